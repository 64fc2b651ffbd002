//! Reusable field rules.
//!
//! Each rule checks one JSON value and produces a typed output or a
//! human-readable message. Rules hold no state and never touch the database.

use chrono::DateTime;
use serde_json::Value;

/// Upper bound of `name()` fields.
pub const NAME_MAX_LEN: usize = 200;

/// Upper bound of `nullable_description()` fields.
pub const DESCRIPTION_MAX_LEN: usize = 500;

/// A check applied to one field value.
pub trait Rule {
    type Output;

    fn check(&self, value: &Value) -> Result<Self::Output, String>;
}

/// Integer flag restricted to 0 or 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bit;

/// Reference to another record: a strictly positive integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignKey;

/// Integer with optional inclusive bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integer {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// String whose length in characters lies in `min..=max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedString {
    pub min: usize,
    pub max: Option<usize>,
}

/// RFC 3339 date-time string, e.g. `2024-05-01T12:30:00Z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateString;

/// Accepts explicit `null` in addition to whatever `R` accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nullable<R>(pub R);

impl Rule for Bit {
    type Output = u8;

    fn check(&self, value: &Value) -> Result<u8, String> {
        match integer_of(value)? {
            0 => Ok(0),
            1 => Ok(1),
            _ => Err("Number must be 0 or 1".to_string()),
        }
    }
}

impl Rule for ForeignKey {
    type Output = i64;

    fn check(&self, value: &Value) -> Result<i64, String> {
        let n = integer_of(value)?;
        if n <= 0 {
            return Err("Number must be greater than 0".to_string());
        }
        Ok(n)
    }
}

impl Rule for Integer {
    type Output = i64;

    fn check(&self, value: &Value) -> Result<i64, String> {
        let n = integer_of(value)?;
        if let Some(min) = self.min.filter(|min| n < *min) {
            return Err(format!("Number must be greater than or equal to {}", min));
        }
        if let Some(max) = self.max.filter(|max| n > *max) {
            return Err(format!("Number must be less than or equal to {}", max));
        }
        Ok(n)
    }
}

impl Rule for BoundedString {
    type Output = String;

    fn check(&self, value: &Value) -> Result<String, String> {
        let s = value
            .as_str()
            .ok_or_else(|| expected("string", value))?;
        let len = s.chars().count();
        if len < self.min {
            return Err(format!(
                "String must contain at least {} character(s)",
                self.min
            ));
        }
        if let Some(max) = self.max.filter(|max| len > *max) {
            return Err(format!("String must contain at most {} character(s)", max));
        }
        Ok(s.to_string())
    }
}

impl Rule for DateString {
    type Output = String;

    fn check(&self, value: &Value) -> Result<String, String> {
        let s = value
            .as_str()
            .ok_or_else(|| expected("string", value))?;
        DateTime::parse_from_rfc3339(s).map_err(|_| "Invalid datetime".to_string())?;
        Ok(s.to_string())
    }
}

impl<R: Rule> Rule for Nullable<R> {
    type Output = Option<R::Output>;

    fn check(&self, value: &Value) -> Result<Self::Output, String> {
        match value {
            Value::Null => Ok(None),
            other => self.0.check(other).map(Some),
        }
    }
}

/// Non-empty string of at most 200 characters.
pub fn name() -> BoundedString {
    BoundedString {
        min: 1,
        max: Some(NAME_MAX_LEN),
    }
}

/// Optional free text of at most 500 characters; null allowed.
pub fn nullable_description() -> Nullable<BoundedString> {
    Nullable(BoundedString {
        min: 0,
        max: Some(DESCRIPTION_MAX_LEN),
    })
}

/// Any string, optionally capped at `max` characters.
pub fn string(max: Option<usize>) -> BoundedString {
    BoundedString { min: 0, max }
}

pub fn nullable_string(max: Option<usize>) -> Nullable<BoundedString> {
    Nullable(string(max))
}

pub fn nullable_foreign_key() -> Nullable<ForeignKey> {
    Nullable(ForeignKey)
}

/// Read an integer, accepting canonical decimal strings such as `"42"` or
/// `"-7"` since path and query values always arrive as text.
fn integer_of(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(i),
            None if n.is_u64() => Err("Number is too large".to_string()),
            None => Err("Expected integer, received float".to_string()),
        },
        Value::String(s) if is_canonical_integer(s) => s
            .parse::<i64>()
            .map_err(|_| "Number is too large".to_string()),
        Value::String(_) => Err("Expected number, received string".to_string()),
        other => Err(expected("number", other)),
    }
}

fn is_canonical_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    match digits.as_bytes() {
        [] => false,
        [b'0'] => s == "0",
        [first, rest @ ..] => {
            (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit)
        }
    }
}

fn expected(kind: &str, value: &Value) -> String {
    let received = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    format!("Expected {}, received {}", kind, received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bit() {
        assert_eq!(Bit.check(&json!(0)), Ok(0));
        assert_eq!(Bit.check(&json!(1)), Ok(1));
        assert_eq!(Bit.check(&json!("1")), Ok(1));
        assert!(Bit.check(&json!(2)).is_err());
        assert!(Bit.check(&json!(-1)).is_err());
        assert!(Bit.check(&json!(true)).is_err());
        assert!(Bit.check(&json!(0.5)).is_err());
        assert!(Bit.check(&json!(1.0)).is_err());
    }

    #[test]
    fn test_foreign_key() {
        assert_eq!(ForeignKey.check(&json!(7)), Ok(7));
        assert_eq!(ForeignKey.check(&json!("42")), Ok(42));
        assert_eq!(
            ForeignKey.check(&json!(0)),
            Err("Number must be greater than 0".to_string())
        );
        assert!(ForeignKey.check(&json!(-3)).is_err());
        assert!(ForeignKey.check(&json!(null)).is_err());
        assert!(ForeignKey.check(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_integer_strings_must_be_canonical() {
        assert_eq!(ForeignKey.check(&json!("-0")), Err("Expected number, received string".into()));
        for bad in ["", "+1", "01", "1.0", " 1", "1e3", "abc", "-"] {
            assert!(ForeignKey.check(&json!(bad)).is_err(), "accepted {:?}", bad);
        }
        assert_eq!(
            Integer::default().check(&json!("-12")),
            Ok(-12),
        );
        assert_eq!(Integer::default().check(&json!("0")), Ok(0));
    }

    #[test]
    fn test_integer_bounds() {
        let rule = Integer {
            min: Some(1),
            max: Some(12),
        };
        assert_eq!(rule.check(&json!(12)), Ok(12));
        assert!(rule.check(&json!(0)).unwrap_err().contains("greater than or equal to 1"));
        assert!(rule.check(&json!(13)).unwrap_err().contains("less than or equal to 12"));
    }

    #[test]
    fn test_name_bounds() {
        assert_eq!(name().check(&json!("Banco do Brasil")), Ok("Banco do Brasil".into()));
        assert_eq!(
            name().check(&json!("")),
            Err("String must contain at least 1 character(s)".to_string())
        );
        assert!(name().check(&json!("x".repeat(200))).is_ok());
        assert!(name().check(&json!("x".repeat(201))).is_err());
        // Length counts characters, not bytes.
        assert!(name().check(&json!("ç".repeat(200))).is_ok());
        assert_eq!(
            name().check(&json!(5)),
            Err("Expected string, received number".to_string())
        );
    }

    #[test]
    fn test_nullable_description() {
        assert_eq!(nullable_description().check(&json!(null)), Ok(None));
        assert_eq!(nullable_description().check(&json!("")), Ok(Some(String::new())));
        assert!(nullable_description().check(&json!("d".repeat(500))).is_ok());
        assert!(nullable_description().check(&json!("d".repeat(501))).is_err());
    }

    #[test]
    fn test_string_helpers() {
        assert!(string(None).check(&json!("a".repeat(10_000))).is_ok());
        assert!(string(Some(3)).check(&json!("abcd")).is_err());
        assert_eq!(nullable_string(Some(3)).check(&json!(null)), Ok(None));
        assert!(nullable_string(None).check(&json!(1)).is_err());
    }

    #[test]
    fn test_nullable_foreign_key() {
        assert_eq!(nullable_foreign_key().check(&json!(null)), Ok(None));
        assert_eq!(nullable_foreign_key().check(&json!(3)), Ok(Some(3)));
        assert!(nullable_foreign_key().check(&json!(0)).is_err());
    }

    #[test]
    fn test_date_string() {
        assert!(DateString.check(&json!("2024-05-01T12:30:00Z")).is_ok());
        assert!(DateString.check(&json!("2024-05-01T12:30:00.123-03:00")).is_ok());
        assert_eq!(
            DateString.check(&json!("01/05/2024")),
            Err("Invalid datetime".to_string())
        );
        assert!(DateString.check(&json!("2024-05-01")).is_err());
        assert!(DateString.check(&json!(1714566600)).is_err());
    }
}
