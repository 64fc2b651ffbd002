//! Routine invocation data models.
//!
//! A routine takes named parameters and answers with zero or more ordered
//! result sets. These types describe both sides of that exchange.

use crate::error::{DbError, DbResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// One row: column name to value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows returned by one statement of a routine, in order.
pub type ResultSet = Vec<Row>;

/// A scalar value bound to a named routine parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoutineParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl RoutineParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<JsonValue> for RoutineParam {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<i64> for RoutineParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RoutineParam {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<bool> for RoutineParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for RoutineParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for RoutineParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RoutineParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<RoutineParam>> From<Option<T>> for RoutineParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Named routine parameters. Names are unique; inserting an existing name
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineParams {
    entries: Vec<(String, RoutineParam)>,
}

impl RoutineParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RoutineParam>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RoutineParam>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RoutineParam> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Case-insensitive lookup, for engines whose parameter names are.
    pub fn get_ignore_case(&self, name: &str) -> Option<&RoutineParam> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RoutineParam)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build parameters from any value serializing to a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> DbResult<Self> {
        let json = serde_json::to_value(value).map_err(|e| {
            DbError::invalid_input(format!("Parameters could not be serialized: {}", e))
        })?;
        match json {
            JsonValue::Object(map) => Ok(map.into_iter().collect()),
            JsonValue::Null => Ok(Self::new()),
            other => Err(DbError::invalid_input(format!(
                "Parameters must serialize to an object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<RoutineParam>> FromIterator<(K, V)> for RoutineParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl Serialize for RoutineParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Shape the caller expects a routine's output to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedReturn {
    /// First row of the first result set.
    Single,
    /// Every result set, optionally labeled.
    Multi,
    /// Output is discarded.
    None,
}

impl ExpectedReturn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::Multi => "Multi",
            Self::None => "None",
        }
    }
}

impl std::fmt::Display for ExpectedReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpectedReturn {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            "none" => Ok(Self::None),
            _ => Err(DbError::invalid_input(format!(
                "Unknown expected return '{}'. Use Single, Multi or None",
                s
            ))),
        }
    }
}

/// Result sets labeled by caller-supplied names, in the order supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedResultSets {
    sets: Vec<(String, ResultSet)>,
}

impl NamedResultSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated name keeps its first position and takes the later set.
    pub fn insert(&mut self, name: impl Into<String>, set: ResultSet) {
        let name = name.into();
        match self.sets.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = set,
            None => self.sets.push((name, set)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResultSet> {
        self.sets.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Serialize for NamedResultSets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sets.len()))?;
        for (name, set) in &self.sets {
            map.serialize_entry(name, set)?;
        }
        map.end()
    }
}

/// Shaped output of a dispatched routine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutput {
    /// `Single`: the first row, if any.
    Row(Option<Row>),
    /// `Multi` without names.
    ResultSets(Vec<ResultSet>),
    /// `Multi` with names.
    Named(NamedResultSets),
    /// `None`.
    Nothing,
}

impl DispatchOutput {
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) => row,
            _ => None,
        }
    }

    pub fn into_result_sets(self) -> Option<Vec<ResultSet>> {
        match self {
            Self::ResultSets(sets) => Some(sets),
            _ => None,
        }
    }

    pub fn into_named(self) -> Option<NamedResultSets> {
        match self {
            Self::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_from_json() {
        assert_eq!(RoutineParam::from(json!(5)), RoutineParam::Int(5));
        assert_eq!(RoutineParam::from(json!(1.5)), RoutineParam::Float(1.5));
        assert_eq!(RoutineParam::from(json!(null)), RoutineParam::Null);
        assert_eq!(
            RoutineParam::from(json!("Banco X")),
            RoutineParam::String("Banco X".to_string())
        );
        assert!(matches!(
            RoutineParam::from(json!({"a": 1})),
            RoutineParam::Json(_)
        ));
    }

    #[test]
    fn test_params_replace_in_place() {
        let params = RoutineParams::new()
            .with("code", "001")
            .with("name", "Banco X")
            .with("code", "002");
        assert_eq!(params.len(), 2);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["code", "name"]);
        assert_eq!(params.get("code"), Some(&RoutineParam::from("002")));
        assert_eq!(params.get_ignore_case("NAME"), Some(&RoutineParam::from("Banco X")));
    }

    #[test]
    fn test_params_from_serialize() {
        #[derive(Serialize)]
        struct Args {
            id: i64,
            description: Option<String>,
        }
        let params = RoutineParams::from_serialize(&Args {
            id: 5,
            description: None,
        })
        .unwrap();
        assert_eq!(params.get("id"), Some(&RoutineParam::Int(5)));
        assert!(params.get("description").unwrap().is_null());

        let err = RoutineParams::from_serialize(&vec![1, 2]).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_params_serialize_in_order() {
        let params = RoutineParams::new().with("b", 2).with("a", 1);
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"b":2,"a":1}"#);
    }

    #[test]
    fn test_expected_return_parsing() {
        assert_eq!("single".parse::<ExpectedReturn>().unwrap(), ExpectedReturn::Single);
        assert_eq!("Multi".parse::<ExpectedReturn>().unwrap(), ExpectedReturn::Multi);
        assert_eq!("NONE".parse::<ExpectedReturn>().unwrap(), ExpectedReturn::None);
    }

    #[test]
    fn test_unknown_expected_return_is_rejected() {
        let err = "Scalar".parse::<ExpectedReturn>().unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_dispatch_output_serialization() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(5));
        assert_eq!(
            serde_json::to_value(DispatchOutput::Row(Some(row))).unwrap(),
            json!({"id": 5})
        );
        assert_eq!(
            serde_json::to_value(DispatchOutput::Row(None)).unwrap(),
            JsonValue::Null
        );
        assert_eq!(
            serde_json::to_value(DispatchOutput::Nothing).unwrap(),
            JsonValue::Null
        );

        let mut named = NamedResultSets::new();
        named.insert("banks", vec![]);
        named.insert("total", vec![]);
        assert_eq!(
            serde_json::to_string(&DispatchOutput::Named(named)).unwrap(),
            r#"{"banks":[],"total":[]}"#
        );
    }
}
