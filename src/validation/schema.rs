//! Schema composition.
//!
//! A schema is a plain struct that knows how to read itself from a merged
//! field bag. Fields are read through a [`FieldReader`], which applies one
//! rule per field and keeps every failure, so a caller sees all problems
//! with a request at once.

use crate::validation::primitives::Rule;
use serde::Serialize;
use serde_json::{Map, Value};

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// Field name; empty when the issue concerns the request as a whole.
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A typed view of a validated request.
///
/// Implementations read every field before combining the results, so that
/// one bad field does not hide another:
///
/// ```
/// use sproc_gateway::validation::{FieldReader, Schema, primitives::{ForeignKey, name}};
///
/// struct BankRename {
///     id_bank: i64,
///     name: String,
/// }
///
/// impl Schema for BankRename {
///     fn from_fields(f: &mut FieldReader<'_>) -> Option<Self> {
///         let id_bank = f.required("idBank", ForeignKey);
///         let name = f.required("name", name());
///         Some(Self { id_bank: id_bank?, name: name? })
///     }
/// }
/// ```
pub trait Schema: Sized {
    /// Build the value, or return `None` after recording issues on `f`.
    fn from_fields(f: &mut FieldReader<'_>) -> Option<Self>;
}

/// Field access with issue collection.
#[derive(Debug)]
pub struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    issues: Vec<FieldIssue>,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a Map<String, Value>) -> Self {
        Self {
            fields,
            issues: Vec::new(),
        }
    }

    /// Read a field that must be present.
    pub fn required<R: Rule>(&mut self, field: &str, rule: R) -> Option<R::Output> {
        match self.fields.get(field) {
            Some(value) => self.apply(field, value, &rule),
            None => {
                self.issue(field, "Required");
                None
            }
        }
    }

    /// Read a field that may be absent. `Some(None)` means absent;
    /// `None` means present but invalid.
    pub fn optional<R: Rule>(&mut self, field: &str, rule: R) -> Option<Option<R::Output>> {
        match self.fields.get(field) {
            Some(value) => self.apply(field, value, &rule).map(Some),
            None => Some(None),
        }
    }

    /// Record an issue that no single rule can express, such as a
    /// cross-field constraint.
    pub fn issue(&mut self, field: &str, message: impl Into<String>) {
        self.issues.push(FieldIssue::new(field, message));
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<FieldIssue> {
        self.issues
    }

    fn apply<R: Rule>(&mut self, field: &str, value: &Value, rule: &R) -> Option<R::Output> {
        match rule.check(value) {
            Ok(output) => Some(output),
            Err(message) => {
                self.issue(field, message);
                None
            }
        }
    }
}

/// Parse a merged field bag into `S`, collecting every issue on failure.
pub fn parse<S: Schema>(fields: &Map<String, Value>) -> Result<S, Vec<FieldIssue>> {
    let mut reader = FieldReader::new(fields);
    let parsed = S::from_fields(&mut reader);
    let mut issues = reader.into_issues();

    match parsed {
        Some(value) if issues.is_empty() => Ok(value),
        _ => {
            if issues.is_empty() {
                issues.push(FieldIssue::new("", "Invalid input"));
            }
            Err(issues)
        }
    }
}

/// Schema for operations that need no fields beyond the credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoFields {}

impl Schema for NoFields {
    fn from_fields(_: &mut FieldReader<'_>) -> Option<Self> {
        Some(Self {})
    }
}
