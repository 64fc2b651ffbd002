//! Raw request input.

use crate::validation::FieldIssue;
use serde_json::{Map, Value};

/// The three input fragments of a request before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBag {
    pub path: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
}

impl RequestBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Flatten into one field map. On a key collision the body wins over
    /// the query, and the query wins over the path.
    ///
    /// A body that is present but not a JSON object (or null) is rejected.
    pub fn merged(&self) -> Result<Map<String, Value>, FieldIssue> {
        let mut merged = self.path.clone();
        merged.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));

        match &self.body {
            None | Some(Value::Null) => {}
            Some(Value::Object(body)) => {
                merged.extend(body.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                let kind = match other {
                    Value::Array(_) => "array",
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    _ => "boolean",
                };
                return Err(FieldIssue::new(
                    "",
                    format!("Expected object body, received {}", kind),
                ));
            }
        }
        Ok(merged)
    }
}
