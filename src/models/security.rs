//! Caller identity and security rule models.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CRUD permission a security rule grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "READ" => Ok(Self::Read),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("Unknown permission: {}", other)),
        }
    }
}

/// A securable resource paired with the verb a controller may validate for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityRule {
    pub securable: String,
    pub permission: Permission,
}

impl SecurityRule {
    pub fn new(securable: impl Into<String>, permission: Permission) -> Self {
        Self {
            securable: securable.into(),
            permission,
        }
    }
}

/// Identity of the acting principal. Both ids are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id_account: i64,
    pub id_user: i64,
}

impl Credential {
    /// Returns `None` unless both ids are positive.
    pub fn new(id_account: i64, id_user: i64) -> Option<Self> {
        (id_account > 0 && id_user > 0).then_some(Self {
            id_account,
            id_user,
        })
    }
}
