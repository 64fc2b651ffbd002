//! Authorization against declared security rules.

use crate::controller::ValidationError;
use crate::models::{Credential, Permission, SecurityRule};

/// Decides whether a credential may perform `permission` given the
/// controller's declared rules. Runs after credential resolution and before
/// schema parsing.
pub trait Authorizer: Send + Sync {
    fn authorize(
        &self,
        credential: &Credential,
        rules: &[SecurityRule],
        permission: Permission,
    ) -> Result<(), ValidationError>;
}

/// Allows everything. Rules are carried but not enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl Authorizer for PermitAll {
    fn authorize(
        &self,
        _credential: &Credential,
        _rules: &[SecurityRule],
        _permission: Permission,
    ) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Allows a verb only when some declared rule grants it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredRulesOnly;

impl Authorizer for DeclaredRulesOnly {
    fn authorize(
        &self,
        _credential: &Credential,
        rules: &[SecurityRule],
        permission: Permission,
    ) -> Result<(), ValidationError> {
        if rules.iter().any(|rule| rule.permission == permission) {
            return Ok(());
        }
        let securable = rules
            .first()
            .map(|rule| rule.securable.clone())
            .unwrap_or_default();
        Err(ValidationError::Forbidden {
            securable,
            permission,
        })
    }
}
