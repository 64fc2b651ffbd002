//! Caller identity resolution.

use crate::controller::{RequestBag, ValidationError};
use crate::models::Credential;
use std::future::Future;

/// Resolves the acting principal for a request.
pub trait CredentialResolver: Send + Sync {
    fn resolve(
        &self,
        bag: &RequestBag,
    ) -> impl Future<Output = Result<Credential, ValidationError>> + Send;
}

/// Resolves every request to the same principal.
///
/// The default is account 1, user 1, which is what a single-tenant
/// deployment without an identity provider runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCredential(pub Credential);

impl Default for StaticCredential {
    fn default() -> Self {
        Self(Credential {
            id_account: 1,
            id_user: 1,
        })
    }
}

impl CredentialResolver for StaticCredential {
    async fn resolve(&self, _bag: &RequestBag) -> Result<Credential, ValidationError> {
        Ok(self.0)
    }
}
