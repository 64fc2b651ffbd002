//! Request validation for CRUD operations.
//!
//! A `CrudController` owns the security rules of one resource. Each of its
//! four verbs resolves the caller's credential, runs the authorization hook,
//! merges the request fragments and parses them into a typed schema. Every
//! outcome comes back as a `Result`; nothing here panics or touches the
//! database.

mod authorize;
mod credential;
mod request;

pub use authorize::{Authorizer, DeclaredRulesOnly, PermitAll};
pub use credential::{CredentialResolver, StaticCredential};
pub use request::RequestBag;

use crate::error::DbResult;
use crate::models::{Credential, Permission, RoutineParams, SecurityRule};
use crate::validation::{self, FieldIssue, Schema};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Why a request did not validate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Validation failed with {} issue(s)", .issues.len())]
    Schema { issues: Vec<FieldIssue> },

    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("{permission} on '{securable}' is not permitted")]
    Forbidden {
        securable: String,
        permission: Permission,
    },
}

impl ValidationError {
    pub fn schema(issues: Vec<FieldIssue>) -> Self {
        Self::Schema { issues }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Field issues, empty for non-schema errors.
    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::Schema { issues } => issues,
            _ => &[],
        }
    }
}

/// A validated request: who is acting, and with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult<S> {
    pub credential: Credential,
    pub params: S,
}

impl<S: Serialize> ValidationResult<S> {
    /// Routine parameters: `idAccount` and `idUser` from the credential
    /// followed by the validated fields. The credential wins over any field
    /// of the same name.
    pub fn routine_params(&self) -> DbResult<RoutineParams> {
        let mut params = RoutineParams::new()
            .with("idAccount", self.credential.id_account)
            .with("idUser", self.credential.id_user);

        for (name, value) in RoutineParams::from_serialize(&self.params)?.iter() {
            if params.get_ignore_case(name).is_none() {
                params.insert(name, value.clone());
            }
        }
        Ok(params)
    }
}

/// Validation front door for one resource.
#[derive(Debug, Clone)]
pub struct CrudController<R = StaticCredential, A = PermitAll> {
    rules: Vec<SecurityRule>,
    resolver: R,
    authorizer: A,
}

impl CrudController {
    /// Controller with the static credential and no rule enforcement.
    pub fn new(rules: Vec<SecurityRule>) -> Self {
        Self {
            rules,
            resolver: StaticCredential::default(),
            authorizer: PermitAll,
        }
    }
}

impl<R: CredentialResolver, A: Authorizer> CrudController<R, A> {
    pub fn with_resolver<R2: CredentialResolver>(self, resolver: R2) -> CrudController<R2, A> {
        CrudController {
            rules: self.rules,
            resolver,
            authorizer: self.authorizer,
        }
    }

    pub fn with_authorizer<A2: Authorizer>(self, authorizer: A2) -> CrudController<R, A2> {
        CrudController {
            rules: self.rules,
            resolver: self.resolver,
            authorizer,
        }
    }

    /// The rules this controller was built with, unchanged.
    pub fn security_rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    pub async fn create<S: Schema>(
        &self,
        bag: &RequestBag,
    ) -> Result<ValidationResult<S>, ValidationError> {
        self.validate(bag, Permission::Create).await
    }

    pub async fn read<S: Schema>(
        &self,
        bag: &RequestBag,
    ) -> Result<ValidationResult<S>, ValidationError> {
        self.validate(bag, Permission::Read).await
    }

    pub async fn update<S: Schema>(
        &self,
        bag: &RequestBag,
    ) -> Result<ValidationResult<S>, ValidationError> {
        self.validate(bag, Permission::Update).await
    }

    pub async fn delete<S: Schema>(
        &self,
        bag: &RequestBag,
    ) -> Result<ValidationResult<S>, ValidationError> {
        self.validate(bag, Permission::Delete).await
    }

    async fn validate<S: Schema>(
        &self,
        bag: &RequestBag,
        permission: Permission,
    ) -> Result<ValidationResult<S>, ValidationError> {
        let credential = self.resolver.resolve(bag).await?;
        self.authorizer
            .authorize(&credential, &self.rules, permission)?;

        let fields = bag
            .merged()
            .map_err(|issue| ValidationError::schema(vec![issue]))?;
        let params = validation::parse::<S>(&fields).map_err(|issues| {
            debug!(permission = %permission, issues = issues.len(), "Request rejected");
            ValidationError::schema(issues)
        })?;

        Ok(ValidationResult { credential, params })
    }
}
