//! Bank registry endpoints.
//!
//! Each handler validates through the bank controller and then dispatches
//! one stored routine. The credential's `idAccount`/`idUser` are always
//! passed along with the validated fields.

use crate::api::error::ApiError;
use crate::api::{ApiResponse, AppState};
use crate::controller::{CrudController, RequestBag};
use crate::models::{DispatchOutput, ExpectedReturn, Permission, SecurityRule};
use crate::validation::primitives::{ForeignKey, name, nullable_description, nullable_string};
use crate::validation::{FieldReader, NoFields, Schema};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

pub const SECURABLE: &str = "Bank";

pub const SP_CREATE: &str = "spBankCreate";
pub const SP_LIST: &str = "spBankList";
pub const SP_GET: &str = "spBankGet";
pub const SP_UPDATE: &str = "spBankUpdate";
pub const SP_DELETE: &str = "spBankDelete";

/// Febraban codes are three digits; leave room for other schemes.
const CODE_MAX_LEN: usize = 10;

const NO_NAMES: Option<&[&str]> = None;

/// Controller declaring every CRUD permission on banks.
pub fn controller() -> CrudController {
    CrudController::new(vec![
        SecurityRule::new(SECURABLE, Permission::Create),
        SecurityRule::new(SECURABLE, Permission::Read),
        SecurityRule::new(SECURABLE, Permission::Update),
        SecurityRule::new(SECURABLE, Permission::Delete),
    ])
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bank", post(create_bank).get(list_banks))
        .route(
            "/bank/{idBank}",
            get(get_bank).put(update_bank).delete(delete_bank),
        )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankCreate {
    pub name: String,
    pub code: Option<String>,
    pub description: Option<String>,
}

impl Schema for BankCreate {
    fn from_fields(f: &mut FieldReader<'_>) -> Option<Self> {
        let name = f.required("name", name());
        let code = f.optional("code", nullable_string(Some(CODE_MAX_LEN)));
        let description = f.optional("description", nullable_description());
        Some(Self {
            name: name?,
            code: code?.flatten(),
            description: description?.flatten(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankKey {
    pub id_bank: i64,
}

impl Schema for BankKey {
    fn from_fields(f: &mut FieldReader<'_>) -> Option<Self> {
        let id_bank = f.required("idBank", ForeignKey);
        Some(Self { id_bank: id_bank? })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankUpdate {
    pub id_bank: i64,
    #[serde(flatten)]
    pub fields: BankCreate,
}

impl Schema for BankUpdate {
    fn from_fields(f: &mut FieldReader<'_>) -> Option<Self> {
        let key = BankKey::from_fields(f);
        let fields = BankCreate::from_fields(f);
        Some(Self {
            id_bank: key?.id_bank,
            fields: fields?,
        })
    }
}

async fn create_bank(
    State(state): State<AppState>,
    bag: RequestBag,
) -> Result<(StatusCode, Json<ApiResponse<DispatchOutput>>), ApiError> {
    let validated = state.banks.create::<BankCreate>(&bag).await?;
    let output = state
        .dispatcher
        .dispatch(
            SP_CREATE,
            &validated.routine_params()?,
            ExpectedReturn::Single,
            None,
            NO_NAMES,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(output))))
}

async fn list_banks(
    State(state): State<AppState>,
    bag: RequestBag,
) -> Result<Json<ApiResponse<DispatchOutput>>, ApiError> {
    let validated = state.banks.read::<NoFields>(&bag).await?;
    let output = state
        .dispatcher
        .dispatch(
            SP_LIST,
            &validated.routine_params()?,
            ExpectedReturn::Multi,
            None,
            Some(&["banks"][..]),
        )
        .await?;
    Ok(Json(ApiResponse::ok(output)))
}

async fn get_bank(
    State(state): State<AppState>,
    bag: RequestBag,
) -> Result<Json<ApiResponse<DispatchOutput>>, ApiError> {
    let validated = state.banks.read::<BankKey>(&bag).await?;
    let output = state
        .dispatcher
        .dispatch(
            SP_GET,
            &validated.routine_params()?,
            ExpectedReturn::Single,
            None,
            NO_NAMES,
        )
        .await?;
    if output == DispatchOutput::Row(None) {
        return Err(ApiError::NotFound(format!(
            "Bank {} not found",
            validated.params.id_bank
        )));
    }
    Ok(Json(ApiResponse::ok(output)))
}

async fn update_bank(
    State(state): State<AppState>,
    bag: RequestBag,
) -> Result<Json<ApiResponse<DispatchOutput>>, ApiError> {
    let validated = state.banks.update::<BankUpdate>(&bag).await?;
    let output = state
        .dispatcher
        .dispatch(
            SP_UPDATE,
            &validated.routine_params()?,
            ExpectedReturn::Single,
            None,
            NO_NAMES,
        )
        .await?;
    Ok(Json(ApiResponse::ok(output)))
}

async fn delete_bank(
    State(state): State<AppState>,
    bag: RequestBag,
) -> Result<Json<ApiResponse<DispatchOutput>>, ApiError> {
    let validated = state.banks.delete::<BankKey>(&bag).await?;
    let output = state
        .dispatcher
        .dispatch(
            SP_DELETE,
            &validated.routine_params()?,
            ExpectedReturn::None,
            None,
            NO_NAMES,
        )
        .await?;
    Ok(Json(ApiResponse::ok(output)))
}
