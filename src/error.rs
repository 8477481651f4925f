//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("table template missing placeholder {0}")]
    MissingPlaceholder(&'static str),
    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),
    #[error("duplicate adapter: {0}")]
    DuplicateAdapter(String),
    #[error("invalid bypass pattern '{pattern}': {reason}")]
    InvalidBypassPattern { pattern: String, reason: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum TenancyError {
    /// A tenant key or id resolved to no record. Recoverable: callers map it
    /// to a 404-style outcome or to "no tenant identified".
    #[error("tenant not found: {0}")]
    TenantNotFound(String),
    /// Record exists but is disabled. Maps to a 403-style outcome.
    #[error("tenant inactive: {0}")]
    TenantInactive(String),
    /// A tenant-scoped operation ran with no tenant in context. Always an
    /// ordering bug in the caller; never resolved by falling back to an
    /// unscoped result.
    #[error("no tenant in context: {0}")]
    NoTenantContext(String),
    /// A subsystem adapter failed during boot or shutdown. Collected per
    /// adapter by the orchestrator; non-fatal to the cycle.
    #[error("adapter {name}: {message}")]
    Adapter { name: String, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl TenancyError {
    pub fn adapter(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        TenancyError::Adapter {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for TenancyError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            TenancyError::TenantNotFound(_) => (StatusCode::NOT_FOUND, "tenant_not_found"),
            TenancyError::TenantInactive(_) => (StatusCode::FORBIDDEN, "tenant_inactive"),
            TenancyError::NoTenantContext(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "no_tenant_context")
            }
            TenancyError::Adapter { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "adapter_error"),
            TenancyError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            TenancyError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
