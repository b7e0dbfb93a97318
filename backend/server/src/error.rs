//! Errors surfaced by the interactive session.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::{ChainError, InstanceError, WalletError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("wallet not connected")]
    NotConnected,
    #[error("a deploy or update is still pending")]
    UpdateInFlight,
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
}

impl SessionError {
    fn status(&self) -> StatusCode {
        match self {
            SessionError::Auth(_) | SessionError::NotConnected | SessionError::Wallet(_) => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::UpdateInFlight => StatusCode::CONFLICT,
            SessionError::Instance(err) => match err {
                InstanceError::Wallet(_) => StatusCode::UNAUTHORIZED,
                InstanceError::ZeroAmount
                | InstanceError::InsufficientFunds { .. }
                | InstanceError::NotDeployed
                | InstanceError::AlreadyDeployed(_)
                | InstanceError::ScriptHash(_) => StatusCode::BAD_REQUEST,
                InstanceError::Chain(ChainError::Valkey(_) | ChainError::Corrupt { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                InstanceError::Chain(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string()
        });
        (self.status(), Json(body)).into_response()
    }
}
