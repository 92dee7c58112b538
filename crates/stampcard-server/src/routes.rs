//! Wallet web service HTTP surface.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::protocol::{PassContent, PassContentService, ProtocolError};
use crate::registry::{DeviceRegistry, RegistrationOutcome};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: DeviceRegistry,
    pub content: PassContentService,
    pub pass_type_identifier: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/devices/{device_id}/registrations/{pass_type}/{serial}",
            post(register_device).delete(unregister_device),
        )
        .route(
            "/v1/devices/{device_id}/registrations/{pass_type}",
            get(updated_passes),
        )
        .route("/v1/passes/{pass_type}/{serial}", get(latest_pass))
        .route("/v1/log", post(device_log))
        .route("/health", get(health))
        .with_state(state)
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Storage(e) => {
                error!(error = %e, "Storage failure while serving device");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Token from an `Authorization: ApplePass <token>` header.
fn apple_pass_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("ApplePass "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn check_pass_type(state: &AppState, pass_type: &str) -> Result<(), ProtocolError> {
    if pass_type == state.pass_type_identifier {
        Ok(())
    } else {
        Err(ProtocolError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub push_token: String,
}

/// `POST /v1/devices/{device}/registrations/{passType}/{serial}`
pub async fn register_device(
    State(state): State<AppState>,
    Path((device_id, pass_type, serial)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<StatusCode, ProtocolError> {
    check_pass_type(&state, &pass_type)?;
    let token = apple_pass_token(&headers).ok_or(ProtocolError::Unauthorized)?;

    match state
        .registry
        .register(&device_id, &serial, token, &body.push_token)
        .await?
    {
        RegistrationOutcome::Created => Ok(StatusCode::CREATED),
        RegistrationOutcome::AlreadyRegistered => Ok(StatusCode::OK),
    }
}

/// `DELETE /v1/devices/{device}/registrations/{passType}/{serial}`
pub async fn unregister_device(
    State(state): State<AppState>,
    Path((device_id, pass_type, serial)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ProtocolError> {
    check_pass_type(&state, &pass_type)?;
    let token = apple_pass_token(&headers).ok_or(ProtocolError::Unauthorized)?;
    state.registry.unregister(&device_id, &serial, token).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct UpdatedQuery {
    #[serde(rename = "passesUpdatedSince")]
    pub passes_updated_since: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedResponse {
    pub serial_numbers: Vec<String>,
    pub last_updated: String,
}

/// `GET /v1/devices/{device}/registrations/{passType}?passesUpdatedSince=T`
pub async fn updated_passes(
    State(state): State<AppState>,
    Path((device_id, pass_type)): Path<(String, String)>,
    Query(query): Query<UpdatedQuery>,
) -> Result<Response, ProtocolError> {
    check_pass_type(&state, &pass_type)?;
    // An unparsable tag means "everything".
    let since = query
        .passes_updated_since
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok());

    let updated = state.registry.updated_since(&device_id, since).await?;
    let Some(last_updated) = updated.last_updated else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    Ok(Json(UpdatedResponse {
        serial_numbers: updated.pass_ids,
        last_updated: last_updated.to_string(),
    })
    .into_response())
}

/// `GET /v1/passes/{passType}/{serial}`
pub async fn latest_pass(
    State(state): State<AppState>,
    Path((pass_type, serial)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ProtocolError> {
    check_pass_type(&state, &pass_type)?;
    let token = apple_pass_token(&headers).ok_or(ProtocolError::Unauthorized)?;
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let content = state
        .content
        .pass_content(&serial, token, if_none_match)
        .await?;
    let response = match content {
        PassContent::Unchanged { etag } => {
            (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response()
        }
        PassContent::Fresh(bundle) => {
            let etag = bundle.etag.clone();
            (StatusCode::OK, [(header::ETAG, etag)], Json(bundle.to_json())).into_response()
        }
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct LogBody {
    #[serde(default)]
    pub logs: Vec<String>,
}

/// `POST /v1/log`
pub async fn device_log(Json(body): Json<LogBody>) -> StatusCode {
    for line in body.logs.iter().take(100) {
        warn!(line = %line, "Device log");
    }
    StatusCode::OK
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
