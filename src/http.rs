//! Inbound HTTP boundary.
//!
//! `POST /poke/search` with `{"Pokemon_Name": "<name>"}` and `GET /poke/search/{name}` both
//! answer with the aggregate body and its status code (200, 207 or 500). Keys that fail
//! normalisation and unreadable request bodies get a 400.

use crate::error::GatewayError;
use crate::orchestrator::Gateway;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Body of `POST /poke/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchBody {
    #[serde(rename = "Pokemon_Name")]
    pub pokemon_name: String,
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/poke/search", post(search_from_body))
        .route("/poke/search/:name", get(search_from_path))
        .with_state(gateway)
}

async fn search_from_body(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => respond(&gateway, &body.pokemon_name).await,
        Err(rejection) => bad_request("InvalidRequest", rejection.body_text()),
    }
}

async fn search_from_path(
    State(gateway): State<Arc<Gateway>>,
    Path(name): Path<String>,
) -> Response {
    respond(&gateway, &name).await
}

async fn respond(gateway: &Gateway, raw: &str) -> Response {
    match gateway.search(raw).await {
        Ok(result) => {
            let status =
                StatusCode::from_u16(result.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(result.to_json())).into_response()
        }
        Err(err @ GatewayError::InvalidKey { .. }) => {
            tracing::debug!(error = %err, "rejected lookup key");
            bad_request("InvalidKey", err.to_string())
        }
        Err(err) => {
            tracing::error!(error = %err, "search failed outside the aggregate");
            let body = json!({ "error": { "classification": "InternalError", "message": err.to_string() } });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn bad_request(classification: &str, message: String) -> Response {
    let body = json!({ "error": { "classification": classification, "message": message } });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}
