use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use gatehouse_auth::ProviderInfo;
use gatehouse_config::{ConfigError, SiteConfig};
use serde::Serialize;
use serde_json::{Value, json};

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    config_version: u64,
    providers: usize,
    reconcile_failures: u64,
}

#[derive(Serialize)]
pub struct ValidationResponse {
    valid: bool,
    problems: Vec<String>,
}

impl ValidationResponse {
    fn from_problems(problems: Vec<String>) -> Self {
        Self {
            valid: problems.is_empty(),
            problems,
        }
    }
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok",
        config_version: state.config.version(),
        providers: state.registry.len(),
        reconcile_failures: state.service.stats().passes_failed,
    };
    (StatusCode::OK, Json(body))
}

pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderInfo>> {
    Json(state.registry.infos())
}

/// Run the pre-acceptance gate on a candidate document without applying it.
pub async fn validate_config(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    match SiteConfig::from_json(payload) {
        Ok(document) => (
            StatusCode::OK,
            Json(ValidationResponse::from_problems(
                state.config.validate(&document),
            )),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ValidationResponse::from_problems(vec![e.to_string()])),
        ),
    }
}

/// Propose a new live document through the gate.
pub async fn put_config(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let document = match SiteConfig::from_json(payload) {
        Ok(document) => document,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!(ValidationResponse::from_problems(vec![e.to_string()]))),
            );
        }
    };

    match state.config.propose(document).await {
        Ok(version) => (StatusCode::OK, Json(json!({ "version": version }))),
        Err(ConfigError::Rejected { problems }) => {
            tracing::info!(count = problems.len(), "Rejected configuration proposal");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!(ValidationResponse::from_problems(problems))),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to apply configuration proposal");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
