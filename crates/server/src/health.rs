use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use crmlink_core::config::{SearchFailurePolicy, UpstreamConfig};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    upstream_base_url: String,
    search_failure_policy: SearchFailurePolicy,
    pipedrive_configured: bool,
}

impl HealthState {
    pub fn from_config(upstream: &UpstreamConfig) -> Self {
        Self {
            upstream_base_url: upstream.base_url.clone(),
            search_failure_policy: upstream.search_failure_policy,
            pipedrive_configured: !upstream.api_token.expose_secret().trim().is_empty(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamSummary {
    pub base_url: String,
    pub search_failure_policy: SearchFailurePolicy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub pipedrive_configured: bool,
    pub upstream: UpstreamSummary,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Liveness only; the upstream CRM is not contacted.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        pipedrive_configured: state.pipedrive_configured,
        upstream: UpstreamSummary {
            base_url: state.upstream_base_url,
            search_failure_policy: state.search_failure_policy,
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
