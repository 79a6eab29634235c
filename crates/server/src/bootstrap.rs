use std::sync::Arc;

use axum::Router;
use crmlink_core::config::{AppConfig, ConfigError, LoadOptions};
use crmlink_core::ContactService;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::crm;
use crate::gateway::PipedriveGateway;
use crate::health::{self, HealthState};

pub struct Application {
    pub config: AppConfig,
    pub service: ContactService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("upstream http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        upstream_base_url = %config.upstream.base_url,
        search_failure_policy = ?config.upstream.search_failure_policy,
        max_retries = config.upstream.max_retries,
        "starting application bootstrap"
    );

    let gateway = PipedriveGateway::new(&config.upstream).map_err(BootstrapError::HttpClient)?;
    let service = ContactService::new(Arc::new(gateway));

    Ok(Application { config, service })
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(crm::router(self.service.clone()))
            .merge(health::router(HealthState::from_config(&self.config.upstream)))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}
