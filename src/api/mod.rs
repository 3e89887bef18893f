pub mod error;
pub mod handlers;

use crate::config::Config;
use crate::ledger;
use crate::pipeline::IngestionPipeline;
use crate::registration::RegistrationFlow;
use crate::scoring;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

pub use error::ApiError;

pub struct AppState {
    pub pipeline: IngestionPipeline,
    pub registration: RegistrationFlow,
}

impl AppState {
    /// Build both flows over one scorer and one shared ledger.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let scorer = scoring::from_config(&config.scoring)?;
        let ledger = ledger::from_config(&config.ledger)?;

        Ok(Self {
            pipeline: IngestionPipeline::new(
                scorer,
                ledger.clone(),
                config.scoring.timeout(),
                config.ledger.lookup_timeout(),
            ),
            registration: RegistrationFlow::new(ledger, config.ledger.write_timeout()),
        })
    }
}

/// `/health` stays at the root; the rest is mounted under `api_prefix`.
pub fn router(state: Arc<AppState>, api_prefix: &str, max_body_bytes: usize) -> Router {
    let api = Router::new()
        .route("/ingest", post(handlers::ingest))
        .route("/attestations", post(handlers::register_attestation))
        .route("/attestations/:domain", get(handlers::get_attestation));

    let app = Router::new().route("/health", get(handlers::health));
    let prefix = api_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        app.merge(api)
    } else {
        app.nest(prefix, api)
    };

    app.layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(max_body_bytes)))
        .with_state(state)
}
