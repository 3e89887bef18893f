pub mod heuristic;
pub mod http;

use crate::config::{ScoringBackend, ScoringConfig};
use crate::models::{EmailMessage, ScoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use heuristic::HeuristicScorer;
pub use http::HttpScorer;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring backend unavailable: {0}")]
    Unavailable(String),

    #[error("scoring backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("scoring backend returned an invalid result: {0}")]
    InvalidResponse(String),
}

impl ScoringError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Unavailable(_) => "scoring_unavailable",
            ScoringError::Timeout(_) => "scoring_timeout",
            ScoringError::InvalidResponse(_) => "scoring_invalid_response",
        }
    }
}

/// Maps raw email text to a phishing-risk score and explanation.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, message: &EmailMessage) -> Result<ScoreResult, ScoringError>;
    fn name(&self) -> &str;
}

pub fn from_config(config: &ScoringConfig) -> anyhow::Result<Arc<dyn Scorer>> {
    let scorer: Arc<dyn Scorer> = match config.backend {
        ScoringBackend::Heuristic => Arc::new(HeuristicScorer::new()),
        ScoringBackend::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("scoring.endpoint is required for the http backend"))?;
            Arc::new(HttpScorer::new(endpoint, config.timeout())?)
        }
    };
    log::info!("Scoring backend: {}", scorer.name());
    Ok(scorer)
}
