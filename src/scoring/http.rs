use super::{Scorer, ScoringError};
use crate::models::{EmailMessage, ScoreResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Serialize)]
struct ScoreRequest<'a> {
    raw_email: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f64,
    explanation: String,
}

/// Client for a model-serving endpoint that accepts `{"raw_email": ...}` and
/// answers `{"score": f64, "explanation": str}`.
pub struct HttpScorer {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpScorer {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("phishguard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ScoringError {
        if e.is_timeout() {
            ScoringError::Timeout(self.timeout)
        } else {
            ScoringError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        log::debug!(
            "Requesting score from {} ({} bytes)",
            self.endpoint,
            message.len()
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ScoreRequest {
                raw_email: message.as_str(),
            })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Unavailable(format!(
                "model endpoint answered HTTP {status}"
            )));
        }

        let body: ScoreResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ScoringError::Timeout(self.timeout)
            } else {
                ScoringError::InvalidResponse(e.to_string())
            }
        })?;

        ScoreResult::new(body.score, body.explanation)
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
