use crate::assembler::assemble;
use crate::extractor::DomainExtractor;
use crate::ledger::{AttestationLedger, LedgerError};
use crate::models::{
    AttestationLookup, EmailMessage, IngestionResult, ScoreResult, SenderDomain,
};
use crate::scoring::{Scorer, ScoringError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of an ingestion. Both backend errors are kept when both fail.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Scoring(ScoringError),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error("scoring and ledger backends both failed: {scoring}; {ledger}")]
    Backends {
        scoring: ScoringError,
        ledger: LedgerError,
    },
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Scoring(e) => e.kind(),
            IngestError::Ledger(e) => e.kind(),
            IngestError::Backends { .. } => "backends_unavailable",
        }
    }
}

pub struct IngestionPipeline {
    extractor: DomainExtractor,
    scorer: Arc<dyn Scorer>,
    ledger: Arc<dyn AttestationLedger>,
    scoring_timeout: Duration,
    lookup_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        ledger: Arc<dyn AttestationLedger>,
        scoring_timeout: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            extractor: DomainExtractor::new(),
            scorer,
            ledger,
            scoring_timeout,
            lookup_timeout,
        }
    }

    /// Score a message and correlate it with the sender's attestation.
    ///
    /// Scoring and the ledger lookup run concurrently inside this future, so
    /// dropping it cancels both. A message whose sender cannot be attributed
    /// is still scored and reported as unverified with no domain.
    pub async fn ingest(&self, message: &EmailMessage) -> Result<IngestionResult, IngestError> {
        let received_at = Utc::now();

        let domain = match self.extractor.extract(message) {
            Ok(domain) => Some(domain),
            Err(e) => {
                log::warn!("Sender not attributable, attestation skipped: {e}");
                None
            }
        };

        let (score, lookup) = tokio::join!(self.score(message), async {
            match &domain {
                Some(domain) => self.lookup_attestation(domain).await.map(Some),
                None => Ok(None),
            }
        });

        let (score, lookup) = match (score, lookup) {
            (Ok(score), Ok(lookup)) => (score, lookup),
            (Err(scoring), Ok(_)) => return Err(IngestError::Scoring(scoring)),
            (Ok(_), Err(ledger)) => return Err(IngestError::Ledger(ledger)),
            (Err(scoring), Err(ledger)) => {
                return Err(IngestError::Backends { scoring, ledger })
            }
        };

        let result = assemble(score, domain, lookup, received_at);
        log::info!(
            "Ingested {} bytes: score={:.3} attestation={:?} domain={}",
            message.len(),
            result.score,
            result.attestation.status(),
            result
                .attestation
                .domain()
                .map(|d| d.as_str())
                .unwrap_or("-")
        );
        Ok(result)
    }

    /// Resolve the attestation for a domain within the lookup deadline.
    pub async fn lookup_attestation(
        &self,
        domain: &SenderDomain,
    ) -> Result<AttestationLookup, LedgerError> {
        match tokio::time::timeout(self.lookup_timeout, self.ledger.lookup(domain)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.lookup_timeout)),
        }
    }

    async fn score(&self, message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        match tokio::time::timeout(self.scoring_timeout, self.scorer.score(message)).await {
            Ok(result) => result,
            Err(_) => Err(ScoringError::Timeout(self.scoring_timeout)),
        }
    }
}
