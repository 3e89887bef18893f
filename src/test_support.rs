//! Scripted backends shared by the unit tests.

use crate::ledger::{
    AttestationLedger, LedgerError, RegisterOutcome, RegistrationRequest, SignatureVerifier,
};
use crate::models::{AttestationLookup, EmailMessage, ScoreResult, SenderDomain};
use crate::scoring::{Scorer, ScoringError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Accepts every signature except those starting with "invalid".
pub struct FixtureVerifier;

impl SignatureVerifier for FixtureVerifier {
    fn verify(&self, request: &RegistrationRequest) -> Result<(), LedgerError> {
        if request.signature.starts_with("invalid") {
            return Err(LedgerError::InvalidSignature {
                entity_address: request.entity_address.clone(),
                reason: "fixture rejects this signature".to_string(),
            });
        }
        Ok(())
    }
}

pub struct StaticScorer {
    score: f64,
    explanation: String,
    calls: AtomicUsize,
}

impl StaticScorer {
    pub fn new(score: f64, explanation: &str) -> Self {
        Self {
            score,
            explanation: explanation.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for StaticScorer {
    async fn score(&self, _message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ScoreResult::new(self.score, self.explanation.clone())
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

pub struct FailingScorer;

#[async_trait]
impl Scorer for FailingScorer {
    async fn score(&self, _message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        Err(ScoringError::Unavailable("model server down".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Answers after `delay`; `completed` counts calls that ran to the end.
pub struct SlowScorer {
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowScorer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for SlowScorer {
    async fn score(&self, _message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        ScoreResult::new(0.5, "slow").map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

pub struct FailingLedger;

#[async_trait]
impl AttestationLedger for FailingLedger {
    async fn lookup(&self, _domain: &SenderDomain) -> Result<AttestationLookup, LedgerError> {
        Err(LedgerError::Unavailable("ledger node unreachable".to_string()))
    }

    async fn register(
        &self,
        _request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        Err(LedgerError::Unavailable("ledger node unreachable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Answers after `delay`; `completed` counts calls that ran to the end.
pub struct SlowLedger {
    delay: Duration,
    completed: AtomicUsize,
}

impl SlowLedger {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationLedger for SlowLedger {
    async fn lookup(&self, _domain: &SenderDomain) -> Result<AttestationLookup, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(AttestationLookup::Absent)
    }

    async fn register(
        &self,
        _request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::Unavailable("slow ledger never confirms".to_string()))
    }

    fn name(&self) -> &str {
        "slow"
    }
}
