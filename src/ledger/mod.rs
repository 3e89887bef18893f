pub mod http;
pub mod memory;
pub mod signature;
pub mod sqlite;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::models::{AttestationLookup, AttestationRecord, SenderDomain, TransactionRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpLedger;
pub use memory::MemoryLedger;
pub use signature::{Ed25519Verifier, SignatureVerifier};
pub use sqlite::SqliteLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger backend unavailable: {0}")]
    Unavailable(String),

    #[error("ledger backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("signature does not validate for {entity_address}: {reason}")]
    InvalidSignature {
        entity_address: String,
        reason: String,
    },

    #[error("{domain} is already attested by {entity_address} with a different signature")]
    DuplicateAttestation {
        domain: String,
        entity_address: String,
    },

    #[error("ledger backend returned an invalid answer: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Unavailable(_) => "ledger_unavailable",
            LedgerError::Timeout(_) => "ledger_timeout",
            LedgerError::InvalidSignature { .. } => "invalid_signature",
            LedgerError::DuplicateAttestation { .. } => "duplicate_attestation",
            LedgerError::InvalidResponse(_) => "ledger_invalid_response",
        }
    }
}

/// Validated registration payload handed to a ledger backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub domain: SenderDomain,
    pub org_name: String,
    pub entity_address: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    pub record: AttestationRecord,
    /// True when an identical registration already existed and was returned as-is
    pub replayed: bool,
}

/// Resolves and records trusted-sender attestations.
///
/// Implementations must report transport or storage failures as errors, never
/// as [`AttestationLookup::Absent`], and must enforce (domain, entity_address)
/// uniqueness in the backend itself.
#[async_trait]
pub trait AttestationLedger: Send + Sync {
    async fn lookup(&self, domain: &SenderDomain) -> Result<AttestationLookup, LedgerError>;
    async fn register(&self, request: &RegistrationRequest)
        -> Result<RegisterOutcome, LedgerError>;
    fn name(&self) -> &str;

    /// Check an entity address against this ledger's address format before
    /// any write is attempted. Backends that cannot tell accept everything.
    fn check_address(&self, _entity_address: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Derive the transaction reference for a new attestation.
pub fn transaction_ref(request: &RegistrationRequest, created_at: DateTime<Utc>) -> TransactionRef {
    let mut hasher = blake3::Hasher::new();
    for part in [
        request.domain.as_str(),
        request.entity_address.as_str(),
        request.signature.as_str(),
    ] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.update(&created_at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());

    TransactionRef::generated(format!("0x{}", hasher.finalize().to_hex()))
}

pub fn from_config(config: &LedgerConfig) -> anyhow::Result<Arc<dyn AttestationLedger>> {
    let verifier: Arc<dyn SignatureVerifier> = Arc::new(Ed25519Verifier);
    let ledger: Arc<dyn AttestationLedger> = match config.backend {
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::open(&config.database_path, verifier)?),
        LedgerBackend::Memory => Arc::new(MemoryLedger::new(verifier)),
        LedgerBackend::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("ledger.endpoint is required for the http backend"))?;
            Arc::new(HttpLedger::new(endpoint, config.write_timeout())?)
        }
    };
    log::info!("Ledger backend: {}", ledger.name());
    Ok(ledger)
}
