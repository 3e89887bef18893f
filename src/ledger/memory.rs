use super::{
    transaction_ref, AttestationLedger, LedgerError, RegisterOutcome, RegistrationRequest,
    SignatureVerifier,
};
use crate::models::{AttestationLookup, AttestationRecord, SenderDomain};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

struct Entry {
    record: AttestationRecord,
    signature: String,
}

/// Process-local ledger for development setups and tests. Records live for
/// the lifetime of the process.
pub struct MemoryLedger {
    entries: Mutex<Vec<Entry>>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl MemoryLedger {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            verifier,
        }
    }

    /// Insert an already-confirmed record without signature verification.
    pub fn preload(&self, record: AttestationRecord, signature: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry {
                record,
                signature: signature.into(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> LedgerError {
        LedgerError::Unavailable("memory ledger lock poisoned".to_string())
    }
}

#[async_trait]
impl AttestationLedger for MemoryLedger {
    async fn lookup(&self, domain: &SenderDomain) -> Result<AttestationLookup, LedgerError> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries
            .iter()
            .find(|entry| &entry.record.domain == domain)
            .map(|entry| AttestationLookup::Found(entry.record.clone()))
            .unwrap_or(AttestationLookup::Absent))
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        self.verifier.verify(request)?;

        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        if let Some(existing) = entries.iter().find(|entry| {
            entry.record.domain == request.domain
                && entry.record.entity_address == request.entity_address
        }) {
            return if existing.signature == request.signature {
                Ok(RegisterOutcome {
                    record: existing.record.clone(),
                    replayed: true,
                })
            } else {
                Err(LedgerError::DuplicateAttestation {
                    domain: request.domain.to_string(),
                    entity_address: request.entity_address.clone(),
                })
            };
        }

        let created_at = Utc::now();
        let record = AttestationRecord {
            domain: request.domain.clone(),
            org_name: request.org_name.clone(),
            entity_address: request.entity_address.clone(),
            tx_hash: transaction_ref(request, created_at),
            created_at,
        };
        entries.push(Entry {
            record: record.clone(),
            signature: request.signature.clone(),
        });

        Ok(RegisterOutcome {
            record,
            replayed: false,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn check_address(&self, entity_address: &str) -> Result<(), String> {
        self.verifier.check_address(entity_address)
    }
}
