use crate::ledger::{AttestationLedger, LedgerError, RegisterOutcome, RegistrationRequest};
use crate::models::SenderDomain;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const MAX_ORG_NAME_CHARS: usize = 256;

lazy_static! {
    static ref ENTITY_ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{1,64}$").unwrap();
}

/// Registration body as received from a client, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AttestationRequest {
    pub domain: String,
    pub org_name: String,
    pub entity_address: String,
    pub signature: String,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RegistrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::InvalidInput { .. } => "invalid_input",
            RegistrationError::Ledger(e) => e.kind(),
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RegistrationError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

/// Validates attestation requests and writes them to the ledger exactly once
/// per call. Failed writes are never retried here; resubmitting the same
/// payload is safe because the ledger replays identical registrations.
pub struct RegistrationFlow {
    ledger: Arc<dyn AttestationLedger>,
    write_timeout: Duration,
}

impl RegistrationFlow {
    pub fn new(ledger: Arc<dyn AttestationLedger>, write_timeout: Duration) -> Self {
        Self {
            ledger,
            write_timeout,
        }
    }

    pub async fn register(
        &self,
        request: AttestationRequest,
    ) -> Result<RegisterOutcome, RegistrationError> {
        let request = validate(request)?;
        self.ledger
            .check_address(&request.entity_address)
            .map_err(|reason| RegistrationError::invalid("entity_address", reason))?;
        log::debug!(
            "Registering attestation for {} by {}",
            request.domain,
            request.entity_address
        );

        let outcome = tokio::time::timeout(self.write_timeout, self.ledger.register(&request))
            .await
            .map_err(|_| LedgerError::Timeout(self.write_timeout))??;
        Ok(outcome)
    }
}

/// Check and normalize a raw request. Addresses are lower-cased so the same
/// entity always maps to the same ledger key.
pub fn validate(request: AttestationRequest) -> Result<RegistrationRequest, RegistrationError> {
    let domain = SenderDomain::parse(&request.domain)
        .map_err(|_| RegistrationError::invalid("domain", "not a valid domain name"))?;

    let org_name = request.org_name.trim();
    if org_name.is_empty() {
        return Err(RegistrationError::invalid("org_name", "must not be empty"));
    }
    if org_name.chars().count() > MAX_ORG_NAME_CHARS {
        return Err(RegistrationError::invalid(
            "org_name",
            format!("longer than {MAX_ORG_NAME_CHARS} characters"),
        ));
    }
    if org_name.chars().any(char::is_control) {
        return Err(RegistrationError::invalid(
            "org_name",
            "contains control characters",
        ));
    }

    let entity_address = request.entity_address.trim();
    if !ENTITY_ADDRESS.is_match(entity_address) {
        return Err(RegistrationError::invalid(
            "entity_address",
            "expected 0x followed by up to 64 hex digits",
        ));
    }

    let signature = request.signature.trim();
    if signature.is_empty() {
        return Err(RegistrationError::invalid("signature", "must not be empty"));
    }

    Ok(RegistrationRequest {
        domain,
        org_name: org_name.to_string(),
        entity_address: entity_address.to_lowercase(),
        signature: signature.to_string(),
    })
}
