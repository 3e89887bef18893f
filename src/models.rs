use crate::domain_utils::DomainUtils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid domain: {0:?}")]
    InvalidDomain(String),

    #[error("score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("explanation must not be empty")]
    EmptyExplanation,

    #[error("transaction reference must not be empty")]
    EmptyTransactionRef,
}

/// Raw RFC822 message text. Cheap to clone, never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    raw: Arc<str>,
}

impl EmailMessage {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: Arc::from(raw.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

/// Normalized, validated sender domain used as the attestation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SenderDomain(String);

impl SenderDomain {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        DomainUtils::normalize(raw)
            .map(SenderDomain)
            .ok_or_else(|| ModelError::InvalidDomain(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SenderDomain {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SenderDomain> for String {
    fn from(domain: SenderDomain) -> Self {
        domain.0
    }
}

impl fmt::Display for SenderDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    score: f64,
    explanation: String,
}

impl ScoreResult {
    pub fn new(score: f64, explanation: impl Into<String>) -> Result<Self, ModelError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ModelError::ScoreOutOfRange(score));
        }
        let explanation = explanation.into();
        if explanation.trim().is_empty() {
            return Err(ModelError::EmptyExplanation);
        }
        Ok(Self { score, explanation })
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// Opaque ledger pointer for a recorded attestation; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionRef(String);

impl TransactionRef {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyTransactionRef);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Wrap a reference minted by this crate (always non-empty).
    pub(crate) fn generated(value: String) -> Self {
        debug_assert!(!value.is_empty());
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TransactionRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransactionRef> for String {
    fn from(tx: TransactionRef) -> Self {
        tx.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub domain: SenderDomain,
    pub org_name: String,
    pub entity_address: String,
    pub tx_hash: TransactionRef,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a ledger lookup. Backend failures are reported as errors,
/// never as `Absent`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationLookup {
    Found(AttestationRecord),
    Absent,
}

impl AttestationLookup {
    pub fn exists(&self) -> bool {
        matches!(self, AttestationLookup::Found(_))
    }

    pub fn into_record(self) -> Option<AttestationRecord> {
        match self {
            AttestationLookup::Found(record) => Some(record),
            AttestationLookup::Absent => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Verified,
    Unverified,
}

/// Attestation block of an ingestion response.
///
/// Only constructible through [`AttestationInfo::verified`] and
/// [`AttestationInfo::unverified`], so `Verified` always carries a transaction
/// reference and `Unverified` never does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttestationInfo {
    status: AttestationStatus,
    tx_hash: Option<TransactionRef>,
    domain: Option<SenderDomain>,
}

impl AttestationInfo {
    pub fn verified(record: AttestationRecord) -> Self {
        Self {
            status: AttestationStatus::Verified,
            tx_hash: Some(record.tx_hash),
            domain: Some(record.domain),
        }
    }

    pub fn unverified(domain: Option<SenderDomain>) -> Self {
        Self {
            status: AttestationStatus::Unverified,
            tx_hash: None,
            domain,
        }
    }

    pub fn status(&self) -> AttestationStatus {
        self.status
    }

    pub fn tx_hash(&self) -> Option<&TransactionRef> {
        self.tx_hash.as_ref()
    }

    pub fn domain(&self) -> Option<&SenderDomain> {
        self.domain.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionResult {
    pub score: f64,
    pub explanation: String,
    pub attestation: AttestationInfo,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_domain_normalizes() {
        let domain = SenderDomain::parse(" Mail.Example.COM ").unwrap();
        assert_eq!(domain.as_str(), "mail.example.com");
        assert!(SenderDomain::parse("not a domain").is_err());
    }

    #[test]
    fn test_sender_domain_deserialize_validates() {
        let ok: SenderDomain = serde_json::from_str("\"EXAMPLE.com\"").unwrap();
        assert_eq!(ok.as_str(), "example.com");
        assert!(serde_json::from_str::<SenderDomain>("\"nope\"").is_err());
    }

    #[test]
    fn test_score_result_bounds() {
        assert!(ScoreResult::new(0.0, "clean").is_ok());
        assert!(ScoreResult::new(1.0, "bad").is_ok());
        assert_eq!(
            ScoreResult::new(1.2, "bad"),
            Err(ModelError::ScoreOutOfRange(1.2))
        );
        assert!(ScoreResult::new(f64::NAN, "bad").is_err());
        assert_eq!(
            ScoreResult::new(0.4, "   "),
            Err(ModelError::EmptyExplanation)
        );
    }

    #[test]
    fn test_transaction_ref_rejects_empty() {
        assert!(TransactionRef::parse("").is_err());
        assert!(serde_json::from_str::<TransactionRef>("\"\"").is_err());
        assert_eq!(TransactionRef::parse("0xabc").unwrap().as_str(), "0xabc");
    }

    #[test]
    fn test_attestation_info_serialization() {
        let info = AttestationInfo::unverified(None);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "unverified", "tx_hash": null, "domain": null})
        );

        let record = AttestationRecord {
            domain: SenderDomain::parse("example.com").unwrap(),
            org_name: "Example Org".to_string(),
            entity_address: "0x1".to_string(),
            tx_hash: TransactionRef::parse("0xabc").unwrap(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(AttestationInfo::verified(record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "verified", "tx_hash": "0xabc", "domain": "example.com"})
        );
    }
}
