use crate::models::{
    AttestationInfo, AttestationLookup, IngestionResult, ScoreResult, SenderDomain,
};
use chrono::{DateTime, Utc};

/// Combine a score and an attestation lookup into the response for one
/// ingestion. `lookup` is `None` when no domain could be extracted.
pub fn assemble(
    score: ScoreResult,
    domain: Option<SenderDomain>,
    lookup: Option<AttestationLookup>,
    received_at: DateTime<Utc>,
) -> IngestionResult {
    let attestation = match lookup {
        Some(AttestationLookup::Found(record)) => AttestationInfo::verified(record),
        Some(AttestationLookup::Absent) | None => AttestationInfo::unverified(domain),
    };

    IngestionResult {
        score: score.score(),
        explanation: score.explanation().to_string(),
        attestation,
        received_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttestationRecord, AttestationStatus, TransactionRef};

    fn record(domain: &str, tx: &str) -> AttestationRecord {
        AttestationRecord {
            domain: SenderDomain::parse(domain).unwrap(),
            org_name: "Example Org".to_string(),
            entity_address: "0x1".to_string(),
            tx_hash: TransactionRef::parse(tx).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_absent_attestation_is_unverified() {
        let now = Utc::now();
        let domain = SenderDomain::parse("example.com").unwrap();
        let result = assemble(
            ScoreResult::new(0.9, "suspicious link").unwrap(),
            Some(domain.clone()),
            Some(AttestationLookup::Absent),
            now,
        );

        assert_eq!(result.score, 0.9);
        assert_eq!(result.explanation, "suspicious link");
        assert_eq!(result.received_at, now);
        assert_eq!(result.attestation.status(), AttestationStatus::Unverified);
        assert_eq!(result.attestation.tx_hash(), None);
        assert_eq!(result.attestation.domain(), Some(&domain));
    }

    #[test]
    fn test_found_attestation_is_verified() {
        let result = assemble(
            ScoreResult::new(0.1, "clean").unwrap(),
            Some(SenderDomain::parse("example.com").unwrap()),
            Some(AttestationLookup::Found(record("example.com", "0xabc"))),
            Utc::now(),
        );

        assert_eq!(result.attestation.status(), AttestationStatus::Verified);
        assert_eq!(result.attestation.tx_hash().unwrap().as_str(), "0xabc");
    }

    #[test]
    fn test_missing_domain_is_unverified_without_domain() {
        let result = assemble(
            ScoreResult::new(0.5, "unknown sender").unwrap(),
            None,
            None,
            Utc::now(),
        );

        assert_eq!(result.attestation.status(), AttestationStatus::Unverified);
        assert!(result.attestation.domain().is_none());
        assert!(result.attestation.tx_hash().is_none());
    }

    #[test]
    fn test_verified_iff_transaction_present() {
        let cases = vec![
            Some(AttestationLookup::Found(record("a.com", "0x1"))),
            Some(AttestationLookup::Absent),
            None,
        ];
        for lookup in cases {
            let result = assemble(
                ScoreResult::new(0.3, "x").unwrap(),
                SenderDomain::parse("a.com").ok(),
                lookup,
                Utc::now(),
            );
            assert_eq!(
                result.attestation.status() == AttestationStatus::Verified,
                result.attestation.tx_hash().is_some()
            );
        }
    }
}
