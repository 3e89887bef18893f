use super::{
    transaction_ref, AttestationLedger, LedgerError, RegisterOutcome, RegistrationRequest,
    SignatureVerifier,
};
use crate::models::{AttestationLookup, AttestationRecord, SenderDomain, TransactionRef};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attestations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    org_name TEXT NOT NULL,
    entity_address TEXT NOT NULL,
    signature TEXT NOT NULL,
    tx_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    UNIQUE (domain, entity_address)
);
CREATE INDEX IF NOT EXISTS idx_attestations_domain ON attestations (domain);
";

const SELECT_COLUMNS: &str =
    "SELECT domain, org_name, entity_address, tx_hash, created_at, signature FROM attestations";

/// SQLite-backed ledger. Every call opens its own connection, so several
/// processes can share one database file; duplicate detection relies on the
/// UNIQUE (domain, entity_address) constraint.
pub struct SqliteLedger {
    db_path: PathBuf,
    verifier: Arc<dyn SignatureVerifier>,
}

impl SqliteLedger {
    pub fn open(
        db_path: impl AsRef<Path>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, LedgerError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Unavailable(format!(
                    "failed to create ledger directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Self::connect(&db_path)?;
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        log::info!("Attestation ledger database: {}", db_path.display());

        Ok(Self { db_path, verifier })
    }

    fn connect(db_path: &Path) -> Result<Connection, LedgerError> {
        let conn = Connection::open(db_path).map_err(storage_error)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_error)?;
        Ok(conn)
    }

    fn lookup_blocking(
        db_path: &Path,
        domain: &SenderDomain,
    ) -> Result<AttestationLookup, LedgerError> {
        let conn = Self::connect(db_path)?;
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE domain = ?1 ORDER BY id ASC LIMIT 1"),
                params![domain.as_str()],
                read_row,
            )
            .optional()
            .map_err(storage_error)?;

        match row {
            Some(row) => Ok(AttestationLookup::Found(row.into_record()?)),
            None => Ok(AttestationLookup::Absent),
        }
    }

    fn register_blocking(
        db_path: &Path,
        request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        let conn = Self::connect(db_path)?;
        let created_at = Utc::now();
        let tx_hash = transaction_ref(request, created_at);

        let inserted = conn
            .execute(
                "INSERT INTO attestations
                    (domain, org_name, entity_address, signature, tx_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (domain, entity_address) DO NOTHING",
                params![
                    request.domain.as_str(),
                    request.org_name,
                    request.entity_address,
                    request.signature,
                    tx_hash.as_str(),
                    created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .map_err(storage_error)?;

        if inserted == 1 {
            return Ok(RegisterOutcome {
                record: AttestationRecord {
                    domain: request.domain.clone(),
                    org_name: request.org_name.clone(),
                    entity_address: request.entity_address.clone(),
                    tx_hash,
                    created_at,
                },
                replayed: false,
            });
        }

        let existing = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE domain = ?1 AND entity_address = ?2"),
                params![request.domain.as_str(), request.entity_address],
                read_row,
            )
            .map_err(storage_error)?;

        if existing.signature != request.signature {
            return Err(LedgerError::DuplicateAttestation {
                domain: request.domain.to_string(),
                entity_address: request.entity_address.clone(),
            });
        }

        Ok(RegisterOutcome {
            record: existing.into_record()?,
            replayed: true,
        })
    }
}

struct StoredRow {
    domain: String,
    org_name: String,
    entity_address: String,
    tx_hash: String,
    created_at: String,
    signature: String,
}

impl StoredRow {
    fn into_record(self) -> Result<AttestationRecord, LedgerError> {
        let invalid = |e: String| LedgerError::InvalidResponse(format!("corrupt ledger row: {e}"));
        Ok(AttestationRecord {
            domain: SenderDomain::parse(&self.domain).map_err(|e| invalid(e.to_string()))?,
            org_name: self.org_name,
            entity_address: self.entity_address,
            tx_hash: TransactionRef::parse(&self.tx_hash).map_err(|e| invalid(e.to_string()))?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| invalid(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        domain: row.get(0)?,
        org_name: row.get(1)?,
        entity_address: row.get(2)?,
        tx_hash: row.get(3)?,
        created_at: row.get(4)?,
        signature: row.get(5)?,
    })
}

fn storage_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::Unavailable(format!("sqlite: {e}"))
}

fn join_error(e: tokio::task::JoinError) -> LedgerError {
    LedgerError::Unavailable(format!("ledger worker failed: {e}"))
}

#[async_trait]
impl AttestationLedger for SqliteLedger {
    async fn lookup(&self, domain: &SenderDomain) -> Result<AttestationLookup, LedgerError> {
        let db_path = self.db_path.clone();
        let domain = domain.clone();
        tokio::task::spawn_blocking(move || Self::lookup_blocking(&db_path, &domain))
            .await
            .map_err(join_error)?
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        self.verifier.verify(request)?;

        let db_path = self.db_path.clone();
        let request = request.clone();
        let outcome = tokio::task::spawn_blocking(move || Self::register_blocking(&db_path, &request))
            .await
            .map_err(join_error)??;

        if outcome.replayed {
            log::info!(
                "Replayed attestation for {} ({})",
                outcome.record.domain,
                outcome.record.tx_hash
            );
        } else {
            log::info!(
                "Recorded attestation for {} ({})",
                outcome.record.domain,
                outcome.record.tx_hash
            );
        }
        Ok(outcome)
    }

    fn name(&self) -> &str {
        "sqlite"
    }

    fn check_address(&self, entity_address: &str) -> Result<(), String> {
        self.verifier.check_address(entity_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixtureVerifier;
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> SqliteLedger {
        SqliteLedger::open(dir.path().join("ledger/attestations.db"), Arc::new(FixtureVerifier))
            .unwrap()
    }

    fn request(entity: &str, signature: &str) -> RegistrationRequest {
        RegistrationRequest {
            domain: SenderDomain::parse("good.org").unwrap(),
            org_name: "Good Org".to_string(),
            entity_address: entity.to_string(),
            signature: signature.to_string(),
        }
    }

    fn row_count(dir: &TempDir) -> i64 {
        let conn = Connection::open(dir.path().join("ledger/attestations.db")).unwrap();
        conn.query_row("SELECT COUNT(*) FROM attestations", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);
        let domain = SenderDomain::parse("good.org").unwrap();

        assert_eq!(ledger.lookup(&domain).await.unwrap(), AttestationLookup::Absent);

        let outcome = ledger.register(&request("0x1", "sig1")).await.unwrap();
        assert!(!outcome.replayed);

        let found = ledger.lookup(&domain).await.unwrap();
        assert_eq!(found, AttestationLookup::Found(outcome.record));
    }

    #[tokio::test]
    async fn test_replay_returns_same_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        let first = ledger.register(&request("0x1", "sig1")).await.unwrap();
        let second = ledger.register(&request("0x1", "sig1")).await.unwrap();

        assert!(second.replayed);
        assert_eq!(first.record.tx_hash, second.record.tx_hash);
        assert_eq!(row_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_conflicting_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        ledger.register(&request("0x1", "sig1")).await.unwrap();
        let err = ledger.register(&request("0x1", "sig2")).await.unwrap_err();

        assert!(matches!(err, LedgerError::DuplicateAttestation { .. }));
        assert_eq!(row_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_invalid_signature_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger(&dir);

        let err = ledger
            .register(&request("0x1", "invalid-signature"))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidSignature { .. }));
        assert_eq!(row_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_concurrent_instances_share_uniqueness() {
        let dir = tempfile::tempdir().unwrap();
        let ledgers: Vec<Arc<SqliteLedger>> = (0..4).map(|_| Arc::new(ledger(&dir))).collect();

        let handles: Vec<_> = ledgers
            .iter()
            .cycle()
            .take(12)
            .cloned()
            .map(|ledger| tokio::spawn(async move { ledger.register(&request("0x1", "sig1")).await }))
            .collect();

        let mut tx_hashes = Vec::new();
        for handle in handles {
            tx_hashes.push(handle.await.unwrap().unwrap().record.tx_hash);
        }

        tx_hashes.dedup();
        assert_eq!(tx_hashes.len(), 1);
        assert_eq!(row_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ledger(&dir).register(&request("0x1", "sig1")).await.unwrap();

        let reopened = ledger(&dir);
        let found = reopened
            .lookup(&SenderDomain::parse("GOOD.org").unwrap())
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(found.tx_hash, outcome.record.tx_hash);
        assert_eq!(found.created_at, outcome.record.created_at);
    }

    #[tokio::test]
    async fn test_unopenable_database_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the database file should be
        let path = dir.path().join("db");
        std::fs::create_dir_all(&path).unwrap();

        let err = SqliteLedger::open(&path, Arc::new(FixtureVerifier))
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
