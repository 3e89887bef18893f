use super::{AttestationLedger, LedgerError, RegisterOutcome, RegistrationRequest};
use crate::models::{AttestationLookup, AttestationRecord, SenderDomain};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: String,
}

/// Client for a remote ledger gateway exposing
/// `GET {base}/attestations/{domain}` and `POST {base}/attestations`.
///
/// Signature validation and duplicate detection happen on the gateway; this
/// client only maps its answers onto [`LedgerError`].
pub struct HttpLedger {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("phishguard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url, LedgerError> {
        self.base
            .join(path)
            .map_err(|e| LedgerError::Unavailable(format!("bad ledger url: {e}")))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else if e.is_decode() {
            LedgerError::InvalidResponse(e.to_string())
        } else {
            LedgerError::Unavailable(e.to_string())
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<GatewayError>().await {
            Ok(body) if !body.message.is_empty() => body.message,
            _ => format!("ledger gateway answered HTTP {status}"),
        }
    }
}

#[async_trait]
impl AttestationLedger for HttpLedger {
    async fn lookup(&self, domain: &SenderDomain) -> Result<AttestationLookup, LedgerError> {
        let url = self.url(&format!("attestations/{domain}"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(AttestationLookup::Absent),
            status if status.is_success() => {
                let record: AttestationRecord = response
                    .json()
                    .await
                    .map_err(|e| self.map_transport_error(e))?;
                if &record.domain != domain {
                    return Err(LedgerError::InvalidResponse(format!(
                        "asked for {domain}, gateway answered for {}",
                        record.domain
                    )));
                }
                Ok(AttestationLookup::Found(record))
            }
            _ => Err(LedgerError::Unavailable(Self::error_message(response).await)),
        }
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegisterOutcome, LedgerError> {
        let url = self.url("attestations")?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        match status {
            StatusCode::CREATED | StatusCode::OK => {
                let record: AttestationRecord = response
                    .json()
                    .await
                    .map_err(|e| self.map_transport_error(e))?;
                Ok(RegisterOutcome {
                    record,
                    replayed: status == StatusCode::OK,
                })
            }
            StatusCode::CONFLICT => Err(LedgerError::DuplicateAttestation {
                domain: request.domain.to_string(),
                entity_address: request.entity_address.clone(),
            }),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(LedgerError::InvalidSignature {
                    entity_address: request.entity_address.clone(),
                    reason: Self::error_message(response).await,
                })
            }
            _ => Err(LedgerError::Unavailable(Self::error_message(response).await)),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode as AxumStatus,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn spawn_gateway(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn record_json(domain: &str, tx_hash: &str) -> Value {
        json!({
            "domain": domain,
            "org_name": "Example Org",
            "entity_address": "0x1",
            "tx_hash": tx_hash,
            "created_at": "2024-05-01T12:00:00Z"
        })
    }

    fn request(signature: &str) -> RegistrationRequest {
        RegistrationRequest {
            domain: SenderDomain::parse("example.com").unwrap(),
            org_name: "Example Org".to_string(),
            entity_address: "0x1".to_string(),
            signature: signature.to_string(),
        }
    }

    fn gateway() -> Router {
        Router::new()
            .route(
                "/v1/attestations/:domain",
                get(|Path(domain): Path<String>| async move {
                    match domain.as_str() {
                        "example.com" => (AxumStatus::OK, Json(record_json("example.com", "0xabc"))),
                        "empty-tx.com" => (AxumStatus::OK, Json(record_json("empty-tx.com", ""))),
                        "broken.com" => (
                            AxumStatus::INTERNAL_SERVER_ERROR,
                            Json(json!({"message": "node offline"})),
                        ),
                        _ => (AxumStatus::NOT_FOUND, Json(json!({"message": "not found"}))),
                    }
                }),
            )
            .route(
                "/v1/attestations",
                post(|Json(body): Json<Value>| async move {
                    match body["signature"].as_str().unwrap_or("") {
                        "sig1" => (AxumStatus::CREATED, Json(record_json("example.com", "0xnew"))),
                        "replay" => (AxumStatus::OK, Json(record_json("example.com", "0xold"))),
                        "conflict" => (AxumStatus::CONFLICT, Json(json!({"message": "exists"}))),
                        _ => (
                            AxumStatus::UNPROCESSABLE_ENTITY,
                            Json(json!({"message": "bad signature"})),
                        ),
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_lookup_found_and_absent() {
        let ledger = HttpLedger::new(&spawn_gateway(gateway()).await, Duration::from_secs(5)).unwrap();

        let found = ledger
            .lookup(&SenderDomain::parse("example.com").unwrap())
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(found.tx_hash.as_str(), "0xabc");

        let absent = ledger
            .lookup(&SenderDomain::parse("unknown.org").unwrap())
            .await
            .unwrap();
        assert_eq!(absent, AttestationLookup::Absent);
    }

    #[tokio::test]
    async fn test_lookup_failures_are_not_absent() {
        let ledger = HttpLedger::new(&spawn_gateway(gateway()).await, Duration::from_secs(5)).unwrap();

        let err = ledger
            .lookup(&SenderDomain::parse("broken.com").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(ref m) if m == "node offline"));

        let err = ledger
            .lookup(&SenderDomain::parse("empty-tx.com").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidResponse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_register_status_mapping() {
        let ledger = HttpLedger::new(&spawn_gateway(gateway()).await, Duration::from_secs(5)).unwrap();

        let created = ledger.register(&request("sig1")).await.unwrap();
        assert!(!created.replayed);
        assert_eq!(created.record.tx_hash.as_str(), "0xnew");

        let replayed = ledger.register(&request("replay")).await.unwrap();
        assert!(replayed.replayed);

        assert!(matches!(
            ledger.register(&request("conflict")).await,
            Err(LedgerError::DuplicateAttestation { .. })
        ));
        assert!(matches!(
            ledger.register(&request("garbage")).await,
            Err(LedgerError::InvalidSignature { ref reason, .. }) if reason == "bad signature"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ledger = HttpLedger::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = ledger
            .lookup(&SenderDomain::parse("example.com").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)), "{err:?}");
    }
}
