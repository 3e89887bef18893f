use crate::ledger::LedgerError;
use crate::pipeline::IngestError;
use crate::registration::RegistrationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

/// Every failure the HTTP surface can report, rendered as
/// `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    NotFound(String),
    Ingest(IngestError),
    Registration(RegistrationError),
    Ledger(LedgerError),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Ingest(e)
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        ApiError::Registration(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::InvalidSignature { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::DuplicateAttestation { .. } => StatusCode::CONFLICT,
        LedgerError::Unavailable(_) | LedgerError::Timeout(_) | LedgerError::InvalidResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn detail(kind: &str, message: String) -> Value {
    json!({ "kind": kind, "message": message })
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Ingest(IngestError::Ledger(e)) => ledger_status(e),
            ApiError::Ingest(IngestError::Scoring(_) | IngestError::Backends { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Registration(RegistrationError::InvalidInput { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Registration(RegistrationError::Ledger(e)) => ledger_status(e),
            ApiError::Ledger(e) => ledger_status(e),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::NotFound(_) => "not_found",
            ApiError::Ingest(e) => e.kind(),
            ApiError::Registration(e) => e.kind(),
            ApiError::Ledger(e) => e.kind(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::InvalidInput(m) | ApiError::NotFound(m) => m.clone(),
            ApiError::Ingest(e) => e.to_string(),
            ApiError::Registration(e) => e.to_string(),
            ApiError::Ledger(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{} ({}): {}", status, self.kind(), self.message());
        } else {
            log::debug!("{} ({}): {}", status, self.kind(), self.message());
        }

        let mut error = detail(self.kind(), self.message());
        if let ApiError::Ingest(IngestError::Backends { scoring, ledger }) = &self {
            error["details"] = json!([
                detail(scoring.kind(), scoring.to_string()),
                detail(ledger.kind(), ledger.to_string()),
            ]);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
