use super::error::ApiError;
use super::AppState;
use crate::models::{
    AttestationLookup, AttestationRecord, EmailMessage, IngestionResult, SenderDomain,
};
use crate::registration::AttestationRequest;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
struct IngestBody {
    raw_email: String,
}

/// Media types compare case-insensitively; parameters such as charset are ignored.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = value.split(';').next().unwrap_or("").trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => {
            let subtype = subtype.to_ascii_lowercase();
            kind.eq_ignore_ascii_case("application")
                && (subtype == "json" || subtype.ends_with("+json"))
        }
        None => false,
    }
}

/// Body is either the raw message or `{"raw_email": "..."}` when sent as JSON.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestionResult>, ApiError> {
    let raw = if is_json(&headers) {
        serde_json::from_slice::<IngestBody>(&body)
            .map_err(|e| ApiError::InvalidInput(format!("invalid JSON body: {e}")))?
            .raw_email
    } else {
        String::from_utf8_lossy(&body).into_owned()
    };

    let message = EmailMessage::new(raw);
    if message.is_empty() {
        return Err(ApiError::InvalidInput("email body is empty".to_string()));
    }

    let result = state.pipeline.ingest(&message).await?;
    Ok(Json(result))
}

pub async fn get_attestation(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<AttestationRecord>, ApiError> {
    let domain = SenderDomain::parse(&domain)
        .map_err(|_| ApiError::InvalidInput(format!("{domain:?} is not a valid domain")))?;

    match state.pipeline.lookup_attestation(&domain).await? {
        AttestationLookup::Found(record) => Ok(Json(record)),
        AttestationLookup::Absent => Err(ApiError::NotFound(format!(
            "no attestation recorded for {domain}"
        ))),
    }
}

pub async fn register_attestation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AttestationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AttestationRecord>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidInput(e.body_text()))?;

    let outcome = state.registration.register(request).await?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome.record)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
