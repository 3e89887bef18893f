use super::{LedgerError, RegistrationRequest};
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Checks that a registration's signature was produced by its entity address.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, request: &RegistrationRequest) -> Result<(), LedgerError>;

    /// Reject entity addresses this scheme can never verify against.
    fn check_address(&self, _entity_address: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Bytes an entity signs to attest a domain.
pub fn signing_message(request: &RegistrationRequest) -> Vec<u8> {
    format!(
        "phishguard-attestation:{}:{}",
        request.domain.as_str(),
        request.org_name
    )
    .into_bytes()
}

/// Decode a signature given as hex (optionally `0x`-prefixed) or standard base64.
pub fn decode_signature(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.trim();
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    if let Ok(bytes) = hex::decode(hex_part) {
        return Some(bytes);
    }
    base64::engine::general_purpose::STANDARD.decode(raw).ok()
}

/// Entity addresses are hex-encoded Ed25519 public keys.
pub struct Ed25519Verifier;

impl Ed25519Verifier {
    fn reject(request: &RegistrationRequest, reason: impl Into<String>) -> LedgerError {
        LedgerError::InvalidSignature {
            entity_address: request.entity_address.clone(),
            reason: reason.into(),
        }
    }

    fn public_key(entity_address: &str) -> Result<VerifyingKey, String> {
        let address = entity_address.trim();
        let key_hex = address.strip_prefix("0x").unwrap_or(address);
        let key_bytes: [u8; 32] = hex::decode(key_hex)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| "expected 0x followed by a 32-byte hex public key".to_string())?;

        VerifyingKey::from_bytes(&key_bytes).map_err(|e| format!("invalid public key: {e}"))
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn check_address(&self, entity_address: &str) -> Result<(), String> {
        Self::public_key(entity_address).map(|_| ())
    }

    fn verify(&self, request: &RegistrationRequest) -> Result<(), LedgerError> {
        let key = Self::public_key(&request.entity_address)
            .map_err(|reason| Self::reject(request, reason))?;

        let signature_bytes = decode_signature(&request.signature)
            .ok_or_else(|| Self::reject(request, "signature is neither hex nor base64"))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| Self::reject(request, format!("malformed signature: {e}")))?;

        key.verify(&signing_message(request), &signature)
            .map_err(|_| Self::reject(request, "signature does not match"))
    }
}
