// src/services/verifier.rs
//! Credential verification service.
//!
//! Checks credentials against the live keys of the [`KeyStore`]. Every check
//! either yields the decoded fields or a terminal [`VerifyError`]; nothing is
//! ever coerced to "valid".
//!
//! Standard envelopes: split, base64-decode, metadata checks (version,
//! algorithm, key binding), RSA-PSS over the payload bytes as transmitted,
//! then expiry. Compact blobs: unwrap the obfuscation envelope, require the
//! schema fields, reject unknown versions, rebuild the canonical signed bytes
//! without `sig`, check the DER ECDSA signature, then the expiry date.

use crate::error::VerifyError;
use crate::models::credential::{
    CompactCredential, EnvelopeMetadata, StandardCredential, COMPACT_VERSION,
    STANDARD_ALGORITHM, STANDARD_FORMAT_VERSION,
};
use crate::services::credential_issuer::ENVELOPE_SEPARATOR;
use crate::utils::obfuscation::unwrap_compact_payload;
use crate::utils::serialization::{canonical_bytes, SIGNATURE_FIELD};
use crate::wallet::key_management::{verify_ecdsa_der, KeyStore};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use p256::ecdsa::VerifyingKey;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Fields a compact credential must carry, in the order they are checked.
const COMPACT_REQUIRED_FIELDS: [&str; 5] = ["v", "mid", "name", "exp", SIGNATURE_FIELD];

/// Verifies credentials issued with this deployment's live keys.
#[derive(Clone)]
pub struct Verifier {
    keys: Arc<KeyStore>,
}

impl Verifier {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    /// Verifies a standard envelope against the current time.
    pub fn verify_standard_credential(
        &self,
        envelope: &str,
    ) -> Result<StandardCredential, VerifyError> {
        self.verify_standard_credential_at(envelope, Utc::now())
    }

    /// Verifies a standard envelope as if the clock read `now`.
    ///
    /// # Errors
    /// - `MalformedEnvelope`: not three segments, bad base64, bad JSON
    /// - `UnsupportedVersion` / `UnsupportedAlgorithm`: metadata this verifier cannot handle
    /// - `KeyMismatch`: envelope bound to another RSA key (checked before any signature math)
    /// - `InvalidSignature`: RSA-PSS check failed
    /// - `Expired`: `now` is past `expires_at`
    pub fn verify_standard_credential_at(
        &self,
        envelope: &str,
        now: DateTime<Utc>,
    ) -> Result<StandardCredential, VerifyError> {
        let result = self.check_standard(envelope, now);
        match &result {
            Ok(credential) => debug!("Standard credential for member {} verified", credential.member_id),
            Err(e) => warn!("Standard credential rejected: {}", e),
        }
        result
    }

    fn check_standard(
        &self,
        envelope: &str,
        now: DateTime<Utc>,
    ) -> Result<StandardCredential, VerifyError> {
        let parts: Vec<&str> = envelope.trim().split(ENVELOPE_SEPARATOR).collect();
        let [payload_b64, signature_b64, metadata_b64] = parts.as_slice() else {
            return Err(VerifyError::MalformedEnvelope(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        };

        let payload = decode_segment("payload", payload_b64)?;
        let signature = decode_segment("signature", signature_b64)?;
        let metadata_bytes = decode_segment("metadata", metadata_b64)?;

        let metadata: EnvelopeMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| VerifyError::MalformedEnvelope(format!("metadata: {}", e)))?;
        if metadata.version != STANDARD_FORMAT_VERSION {
            return Err(VerifyError::UnsupportedVersion(metadata.version));
        }
        if metadata.algorithm != STANDARD_ALGORITHM {
            return Err(VerifyError::UnsupportedAlgorithm(metadata.algorithm));
        }

        let rsa = self.keys.rsa();
        if metadata.key_id != rsa.fingerprint() {
            return Err(VerifyError::KeyMismatch {
                expected: rsa.fingerprint().to_string(),
                found: metadata.key_id,
            });
        }

        if !rsa.verify_pss(&payload, &signature) {
            return Err(VerifyError::InvalidSignature);
        }

        let credential: StandardCredential = serde_json::from_slice(&payload)
            .map_err(|e| VerifyError::MalformedEnvelope(format!("payload: {}", e)))?;
        if credential.is_expired_at(now) {
            return Err(VerifyError::Expired);
        }
        Ok(credential)
    }

    /// Verifies a compact credential with the live EC key against today's date.
    pub fn verify_compact_credential(&self, blob: &str) -> Result<CompactCredential, VerifyError> {
        self.verify_compact_credential_at(blob, Utc::now())
    }

    /// Verifies a compact credential with the live EC key as if the clock read `now`.
    pub fn verify_compact_credential_at(
        &self,
        blob: &str,
        now: DateTime<Utc>,
    ) -> Result<CompactCredential, VerifyError> {
        let result = verify_compact_with(self.keys.ec().verifying_key(), blob, now);
        match &result {
            Ok(credential) => debug!("Compact credential {} verified online", credential.mid),
            Err(e) => warn!("Compact credential rejected online: {}", e),
        }
        result
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, VerifyError> {
    base64::decode(segment)
        .map_err(|e| VerifyError::MalformedEnvelope(format!("{} segment: {}", name, e)))
}

/// A compact credential taken apart, signature not yet checked.
struct OpenedCompact {
    /// Every field except `sig`
    fields: Map<String, Value>,
    signed_bytes: Vec<u8>,
    signature: Vec<u8>,
}

/// Unwraps and parses a compact blob up to (not including) the signature check.
fn open_compact(blob: &str) -> Result<OpenedCompact, VerifyError> {
    let json = unwrap_compact_payload(blob)?;
    let mut fields = match serde_json::from_str::<Value>(&json) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(VerifyError::MalformedEnvelope("not a JSON object".into())),
        Err(e) => return Err(VerifyError::MalformedEnvelope(e.to_string())),
    };

    for field in COMPACT_REQUIRED_FIELDS {
        if !fields.contains_key(field) {
            return Err(VerifyError::MissingField(field));
        }
    }

    let version = &fields["v"];
    if version.as_u64() != Some(COMPACT_VERSION) {
        return Err(VerifyError::UnsupportedVersion(version.to_string()));
    }

    let signature = match fields.remove(SIGNATURE_FIELD) {
        Some(Value::String(signature)) => decode_signature(&signature)?,
        _ => return Err(VerifyError::MalformedEnvelope("sig is not a string".into())),
    };
    let signed_bytes = canonical_bytes(&fields)
        .map_err(|e| VerifyError::MalformedEnvelope(e.to_string()))?;

    Ok(OpenedCompact {
        fields,
        signed_bytes,
        signature,
    })
}

/// Full compact verification against one specific P-256 key.
pub(crate) fn verify_compact_with(
    key: &VerifyingKey,
    blob: &str,
    now: DateTime<Utc>,
) -> Result<CompactCredential, VerifyError> {
    let opened = open_compact(blob)?;
    if !verify_ecdsa_der(key, &opened.signed_bytes, &opened.signature) {
        return Err(VerifyError::InvalidSignature);
    }

    let credential: CompactCredential = serde_json::from_value(Value::Object(opened.fields))
        .map_err(|e| VerifyError::MalformedEnvelope(e.to_string()))?;
    if credential.is_expired_on(now.date_naive()) {
        return Err(VerifyError::Expired);
    }
    Ok(credential)
}

/// Decodes a base64url signature, with or without its padding.
fn decode_signature(signature: &str) -> Result<Vec<u8>, VerifyError> {
    let mut padded = signature.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    base64::decode_config(&padded, base64::URL_SAFE)
        .map_err(|e| VerifyError::MalformedEnvelope(format!("sig: {}", e)))
}

/// Cleans up text from camera QR scanners before verification.
///
/// Trims whitespace, strips one pair of enclosing quotes, removes line breaks,
/// maps the look-alike separators `‖` and `｜` to `|`, and hex-decodes input
/// that has no separator and is entirely hex. The signature check that
/// follows is unaffected.
pub fn normalize_scanned_input(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    if !text.contains(ENVELOPE_SEPARATOR) && looks_like_hex(&text) {
        if let Some(decoded) = hex::decode(&text).ok().and_then(|b| String::from_utf8(b).ok()) {
            text = decoded.trim().to_string();
        }
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].to_string();
            break;
        }
    }

    text.replace('\r', "")
        .replace('\n', "")
        .replace('‖', "|")
        .replace('｜', "|")
        .trim()
        .to_string()
}

fn looks_like_hex(text: &str) -> bool {
    !text.is_empty() && text.len() % 2 == 0 && text.chars().all(|c| c.is_ascii_hexdigit())
}
