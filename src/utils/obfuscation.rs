// src/utils/obfuscation.rs
//! Obfuscation envelope for compact (NFC) credentials.
//!
//! NOT ENCRYPTION. The transform is a XOR against a fixed key that ships in
//! this source file, followed by base64 and a format tag. Its only job is to
//! keep a generic NFC reader app from showing the credential JSON as plain
//! text. Anyone with this crate can undo it. Authenticity and integrity of a
//! compact credential come from its ECDSA signature alone, and nothing in this
//! crate treats a successful decode as evidence of anything.

use crate::error::VerifyError;

/// Prefix marking an obfuscated compact credential.
pub const OBFUSCATION_TAG: &str = "ENC-V1:";

/// Repeating XOR key. Public by construction.
const OBFUSCATION_KEY: &[u8] = b"CommunityConnect-NFC";

fn xor_with_key(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Wraps serialized credential JSON into the tagged blob written to the tag.
pub fn obfuscate(json: &str) -> String {
    format!("{}{}", OBFUSCATION_TAG, base64::encode(xor_with_key(json.as_bytes())))
}

/// Reverses [`obfuscate`].
///
/// # Errors
/// `MalformedEnvelope` if the tag is missing, the body is not base64, or the
/// recovered bytes are not UTF-8.
pub fn deobfuscate(blob: &str) -> Result<String, VerifyError> {
    let body = blob
        .trim()
        .strip_prefix(OBFUSCATION_TAG)
        .ok_or_else(|| VerifyError::MalformedEnvelope("missing obfuscation tag".into()))?;
    let bytes = base64::decode(body)
        .map_err(|e| VerifyError::MalformedEnvelope(format!("obfuscated body: {}", e)))?;
    String::from_utf8(xor_with_key(&bytes))
        .map_err(|_| VerifyError::MalformedEnvelope("obfuscated body is not UTF-8".into()))
}

/// Recovers credential JSON from whatever was read off a tag.
///
/// Tagged blobs are deobfuscated; untagged input is accepted only if it
/// already looks like a JSON object.
pub fn unwrap_compact_payload(raw: &str) -> Result<String, VerifyError> {
    let raw = raw.trim();
    if raw.starts_with(OBFUSCATION_TAG) {
        deobfuscate(raw)
    } else if raw.starts_with('{') {
        Ok(raw.to_string())
    } else {
        Err(VerifyError::MalformedEnvelope(
            "neither an obfuscated nor a plaintext compact credential".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"exp":"2025-06-01","mid":"CC-2024-0000","name":"Ada Lovelace","sig":"MEQ","v":1}"#;

    #[test]
    fn test_blob_hides_plain_json() {
        let blob = obfuscate(SAMPLE);
        assert!(blob.starts_with(OBFUSCATION_TAG));
        assert!(!blob.contains("Lovelace"));
        assert_eq!(deobfuscate(&blob).unwrap(), SAMPLE);
    }

    #[test]
    fn test_untagged_blob_is_rejected() {
        let blob = obfuscate(SAMPLE);
        let untagged = blob.trim_start_matches(OBFUSCATION_TAG);
        assert!(matches!(
            deobfuscate(untagged),
            Err(VerifyError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_base64_is_malformed() {
        assert!(matches!(
            deobfuscate("ENC-V1:***not base64***"),
            Err(VerifyError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_plaintext_json_passes_through() {
        assert_eq!(unwrap_compact_payload(SAMPLE).unwrap(), SAMPLE);
        assert_eq!(unwrap_compact_payload(&obfuscate(SAMPLE)).unwrap(), SAMPLE);
        assert!(unwrap_compact_payload("hello").is_err());
    }
}
