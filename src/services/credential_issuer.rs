// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Turns a [`MemberRecord`] into a signed credential string:
//! - Standard (QR): canonical payload, RSA-PSS/SHA-256 signature, metadata,
//!   joined as `base64(payload)|base64(signature)|base64(metadata)`
//! - Compact (NFC): canonical core fields, ECDSA P-256/SHA-256 DER signature
//!   in a `sig` field, JSON, then the obfuscation envelope

use crate::config::Settings;
use crate::error::IssueError;
use crate::models::credential::{CompactCredential, EnvelopeMetadata, StandardCredential};
use crate::models::member::{MemberRecord, MemberStatus};
use crate::utils::crypto::generate_nonce;
use crate::utils::obfuscation::obfuscate;
use crate::utils::serialization::{canonical_bytes, canonical_bytes_of, to_field_map, SIGNATURE_FIELD};
use crate::wallet::key_management::KeyStore;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Separator between the three segments of a standard envelope.
pub const ENVELOPE_SEPARATOR: char = '|';

/// Signs credentials with the live keys of a [`KeyStore`].
#[derive(Clone)]
pub struct CredentialIssuer {
    keys: Arc<KeyStore>,
    organization: String,
    validity_days: i64,
    compact_capacity: usize,
}

impl CredentialIssuer {
    /// Creates a new CredentialIssuer
    ///
    /// # Arguments
    /// * `keys` - Loaded key store shared with the verifiers
    /// * `settings` - Organization name, credential lifetime and NFC capacity
    pub fn new(keys: Arc<KeyStore>, settings: &Settings) -> Self {
        Self {
            keys,
            organization: settings.organization.clone(),
            validity_days: settings.validity_days,
            compact_capacity: settings.compact_capacity,
        }
    }

    /// Issues a standard credential valid from now.
    pub fn issue_standard_credential(&self, subject: &MemberRecord) -> Result<String, IssueError> {
        self.issue_standard_credential_at(subject, Utc::now())
    }

    /// Issues a standard credential as if the clock read `now`.
    pub fn issue_standard_credential_at(
        &self,
        subject: &MemberRecord,
        now: DateTime<Utc>,
    ) -> Result<String, IssueError> {
        let credential = self.standard_fields(subject, now)?;
        let envelope = self.sign_standard(&credential)?;
        info!(
            "Issued standard credential for member {} (key {}, expires {})",
            credential.member_id,
            self.keys.rsa().fingerprint(),
            credential.expires_at
        );
        Ok(envelope)
    }

    /// Builds the logical fields of a standard credential.
    ///
    /// # Errors
    /// `InvalidSubject` if the status is unknown or the membership id is blank.
    pub fn standard_fields(
        &self,
        subject: &MemberRecord,
        now: DateTime<Utc>,
    ) -> Result<StandardCredential, IssueError> {
        let status = validate_subject(subject)?;
        let expires_at = self.expiry(now)?;
        Ok(StandardCredential {
            member_id: subject.id,
            membership_id: subject.membership_id.clone(),
            name: subject.name.clone(),
            status,
            org: self.organization.clone(),
            issued_at: now,
            expires_at,
            nonce: generate_nonce(),
        })
    }

    /// `now` plus the configured lifetime.
    ///
    /// # Errors
    /// `InvalidValidity` if the lifetime is not positive or the sum overflows.
    fn expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, IssueError> {
        let invalid = IssueError::InvalidValidity {
            days: self.validity_days,
        };
        if self.validity_days < 1 {
            return Err(invalid);
        }
        Duration::try_days(self.validity_days)
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or(invalid)
    }

    /// Signs prepared standard fields and assembles the envelope.
    pub fn sign_standard(&self, credential: &StandardCredential) -> Result<String, IssueError> {
        let rsa = self.keys.rsa();
        let payload = canonical_bytes_of(credential)?;
        let signature = rsa
            .sign_pss(&payload)
            .map_err(|e| IssueError::Signing(e.to_string()))?;
        let metadata = serde_json::to_vec(&EnvelopeMetadata::rsa_pss(rsa.fingerprint()))?;

        Ok(format!(
            "{}{sep}{}{sep}{}",
            base64::encode(payload),
            base64::encode(signature),
            base64::encode(metadata),
            sep = ENVELOPE_SEPARATOR
        ))
    }

    /// Issues a compact credential valid from today.
    pub fn issue_compact_credential(&self, subject: &MemberRecord) -> Result<String, IssueError> {
        self.issue_compact_credential_at(subject, Utc::now())
    }

    /// Issues a compact credential as if the clock read `now`.
    pub fn issue_compact_credential_at(
        &self,
        subject: &MemberRecord,
        now: DateTime<Utc>,
    ) -> Result<String, IssueError> {
        validate_subject(subject)?;
        let credential = CompactCredential::new(
            &subject.membership_id,
            &subject.name,
            self.expiry(now)?.date_naive(),
        );
        let blob = self.sign_compact(&credential)?;
        info!(
            "Issued compact credential for member {} (key {}, {} bytes, expires {})",
            subject.id,
            self.keys.ec().fingerprint(),
            blob.len(),
            credential.exp
        );
        Ok(blob)
    }

    /// Signs prepared compact fields and wraps them for the tag.
    pub fn sign_compact(&self, credential: &CompactCredential) -> Result<String, IssueError> {
        self.sign_compact_fields(to_field_map(credential)?)
    }

    /// Signs an arbitrary compact field map. Any `sig` already present is replaced.
    pub(crate) fn sign_compact_fields(
        &self,
        mut fields: Map<String, Value>,
    ) -> Result<String, IssueError> {
        let signed = canonical_bytes(&fields)?;
        let signature = self.keys.ec().sign_der(&signed);
        fields.insert(
            SIGNATURE_FIELD.to_string(),
            Value::String(base64::encode_config(signature, base64::URL_SAFE_NO_PAD)),
        );

        let json = serde_json::to_string(&Value::Object(fields))?;
        let blob = obfuscate(&json);
        debug!("Compact credential JSON is {} bytes, tagged blob {}", json.len(), blob.len());
        if blob.len() > self.compact_capacity {
            return Err(IssueError::PayloadTooLarge {
                size: blob.len(),
                capacity: self.compact_capacity,
            });
        }
        Ok(blob)
    }
}

fn validate_subject(subject: &MemberRecord) -> Result<MemberStatus, IssueError> {
    if subject.membership_id.trim().is_empty() {
        return Err(IssueError::InvalidSubject("membership id is empty".into()));
    }
    if subject.name.trim().is_empty() {
        return Err(IssueError::InvalidSubject("name is empty".into()));
    }
    subject
        .status
        .parse::<MemberStatus>()
        .map_err(|e| IssueError::InvalidSubject(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ada, shared_keys};
    use crate::utils::obfuscation::deobfuscate;

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(shared_keys(), &Settings::default())
    }

    #[test]
    fn test_standard_envelope_shape() {
        let envelope = issuer().issue_standard_credential(&ada()).unwrap();
        let parts: Vec<&str> = envelope.split(ENVELOPE_SEPARATOR).collect();
        assert_eq!(parts.len(), 3);

        let payload: Value = serde_json::from_slice(&base64::decode(parts[0]).unwrap()).unwrap();
        assert_eq!(payload["member_id"], 42);
        assert_eq!(payload["org"], "Community Connect");
        assert_eq!(payload["nonce"].as_str().unwrap().len(), 16);

        assert_eq!(base64::decode(parts[1]).unwrap().len(), 256);

        let metadata: EnvelopeMetadata =
            serde_json::from_slice(&base64::decode(parts[2]).unwrap()).unwrap();
        assert_eq!(metadata.version, "1.0");
        assert_eq!(metadata.algorithm, "RSA-PSS-SHA256");
        assert_eq!(metadata.key_id, shared_keys().rsa().fingerprint());
    }

    #[test]
    fn test_payload_is_canonically_encoded() {
        let envelope = issuer().issue_standard_credential(&ada()).unwrap();
        let payload = base64::decode(envelope.split('|').next().unwrap()).unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.starts_with(r#"{"expires_at":"#));
        assert!(!text.contains(": "));
        assert!(!text.contains(", "));
    }

    #[test]
    fn test_standard_expiry_is_one_year_out() {
        let now = Utc::now();
        let fields = issuer().standard_fields(&ada(), now).unwrap();
        assert_eq!(fields.expires_at - fields.issued_at, Duration::days(365));
        assert_eq!(fields.status, MemberStatus::Active);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut subject = ada();
        subject.status = "banned".into();
        assert!(matches!(
            issuer().issue_standard_credential(&subject),
            Err(IssueError::InvalidSubject(_))
        ));
        subject.status = "active".into();
        subject.membership_id = "  ".into();
        assert!(matches!(
            issuer().issue_compact_credential(&subject),
            Err(IssueError::InvalidSubject(_))
        ));
    }

    #[test]
    fn test_compact_blob_fits_tag() {
        let subject = MemberRecord::new(
            7,
            "CC-2024-000000000007",
            "Bartholomew Maximilian Featherstonehaugh-Cholmondeley",
            "pending",
        );
        let blob = issuer().issue_compact_credential(&subject).unwrap();
        assert!(blob.len() <= 540);

        let json: Value = serde_json::from_str(&deobfuscate(&blob).unwrap()).unwrap();
        assert_eq!(json["v"], 1);
        assert_eq!(json["mid"], "CC-2024-0000");
        assert!(json["name"].as_str().unwrap().chars().count() <= 25);
        let sig = json["sig"].as_str().unwrap();
        assert!(!sig.contains('=') && !sig.contains('+') && !sig.contains('/'));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let settings = Settings {
            compact_capacity: 64,
            ..Settings::default()
        };
        let small = CredentialIssuer::new(shared_keys(), &settings);
        assert!(matches!(
            small.issue_compact_credential(&ada()),
            Err(IssueError::PayloadTooLarge { capacity: 64, .. })
        ));
    }

    #[test]
    fn test_lifetime_must_be_positive_and_representable() {
        for days in [0, -1, 100_000_000, i64::MAX] {
            let settings = Settings {
                validity_days: days,
                ..Settings::default()
            };
            let issuer = CredentialIssuer::new(shared_keys(), &settings);
            assert!(
                matches!(
                    issuer.issue_standard_credential(&ada()),
                    Err(IssueError::InvalidValidity { days: d }) if d == days
                ),
                "validity_days = {} should be refused",
                days
            );
            assert!(matches!(
                issuer.issue_compact_credential(&ada()),
                Err(IssueError::InvalidValidity { .. })
            ));
        }

        let one_day = Settings {
            validity_days: 1,
            ..Settings::default()
        };
        let fields = CredentialIssuer::new(shared_keys(), &one_day)
            .standard_fields(&ada(), Utc::now())
            .unwrap();
        assert!(fields.expires_at > fields.issued_at);
    }
}
