// src/models/credential.rs
//! Membership credential data model.
//!
//! Two credential shapes share one subject:
//! - [`StandardCredential`]: the full record carried in a QR code and signed with RSA-PSS.
//! - [`CompactCredential`]: a trimmed record sized for a 540-byte NFC tag and signed
//!   with ECDSA P-256.
//!
//! Both are immutable once signed. A changed membership means a new credential.

use crate::models::member::MemberStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Metadata `version` of the standard envelope.
pub const STANDARD_FORMAT_VERSION: &str = "1.0";

/// Metadata `algorithm` of the standard envelope.
pub const STANDARD_ALGORITHM: &str = "RSA-PSS-SHA256";

/// The only compact schema version this crate issues and accepts.
pub const COMPACT_VERSION: u64 = 1;

/// Maximum characters of the membership id kept in a compact credential.
pub const COMPACT_MEMBERSHIP_ID_CHARS: usize = 12;

/// Maximum characters of the display name kept in a compact credential.
pub const COMPACT_NAME_CHARS: usize = 25;

/// The QR credential payload.
///
/// Serialized with the canonical encoder, so field declaration order does not
/// affect the signed bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StandardCredential {
    /// Numeric id from the membership store
    pub member_id: i64,

    /// Membership number, e.g. "CC-2024-000042"
    pub membership_id: String,

    /// Display name
    pub name: String,

    pub status: MemberStatus,

    /// Issuing organization
    pub org: String,

    pub issued_at: DateTime<Utc>,

    /// Always `issued_at` plus the configured validity (365 days by default)
    pub expires_at: DateTime<Utc>,

    /// 8 random bytes, hex encoded. Informational only, never checked against a replay store.
    pub nonce: String,
}

impl StandardCredential {
    /// A credential is still valid at the very instant of `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Third segment of a standard envelope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeMetadata {
    pub version: String,
    pub algorithm: String,
    /// Fingerprint of the RSA public key that must verify the envelope
    pub key_id: String,
}

impl EnvelopeMetadata {
    pub fn rsa_pss(key_id: impl Into<String>) -> Self {
        Self {
            version: STANDARD_FORMAT_VERSION.to_string(),
            algorithm: STANDARD_ALGORITHM.to_string(),
            key_id: key_id.into(),
        }
    }
}

/// The NFC credential fields covered by the signature.
///
/// The signature itself travels in a sibling `sig` field of the same JSON
/// object and is never part of the signed bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompactCredential {
    /// Schema version, always [`COMPACT_VERSION`]
    pub v: u64,

    /// Membership id, at most 12 characters
    pub mid: String,

    /// Display name, at most 25 characters
    pub name: String,

    /// Last valid calendar day (UTC)
    pub exp: NaiveDate,
}

impl CompactCredential {
    /// Builds the compact fields for a member, applying the tag size rules.
    pub fn new(membership_id: &str, name: &str, exp: NaiveDate) -> Self {
        Self {
            v: COMPACT_VERSION,
            mid: truncate_chars(membership_id, COMPACT_MEMBERSHIP_ID_CHARS),
            name: abbreviate_name(name, COMPACT_NAME_CHARS),
            exp,
        }
    }

    /// Expiry is a date: the credential stays valid through all of `exp`.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        today > self.exp
    }
}

/// Public key export handed to third-party verifiers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInfo {
    /// SPKI PEM text
    pub public_key: String,
    pub algorithm: String,
    pub key_format: String,
    /// Fingerprint, as found in standard envelope metadata
    pub key_id: String,
    pub usage: String,
    pub organization: String,
}

/// Keeps at most `max` characters (not bytes) of `value`.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Shortens a display name to at most `max` characters.
///
/// Names that fit are kept as-is. Longer names are reduced to their first and
/// last tokens ("Augusta Ada King Lovelace" -> "Augusta Lovelace"); if that is
/// still too long, or there is only one token, the result is truncated.
pub fn abbreviate_name(name: &str, max: usize) -> String {
    let name = name.trim();
    if name.chars().count() <= max {
        return name.to_string();
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    let shortened = match tokens.as_slice() {
        [first, .., last] => format!("{} {}", first, last),
        _ => name.to_string(),
    };
    truncate_chars(&shortened, max)
}
