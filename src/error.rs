// src/error.rs
//! Error types for credential issuance, verification and key management.
//!
//! Verification outcomes are terminal: nothing here is transient and nothing
//! should be retried. Key store failures are fatal at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Why a credential was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Structural parse failure: segment count, base64, JSON or field types.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A required field is absent from the credential.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The credential or its metadata carries a version this verifier does not speak.
    #[error("unsupported credential version: {0}")]
    UnsupportedVersion(String),

    /// The metadata names a signature algorithm other than the one this verifier uses.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential is bound to a different signing key.
    #[error("signing key {found} does not match verifying key {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("credential expired")]
    Expired,
}

/// Why a credential could not be issued.
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("signing error: {0}")]
    Signing(String),

    /// The configured lifetime does not yield an expiry after the issue time.
    #[error("credential lifetime of {days} days is not usable")]
    InvalidValidity { days: i64 },

    /// The encoded credential does not fit on the target medium.
    #[error("encoded credential is {size} bytes, capacity is {capacity}")]
    PayloadTooLarge { size: usize, capacity: usize },
}

/// Failures while loading, generating or persisting key material.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted key material exists but cannot be used.
    #[error("corrupt key material in {path:?}: {reason}")]
    CorruptKey { path: PathBuf, reason: String },

    /// A public key is persisted without its private half.
    #[error("public key present but private key missing: {path:?}")]
    Incomplete { path: PathBuf },

    #[error("key encoding error: {0}")]
    Encoding(String),

    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("fallback public key error: {0}")]
    FallbackKey(String),
}

/// Result type for key store operations
pub type KeyStoreResult<T> = std::result::Result<T, KeyStoreError>;
