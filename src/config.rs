// src/config.rs
//! Runtime settings for the credential subsystem.
//!
//! Settings are layered: built-in defaults, then an optional `credentials.*`
//! file in the working directory, then `CREDENTIALS_*` environment variables
//! (which may come from a `.env` file loaded by the binary).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Organization name stamped into every standard credential.
pub const DEFAULT_ORGANIZATION: &str = "Community Connect";

/// Credential lifetime in days.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// Longest lifetime accepted from configuration (100 years).
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// Usable bytes on the NFC tags the compact credential is written to.
pub const DEFAULT_COMPACT_CAPACITY: usize = 540;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding the persisted RSA and EC key files
    pub key_dir: PathBuf,

    /// Value of the `org` field in standard credentials
    pub organization: String,

    /// Lifetime of issued credentials
    pub validity_days: i64,

    /// PEM file that replaces the compiled-in fallback public key
    #[serde(default)]
    pub fallback_public_key_path: Option<PathBuf>,

    /// Maximum size of a tagged compact credential
    pub compact_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("crypto_keys"),
            organization: DEFAULT_ORGANIZATION.to_string(),
            validity_days: DEFAULT_VALIDITY_DAYS,
            fallback_public_key_path: None,
            compact_capacity: DEFAULT_COMPACT_CAPACITY,
        }
    }
}

impl Settings {
    /// Loads settings from defaults, `credentials.{toml,json,yaml}` and the environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a source cannot be parsed or a value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder_with_defaults()?
            .add_source(File::with_name("credentials").required(false))
            .add_source(Environment::with_prefix("CREDENTIALS"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Same as [`Settings::load`] but reads the given file instead of `credentials.*`.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        Self::builder_with_defaults()?
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("CREDENTIALS"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Rejects values that would produce unusable credentials.
    ///
    /// # Errors
    /// `ConfigError::Message` if `validity_days` is outside `1..=MAX_VALIDITY_DAYS`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if !(1..=MAX_VALIDITY_DAYS).contains(&self.validity_days) {
            return Err(ConfigError::Message(format!(
                "validity_days must be between 1 and {}, got {}",
                MAX_VALIDITY_DAYS, self.validity_days
            )));
        }
        Ok(self)
    }

    fn builder_with_defaults(
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = Settings::default();
        Config::builder()
            .set_default("key_dir", defaults.key_dir.to_string_lossy().into_owned())?
            .set_default("organization", defaults.organization)?
            .set_default("validity_days", defaults.validity_days)?
            .set_default("compact_capacity", defaults.compact_capacity as i64)
    }

    /// The configured lifetime as a duration, `None` if it is not a positive
    /// number of days representable by `chrono`.
    pub fn validity(&self) -> Option<chrono::Duration> {
        if self.validity_days < 1 {
            return None;
        }
        chrono::Duration::try_days(self.validity_days)
    }
}
