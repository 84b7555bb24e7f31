// src/main.rs

//! # Member Credentials - Operator CLI
//!
//! Thin command line front end over [`CredentialService`]. It loads settings,
//! opens the key store (generating keys on first run) and runs one command.
//!
//! ## Environment Variables
//! - `CREDENTIALS_KEY_DIR`: directory holding the PEM key files (default: `crypto_keys`)
//! - `CREDENTIALS_ORGANIZATION`: issuing organization name
//! - `CREDENTIALS_VALIDITY_DAYS`: credential lifetime in days, 1 to 36500 (default: 365)
//! - `CREDENTIALS_FALLBACK_PUBLIC_KEY_PATH`: (Optional) P-256 PEM replacing the embedded fallback key
//! - `CREDENTIALS_COMPACT_CAPACITY`: maximum size in bytes of a compact credential (default: 540)
//! - `RUST_LOG`: log filter for `env_logger`
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use member_credentials::services::credential_service::decoy_qr_payload;
use member_credentials::services::verifier::normalize_scanned_input;
use member_credentials::{CredentialService, KeyAlgorithm, MemberRecord, Settings};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "member-credentials")]
#[command(about = "Issue and verify signed membership credentials")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file to use instead of ./credentials.*
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load or create the signing keys and print their fingerprints
    Init,
    /// Print a live public key
    PublicKey {
        /// rsa (QR credentials) or ec (NFC credentials)
        #[arg(short, long, default_value = "rsa")]
        algorithm: KeyAlgorithm,
        /// Print key id, algorithm and usage alongside the PEM
        #[arg(long)]
        info: bool,
    },
    /// Issue a standard (QR) credential
    IssueStandard(SubjectArgs),
    /// Issue a compact (NFC) credential
    IssueCompact(SubjectArgs),
    /// Verify a standard (QR) credential envelope
    VerifyStandard {
        envelope: String,
        /// Clean up scanner output (whitespace, hex dumps) before verifying
        #[arg(long)]
        normalize: bool,
    },
    /// Verify a compact (NFC) credential blob
    VerifyCompact {
        blob: String,
        /// Check against the fallback public key instead of the live EC key
        #[arg(long)]
        offline: bool,
    },
    /// Print the decoy payload for generic QR readers
    Decoy,
}

#[derive(clap::Args)]
struct SubjectArgs {
    /// Internal member id
    #[arg(long)]
    id: i64,
    /// Human-readable membership number
    #[arg(long)]
    membership_id: String,
    /// Full name
    #[arg(long)]
    name: String,
    /// active, inactive, suspended or pending
    #[arg(long, default_value = "active", value_parser = ["active", "inactive", "suspended", "pending"])]
    status: String,
}

impl SubjectArgs {
    fn into_record(self) -> MemberRecord {
        MemberRecord::new(self.id, self.membership_id, self.name, self.status)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {path:?}"))?,
        None => Settings::load().context("Failed to load settings")?,
    };
    let open_service = || {
        CredentialService::open(&settings)
            .with_context(|| format!("Failed to open key store in {:?}", settings.key_dir))
    };

    match cli.command {
        Commands::Init => {
            let service = open_service()?;
            let keys = service.key_store();
            info!("Key store ready in {:?}", settings.key_dir);
            print_json(&json!({
                "key_dir": settings.key_dir,
                "rsa_key_id": keys.fingerprint(KeyAlgorithm::Rsa2048),
                "ec_key_id": keys.fingerprint(KeyAlgorithm::EcdsaP256),
                "fallback_key_id": keys.fallback().fingerprint(),
            }))?;
        }
        Commands::PublicKey { algorithm, info } => {
            let service = open_service()?;
            if info {
                print_json(&service.public_key_info(algorithm)?)?;
            } else {
                print!("{}", service.public_key_pem(algorithm)?);
            }
        }
        Commands::IssueStandard(subject) => {
            let service = open_service()?;
            let envelope = service.issue_standard_credential(&subject.into_record())?;
            print_json(&json!({ "credential": envelope }))?;
        }
        Commands::IssueCompact(subject) => {
            let service = open_service()?;
            let blob = service.issue_compact_credential(&subject.into_record())?;
            print_json(&json!({ "credential": blob, "bytes": blob.len() }))?;
        }
        Commands::VerifyStandard { envelope, normalize } => {
            let service = open_service()?;
            let envelope = if normalize {
                normalize_scanned_input(&envelope)
            } else {
                envelope
            };
            let credential = service
                .verify_standard_credential(&envelope)
                .context("Standard credential rejected")?;
            print_json(&credential)?;
        }
        Commands::VerifyCompact { blob, offline } => {
            let service = open_service()?;
            let credential = if offline {
                service.verify_compact_credential_offline(&blob)
            } else {
                service.verify_compact_credential(&blob)
            }
            .context("Compact credential rejected")?;
            print_json(&credential)?;
        }
        Commands::Decoy => println!("{}", decoy_qr_payload()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use member_credentials::MemberStatus;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_status_choices_match_member_statuses() {
        let command = Cli::command();
        let issue = command.find_subcommand("issue-standard").unwrap();
        let status = issue
            .get_arguments()
            .find(|arg| arg.get_id() == "status")
            .unwrap();
        let choices: Vec<String> = status
            .get_possible_values()
            .iter()
            .map(|value| value.get_name().to_string())
            .collect();
        let expected: Vec<String> = MemberStatus::ALL
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();
        assert_eq!(choices, expected);

        let help = status.get_help().unwrap().to_string();
        for status in MemberStatus::ALL {
            assert!(help.contains(status.as_str()), "help misses {}", status);
        }
        assert!(Cli::try_parse_from([
            "member-credentials",
            "issue-compact",
            "--id",
            "1",
            "--membership-id",
            "CC-1",
            "--name",
            "Ada",
            "--status",
            "expired",
        ])
        .is_err());
    }

    #[test]
    fn test_compact_capacity_is_read_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "organization = \"Test Org\"\n").unwrap();

        std::env::set_var("CREDENTIALS_COMPACT_CAPACITY", "480");
        let settings = Settings::load_from(&path);
        std::env::remove_var("CREDENTIALS_COMPACT_CAPACITY");

        let settings = settings.unwrap();
        assert_eq!(settings.compact_capacity, 480);
        assert_eq!(settings.organization, "Test Org");
    }
}
