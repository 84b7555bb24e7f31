// src/models/member.rs
//! Subject records supplied by the membership store.
//!
//! The membership store itself lives outside this crate; it hands over a
//! [`MemberRecord`] per issuance request and this module turns the loosely
//! typed status string into a [`MemberStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The person a credential is issued to, as the membership store describes them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    /// Numeric primary key in the membership store
    pub id: i64,

    /// Human-facing membership number, e.g. "CC-2024-000042"
    pub membership_id: String,

    /// Display name printed on the card
    #[serde(alias = "fullName")]
    pub name: String,

    /// Status as stored ("active", "inactive", "suspended", "pending")
    pub status: String,
}

impl MemberRecord {
    pub fn new(
        id: i64,
        membership_id: impl Into<String>,
        name: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id,
            membership_id: membership_id.into(),
            name: name.into(),
            status: status.into(),
        }
    }
}

/// Membership status carried inside a standard credential.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl MemberStatus {
    pub const ALL: [MemberStatus; 4] = [
        MemberStatus::Active,
        MemberStatus::Inactive,
        MemberStatus::Suspended,
        MemberStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
            MemberStatus::Suspended => "suspended",
            MemberStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when the membership store hands over a status this crate does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown member status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for MemberStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(MemberStatus::Active),
            "inactive" => Ok(MemberStatus::Inactive),
            "suspended" => Ok(MemberStatus::Suspended),
            "pending" => Ok(MemberStatus::Pending),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("active".parse::<MemberStatus>(), Ok(MemberStatus::Active));
        assert_eq!(" Suspended ".parse::<MemberStatus>(), Ok(MemberStatus::Suspended));
        assert_eq!("PENDING".parse::<MemberStatus>(), Ok(MemberStatus::Pending));
        assert!("banned".parse::<MemberStatus>().is_err());
    }

    #[test]
    fn test_unknown_status_error_names_the_value() {
        let err = "expired".parse::<MemberStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("expired".to_string()));
        assert_eq!(err.to_string(), r#"unknown member status "expired""#);
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn test_record_accepts_store_field_names() {
        let record: MemberRecord = serde_json::from_str(
            r#"{"id":42,"membershipId":"CC-2024-000042","fullName":"Ada Lovelace","status":"active"}"#,
        )
        .unwrap();
        assert_eq!(record, MemberRecord::new(42, "CC-2024-000042", "Ada Lovelace", "active"));
    }
}
