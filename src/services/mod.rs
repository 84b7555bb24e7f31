pub mod credential_issuer;
pub mod credential_service;
pub mod offline_verifier;
pub mod verifier;
