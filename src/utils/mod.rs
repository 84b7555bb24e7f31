pub mod crypto;
pub mod obfuscation;
pub mod serialization;
