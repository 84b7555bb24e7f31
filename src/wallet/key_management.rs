// src/wallet/key_management.rs
//! Signing key management for credential issuance.
//!
//! A deployment owns exactly two live key pairs plus one embedded public key:
//! - RSA-2048 for standard (QR) credentials, signed with RSA-PSS/SHA-256
//! - ECDSA P-256 for compact (NFC) credentials, signed with ECDSA/SHA-256
//! - a compiled-in P-256 fallback public key for offline verification
//!
//! Key pairs are generated once, persisted as PKCS#8 PEM, and never rotated
//! automatically. Unreadable persisted keys are fatal: regenerating them would
//! silently invalidate every credential already issued.
//!
//! The [`KeyStore`] is built once at startup and is read-only afterwards, so it
//! can be shared across threads behind an `Arc` without locking.

use crate::config::Settings;
use crate::error::{KeyStoreError, KeyStoreResult};
use crate::storage::key_files::{KeyFiles, WriteOutcome};
use crate::utils::crypto::{fingerprint, max_pss_salt_len};
use log::{debug, info, warn};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Public key for offline verification of compact credentials.
///
/// Must be the public half of the deployment's P-256 signing key.
pub const EMBEDDED_FALLBACK_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEDpt7s6FXbl1pVTHKcnpiFV8ZiP25
54Te+ijEwpEkbXk4xfF0K5QXZBS4jpzXg6Y44KBe0YrcWp4/V/iVbf/uzw==
-----END PUBLIC KEY-----
";

/// The two signature families in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA-2048, used for standard (QR) credentials
    Rsa2048,
    /// ECDSA on P-256, used for compact (NFC) credentials
    EcdsaP256,
}

impl KeyAlgorithm {
    /// Name of the signature scheme built on this key type.
    pub fn signature_algorithm(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RSA-PSS-SHA256",
            KeyAlgorithm::EcdsaP256 => "ECDSA-P256-SHA256",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa2048 => f.write_str("RSA-2048"),
            KeyAlgorithm::EcdsaP256 => f.write_str("ECDSA-P256"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" | "rsa-2048" | "rsa2048" => Ok(KeyAlgorithm::Rsa2048),
            "ec" | "ecdsa" | "p256" | "ecdsa-p256" => Ok(KeyAlgorithm::EcdsaP256),
            other => Err(format!("unknown key algorithm {:?} (expected rsa or ec)", other)),
        }
    }
}

/// A key pair that lives in a [`KeyFiles`] directory.
trait PersistedKeyPair: Sized {
    const LABEL: &'static str;
    const PRIVATE_FILE: &'static str;
    const PUBLIC_FILE: &'static str;

    fn generate() -> KeyStoreResult<Self>;
    fn from_private_pem(pem: &str) -> Result<Self, String>;
    fn private_pem(&self) -> KeyStoreResult<Zeroizing<String>>;
    fn public_pem(&self) -> KeyStoreResult<String>;
    fn public_pem_fingerprint(pem: &str) -> Result<String, String>;
    fn key_id(&self) -> &str;
}

fn load_or_create<K: PersistedKeyPair>(files: &KeyFiles) -> KeyStoreResult<K> {
    let private_path = files.path(K::PRIVATE_FILE);

    let Some(private_pem) = files.read(K::PRIVATE_FILE)? else {
        if files.read(K::PUBLIC_FILE)?.is_some() {
            // private files are published before public ones, so a concurrent
            // creator's key is visible by now
            if files.read(K::PRIVATE_FILE)?.is_some() {
                return load_or_create::<K>(files);
            }
            return Err(KeyStoreError::Incomplete { path: private_path });
        }

        debug!("No {} key in {:?}, generating", K::LABEL, files.dir());
        let pair = K::generate()?;
        return match files.write_private(K::PRIVATE_FILE, &pair.private_pem()?)? {
            WriteOutcome::Written => {
                files.write_public(K::PUBLIC_FILE, &pair.public_pem()?)?;
                info!("Generated {} key {}", K::LABEL, pair.key_id());
                Ok(pair)
            }
            WriteOutcome::AlreadyExists => {
                warn!(
                    "{} key was created concurrently in {:?}, using the persisted one",
                    K::LABEL,
                    files.dir()
                );
                load_or_create::<K>(files)
            }
        };
    };

    let pair = K::from_private_pem(&private_pem).map_err(|reason| KeyStoreError::CorruptKey {
        path: private_path,
        reason,
    })?;

    match files.read(K::PUBLIC_FILE)? {
        Some(public_pem) => {
            let public_path = files.path(K::PUBLIC_FILE);
            let persisted = K::public_pem_fingerprint(&public_pem).map_err(|reason| {
                KeyStoreError::CorruptKey {
                    path: public_path.clone(),
                    reason,
                }
            })?;
            if persisted != pair.key_id() {
                return Err(KeyStoreError::CorruptKey {
                    path: public_path,
                    reason: format!(
                        "public key {} does not belong to private key {}",
                        persisted,
                        pair.key_id()
                    ),
                });
            }
        }
        None => {
            warn!("{} public key file missing, re-deriving it", K::LABEL);
            files.write_public(K::PUBLIC_FILE, &pair.public_pem()?)?;
        }
    }

    info!("Loaded {} key {}", K::LABEL, pair.key_id());
    Ok(pair)
}

/// RSA-2048 pair signing standard credentials.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    fingerprint: String,
}

impl RsaKeyPair {
    pub const BITS: usize = 2048;

    fn from_private(private_key: RsaPrivateKey) -> Result<Self, String> {
        if private_key.size() * 8 != Self::BITS {
            return Err(format!(
                "expected a {}-bit RSA key, found {} bits",
                Self::BITS,
                private_key.size() * 8
            ));
        }
        let public_key = private_key.to_public_key();
        let der = public_key.to_public_key_der().map_err(|e| e.to_string())?;
        Ok(Self {
            fingerprint: fingerprint(der.as_bytes()),
            private_key,
            public_key,
        })
    }

    /// Parses a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem: &str) -> KeyStoreResult<Self> {
        <Self as PersistedKeyPair>::from_private_pem(pem).map_err(KeyStoreError::Encoding)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Fingerprint of the public key, as written into envelope metadata.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// SPKI PEM of the public key.
    pub fn public_key_pem(&self) -> KeyStoreResult<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))
    }

    fn pss(&self) -> Pss {
        Pss::new_with_salt::<Sha256>(max_pss_salt_len(self.public_key.size()))
    }

    /// Signs `message` with RSA-PSS over SHA-256, MGF1-SHA-256 and the maximum salt length.
    pub fn sign_pss(&self, message: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        let digest = Sha256::digest(message);
        self.private_key.sign_with_rng(&mut OsRng, self.pss(), &digest)
    }

    /// Checks an RSA-PSS signature produced by [`RsaKeyPair::sign_pss`].
    pub fn verify_pss(&self, message: &[u8], signature: &[u8]) -> bool {
        let digest = Sha256::digest(message);
        self.public_key.verify(self.pss(), &digest, signature).is_ok()
    }
}

impl PersistedKeyPair for RsaKeyPair {
    const LABEL: &'static str = "RSA-2048";
    const PRIVATE_FILE: &'static str = "rsa_private.pem";
    const PUBLIC_FILE: &'static str = "rsa_public.pem";

    fn generate() -> KeyStoreResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, Self::BITS)
            .map_err(|e| KeyStoreError::Generation(e.to_string()))?;
        Self::from_private(private_key).map_err(KeyStoreError::Generation)
    }

    fn from_private_pem(pem: &str) -> Result<Self, String> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())?;
        Self::from_private(private_key)
    }

    fn private_pem(&self) -> KeyStoreResult<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))
    }

    fn public_pem(&self) -> KeyStoreResult<String> {
        self.public_key_pem()
    }

    fn public_pem_fingerprint(pem: &str) -> Result<String, String> {
        let public_key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| e.to_string())?;
        let der = public_key.to_public_key_der().map_err(|e| e.to_string())?;
        Ok(fingerprint(der.as_bytes()))
    }

    fn key_id(&self) -> &str {
        &self.fingerprint
    }
}

/// P-256 pair signing compact credentials.
#[derive(Clone)]
pub struct EcKeyPair {
    secret_key: p256::SecretKey,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    fingerprint: String,
}

impl EcKeyPair {
    fn from_secret(secret_key: p256::SecretKey) -> Result<Self, String> {
        let public_key = secret_key.public_key();
        let der = public_key.to_public_key_der().map_err(|e| e.to_string())?;
        Ok(Self {
            signing_key: SigningKey::from(&secret_key),
            verifying_key: VerifyingKey::from(&public_key),
            fingerprint: fingerprint(der.as_bytes()),
            secret_key,
        })
    }

    /// Parses a PKCS#8 PEM private key.
    pub fn from_pkcs8_pem(pem: &str) -> KeyStoreResult<Self> {
        <Self as PersistedKeyPair>::from_private_pem(pem).map_err(KeyStoreError::Encoding)
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// SPKI PEM of the public key.
    pub fn public_key_pem(&self) -> KeyStoreResult<String> {
        self.secret_key
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))
    }

    /// Signs `message` with ECDSA/SHA-256 and returns the DER-encoded signature.
    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// Checks a DER-encoded ECDSA signature against this pair's public key.
    pub fn verify_der(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_ecdsa_der(&self.verifying_key, message, signature)
    }
}

impl PersistedKeyPair for EcKeyPair {
    const LABEL: &'static str = "ECDSA-P256";
    const PRIVATE_FILE: &'static str = "ec_private.pem";
    const PUBLIC_FILE: &'static str = "ec_public.pem";

    fn generate() -> KeyStoreResult<Self> {
        Self::from_secret(p256::SecretKey::random(&mut OsRng)).map_err(KeyStoreError::Generation)
    }

    fn from_private_pem(pem: &str) -> Result<Self, String> {
        let secret_key = p256::SecretKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())?;
        Self::from_secret(secret_key)
    }

    fn private_pem(&self) -> KeyStoreResult<Zeroizing<String>> {
        self.secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))
    }

    fn public_pem(&self) -> KeyStoreResult<String> {
        self.public_key_pem()
    }

    fn public_pem_fingerprint(pem: &str) -> Result<String, String> {
        let public_key = p256::PublicKey::from_public_key_pem(pem).map_err(|e| e.to_string())?;
        let der = public_key.to_public_key_der().map_err(|e| e.to_string())?;
        Ok(fingerprint(der.as_bytes()))
    }

    fn key_id(&self) -> &str {
        &self.fingerprint
    }
}

/// Exactly one DER encoding of (r, s) is accepted; raw or truncated forms are not.
pub fn verify_ecdsa_der(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    match Signature::from_der(signature) {
        Ok(signature) => key.verify(message, &signature).is_ok(),
        Err(_) => false,
    }
}

/// P-256 public key used when the live signing key is out of reach.
#[derive(Clone, Debug)]
pub struct FallbackPublicKey {
    verifying_key: VerifyingKey,
    fingerprint: String,
}

impl FallbackPublicKey {
    /// Parses a P-256 SPKI PEM.
    ///
    /// # Errors
    /// Rejects anything that is not a P-256 public key, including RSA keys.
    pub fn from_pem(pem: &str) -> KeyStoreResult<Self> {
        let public_key = p256::PublicKey::from_public_key_pem(pem)
            .map_err(|e| KeyStoreError::FallbackKey(e.to_string()))?;
        let der = public_key
            .to_public_key_der()
            .map_err(|e| KeyStoreError::FallbackKey(e.to_string()))?;
        Ok(Self {
            verifying_key: VerifyingKey::from(&public_key),
            fingerprint: fingerprint(der.as_bytes()),
        })
    }

    /// The key compiled into this crate.
    pub fn embedded() -> KeyStoreResult<Self> {
        Self::from_pem(EMBEDDED_FALLBACK_PUBLIC_KEY_PEM)
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Loads the persisted RSA pair from `dir`, generating and persisting one on first use.
pub fn load_or_create_rsa_pair(dir: &Path) -> KeyStoreResult<RsaKeyPair> {
    load_or_create(&KeyFiles::open(dir)?)
}

/// Loads the persisted P-256 pair from `dir`, generating and persisting one on first use.
pub fn load_or_create_ec_pair(dir: &Path) -> KeyStoreResult<EcKeyPair> {
    load_or_create(&KeyFiles::open(dir)?)
}

/// All key material the signers and verifiers need. Immutable once built.
#[derive(Clone)]
pub struct KeyStore {
    rsa: RsaKeyPair,
    ec: EcKeyPair,
    fallback: FallbackPublicKey,
}

impl KeyStore {
    /// Loads or creates both key pairs and resolves the fallback key.
    ///
    /// Call once at startup, before serving concurrent traffic.
    ///
    /// # Errors
    /// Any unreadable, corrupt or incomplete key material aborts initialization.
    pub fn open(settings: &Settings) -> KeyStoreResult<Self> {
        let files = KeyFiles::open(&settings.key_dir)?;
        let rsa = load_or_create::<RsaKeyPair>(&files)?;
        let ec = load_or_create::<EcKeyPair>(&files)?;

        let fallback = match &settings.fallback_public_key_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                FallbackPublicKey::from_pem(&pem)?
            }
            None => FallbackPublicKey::embedded()?,
        };

        Ok(Self::from_parts(rsa, ec, fallback))
    }

    /// Assembles a key store from already loaded parts.
    pub fn from_parts(rsa: RsaKeyPair, ec: EcKeyPair, fallback: FallbackPublicKey) -> Self {
        if fallback.fingerprint() != ec.fingerprint() {
            warn!(
                "Fallback key {} differs from live EC key {}; offline verification will reject newly issued compact credentials",
                fallback.fingerprint(),
                ec.fingerprint()
            );
        }
        Self { rsa, ec, fallback }
    }

    pub fn rsa(&self) -> &RsaKeyPair {
        &self.rsa
    }

    pub fn ec(&self) -> &EcKeyPair {
        &self.ec
    }

    pub fn fallback(&self) -> &FallbackPublicKey {
        &self.fallback
    }

    /// Fingerprint of the live key for `algorithm`.
    pub fn fingerprint(&self, algorithm: KeyAlgorithm) -> &str {
        match algorithm {
            KeyAlgorithm::Rsa2048 => self.rsa.fingerprint(),
            KeyAlgorithm::EcdsaP256 => self.ec.fingerprint(),
        }
    }

    /// SPKI PEM of the live public key for `algorithm`.
    pub fn public_key_pem(&self, algorithm: KeyAlgorithm) -> KeyStoreResult<String> {
        match algorithm {
            KeyAlgorithm::Rsa2048 => self.rsa.public_key_pem(),
            KeyAlgorithm::EcdsaP256 => self.ec.public_key_pem(),
        }
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("rsa", &self.rsa.fingerprint())
            .field("ec", &self.ec.fingerprint())
            .field("fallback", &self.fallback.fingerprint())
            .finish()
    }
}
