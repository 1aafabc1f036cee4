//! Wrapping of vault key material at rest.
//!
//! Every record is sealed with AES-256-GCM under a per-record key derived
//! as `HMAC-SHA256(master secret, salt)`, so no two records share a
//! wrapping key even though the vault holds one master secret. The secret
//! version is recorded alongside each record: after a rotation, old
//! records name the secret that can still open them.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::vault::VaultError;

/// Per-record salt length (256 bits).
pub const SALT_LEN: usize = 32;

/// AES-GCM nonce length, prepended to the ciphertext.
const NONCE_LEN: usize = 12;

/// Version stamped on records wrapped with the currently configured secret.
pub const CURRENT_SECRET_VERSION: i16 = 1;

/// Wrapped key material as persisted by a vault implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub secret_version: i16,
    /// Unique per record; feeds the wrapping-key derivation.
    pub salt: Vec<u8>,
    /// `nonce || AES-256-GCM ciphertext`.
    pub ciphertext: Vec<u8>,
}

/// Seals and opens vault key material with the process-wide wrap secret.
///
/// The secret is injected from configuration at startup and reduced to a
/// 256-bit master key; it is never persisted.
pub struct KeyWrapper {
    master: [u8; 32],
    version: i16,
}

impl KeyWrapper {
    pub fn new(secret: &str) -> Self {
        Self {
            master: Sha256::digest(secret.as_bytes()).into(),
            version: CURRENT_SECRET_VERSION,
        }
    }

    /// Wrap `material` under a freshly generated salt and nonce.
    pub fn wrap(&self, material: &[u8]) -> Result<WrappedKey, VaultError> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);

        let cipher = self.record_cipher(&salt)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, material)
            .map_err(|_| VaultError::Crypto("key wrapping failed".into()))?;

        Ok(WrappedKey {
            secret_version: self.version,
            salt,
            ciphertext: [nonce.as_slice(), &sealed].concat(),
        })
    }

    /// Open a wrapped record. Fails on an unknown secret version, a
    /// truncated record, or an authentication failure (tampering or a
    /// rotated-away secret).
    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<Vec<u8>, VaultError> {
        if wrapped.secret_version != self.version {
            return Err(VaultError::Crypto(format!(
                "record wrapped with unknown secret version {}",
                wrapped.secret_version
            )));
        }
        if wrapped.ciphertext.len() < NONCE_LEN {
            return Err(VaultError::Crypto("wrapped record too short".into()));
        }

        let cipher = self.record_cipher(&wrapped.salt)?;
        let nonce = Nonce::from_slice(&wrapped.ciphertext[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &wrapped.ciphertext[NONCE_LEN..])
            .map_err(|_| VaultError::Crypto("key unwrapping failed".into()))
    }

    /// Derive the per-record cipher from the master secret and salt.
    fn record_cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, VaultError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.master)
            .map_err(|_| VaultError::Crypto("invalid master key length".into()))?;
        mac.update(salt);
        let record_key = mac.finalize().into_bytes();
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&record_key)))
    }
}
