// Encrypted secret store - open, guard, zero

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::Error;

const MAGIC: &[u8; 4] = b"DLGS";
const VERSION: u8 = 1;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

/// Key-derivation cost profile used to turn the passphrase into a store key.
///
/// The profile is not written to the store file: a store sealed with one
/// profile only opens with the same profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfMode {
    Interactive,
    Standard,
}

impl KdfMode {
    fn params(self) -> Result<Params, Error> {
        let (memory, iterations, parallelism) = match self {
            KdfMode::Interactive => (19 * 1024, 2, 1),
            KdfMode::Standard => (64 * 1024, 3, 4),
        };
        Params::new(memory, iterations, parallelism, Some(32))
            .map_err(|_| Error::StoreOpen("invalid key derivation parameters".to_string()))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub label: String,
    pub timestamp: i64,
    pub secret: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("label", &self.label)
            .field("timestamp", &self.timestamp)
            .field("secret", &"<redacted>")
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SecretStore {
    pub timestamp: i64,
    pub records: HashMap<String, SecretRecord>,
}

impl SecretStore {
    pub fn get(&self, label: &str) -> Option<&SecretRecord> {
        self.records.get(label)
    }

    /// Overwrite every secret and metadata value, then drop the records.
    pub fn zero(&mut self) {
        for (_, mut record) in self.records.drain() {
            record.secret.zeroize();
            record.label.zeroize();
            for (_, mut value) in record.metadata.drain() {
                value.zeroize();
            }
        }
        self.timestamp = 0;
    }

    #[cfg(test)]
    pub fn insert(&mut self, label: &str, secret: &[u8], metadata: &[(&str, &str)]) {
        let record = SecretRecord {
            label: label.to_string(),
            timestamp: self.timestamp,
            secret: secret.to_vec(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.records.insert(label.to_string(), record);
    }
}

#[cfg(test)]
thread_local! {
    static GUARDS_ZEROED: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Owns an unlocked store and zeroes it when dropped.
#[derive(Debug)]
pub struct StoreGuard {
    store: SecretStore,
}

impl StoreGuard {
    fn new(store: SecretStore) -> Self {
        Self { store }
    }
}

impl Deref for StoreGuard {
    type Target = SecretStore;

    fn deref(&self) -> &SecretStore {
        &self.store
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        self.store.zero();
        #[cfg(test)]
        GUARDS_ZEROED.with(|n| n.set(n.get() + 1));
        tracing::debug!("secret store zeroed");
    }
}

fn derive_key(passphrase: &str, salt: &[u8], mode: KdfMode) -> Result<Zeroizing<[u8; 32]>, Error> {
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, mode.params()?)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|_| Error::StoreOpen("key derivation failed".to_string()))?;
    Ok(key)
}

/// Unlock the store at `path`.
///
/// A missing file is reported as [`Error::StoreNotFound`]; every problem
/// with the contents, including a wrong passphrase, is [`Error::StoreOpen`].
pub fn open(path: &Path, passphrase: &str, mode: KdfMode) -> Result<StoreGuard, Error> {
    if !path.exists() {
        return Err(Error::StoreNotFound(path.to_path_buf()));
    }
    let data = std::fs::read(path)?;
    tracing::debug!(path = %path.display(), bytes = data.len(), ?mode, "opening secret store");
    let store = unseal(&data, passphrase, mode)?;
    tracing::info!(records = store.records.len(), "secret store unlocked");
    Ok(StoreGuard::new(store))
}

fn unseal(data: &[u8], passphrase: &str, mode: KdfMode) -> Result<SecretStore, Error> {
    if data.len() < HEADER_LEN {
        return Err(Error::StoreOpen("store file is truncated".to_string()));
    }
    let (magic, rest) = data.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(Error::StoreOpen("not a secret store".to_string()));
    }
    let (version, rest) = rest.split_at(1);
    if version[0] != VERSION {
        return Err(Error::StoreOpen(format!("unsupported store version {}", version[0])));
    }
    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(passphrase, salt, mode)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| Error::StoreOpen("wrong passphrase or corrupt store".to_string()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|_| Error::StoreOpen("store contents are malformed".to_string()))
}

#[cfg(test)]
pub fn seal(store: &SecretStore, passphrase: &str, mode: KdfMode) -> Result<Vec<u8>, Error> {
    use chacha20poly1305::aead::rand_core::RngCore;
    use chacha20poly1305::aead::{AeadCore, OsRng};

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let key = derive_key(passphrase, &salt, mode)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    let plaintext = Zeroizing::new(
        serde_json::to_vec(store).map_err(|e| Error::StoreOpen(e.to_string()))?,
    );
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| Error::StoreOpen("encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}
