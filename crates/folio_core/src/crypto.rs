//! Per-namespace authenticated encryption.
//!
//! Every payload leaving the device is encrypted under a key derived for its
//! namespace, so the cloud provider sees only opaque blobs and a payload
//! encrypted for one namespace can never be decrypted in another.

use crate::error::{CoreError, CoreResult};
use crate::types::Namespace;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use parking_lot::RwLock;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts and decrypts payloads for a namespace.
///
/// Implementations must be deterministic about failure: a ciphertext that
/// does not authenticate under the namespace's key is an error, never
/// garbage plaintext.
pub trait EncryptionService: Send + Sync {
    /// Encrypts `plaintext` under the key for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EncryptionFailed`] if the cipher rejects the
    /// input.
    fn encrypt(&self, namespace: &Namespace, plaintext: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypts a payload previously produced by
    /// [`encrypt`](Self::encrypt) for the same namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthenticationFailure`] if the ciphertext was
    /// produced under a different namespace or has been tampered with.
    fn decrypt(&self, namespace: &Namespace, ciphertext: &[u8]) -> CoreResult<Vec<u8>>;
}

/// Root key material; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Generates a fresh random master key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a master key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKeySize`] if `bytes` is not exactly 32
    /// bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// [`EncryptionService`] deriving one AES-256-GCM key per namespace.
///
/// The namespace key is HKDF-SHA256 of the master key with the namespace
/// name as the info string, and every ciphertext additionally authenticates
/// the namespace name as associated data. Ciphertext layout is
/// `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct NamespaceCrypto {
    master: MasterKey,
    ciphers: RwLock<HashMap<Namespace, Aes256Gcm>>,
}

impl NamespaceCrypto {
    /// Creates a service rooted at `master`.
    #[must_use]
    pub fn new(master: MasterKey) -> Self {
        Self {
            master,
            ciphers: RwLock::new(HashMap::new()),
        }
    }

    fn cipher_for(&self, namespace: &Namespace) -> CoreResult<Aes256Gcm> {
        if let Some(cipher) = self.ciphers.read().get(namespace) {
            return Ok(cipher.clone());
        }

        let hk = Hkdf::<Sha256>::new(None, &self.master.bytes);
        let mut subkey = [0u8; KEY_SIZE];
        hk.expand(namespace.as_bytes(), &mut subkey)
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&subkey));
        subkey.zeroize();

        self.ciphers
            .write()
            .insert(namespace.clone(), cipher.clone());
        Ok(cipher)
    }
}

impl std::fmt::Debug for NamespaceCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceCrypto")
            .field("ciphers", &self.ciphers.read().len())
            .finish()
    }
}

impl EncryptionService for NamespaceCrypto {
    fn encrypt(&self, namespace: &Namespace, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let cipher = self.cipher_for(namespace)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad: namespace.as_bytes(),
        };
        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|_| CoreError::encryption_failed("AES-GCM encryption error"))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    fn decrypt(&self, namespace: &Namespace, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        let auth_failure = || CoreError::AuthenticationFailure {
            namespace: namespace.to_string(),
        };

        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(auth_failure());
        }
        let cipher = self.cipher_for(namespace)?;

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let payload = Payload {
            msg: &ciphertext[NONCE_SIZE..],
            aad: namespace.as_bytes(),
        };
        cipher.decrypt(nonce, payload).map_err(|_| auth_failure())
    }
}

/// Pass-through [`EncryptionService`] for tests and local-only setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCrypto;

impl EncryptionService for PlaintextCrypto {
    fn encrypt(&self, _namespace: &Namespace, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _namespace: &Namespace, ciphertext: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(name: &str) -> Namespace {
        Namespace::new(name)
    }

    #[test]
    fn master_keys_are_random() {
        let a = MasterKey::generate();
        let b = MasterKey::generate();
        assert_ne!(a.bytes, b.bytes);
    }

    #[test]
    fn master_key_rejects_wrong_size() {
        assert!(matches!(
            MasterKey::from_bytes(&[0u8; 16]),
            Err(CoreError::InvalidKeySize {
                expected: 32,
                actual: 16,
            })
        ));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        let ns = namespace("notes");

        let plaintext = b"page content";
        let ciphertext = crypto.encrypt(&ns, plaintext).unwrap();
        assert_ne!(&ciphertext[NONCE_SIZE..], plaintext);

        let decrypted = crypto.decrypt(&ns, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn nonces_differ_per_encryption() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        let ns = namespace("notes");

        let ct1 = crypto.encrypt(&ns, b"same").unwrap();
        let ct2 = crypto.encrypt(&ns, b"same").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn cross_namespace_decryption_fails() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        let ciphertext = crypto.encrypt(&namespace("alpha"), b"secret").unwrap();

        assert!(matches!(
            crypto.decrypt(&namespace("beta"), &ciphertext),
            Err(CoreError::AuthenticationFailure { .. })
        ));
    }

    #[test]
    fn different_master_key_fails() {
        let ns = namespace("notes");
        let a = NamespaceCrypto::new(MasterKey::generate());
        let b = NamespaceCrypto::new(MasterKey::generate());

        let ciphertext = a.encrypt(&ns, b"secret").unwrap();
        assert!(b.decrypt(&ns, &ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        let ns = namespace("notes");

        let mut ciphertext = crypto.encrypt(&ns, b"secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;

        assert!(matches!(
            crypto.decrypt(&ns, &ciphertext),
            Err(CoreError::AuthenticationFailure { .. })
        ));
    }

    #[test]
    fn short_ciphertext_fails() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        assert!(crypto.decrypt(&namespace("notes"), &[0u8; 10]).is_err());
    }

    #[test]
    fn same_master_key_is_deterministic_across_instances() {
        let key = MasterKey::from_bytes(&[7u8; KEY_SIZE]).unwrap();
        let ns = namespace("notes");

        let a = NamespaceCrypto::new(key.clone());
        let b = NamespaceCrypto::new(key);

        let ciphertext = a.encrypt(&ns, b"shared").unwrap();
        assert_eq!(b.decrypt(&ns, &ciphertext).unwrap(), b"shared");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let crypto = NamespaceCrypto::new(MasterKey::generate());
        let ns = namespace("notes");

        let ciphertext = crypto.encrypt(&ns, b"").unwrap();
        assert_eq!(crypto.decrypt(&ns, &ciphertext).unwrap(), b"");
    }

    #[test]
    fn plaintext_crypto_passes_through() {
        let crypto = PlaintextCrypto;
        let ns = namespace("notes");
        let ciphertext = crypto.encrypt(&ns, b"visible").unwrap();
        assert_eq!(ciphertext, b"visible");
        assert_eq!(crypto.decrypt(&ns, &ciphertext).unwrap(), b"visible");
    }
}
