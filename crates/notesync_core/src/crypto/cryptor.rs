//! Symmetric encryption using AES-256-GCM.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the per-message key derivation salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Magic bytes opening every ciphertext.
const CIPHERTEXT_MAGIC: [u8; 4] = *b"NSC1";
/// Header size (magic + algorithm + salt + nonce).
const HEADER_SIZE: usize = 4 + 1 + SALT_SIZE + NONCE_SIZE;
/// HKDF context string.
const KDF_INFO: &[u8] = b"notesync-cryptor-v1";

/// Symmetric key, zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key bytes.
    ///
    /// Don't log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a key from high-entropy key material using HKDF-SHA256.
    ///
    /// Suited to transfer codes and raw safe keys, not to user passwords.
    pub fn derive_from_key_material(material: &[u8], salt: &[u8]) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), material);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| CoreError::encryption_failed("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Derives a key from a user password using Argon2id.
    ///
    /// `salt` must be at least 8 bytes long.
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> CoreResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(password, salt, &mut bytes)
            .map_err(|err| CoreError::encryption_failed(format!("Argon2 failed: {err}")))?;
        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derives a key from a user password with Argon2id.
pub fn derive_key_from_password(password: &[u8], salt: &[u8]) -> CoreResult<EncryptionKey> {
    EncryptionKey::derive_from_password(password, salt)
}

/// Derives the message key for `key` and `salt` the way `algorithm` demands.
pub fn derive_message_key(
    algorithm: CipherAlgorithm,
    key: &[u8],
    salt: &[u8],
) -> CoreResult<EncryptionKey> {
    match algorithm {
        CipherAlgorithm::Aes256Gcm => EncryptionKey::derive_from_key_material(key, salt),
        CipherAlgorithm::Aes256GcmArgon2id => derive_key_from_password(key, salt),
    }
}

/// Cipher algorithms a ciphertext can be produced with.
///
/// Both use AES-256 in Galois/Counter mode and differ in how the message key
/// is derived from the caller's key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherAlgorithm {
    /// HKDF-SHA256 message keys, for random keys and transfer codes.
    #[default]
    Aes256Gcm,
    /// Argon2id message keys, for user passwords.
    Aes256GcmArgon2id,
}

impl CipherAlgorithm {
    /// Converts to the header code.
    pub fn to_code(self) -> u8 {
        match self {
            CipherAlgorithm::Aes256Gcm => 1,
            CipherAlgorithm::Aes256GcmArgon2id => 2,
        }
    }

    /// Converts from the header code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CipherAlgorithm::Aes256Gcm),
            2 => Some(CipherAlgorithm::Aes256GcmArgon2id),
            _ => None,
        }
    }
}

/// Encrypts and decrypts opaque payloads.
///
/// `key` is arbitrary key material: a user password, a transfer code or the
/// raw bytes of a safe key. Implementations derive the actual cipher key.
pub trait Cryptor: Send + Sync {
    /// Encrypts `plaintext` under `key`, drawing salt and nonce from `rng`.
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        algorithm: CipherAlgorithm,
        rng: &mut dyn RngCore,
    ) -> CoreResult<Vec<u8>>;

    /// Decrypts data produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for a wrong key or corrupted data.
    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> CoreResult<Vec<u8>>;
}

/// Default [`Cryptor`] using AES-256-GCM.
///
/// The algorithm byte selects HKDF-SHA256 or Argon2id for the message key.
///
/// Output format:
///
/// ```text
/// | magic "NSC1" (4) | algorithm (1) | salt (16) | nonce (12) | ciphertext || tag |
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCryptor;

impl AesGcmCryptor {
    /// Creates the cryptor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn cipher(algorithm: CipherAlgorithm, key: &[u8], salt: &[u8]) -> CoreResult<Aes256Gcm> {
        let derived = derive_message_key(algorithm, key, salt)?;
        Ok(Aes256Gcm::new(GenericArray::from_slice(derived.as_bytes())))
    }
}

impl Cryptor for AesGcmCryptor {
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        algorithm: CipherAlgorithm,
        rng: &mut dyn RngCore,
    ) -> CoreResult<Vec<u8>> {
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce_bytes);

        let cipher = Self::cipher(algorithm, key, &salt)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CoreError::encryption_failed("encryption error"))?;

        let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        result.extend_from_slice(&CIPHERTEXT_MAGIC);
        result.push(algorithm.to_code());
        result.extend_from_slice(&salt);
        result.extend_from_slice(&nonce_bytes);
        result.extend(ciphertext);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> CoreResult<Vec<u8>> {
        if ciphertext.len() < HEADER_SIZE + TAG_SIZE {
            return Err(CoreError::decryption_failed("ciphertext too short"));
        }
        if ciphertext[..4] != CIPHERTEXT_MAGIC {
            return Err(CoreError::decryption_failed("unknown ciphertext format"));
        }
        let algorithm = CipherAlgorithm::from_code(ciphertext[4]).ok_or_else(|| {
            CoreError::decryption_failed(format!("unsupported cipher algorithm {}", ciphertext[4]))
        })?;

        let salt = &ciphertext[5..5 + SALT_SIZE];
        let nonce = Nonce::from_slice(&ciphertext[5 + SALT_SIZE..HEADER_SIZE]);
        let cipher = Self::cipher(algorithm, key, salt)?;

        cipher
            .decrypt(nonce, &ciphertext[HEADER_SIZE..])
            .map_err(|_| CoreError::decryption_failed("decryption error"))
    }
}
