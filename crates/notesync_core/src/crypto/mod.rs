//! Cryptographic operations for NoteSync.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption behind the [`Cryptor`] trait
//! - Random salt and nonce per message
//! - Message keys derived with Argon2id from user passwords and with
//!   HKDF-SHA256 from transfer codes or safe keys
//! - Keys are zeroized on drop
//!
//! ## Usage
//!
//! ```ignore
//! use notesync_core::crypto::{AesGcmCryptor, CipherAlgorithm, Cryptor};
//!
//! let cryptor = AesGcmCryptor::new();
//! let ciphertext = cryptor.encrypt(b"secret", b"password", CipherAlgorithm::Aes256Gcm, &mut rand::thread_rng())?;
//! let plaintext = cryptor.decrypt(&ciphertext, b"password")?;
//! ```

mod cryptor;

pub use cryptor::*;
