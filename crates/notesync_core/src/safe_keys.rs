//! Volatile store of decrypted safe keys.
//!
//! Decrypted keys live only in memory, behind a mutex, and are zeroized when
//! a safe is closed or the store is dropped. Nothing in here is persisted.

use crate::crypto::{CipherAlgorithm, Cryptor, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use crate::model::{Note, Safe};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Holds the decrypted keys of all currently open safes.
///
/// Several safes can be open at once, e.g. safes created on different
/// devices at different points in time with the same password.
pub struct SafeKeyStore {
    cryptor: Arc<dyn Cryptor>,
    keys: Mutex<HashMap<Uuid, EncryptionKey>>,
}

impl SafeKeyStore {
    /// Creates an empty store using the given cryptor.
    pub fn new(cryptor: Arc<dyn Cryptor>) -> Self {
        Self {
            cryptor,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cryptor used for keys and note bodies.
    pub fn cryptor(&self) -> &Arc<dyn Cryptor> {
        &self.cryptor
    }

    /// Tries to open a safe with a password.
    ///
    /// Returns true if the safe is open afterwards, whether it was opened by
    /// this call or already open. A wrong password returns false and leaves
    /// no trace in the store.
    pub fn try_open(&self, safe: &Safe, password: &str) -> bool {
        let mut keys = self.keys.lock();
        if keys.contains_key(&safe.id) {
            return true;
        }

        let decrypted = self
            .cryptor
            .decrypt(&safe.encrypted_key, password.as_bytes())
            .map(Zeroizing::new)
            .and_then(|bytes| EncryptionKey::from_bytes(&bytes));

        match decrypted {
            Ok(key) => {
                keys.insert(safe.id, key);
                info!(safe_id = %safe.id, "opened safe");
                true
            }
            Err(err) => {
                debug!(safe_id = %safe.id, error = %err, "could not open safe");
                false
            }
        }
    }

    /// Tries one password on several safes.
    ///
    /// Returns how many of them are open afterwards thanks to this password
    /// (including safes that were already open).
    pub fn open_safes<'a, I>(&self, safes: I, password: &str) -> usize
    where
        I: IntoIterator<Item = &'a Safe>,
    {
        safes
            .into_iter()
            .filter(|safe| self.try_open(safe, password))
            .count()
    }

    /// Returns a copy of the key of an open safe.
    ///
    /// Returns `None` for a `None` id or a safe that is not open.
    pub fn get_key(&self, safe_id: Option<Uuid>) -> Option<EncryptionKey> {
        let safe_id = safe_id?;
        self.keys.lock().get(&safe_id).cloned()
    }

    /// Returns true if the safe is open.
    pub fn is_open(&self, safe_id: Uuid) -> bool {
        self.keys.lock().contains_key(&safe_id)
    }

    /// Returns the number of open safes.
    pub fn open_count(&self) -> usize {
        self.keys.lock().len()
    }

    /// Closes a safe. The key bytes are zeroized when dropped.
    ///
    /// Returns true if the safe was open.
    pub fn close(&self, safe_id: Uuid) -> bool {
        let removed = self.keys.lock().remove(&safe_id);
        if removed.is_some() {
            info!(safe_id = %safe_id, "closed safe");
        }
        removed.is_some()
    }

    /// Closes every safe.
    pub fn close_all(&self) {
        let mut keys = self.keys.lock();
        let count = keys.len();
        keys.clear();
        info!(count, "closed all safes");
    }

    /// Creates a new safe with a random key protected by `password`.
    ///
    /// The new safe is open on return; the caller adds it to the repository.
    pub fn create_safe(&self, password: &str) -> CoreResult<Safe> {
        let key = EncryptionKey::generate();
        let encrypted_key = self.cryptor.encrypt(
            key.as_bytes(),
            password.as_bytes(),
            CipherAlgorithm::Aes256GcmArgon2id,
            &mut rand::thread_rng(),
        )?;
        let safe = Safe::new(encrypted_key);
        self.keys.lock().insert(safe.id, key);
        info!(safe_id = %safe.id, "created safe");
        Ok(safe)
    }

    /// Re-encrypts the key of an open safe under a new password.
    ///
    /// Note bodies are untouched since the key itself does not change.
    pub fn change_password(&self, safe: &mut Safe, new_password: &str) -> CoreResult<()> {
        let key = self
            .get_key(Some(safe.id))
            .ok_or(CoreError::SafeNotOpen { safe_id: safe.id })?;
        let encrypted_key = self.cryptor.encrypt(
            key.as_bytes(),
            new_password.as_bytes(),
            CipherAlgorithm::Aes256GcmArgon2id,
            &mut rand::thread_rng(),
        )?;
        safe.replace_encrypted_key(encrypted_key);
        info!(safe_id = %safe.id, "changed safe password");
        Ok(())
    }

    /// Encrypts the body of a plaintext note with the key of an open safe.
    pub fn lock_note(&self, note: &mut Note, safe_id: Uuid) -> CoreResult<()> {
        let key = self
            .get_key(Some(safe_id))
            .ok_or(CoreError::SafeNotOpen { safe_id })?;
        let ciphertext = self.cryptor.encrypt(
            note.body.as_bytes(),
            key.as_bytes(),
            CipherAlgorithm::default(),
            &mut rand::thread_rng(),
        )?;
        note.safe_id = Some(safe_id);
        note.set_body(STANDARD.encode(ciphertext));
        Ok(())
    }

    /// Permanently decrypts a locked note back into plaintext.
    pub fn unlock_note(&self, note: &mut Note) -> CoreResult<()> {
        if !note.is_locked() {
            return Ok(());
        }
        let plaintext = self.decrypt_note_body(note)?;
        note.safe_id = None;
        note.set_body(plaintext);
        Ok(())
    }

    /// Returns the plaintext body of a note without modifying it.
    pub fn decrypt_note_body(&self, note: &Note) -> CoreResult<String> {
        let Some(safe_id) = note.safe_id else {
            return Ok(note.body.clone());
        };
        let key = self
            .get_key(Some(safe_id))
            .ok_or(CoreError::SafeNotOpen { safe_id })?;
        let ciphertext = STANDARD
            .decode(note.body.as_bytes())
            .map_err(|err| CoreError::decryption_failed(format!("invalid note ciphertext: {err}")))?;
        let plaintext = self.cryptor.decrypt(&ciphertext, key.as_bytes())?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::decryption_failed("note body is not valid UTF-8"))
    }
}

impl std::fmt::Debug for SafeKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeKeyStore")
            .field("open_safes", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCryptor;

    fn store() -> SafeKeyStore {
        SafeKeyStore::new(Arc::new(AesGcmCryptor::new()))
    }

    #[test]
    fn create_and_reopen() {
        let creator = store();
        let safe = creator.create_safe("correct horse").unwrap();
        assert!(creator.is_open(safe.id));

        let other_device = store();
        assert!(!other_device.is_open(safe.id));
        assert!(other_device.try_open(&safe, "correct horse"));
        assert_eq!(
            other_device.get_key(Some(safe.id)),
            creator.get_key(Some(safe.id))
        );
    }

    #[test]
    fn try_open_is_idempotent() {
        let keys = store();
        let safe = keys.create_safe("pw").unwrap();
        keys.close(safe.id);

        assert!(keys.try_open(&safe, "pw"));
        assert!(keys.try_open(&safe, "pw"));
        // Already open, the password is not checked again.
        assert!(keys.try_open(&safe, "anything"));
        assert_eq!(keys.open_count(), 1);
    }

    #[test]
    fn wrong_password_twice_never_inserts_key() {
        let creator = store();
        let safe = creator.create_safe("secret").unwrap();

        let keys = store();
        assert!(!keys.try_open(&safe, "wrong"));
        assert!(!keys.try_open(&safe, "wrong"));
        assert_eq!(keys.open_count(), 0);
        assert!(keys.get_key(Some(safe.id)).is_none());
    }

    #[test]
    fn get_key_for_none_or_closed() {
        let keys = store();
        assert!(keys.get_key(None).is_none());
        assert!(keys.get_key(Some(Uuid::new_v4())).is_none());
    }

    #[test]
    fn close_and_close_all() {
        let keys = store();
        let a = keys.create_safe("a").unwrap();
        let b = keys.create_safe("b").unwrap();
        assert_eq!(keys.open_count(), 2);

        assert!(keys.close(a.id));
        assert!(!keys.close(a.id));
        assert!(keys.is_open(b.id));

        keys.close_all();
        assert_eq!(keys.open_count(), 0);
    }

    #[test]
    fn open_safes_counts_matches() {
        let creator = store();
        let s1 = creator.create_safe("shared").unwrap();
        let s2 = creator.create_safe("shared").unwrap();
        let s3 = creator.create_safe("different").unwrap();

        let keys = store();
        let opened = keys.open_safes([&s1, &s2, &s3], "shared");
        assert_eq!(opened, 2);
        assert!(!keys.is_open(s3.id));
    }

    #[test]
    fn change_password_preserves_key() {
        let keys = store();
        let mut safe = keys.create_safe("old").unwrap();
        let old_encrypted = safe.encrypted_key.clone();
        let original = keys.get_key(Some(safe.id)).unwrap();

        keys.change_password(&mut safe, "new").unwrap();
        assert_ne!(safe.encrypted_key, old_encrypted);

        let cryptor = AesGcmCryptor::new();
        let from_new = cryptor.decrypt(&safe.encrypted_key, b"new").unwrap();
        let from_old = cryptor.decrypt(&old_encrypted, b"old").unwrap();
        assert_eq!(from_new, from_old);
        assert_eq!(from_new, original.as_bytes().to_vec());
    }

    #[test]
    fn safe_keys_are_stretched_and_note_bodies_are_not() {
        let keys = store();
        let safe = keys.create_safe("pw").unwrap();
        assert_eq!(
            CipherAlgorithm::from_code(safe.encrypted_key[4]),
            Some(CipherAlgorithm::Aes256GcmArgon2id)
        );

        let mut note = Note::new();
        note.body = "groceries".into();
        keys.lock_note(&mut note, safe.id).unwrap();
        let ciphertext = STANDARD.decode(note.body.as_bytes()).unwrap();
        assert_eq!(
            CipherAlgorithm::from_code(ciphertext[4]),
            Some(CipherAlgorithm::Aes256Gcm)
        );
    }

    #[test]
    fn change_password_requires_open_safe() {
        let keys = store();
        let mut safe = keys.create_safe("old").unwrap();
        keys.close(safe.id);
        assert!(matches!(
            keys.change_password(&mut safe, "new"),
            Err(CoreError::SafeNotOpen { .. })
        ));
    }

    #[test]
    fn lock_and_unlock_note() {
        let keys = store();
        let safe = keys.create_safe("pw").unwrap();
        let mut note = Note::new();
        note.body = "my diary".into();

        keys.lock_note(&mut note, safe.id).unwrap();
        assert!(note.is_locked());
        assert_ne!(note.body, "my diary");
        assert_eq!(keys.decrypt_note_body(&note).unwrap(), "my diary");

        keys.close(safe.id);
        assert!(keys.decrypt_note_body(&note).is_err());

        assert!(keys.try_open(&safe, "pw"));
        keys.unlock_note(&mut note).unwrap();
        assert!(!note.is_locked());
        assert_eq!(note.body, "my diary");
    }
}
