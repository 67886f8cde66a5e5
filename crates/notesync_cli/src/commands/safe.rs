//! Safe maintenance commands.

use notesync_core::{
    AesGcmCryptor, FileRepositoryStorage, Repository, RepositoryStorage, SafeKeyStore,
    StorageProfile,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Opens the repository storage of `data_dir`.
pub fn open_storage(data_dir: &Path, profile: StorageProfile) -> FileRepositoryStorage {
    FileRepositoryStorage::new(data_dir, profile)
}

fn key_store() -> SafeKeyStore {
    SafeKeyStore::new(Arc::new(AesGcmCryptor::new()))
}

fn find_note_index(repository: &Repository, note: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let id = Uuid::parse_str(note)?;
    repository
        .notes
        .iter()
        .position(|candidate| candidate.id == id)
        .ok_or_else(|| format!("No note with id {id}").into())
}

/// Creates a safe protected by `password`.
pub fn create(storage: &FileRepositoryStorage, password: &str) -> CommandResult {
    let mut repository = storage.load()?;
    let safe = key_store().create_safe(password)?;
    println!("Created safe {}", safe.id);
    repository.safes.push(safe);
    storage.save(&repository)?;
    Ok(())
}

/// Prints how many safes `password` opens.
pub fn check(storage: &FileRepositoryStorage, password: &str) -> CommandResult {
    let repository = storage.load()?;
    let opened = key_store().open_safes(&repository.safes, password);
    println!("Password opens {} of {} safes", opened, repository.safes.len());
    Ok(())
}

/// Re-protects every safe `old` opens with `new`.
pub fn change_password(storage: &FileRepositoryStorage, old: &str, new: &str) -> CommandResult {
    let mut repository = storage.load()?;
    let keys = key_store();
    if keys.open_safes(&repository.safes, old) == 0 {
        return Err("The password does not open any safe".into());
    }

    let mut changed = 0;
    for safe in repository.safes.iter_mut().filter(|safe| keys.is_open(safe.id)) {
        keys.change_password(safe, new)?;
        changed += 1;
    }
    storage.save(&repository)?;
    println!("Changed the password of {changed} safes");
    Ok(())
}

/// Encrypts a note with the first safe `password` opens.
pub fn lock(storage: &FileRepositoryStorage, note: &str, password: &str) -> CommandResult {
    let mut repository = storage.load()?;
    let index = find_note_index(&repository, note)?;
    if repository.notes[index].is_locked() {
        return Err("The note is already locked".into());
    }

    let keys = key_store();
    let safe_id = repository
        .safes
        .iter()
        .find(|safe| keys.try_open(safe, password))
        .map(|safe| safe.id)
        .ok_or("The password does not open any safe")?;
    keys.lock_note(&mut repository.notes[index], safe_id)?;
    storage.save(&repository)?;
    println!("Locked note {note} with safe {safe_id}");
    Ok(())
}

/// Decrypts a locked note permanently.
pub fn unlock(storage: &FileRepositoryStorage, note: &str, password: &str) -> CommandResult {
    let mut repository = storage.load()?;
    let index = find_note_index(&repository, note)?;
    let Some(safe_id) = repository.notes[index].safe_id else {
        return Err("The note is not locked".into());
    };

    let keys = key_store();
    let opened = repository
        .find_safe(safe_id)
        .is_some_and(|safe| keys.try_open(safe, password));
    if !opened {
        return Err("The password does not open the safe of this note".into());
    }
    keys.unlock_note(&mut repository.notes[index])?;
    storage.save(&repository)?;
    println!("Unlocked note {note}");
    Ok(())
}

/// Removes every safe and erases the notes they protect.
pub fn reset(storage: &FileRepositoryStorage) -> CommandResult {
    let mut repository = storage.load()?;
    let erased = repository.reset_safes();
    storage.save(&repository)?;
    println!("Removed all safes, erased {erased} locked notes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn first_note(storage: &FileRepositoryStorage) -> String {
        storage.load().unwrap().notes[0].id.to_string()
    }

    #[test]
    fn lock_and_unlock_note() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(dir.path(), StorageProfile::Development);
        create(&storage, "secret").unwrap();
        let note = first_note(&storage);
        let plain = storage.load().unwrap().notes[0].body.clone();

        assert!(lock(&storage, &note, "wrong").is_err());
        lock(&storage, &note, "secret").unwrap();
        let locked = storage.load().unwrap().notes[0].clone();
        assert!(locked.is_locked());
        assert_ne!(locked.body, plain);

        assert!(unlock(&storage, &note, "wrong").is_err());
        unlock(&storage, &note, "secret").unwrap();
        let unlocked = storage.load().unwrap().notes[0].clone();
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.body, plain);
    }

    #[test]
    fn changed_password_opens_safe() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(dir.path(), StorageProfile::Development);
        create(&storage, "old").unwrap();
        let note = first_note(&storage);
        lock(&storage, &note, "old").unwrap();

        change_password(&storage, "old", "new").unwrap();
        assert!(change_password(&storage, "old", "other").is_err());
        unlock(&storage, &note, "new").unwrap();
    }

    #[test]
    fn reset_erases_locked_notes() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(dir.path(), StorageProfile::Development);
        create(&storage, "secret").unwrap();
        let note = first_note(&storage);
        lock(&storage, &note, "secret").unwrap();

        reset(&storage).unwrap();

        let repository = storage.load().unwrap();
        assert!(repository.safes.is_empty());
        assert_eq!(repository.notes.len(), 1);
        assert!(repository.contains_tombstone(Uuid::parse_str(&note).unwrap()));
    }

    #[test]
    fn unknown_note_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = open_storage(dir.path(), StorageProfile::Development);
        create(&storage, "secret").unwrap();
        assert!(lock(&storage, &Uuid::new_v4().to_string(), "secret").is_err());
        assert!(lock(&storage, "not-a-uuid", "secret").is_err());
    }
}
