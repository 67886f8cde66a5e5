//! Inspect command implementation.

use notesync_core::{
    FileRepositoryStorage, LoadOutcome, Repository, RepositoryStorage, StorageProfile,
};
use serde::Serialize;
use std::path::Path;

/// Repository inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Repository file path.
    pub path: String,
    /// Repository file size in bytes.
    pub file_size: u64,
    /// How the repository was loaded.
    pub load_outcome: String,
    /// Repository id.
    pub id: String,
    /// Document revision.
    pub revision: u32,
    /// Change fingerprint.
    pub fingerprint: i64,
    /// Number of live notes.
    pub note_count: usize,
    /// Notes in the recycle bin.
    pub recycled_count: usize,
    /// Notes encrypted by a safe.
    pub locked_count: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Number of safes.
    pub safe_count: usize,
    /// Distinct tags, in order of first use.
    pub tags: Vec<String>,
}

impl InspectResult {
    fn new(path: &Path, file_size: u64, outcome: LoadOutcome, repository: &Repository) -> Self {
        let mut tags: Vec<String> = Vec::new();
        for tag in repository.notes.iter().flat_map(|note| note.tags()) {
            if !tags.iter().any(|known| known.eq_ignore_ascii_case(tag)) {
                tags.push(tag.clone());
            }
        }

        Self {
            path: path.display().to_string(),
            file_size,
            load_outcome: format!("{outcome:?}"),
            id: repository.id.to_string(),
            revision: repository.revision,
            fingerprint: repository.fingerprint(),
            note_count: repository.notes.len(),
            recycled_count: repository.notes.iter().filter(|n| n.in_recycle_bin).count(),
            locked_count: repository.notes.iter().filter(|n| n.is_locked()).count(),
            tombstone_count: repository.deleted_notes.len(),
            safe_count: repository.safes.len(),
            tags,
        }
    }
}

/// Runs the inspect command.
pub fn run(
    data_dir: &Path,
    profile: StorageProfile,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = FileRepositoryStorage::new(data_dir, profile);
    let path = storage.path();

    if !path.exists() {
        return Err(format!("No repository found at {:?}", path).into());
    }

    let (repository, outcome) = storage.reload()?;
    let file_size = std::fs::metadata(&path)?.len();
    let result = InspectResult::new(&path, file_size, outcome, &repository);

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("NoteSync Repository Inspection");
    println!("==============================");
    println!();
    println!("Path:        {}", result.path);
    println!("Size:        {}", format_size(result.file_size));
    println!("Loaded:      {}", result.load_outcome);
    println!();
    println!("Repository:");
    println!("  Id:          {}", result.id);
    println!("  Revision:    {}", result.revision);
    println!("  Fingerprint: {}", result.fingerprint);
    println!();
    println!("Notes:");
    println!("  Live notes:  {}", result.note_count);
    println!("  Recycled:    {}", result.recycled_count);
    println!("  Locked:      {}", result.locked_count);
    println!("  Tombstones:  {}", result.tombstone_count);
    println!("  Safes:       {}", result.safe_count);

    if !result.tags.is_empty() {
        println!();
        println!("Tags: {}", result.tags.join(", "));
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
