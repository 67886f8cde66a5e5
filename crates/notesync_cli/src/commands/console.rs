//! Terminal implementation of the synchronization dialogs.

use notesync_sync_engine::{
    CloudCredentials, Interaction, MergeChoice, TransferCode, FOLDER_PROVIDER,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Answers synchronization dialogs on stdin/stdout.
#[derive(Debug, Default)]
pub struct ConsoleInteraction {
    cloud_dir: Option<PathBuf>,
}

impl ConsoleInteraction {
    /// Creates an interaction offering `cloud_dir` when a cloud storage
    /// must be chosen.
    pub fn new(cloud_dir: Option<PathBuf>) -> Self {
        Self { cloud_dir }
    }
}

fn prompt(question: &str) -> Option<String> {
    print!("{question} ");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line).ok()?;
    if read == 0 {
        return None;
    }
    let answer = line.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

fn parse_merge_choice(answer: &str) -> Option<MergeChoice> {
    match answer.to_ascii_lowercase().as_str() {
        "l" | "local" => Some(MergeChoice::KeepLocal),
        "c" | "cloud" => Some(MergeChoice::KeepCloud),
        "m" | "merge" => Some(MergeChoice::Merge),
        _ => None,
    }
}

impl Interaction for ConsoleInteraction {
    fn show_toast(&self, message: &str) {
        println!("{message}");
    }

    fn show_message(&self, message: &str) {
        eprintln!("{message}");
    }

    fn choose_cloud_storage(&self, providers: &[String]) -> Option<CloudCredentials> {
        if !providers.iter().any(|provider| provider == FOLDER_PROVIDER) {
            return None;
        }
        match &self.cloud_dir {
            Some(dir) => Some(CloudCredentials::folder(dir)),
            None => prompt("Cloud folder (empty to cancel):").map(CloudCredentials::folder),
        }
    }

    fn open_authorization(&self, credentials: &CloudCredentials) {
        println!(
            "Authorize access to {} and run the synchronization again.",
            credentials.location
        );
    }

    fn ask_transfer_code(&self, previous_rejected: bool) -> Option<String> {
        if previous_rejected {
            eprintln!("The transfer code does not open the cloud repository.");
        }
        prompt("Transfer code (empty to cancel):")
    }

    fn show_transfer_code(&self, code: &TransferCode) {
        println!("New transfer code: {code}");
        println!("Write it down, other devices need it to read the cloud repository.");
    }

    fn choose_merge(&self) -> Option<MergeChoice> {
        println!("The cloud holds a different repository.");
        let answer = prompt("Keep [l]ocal, keep [c]loud or [m]erge both (empty to cancel):")?;
        parse_merge_choice(&answer)
    }
}
