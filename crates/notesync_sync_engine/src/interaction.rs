//! The user facing side of a synchronization.
//!
//! Every method has a no-op default, so a silent run simply uses
//! [`SilentInteraction`]. Which methods the step chain calls at all is
//! decided by the [`StoryMode`](crate::StoryMode).

use crate::cloud::CloudCredentials;
use crate::transfer_code::TransferCode;

/// Answer to the merge dialog shown for unrelated repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    /// Overwrite the cloud copy with the local repository.
    KeepLocal,
    /// Overwrite the local repository with the cloud copy.
    KeepCloud,
    /// Merge both repositories.
    Merge,
}

/// Callbacks into the UI.
pub trait Interaction: Send + Sync {
    /// Shows or hides a busy indicator.
    fn set_busy(&self, _busy: bool) {}

    /// Shows a short, self-dismissing notification.
    fn show_toast(&self, _message: &str) {}

    /// Shows a message the user has to acknowledge.
    fn show_message(&self, _message: &str) {}

    /// Lets the user pick a provider and enter credentials.
    ///
    /// `None` cancels the synchronization.
    fn choose_cloud_storage(&self, _providers: &[String]) -> Option<CloudCredentials> {
        None
    }

    /// Starts an external authorization, e.g. opens an OAuth page.
    ///
    /// The synchronization is parked and resumed when the redirect arrives.
    fn open_authorization(&self, _credentials: &CloudCredentials) {}

    /// Asks for the transfer code of the cloud copy.
    ///
    /// `previous_rejected` is true if the last entered code did not work.
    /// `None` cancels the synchronization.
    fn ask_transfer_code(&self, _previous_rejected: bool) -> Option<String> {
        None
    }

    /// Shows a newly generated transfer code the user must write down.
    fn show_transfer_code(&self, _code: &TransferCode) {}

    /// Asks how to combine two unrelated repositories.
    ///
    /// `None` cancels the synchronization.
    fn choose_merge(&self) -> Option<MergeChoice> {
        None
    }
}

/// Interaction that shows nothing and answers every dialog with "cancel".
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentInteraction;

impl Interaction for SilentInteraction {}
