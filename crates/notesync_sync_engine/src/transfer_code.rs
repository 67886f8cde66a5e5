//! Transfer codes.
//!
//! A transfer code is the secret that encrypts the cloud copy of the
//! repository. It is generated on the first upload and must be entered on
//! every further device. The alphabet leaves out characters that are easily
//! confused (`0`/`o`, `1`/`l`/`i`).

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters a transfer code is made of.
pub const TRANSFER_CODE_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Number of characters of a transfer code.
pub const TRANSFER_CODE_LENGTH: usize = 16;

/// Characters per group when a code is displayed.
const GROUP_SIZE: usize = 4;

/// A validated transfer code in canonical (lowercase, ungrouped) form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferCode(String);

impl TransferCode {
    /// Generates a random code.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..TRANSFER_CODE_LENGTH)
            .map(|_| {
                let index = rng.gen_range(0..TRANSFER_CODE_ALPHABET.len());
                char::from(TRANSFER_CODE_ALPHABET[index])
            })
            .collect();
        Self(code)
    }

    /// Parses user input, accepting any case, spaces and dashes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransferCode` if the sanitized input is not a code.
    pub fn parse(input: &str) -> SyncResult<Self> {
        let code = sanitize(input);
        if is_valid(&code) {
            Ok(Self(code))
        } else {
            Err(SyncError::InvalidTransferCode)
        }
    }

    /// Returns the canonical code, used as key material.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the code as the user should see it: groups of four.
    pub fn display(&self) -> String {
        self.0
            .as_bytes()
            .chunks(GROUP_SIZE)
            .map(|group| String::from_utf8_lossy(group).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Removes whitespace and dashes and lowercases the input.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns true if a sanitized string is a well formed code.
pub fn is_valid(code: &str) -> bool {
    code.len() == TRANSFER_CODE_LENGTH
        && code.bytes().all(|b| TRANSFER_CODE_ALPHABET.contains(&b))
}

impl TryFrom<String> for TransferCode {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransferCode> for String {
    fn from(code: TransferCode) -> Self {
        code.0
    }
}

impl fmt::Display for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl fmt::Debug for TransferCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransferCode([REDACTED])")
    }
}
