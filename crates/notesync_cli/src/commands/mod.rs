//! CLI command implementations.

pub mod console;
pub mod init;
pub mod inspect;
pub mod safe;
pub mod sync;
pub mod transfer_code;
