//! Repository data model.

mod note;
mod repository;
mod safe;

pub use note::{DeletedNote, Note, NoteType};
pub use repository::Repository;
pub use safe::Safe;
