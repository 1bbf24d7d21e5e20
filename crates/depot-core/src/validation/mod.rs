//! Validation modules

pub mod filename;

pub use filename::{sanitize_filename, FilenameError, FilenamePolicy, MAX_FILENAME_LENGTH};
