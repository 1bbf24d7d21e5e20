//! Filename validation shared by every storage handler.
//!
//! Rules, applied in order:
//! - at most 255 characters (counted on the raw input)
//! - directory components are stripped, only the basename is kept
//! - `.`, `..` and empty basenames are rejected
//! - only letters, digits, `_`, `-`, `.` and (for [`FilenamePolicy::AllowSpaces`]) space

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

pub const MAX_FILENAME_LENGTH: usize = 255;

static ALLOW_SPACES_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-. ]+$").expect("valid filename regex"));

static STRICT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-.]+$").expect("valid filename regex"));

/// Character set accepted for stored names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenamePolicy {
    /// Letters, digits, `_`, `-`, `.` and space. Used by the local backend and the index.
    AllowSpaces,
    /// Same without space. Used where the name travels in remote headers.
    Strict,
}

impl FilenamePolicy {
    fn pattern(self) -> &'static Regex {
        match self {
            FilenamePolicy::AllowSpaces => &ALLOW_SPACES_PATTERN,
            FilenamePolicy::Strict => &STRICT_PATTERN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("Filename exceeds maximum length of {max} characters")]
    TooLong { max: usize },

    #[error("Filename is empty or not a file name")]
    Empty,

    #[error("Filename contains invalid characters")]
    InvalidCharacters,
}

impl From<FilenameError> for AppError {
    fn from(err: FilenameError) -> Self {
        AppError::Client(err.to_string())
    }
}

/// Reduce `raw` to a safe basename or reject it.
pub fn sanitize_filename(raw: &str, policy: FilenamePolicy) -> Result<String, FilenameError> {
    if raw.chars().count() > MAX_FILENAME_LENGTH {
        return Err(FilenameError::TooLong {
            max: MAX_FILENAME_LENGTH,
        });
    }

    // Both separators are stripped regardless of host platform.
    let basename = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    if basename.is_empty() || basename == "." || basename == ".." {
        return Err(FilenameError::Empty);
    }

    if !policy.pattern().is_match(basename) {
        return Err(FilenameError::InvalidCharacters);
    }

    Ok(basename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directory_components() {
        assert_eq!(
            sanitize_filename("../../etc/passwd", FilenamePolicy::AllowSpaces).unwrap(),
            "passwd"
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\notes.txt", FilenamePolicy::Strict).unwrap(),
            "notes.txt"
        );
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "a".repeat(256);
        assert_eq!(
            sanitize_filename(&name, FilenamePolicy::AllowSpaces),
            Err(FilenameError::TooLong { max: 255 })
        );
        let name = "a".repeat(255);
        assert!(sanitize_filename(&name, FilenamePolicy::AllowSpaces).is_ok());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert_eq!(
            sanitize_filename("a<b.txt", FilenamePolicy::AllowSpaces),
            Err(FilenameError::InvalidCharacters)
        );
        assert_eq!(
            sanitize_filename("résumé.pdf", FilenamePolicy::AllowSpaces),
            Err(FilenameError::InvalidCharacters)
        );
    }

    #[test]
    fn spaces_depend_on_policy() {
        assert_eq!(
            sanitize_filename("my report.pdf", FilenamePolicy::AllowSpaces).unwrap(),
            "my report.pdf"
        );
        assert_eq!(
            sanitize_filename("my report.pdf", FilenamePolicy::Strict),
            Err(FilenameError::InvalidCharacters)
        );
    }

    #[test]
    fn rejects_dot_names_and_trailing_separator() {
        for raw in ["", ".", "..", "dir/", "a/.."] {
            assert_eq!(
                sanitize_filename(raw, FilenamePolicy::AllowSpaces),
                Err(FilenameError::Empty),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn converts_to_client_error() {
        let err: AppError = FilenameError::InvalidCharacters.into();
        assert!(matches!(err, AppError::Client(_)));
    }
}
