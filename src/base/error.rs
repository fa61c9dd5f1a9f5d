//! Error types for profile discovery and signon extraction.
//!
//! Errors fall into two classes. Record-level errors ([`SignonError::InvalidRecord`],
//! [`SignonError::Decrypt`]) invalidate a single credential and the sequence
//! producing it keeps going. Everything else is fatal for the parse attempt:
//! the sequence yields it once and then stops.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by a [`Decryptor`](crate::crypto::Decryptor).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecryptError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),
    #[error("Decrypted value is not valid UTF-8")]
    InvalidUtf8,
    #[error("Decryption failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SignonError {
    /// A registry file, store file or profile is missing.
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// None of the known signon files exist in the profile directory.
    #[error("No signon store found in {}", profile.display())]
    NoStoreFound { profile: PathBuf },

    /// The table-format database is missing.
    #[error("Signon database not found: {}", path.display())]
    StoreNotFound { path: PathBuf },

    /// Structural problem that makes the whole file unusable.
    #[error("Invalid signon file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// Legacy grammar violated part-way through the file.
    #[error("Corrupt signon file {} at line {line}: {reason}", path.display())]
    CorruptFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// One login entry could not be converted.
    #[error("Invalid signon record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("Signon database is locked")]
    DatabaseLocked,

    #[error("Signon database error: {message}")]
    Database { message: String },

    #[error("I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl SignonError {
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        SignonError::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        SignonError::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, line: usize, reason: impl Into<String>) -> Self {
        SignonError::CorruptFile {
            path: path.as_ref().to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    pub fn invalid_record(index: usize, reason: impl Into<String>) -> Self {
        SignonError::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(path);
        }
        SignonError::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Whether this error ends the sequence that produced it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SignonError::InvalidRecord { .. } | SignonError::Decrypt(_)
        )
    }

    /// Whether this is a discovery-level absence that callers may recover from
    /// by trying the next path or format.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SignonError::NotFound { .. }
                | SignonError::NoStoreFound { .. }
                | SignonError::StoreNotFound { .. }
        )
    }
}

impl From<rusqlite::Error> for SignonError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ffi::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ffi::ErrorCode::DatabaseLocked =>
            {
                SignonError::DatabaseLocked
            }
            _ => SignonError::Database {
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SignonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_level_errors_are_not_fatal() {
        assert!(!SignonError::invalid_record(3, "missing hostname").is_fatal());
        assert!(!SignonError::Decrypt(DecryptError::InvalidUtf8).is_fatal());
        assert!(SignonError::corrupt("signons3.txt", 4, "sentinel").is_fatal());
        assert!(SignonError::format("signons3.txt", "empty").is_fatal());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(SignonError::not_found("profiles.ini").is_not_found());
        assert!(SignonError::NoStoreFound {
            profile: PathBuf::from("/tmp/p")
        }
        .is_not_found());
        assert!(!SignonError::DatabaseLocked.is_not_found());
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            SignonError::io("logins.json", &err),
            SignonError::NotFound { .. }
        ));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            SignonError::io("logins.json", &err),
            SignonError::Io { .. }
        ));
    }

    #[test]
    fn test_sqlite_busy_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(SignonError::from(err), SignonError::DatabaseLocked);
    }

    #[test]
    fn test_display_includes_line() {
        let err = SignonError::corrupt("signons3.txt", 7, "sentinel where hostname expected");
        let text = err.to_string();
        assert!(text.contains("line 7"));
        assert!(text.contains("signons3.txt"));
    }
}
