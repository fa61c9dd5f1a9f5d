//! Store format detection and dispatch.
//!
//! A profile holds at most one signon store. The format is chosen by which
//! file exists, in a fixed order:
//!
//! 1. `logins.json`
//! 2. `signons.sqlite`
//! 3. `signons3.txt`, `signons2.txt`, `signons.txt`
//!
//! File contents are never sniffed.

use crate::base::config::{
    clamp_table_page_size, LegacyVersion, DEFAULT_TABLE_PAGE_SIZE, LOGINS_JSON, SIGNONS_SQLITE,
};
use crate::base::error::{Result, SignonError};
use crate::crypto::SharedDecryptor;
use crate::signons::document::{DocumentFormatParser, DocumentSignons};
use crate::signons::legacy::{LegacyFormatParser, LegacySignons};
use crate::signons::record::{ExtractionReport, SignonRecord};
use crate::signons::table::{TableFormatParser, TableSignons};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Physical format of a signon store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFormat {
    Document,
    Table,
    Legacy(LegacyVersion),
}

impl StoreFormat {
    /// Every format in probe order.
    pub const PROBE_ORDER: [StoreFormat; 5] = [
        StoreFormat::Document,
        StoreFormat::Table,
        StoreFormat::Legacy(LegacyVersion::V3),
        StoreFormat::Legacy(LegacyVersion::V2),
        StoreFormat::Legacy(LegacyVersion::V1),
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            StoreFormat::Document => LOGINS_JSON,
            StoreFormat::Table => SIGNONS_SQLITE,
            StoreFormat::Legacy(version) => version.file_name(),
        }
    }

    /// First format whose file exists in `profile_dir`.
    pub fn detect(profile_dir: &Path) -> Option<(StoreFormat, PathBuf)> {
        Self::PROBE_ORDER.into_iter().find_map(|format| {
            let path = profile_dir.join(format.file_name());
            if path.is_file() {
                Some((format, path))
            } else {
                tracing::debug!(path = %path.display(), "signon file does not exist");
                None
            }
        })
    }
}

impl fmt::Display for StoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFormat::Document => f.write_str("document"),
            StoreFormat::Table => f.write_str("table"),
            StoreFormat::Legacy(version) => write!(f, "legacy v{}", version.number()),
        }
    }
}

/// Reads whichever store a profile directory holds.
#[derive(Clone)]
pub struct SignonStoreReader {
    decryptor: SharedDecryptor,
    table_page_size: usize,
}

impl SignonStoreReader {
    pub fn new(decryptor: SharedDecryptor) -> Self {
        Self {
            decryptor,
            table_page_size: DEFAULT_TABLE_PAGE_SIZE,
        }
    }

    /// Rows per `signons.sqlite` page, clamped like
    /// [`TableFormatParser::page_size`].
    pub fn table_page_size(mut self, size: usize) -> Self {
        self.table_page_size = clamp_table_page_size(size);
        self
    }

    /// Open the store in `profile_dir`.
    ///
    /// Fails with [`SignonError::NoStoreFound`] when none of the known files
    /// exist. Errors opening the chosen file are returned as is; there is no
    /// fallback to an older format once a file has been picked.
    pub fn read(&self, profile_dir: impl AsRef<Path>) -> Result<SignonStore> {
        let profile_dir = profile_dir.as_ref();
        let Some((format, path)) = StoreFormat::detect(profile_dir) else {
            tracing::info!(profile = %profile_dir.display(), "no signon store in profile");
            return Err(SignonError::NoStoreFound {
                profile: profile_dir.to_path_buf(),
            });
        };

        tracing::info!(path = %path.display(), format = %format, "reading signon store");
        self.open(format, &path)
    }

    /// Open `path` as `format`, bypassing detection.
    pub fn open(&self, format: StoreFormat, path: &Path) -> Result<SignonStore> {
        let store = match format {
            StoreFormat::Document => SignonStore::Document(
                DocumentFormatParser::new(self.decryptor.clone()).parse(path)?,
            ),
            StoreFormat::Table => SignonStore::Table(
                TableFormatParser::new(self.decryptor.clone())
                    .page_size(self.table_page_size)
                    .parse(path)?,
            ),
            StoreFormat::Legacy(version) => SignonStore::Legacy(
                LegacyFormatParser::new(self.decryptor.clone()).parse_as(path, version)?,
            ),
        };
        Ok(store)
    }
}

impl fmt::Debug for SignonStoreReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignonStoreReader")
            .field("table_page_size", &self.table_page_size)
            .finish_non_exhaustive()
    }
}

/// An open store of one of the three formats.
///
/// Iterating yields records in the order the underlying file holds them.
#[derive(Debug)]
pub enum SignonStore {
    Document(DocumentSignons<BufReader<File>>),
    Table(TableSignons),
    Legacy(LegacySignons<BufReader<File>>),
}

impl SignonStore {
    pub fn format(&self) -> StoreFormat {
        match self {
            SignonStore::Document(_) => StoreFormat::Document,
            SignonStore::Table(_) => StoreFormat::Table,
            SignonStore::Legacy(signons) => StoreFormat::Legacy(signons.version()),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SignonStore::Document(signons) => signons.path(),
            SignonStore::Table(signons) => signons.path(),
            SignonStore::Legacy(signons) => signons.path(),
        }
    }

    /// Hosts excluded from saving. Only the legacy format records them.
    pub fn excluded_hosts(&self) -> Option<&BTreeSet<String>> {
        match self {
            SignonStore::Legacy(signons) => Some(signons.excluded_hosts()),
            _ => None,
        }
    }

    /// Drain the store, keeping record-level failures beside the records.
    ///
    /// Returns the first fatal error instead of a report.
    pub fn collect_report(self) -> Result<ExtractionReport> {
        let path = self.path().to_path_buf();
        let mut report = ExtractionReport::default();
        for item in self {
            match item {
                Ok(record) => report.records.push(record),
                Err(e) if !e.is_fatal() => report.failures.push(e),
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            path = %path.display(),
            records = report.records.len(),
            failures = report.failures.len(),
            "signon store read"
        );
        Ok(report)
    }
}

impl Iterator for SignonStore {
    type Item = Result<SignonRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SignonStore::Document(signons) => signons.next(),
            SignonStore::Table(signons) => signons.next(),
            SignonStore::Legacy(signons) => signons.next(),
        }
    }
}

impl std::iter::FusedIterator for SignonStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IdentityDecryptor;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    const LEGACY: &str = "#2e\n.\nsite.example\nuser\nalice\npass\nsecret\nsite.example\n.\n";

    fn reader() -> SignonStoreReader {
        SignonStoreReader::new(Arc::new(IdentityDecryptor))
    }

    #[test]
    fn test_empty_directory_is_no_store_found() {
        let dir = tempdir().unwrap();
        let err = reader().read(dir.path()).unwrap_err();
        assert!(matches!(err, SignonError::NoStoreFound { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_document_preferred_over_everything() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("logins.json"), r#"{"logins": []}"#).unwrap();
        fs::write(dir.path().join("signons3.txt"), LEGACY).unwrap();
        // Not a database; must not even be opened.
        fs::write(dir.path().join("signons.sqlite"), "garbage").unwrap();

        let store = reader().read(dir.path()).unwrap();
        assert_eq!(store.format(), StoreFormat::Document);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_newest_legacy_version_wins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("signons.txt"), "#2c\n.\nold.example\n.\n").unwrap();
        fs::write(dir.path().join("signons2.txt"), LEGACY.replace("#2e", "#2d")).unwrap();

        let store = reader().read(dir.path()).unwrap();
        assert_eq!(store.format(), StoreFormat::Legacy(LegacyVersion::V2));
        assert_eq!(store.format().to_string(), "legacy v2");
        let report = store.collect_report().unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].hostname, "site.example");
    }

    #[test]
    fn test_legacy_header_checked_against_file_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("signons3.txt"), LEGACY.replace("#2e", "#2c")).unwrap();
        let err = reader().read(dir.path()).unwrap_err();
        assert!(matches!(err, SignonError::Format { .. }));
    }

    #[test]
    fn test_directory_named_like_store_is_ignored() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("logins.json")).unwrap();
        fs::write(dir.path().join("signons3.txt"), LEGACY).unwrap();
        let store = reader().read(dir.path()).unwrap();
        assert_eq!(store.format(), StoreFormat::Legacy(LegacyVersion::V3));
    }

    #[test]
    fn test_report_keeps_record_failures() {
        let dir = tempdir().unwrap();
        let json = r#"{"logins": [
            {"hostname": "a", "usernameField": "", "passwordField": "",
             "encryptedUsername": "~!!", "encryptedPassword": ""},
            {"hostname": "b", "usernameField": "", "passwordField": "",
             "encryptedUsername": "bob", "encryptedPassword": "pw"}
        ]}"#;
        fs::write(dir.path().join("logins.json"), json).unwrap();

        let report = reader().read(dir.path()).unwrap().collect_report().unwrap();
        assert!(report.has_failures());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].hostname, "b");
    }

    #[test]
    fn test_report_fails_on_fatal_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("signons3.txt"), "#2e\n.\nh\n.\n.\n").unwrap();
        let err = reader().read(dir.path()).unwrap().collect_report().unwrap_err();
        assert!(matches!(err, SignonError::CorruptFile { .. }));
    }

    #[test]
    fn test_excluded_hosts_only_for_legacy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("signons3.txt"), "#2e\nno.example\n.\n").unwrap();
        let store = reader().read(dir.path()).unwrap();
        assert!(store.excluded_hosts().unwrap().contains("no.example"));

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("logins.json"), "{}").unwrap();
        assert!(reader().read(dir.path()).unwrap().excluded_hosts().is_none());
    }
}
