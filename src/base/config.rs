//! Extraction configuration and the fixed file-name tables.

use serde::Deserialize;
use std::path::PathBuf;

/// Document-format store.
pub const LOGINS_JSON: &str = "logins.json";

/// Table-format store.
pub const SIGNONS_SQLITE: &str = "signons.sqlite";

/// Registry file name.
pub const PROFILES_INI: &str = "profiles.ini";

/// Line that separates sections and site groups in the legacy format.
pub const LEGACY_SENTINEL: &str = ".";

/// Default number of rows fetched per page from the table-format store.
pub const DEFAULT_TABLE_PAGE_SIZE: usize = 64;

/// Upper bound on rows fetched per page from the table-format store.
pub const MAX_TABLE_PAGE_SIZE: usize = 4096;

/// Clamp a requested page size into `1..=MAX_TABLE_PAGE_SIZE`.
pub fn clamp_table_page_size(size: usize) -> usize {
    size.clamp(1, MAX_TABLE_PAGE_SIZE)
}

/// Legacy line-oriented sub-variants, newest last.
///
/// File name and header are paired by version; the file name selects the
/// variant and the header is then checked against the file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LegacyVersion {
    V1,
    V2,
    V3,
}

impl LegacyVersion {
    /// Probe order: newest first.
    pub const NEWEST_FIRST: [LegacyVersion; 3] =
        [LegacyVersion::V3, LegacyVersion::V2, LegacyVersion::V1];

    pub fn file_name(self) -> &'static str {
        match self {
            LegacyVersion::V1 => "signons.txt",
            LegacyVersion::V2 => "signons2.txt",
            LegacyVersion::V3 => "signons3.txt",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            LegacyVersion::V1 => "#2c",
            LegacyVersion::V2 => "#2d",
            LegacyVersion::V3 => "#2e",
        }
    }

    pub fn number(self) -> u8 {
        match self {
            LegacyVersion::V1 => 1,
            LegacyVersion::V2 => 2,
            LegacyVersion::V3 => 3,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::NEWEST_FIRST
            .into_iter()
            .find(|v| v.file_name() == name)
    }
}

/// Where to look for registry (`profiles.ini`) files.
///
/// Candidate paths are `roots × registry_subpaths`, roots in the outer loop.
/// Both lists keep their declared order because the first matching profile
/// wins when several installations exist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Application-data roots: per-user local, per-user roaming, machine-wide.
    pub roots: Vec<PathBuf>,
    /// Registry file locations relative to each root.
    pub registry_subpaths: Vec<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            registry_subpaths: default_subpaths(),
        }
    }
}

impl LocatorConfig {
    /// Create a config for the current platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with no roots and no subpaths.
    pub fn empty() -> Self {
        Self {
            roots: Vec::new(),
            registry_subpaths: Vec::new(),
        }
    }

    /// Replace the roots.
    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the subpaths.
    pub fn subpaths<I, P>(mut self, subpaths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.registry_subpaths = subpaths.into_iter().map(Into::into).collect();
        self
    }

    /// Append a root after the existing ones.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Append a subpath after the existing ones.
    pub fn with_subpath(mut self, subpath: impl Into<PathBuf>) -> Self {
        self.registry_subpaths.push(subpath.into());
        self
    }

    /// All candidate registry paths in probe order.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .flat_map(|root| self.registry_subpaths.iter().map(move |sub| root.join(sub)))
            .collect()
    }
}

#[cfg(target_os = "windows")]
fn default_roots() -> Vec<PathBuf> {
    ["LOCALAPPDATA", "APPDATA", "PROGRAMDATA"]
        .into_iter()
        .filter_map(|var| std::env::var_os(var).map(PathBuf::from))
        .collect()
}

#[cfg(target_os = "windows")]
fn default_subpaths() -> Vec<PathBuf> {
    [
        r"Mozilla\Firefox\profiles.ini",
        r"Thunderbird\profiles.ini",
        r"Mozilla\SeaMonkey\profiles.ini",
        r"Mozilla\profiles.ini",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(target_os = "macos")]
fn default_roots() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return vec![PathBuf::from("/Library/Application Support")];
    };
    vec![
        home.join("Library/Application Support"),
        home.join("Library/Mozilla"),
        PathBuf::from("/Library/Application Support"),
    ]
}

#[cfg(target_os = "macos")]
fn default_subpaths() -> Vec<PathBuf> {
    [
        "Firefox/profiles.ini",
        "Thunderbird/profiles.ini",
        "SeaMonkey/profiles.ini",
        "profiles.ini",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_roots() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return Vec::new();
    };
    vec![home.clone(), home.join(".local/share"), PathBuf::from("/etc")]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_subpaths() -> Vec<PathBuf> {
    [
        ".mozilla/firefox/profiles.ini",
        ".thunderbird/profiles.ini",
        ".mozilla/seamonkey/profiles.ini",
        ".mozilla/profiles.ini",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

/// Top-level settings for [`SignonExtractor`](crate::extractor::SignonExtractor).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub locator: LocatorConfig,
    /// Rows fetched per round trip from `signons.sqlite`.
    pub table_page_size: usize,
    /// Skip discovery and read this profile directory directly.
    pub profile_dir: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            locator: LocatorConfig::default(),
            table_page_size: DEFAULT_TABLE_PAGE_SIZE,
            profile_dir: None,
        }
    }
}

impl ExtractorConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from JSON. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Set the locator config.
    pub fn locator(mut self, locator: LocatorConfig) -> Self {
        self.locator = locator;
        self
    }

    /// Set the table page size, clamped to `1..=MAX_TABLE_PAGE_SIZE`.
    pub fn table_page_size(mut self, size: usize) -> Self {
        self.table_page_size = clamp_table_page_size(size);
        self
    }

    /// Read this profile directory instead of discovering one.
    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }
}
