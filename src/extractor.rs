//! One-call extraction: find the profile, open its store, read every record.

use crate::base::config::{ExtractorConfig, PROFILES_INI};
use crate::base::error::{Result, SignonError};
use crate::crypto::SharedDecryptor;
use crate::profiles::{ProfileDescriptor, ProfileLocator};
use crate::signons::record::ExtractionReport;
use crate::signons::store::{SignonStore, SignonStoreReader, StoreFormat};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Everything read from one profile.
#[derive(Debug)]
pub struct Extraction {
    pub profile_dir: PathBuf,
    pub format: StoreFormat,
    /// Empty unless the store is in the legacy format.
    pub excluded_hosts: BTreeSet<String>,
    pub report: ExtractionReport,
}

/// Locates a profile and reads its saved logins.
///
/// ```rust,no_run
/// use foxsignons::base::config::ExtractorConfig;
/// use foxsignons::crypto::Base64Decryptor;
/// use foxsignons::extractor::SignonExtractor;
/// use std::sync::Arc;
///
/// let extractor = SignonExtractor::new(ExtractorConfig::default(), Arc::new(Base64Decryptor));
/// let extraction = extractor.extract()?;
/// for site in extraction.report.sites() {
///     println!("{}: {} logins", site.hostname, site.signons.len());
/// }
/// # Ok::<(), foxsignons::base::error::SignonError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SignonExtractor {
    config: ExtractorConfig,
    locator: ProfileLocator,
    reader: SignonStoreReader,
}

impl SignonExtractor {
    pub fn new(config: ExtractorConfig, decryptor: SharedDecryptor) -> Self {
        let locator = ProfileLocator::new(config.locator.clone());
        let reader = SignonStoreReader::new(decryptor).table_page_size(config.table_page_size);
        Self {
            config,
            locator,
            reader,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn locator(&self) -> &ProfileLocator {
        &self.locator
    }

    /// Registry entry of the profile that would be read, if there is one.
    pub fn profile(&self) -> Option<ProfileDescriptor> {
        match &self.config.profile_dir {
            Some(dir) => ProfileLocator::describe_profile_dir(dir),
            None => self.locator.find_primary_profile(),
        }
    }

    /// Directory to read: the configured one, else the primary profile's.
    pub fn profile_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.config.profile_dir {
            return Ok(dir.clone());
        }
        match self.locator.find_primary_profile() {
            Some(profile) => Ok(profile.absolute_path()),
            None => {
                tracing::info!("no profile found in any registry file");
                Err(SignonError::not_found(PROFILES_INI))
            }
        }
    }

    /// Open the store of the selected profile without reading it.
    pub fn open(&self) -> Result<SignonStore> {
        let dir = self.profile_dir()?;
        self.reader.read(dir)
    }

    /// Read every record of the selected profile.
    pub fn extract(&self) -> Result<Extraction> {
        let profile_dir = self.profile_dir()?;
        let store = self.reader.read(&profile_dir)?;
        let format = store.format();
        let excluded_hosts = store.excluded_hosts().cloned().unwrap_or_default();
        let report = store.collect_report()?;

        if report.has_failures() {
            tracing::warn!(
                profile = %profile_dir.display(),
                failures = report.failures.len(),
                "some signons could not be read"
            );
        }

        Ok(Extraction {
            profile_dir,
            format,
            excluded_hosts,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::config::LocatorConfig;
    use crate::crypto::IdentityDecryptor;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn extractor(config: ExtractorConfig) -> SignonExtractor {
        SignonExtractor::new(config, Arc::new(IdentityDecryptor))
    }

    #[test]
    fn test_no_profile_is_not_found() {
        let config = ExtractorConfig::new().locator(LocatorConfig::empty());
        let err = extractor(config).extract().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_explicit_profile_dir_skips_discovery() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("signons2.txt"),
            "#2d\nnope.example\n.\nh\nu\nU\np\nP\nd\n.\n",
        )
        .unwrap();

        let config = ExtractorConfig::new()
            .locator(LocatorConfig::empty())
            .profile_dir(dir.path());
        let extraction = extractor(config).extract().unwrap();
        assert_eq!(extraction.profile_dir, dir.path());
        assert_eq!(extraction.format, StoreFormat::Legacy(crate::base::config::LegacyVersion::V2));
        assert!(extraction.excluded_hosts.contains("nope.example"));
        assert_eq!(extraction.report.records.len(), 1);
    }

    #[test]
    fn test_profile_found_through_registry() {
        let root = tempdir().unwrap();
        let install = root.path().join("Firefox");
        let profile = install.join("Profiles").join("abc.default");
        fs::create_dir_all(&profile).unwrap();
        fs::write(
            install.join("profiles.ini"),
            "[Profile0]\nName=default\nIsRelative=1\nPath=Profiles/abc.default\nDefault=1\n",
        )
        .unwrap();
        fs::write(profile.join("logins.json"), r#"{"logins": []}"#).unwrap();

        let config = ExtractorConfig::new().locator(
            LocatorConfig::empty()
                .with_root(root.path())
                .with_subpath("Firefox/profiles.ini"),
        );
        let extractor = extractor(config);
        assert_eq!(extractor.profile().unwrap().name, "default");

        let extraction = extractor.extract().unwrap();
        assert_eq!(extraction.format, StoreFormat::Document);
        assert!(extraction.report.records.is_empty());
        assert!(extraction.excluded_hosts.is_empty());
    }
}
