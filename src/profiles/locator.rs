//! Finds the profile to import from.
//!
//! Candidate registry files are the cross product of the configured roots and
//! subpaths. Missing files are skipped and a file that fails part-way is
//! abandoned with a warning, so one corrupt registry does not hide profiles
//! listed in another.

use crate::base::config::{LocatorConfig, PROFILES_INI};
use crate::profiles::descriptor::ProfileDescriptor;
use crate::profiles::registry::{parse_registry, RegistryProfiles};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Discovers profiles listed in registry files.
#[derive(Debug, Clone, Default)]
pub struct ProfileLocator {
    config: LocatorConfig,
}

impl ProfileLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Candidate registry paths in probe order, existing or not.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.config.candidate_paths()
    }

    /// Every profile from every existing registry file, lazily.
    pub fn profiles(&self) -> AllProfiles {
        AllProfiles::new(self.candidate_paths())
    }

    /// The default profile if one has a path; otherwise the first profile
    /// with a path; otherwise `None`.
    pub fn find_primary_profile(&self) -> Option<ProfileDescriptor> {
        select_primary(self.profiles())
    }

    /// Registry entry for a profile directory that was given explicitly.
    ///
    /// Looks for a `profiles.ini` inside the directory itself. Returns `None`
    /// when there is none or it lists no profiles.
    pub fn describe_profile_dir(dir: impl AsRef<Path>) -> Option<ProfileDescriptor> {
        let registry = dir.as_ref().join(PROFILES_INI);
        if !registry.is_file() {
            return None;
        }
        AllProfiles::new(vec![registry]).next()
    }
}

/// Pick the primary profile from a sequence, stopping at the first default.
pub fn select_primary<I>(profiles: I) -> Option<ProfileDescriptor>
where
    I: IntoIterator<Item = ProfileDescriptor>,
{
    let mut fallback = None;

    for profile in profiles {
        if !profile.is_well_formed() {
            tracing::debug!(code = %profile.code, "skipping profile without a path");
            continue;
        }
        if profile.is_default {
            tracing::info!(profile = %profile, "using default profile");
            return Some(profile);
        }
        if fallback.is_none() {
            fallback = Some(profile);
        }
    }

    if let Some(profile) = &fallback {
        tracing::info!(profile = %profile, "no default profile, using first profile");
    }
    fallback
}

/// Flattened profiles across several registry files.
#[derive(Debug)]
pub struct AllProfiles {
    pending: std::vec::IntoIter<PathBuf>,
    current: Option<RegistryProfiles<BufReader<File>>>,
}

impl AllProfiles {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            pending: paths.into_iter(),
            current: None,
        }
    }

    fn open_next(&mut self) -> bool {
        for path in self.pending.by_ref() {
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "registry file does not exist");
                continue;
            }
            tracing::info!(path = %path.display(), "registry file found");
            match parse_registry(&path) {
                Ok(profiles) => {
                    self.current = Some(profiles);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable registry file"
                    );
                }
            }
        }
        false
    }
}

impl Iterator for AllProfiles {
    type Item = ProfileDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(Ok(profile)) => return Some(profile),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "abandoning registry file");
                        self.current = None;
                    }
                    None => self.current = None,
                }
            }
            if self.current.is_none() && !self.open_next() {
                return None;
            }
        }
    }
}
