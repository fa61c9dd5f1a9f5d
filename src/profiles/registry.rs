//! Streaming parser for `profiles.ini` registry files.
//!
//! The file is read one line at a time. A descriptor is only yielded once the
//! next section header (or end of file) has been seen, so every `key=value`
//! line of a section has been applied before the caller gets it.
//!
//! ```text
//! [General]
//! StartWithLastProfile=1
//!
//! [Profile0]
//! Name=default
//! IsRelative=1
//! Path=Profiles/abc.default
//! Default=1
//! ```

use crate::base::error::{Result, SignonError};
use crate::base::lines::LossyLines;
use crate::profiles::descriptor::ProfileDescriptor;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Open a registry file and return a lazy sequence of its profiles.
///
/// Fails with [`SignonError::NotFound`] if the file does not exist. An I/O
/// error during the scan is yielded as the last item, after the profile that
/// was open when it happened.
pub fn parse_registry(path: impl AsRef<Path>) -> Result<RegistryProfiles<BufReader<File>>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SignonError::io(path, &e))?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(RegistryProfiles::new(BufReader::new(file), dir, path))
}

/// Parse registry text held in memory.
pub fn parse_registry_str(
    text: &str,
    registry_dir: impl Into<PathBuf>,
) -> RegistryProfiles<&[u8]> {
    let dir = registry_dir.into();
    let source = dir.join(crate::base::config::PROFILES_INI);
    RegistryProfiles::new(text.as_bytes(), dir, source)
}

/// Iterator over the `[Profile*]` sections of one registry file.
#[derive(Debug)]
pub struct RegistryProfiles<R> {
    lines: LossyLines<R>,
    registry_dir: PathBuf,
    source: PathBuf,
    current: Option<ProfileDescriptor>,
    error: Option<SignonError>,
    done: bool,
}

enum Line<'a> {
    ProfileHeader(&'a str),
    OtherSection,
    Entry(&'a str),
}

impl<R: BufRead> RegistryProfiles<R> {
    fn new(reader: R, registry_dir: PathBuf, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: LossyLines::new(reader),
            registry_dir,
            source: source.into(),
            current: None,
            error: None,
            done: false,
        }
    }

    fn classify(line: &str) -> Line<'_> {
        let trimmed = line.trim();
        if starts_with_ignore_case(trimmed, "[profile") {
            let code = trimmed.trim_start_matches('[').trim_end_matches(']');
            Line::ProfileHeader(code)
        } else if trimmed.starts_with('[') {
            Line::OtherSection
        } else {
            Line::Entry(line)
        }
    }

    /// Apply a `key=value` line to the open descriptor.
    fn apply(profile: &mut ProfileDescriptor, line: &str) {
        let line = line.trim_end_matches('\r');
        if let Some(value) = strip_prefix_ignore_case(line, "name=") {
            profile.name = value.to_string();
        } else if let Some(value) = strip_prefix_ignore_case(line, "path=") {
            profile.path = value.to_string();
        } else if line.eq_ignore_ascii_case("default=1") {
            profile.is_default = true;
        } else if line.eq_ignore_ascii_case("isrelative=0") {
            profile.is_relative = false;
        }
    }
}

impl<R: BufRead> Iterator for RegistryProfiles<R> {
    type Item = Result<ProfileDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    let e = SignonError::io(&self.source, &e);
                    return match self.current.take() {
                        Some(profile) => {
                            self.error = Some(e);
                            Some(Ok(profile))
                        }
                        None => Some(Err(e)),
                    };
                }
                None => {
                    self.done = true;
                    return self.current.take().map(Ok);
                }
            };

            match Self::classify(&line) {
                Line::ProfileHeader(code) => {
                    let next = ProfileDescriptor::new(code, self.registry_dir.clone());
                    if let Some(previous) = self.current.replace(next) {
                        return Some(Ok(previous));
                    }
                }
                Line::OtherSection => {
                    if let Some(previous) = self.current.take() {
                        return Some(Ok(previous));
                    }
                }
                Line::Entry(entry) => {
                    if let Some(profile) = self.current.as_mut() {
                        Self::apply(profile, entry);
                    }
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for RegistryProfiles<R> {}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if starts_with_ignore_case(text, prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}
