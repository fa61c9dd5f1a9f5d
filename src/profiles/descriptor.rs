//! One `[ProfileN]` section of a registry file.

use std::fmt;
use std::path::PathBuf;

/// Profile entry read from `profiles.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDescriptor {
    /// Section header without brackets, e.g. `Profile0`.
    pub code: String,
    pub name: String,
    /// `false` only when the section says `IsRelative=0`.
    pub is_relative: bool,
    /// `Path=` value as written.
    pub path: String,
    /// `Default=1`.
    pub is_default: bool,
    /// Directory containing the registry file this entry came from.
    pub registry_dir: PathBuf,
}

impl ProfileDescriptor {
    pub(crate) fn new(code: impl Into<String>, registry_dir: impl Into<PathBuf>) -> Self {
        Self {
            code: code.into(),
            name: String::new(),
            is_relative: true,
            path: String::new(),
            is_default: false,
            registry_dir: registry_dir.into(),
        }
    }

    /// A descriptor without a path cannot point at a profile.
    pub fn is_well_formed(&self) -> bool {
        !self.path.is_empty()
    }

    /// Profile directory on disk.
    pub fn absolute_path(&self) -> PathBuf {
        if self.is_relative {
            self.registry_dir.join(normalize_separators(&self.path))
        } else {
            PathBuf::from(normalize_separators(&self.path))
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.registry_dir.join(crate::base::config::PROFILES_INI)
    }
}

impl fmt::Display for ProfileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.absolute_path().display())?;
        if self.is_default {
            write!(f, " [default]")?;
        }
        Ok(())
    }
}

/// Registry files use `/` even on Windows.
fn normalize_separators(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let profile = ProfileDescriptor::new("Profile0", "/home/u/.mozilla/firefox");
        assert!(profile.is_relative);
        assert!(!profile.is_default);
        assert!(!profile.is_well_formed());
    }

    #[test]
    fn test_relative_path_joins_registry_dir() {
        let mut profile = ProfileDescriptor::new("Profile0", "/home/u/.mozilla/firefox");
        profile.path = "abc.default".into();
        assert_eq!(
            profile.absolute_path(),
            Path::new("/home/u/.mozilla/firefox").join("abc.default")
        );
    }

    #[test]
    fn test_absolute_path_ignores_registry_dir() {
        let mut profile = ProfileDescriptor::new("Profile1", "/home/u/.mozilla/firefox");
        profile.is_relative = false;
        profile.path = "/srv/profiles/work".into();
        assert_eq!(profile.absolute_path(), PathBuf::from("/srv/profiles/work"));
    }

    #[test]
    fn test_display() {
        let mut profile = ProfileDescriptor::new("Profile0", "/r");
        profile.name = "default".into();
        profile.path = "p".into();
        profile.is_default = true;
        let text = profile.to_string();
        assert!(text.starts_with("default ("));
        assert!(text.ends_with("[default]"));
    }
}
