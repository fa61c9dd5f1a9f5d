//! The unified signon record every store format is normalized into.

use crate::base::error::SignonError;
use time::OffsetDateTime;
use zeroize::Zeroizing;

/// One saved credential, with cleartext username and password.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignonRecord {
    /// Site the credential belongs to, e.g. `https://example.com`.
    pub hostname: String,
    /// Realm for HTTP-authenticated logins.
    pub http_realm: Option<String>,
    /// Origin the login form submits to.
    pub form_submit_url: Option<String>,
    /// Name of the HTML username field, blank for HTTP authentication.
    pub username_field: String,
    /// Name of the HTML password field, blank for HTTP authentication.
    pub password_field: String,
    pub username: String,
    /// Zeroized on drop.
    pub password: Zeroizing<String>,
    pub time_created: Option<OffsetDateTime>,
    pub time_last_used: Option<OffsetDateTime>,
    pub time_password_changed: Option<OffsetDateTime>,
    pub times_used: u64,
}

impl SignonRecord {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Whether this is an HTTP-auth login rather than a form login.
    pub fn is_http_auth(&self) -> bool {
        self.http_realm.as_deref().is_some_and(|r| !r.is_empty())
    }
}

/// Records sharing a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignonSite {
    pub hostname: String,
    pub signons: Vec<SignonRecord>,
}

impl SignonSite {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            signons: Vec::new(),
        }
    }
}

/// Group records by hostname, keeping first-seen order of hostnames and the
/// original order within each group.
pub fn group_by_site<I>(records: I) -> Vec<SignonSite>
where
    I: IntoIterator<Item = SignonRecord>,
{
    let mut sites: Vec<SignonSite> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for record in records {
        let slot = *index.entry(record.hostname.clone()).or_insert_with(|| {
            sites.push(SignonSite::new(record.hostname.clone()));
            sites.len() - 1
        });
        sites[slot].signons.push(record);
    }

    sites
}

/// Records plus the record-level failures met while reading them.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub records: Vec<SignonRecord>,
    pub failures: Vec<SignonError>,
}

impl ExtractionReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn sites(&self) -> Vec<SignonSite> {
        group_by_site(self.records.iter().cloned())
    }
}

/// Convert milliseconds since the Unix epoch to a UTC instant.
///
/// Returns `None` for values outside the representable range.
pub fn unix_millis_to_utc(millis: u64) -> Option<OffsetDateTime> {
    let nanos = i128::from(millis).checked_mul(1_000_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Same as [`unix_millis_to_utc`] for an optional source value. Absence maps
/// to `None`, never to the epoch.
pub fn optional_millis_to_utc(millis: Option<u64>) -> Option<OffsetDateTime> {
    millis.and_then(unix_millis_to_utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: &str, user: &str) -> SignonRecord {
        SignonRecord {
            username: user.into(),
            ..SignonRecord::new(host)
        }
    }

    #[test]
    fn test_millis_conversion() {
        let dt = unix_millis_to_utc(1_704_067_200_123).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.millisecond(), 123);
        assert_eq!(dt.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn test_zero_is_epoch_not_absent() {
        let dt = unix_millis_to_utc(0).unwrap();
        assert_eq!(dt, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_absent_is_none() {
        assert!(optional_millis_to_utc(None).is_none());
        assert!(optional_millis_to_utc(Some(1000)).is_some());
    }

    #[test]
    fn test_out_of_range_is_none() {
        assert!(unix_millis_to_utc(u64::MAX).is_none());
    }

    #[test]
    fn test_group_by_site_keeps_order() {
        let sites = group_by_site(vec![
            record("b.example", "1"),
            record("a.example", "2"),
            record("b.example", "3"),
        ]);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].hostname, "b.example");
        let users: Vec<_> = sites[0].signons.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(users, vec!["1", "3"]);
        assert_eq!(sites[1].signons.len(), 1);
    }

    #[test]
    fn test_http_auth_detection() {
        let mut r = SignonRecord::new("https://intranet");
        assert!(!r.is_http_auth());
        r.http_realm = Some(String::new());
        assert!(!r.is_http_auth());
        r.http_realm = Some("Staff".into());
        assert!(r.is_http_auth());
    }
}
