//! `signons.sqlite` reader.
//!
//! One row of `moz_logins` becomes one record; there is no grouping. Rows come
//! back ordered by hostname. The iterator owns its read-only connection and
//! pulls rows a page at a time with keyset pagination on `(hostname, rowid)`,
//! so dropping it early leaves the remaining pages unread.
//!
//! Nullable text columns become empty strings rather than absent values.
//! `timeCreated`, `timeLastUsed` and `timePasswordChanged` are nullable
//! integers; `timesUsed` defaults to zero.

use crate::base::config::{clamp_table_page_size, DEFAULT_TABLE_PAGE_SIZE};
use crate::base::error::{Result, SignonError};
use crate::crypto::{decrypt_field, SharedDecryptor};
use crate::signons::record::{optional_millis_to_utc, SignonRecord};
use rusqlite::{Connection, OpenFlags, Row};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Table holding the logins.
pub const LOGINS_TABLE: &str = "moz_logins";

/// Columns that must exist for the table to be readable.
const REQUIRED_COLUMNS: &[&str] = &[
    "hostname",
    "usernameField",
    "passwordField",
    "encryptedUsername",
    "encryptedPassword",
];

/// Columns added by later schema versions; read as NULL when missing.
const OPTIONAL_COLUMNS: &[&str] = &[
    "httpRealm",
    "formSubmitURL",
    "timeCreated",
    "timeLastUsed",
    "timePasswordChanged",
    "timesUsed",
];

/// Parser for the table format.
#[derive(Clone)]
pub struct TableFormatParser {
    decryptor: SharedDecryptor,
    page_size: usize,
}

impl TableFormatParser {
    pub fn new(decryptor: SharedDecryptor) -> Self {
        Self {
            decryptor,
            page_size: DEFAULT_TABLE_PAGE_SIZE,
        }
    }

    /// Rows fetched per query, clamped to `1..=MAX_TABLE_PAGE_SIZE`.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = clamp_table_page_size(size);
        self
    }

    /// Open the database read-only and return a lazy sequence of its records.
    ///
    /// The existence check is explicit: a missing file is reported as
    /// [`SignonError::StoreNotFound`] instead of a driver error.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<TableSignons> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SignonError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let columns = table_columns(&conn)?;
        if columns.is_empty() {
            return Err(SignonError::format(path, format!("no {LOGINS_TABLE} table")));
        }
        if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| !columns.contains(**c)) {
            return Err(SignonError::format(
                path,
                format!("{LOGINS_TABLE} has no {missing} column"),
            ));
        }

        let (first_page_sql, next_page_sql) = build_queries(&columns);
        tracing::debug!(
            path = %path.display(),
            page_size = self.page_size,
            "opened signon database"
        );

        Ok(TableSignons {
            conn,
            path: path.to_path_buf(),
            first_page_sql,
            next_page_sql,
            decryptor: self.decryptor.clone(),
            page_size: self.page_size,
            page: VecDeque::new(),
            last_key: None,
            exhausted: false,
            done: false,
            index: 0,
        })
    }
}

impl std::fmt::Debug for TableFormatParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableFormatParser")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn table_columns(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({LOGINS_TABLE})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for name in names {
        columns.insert(name?);
    }
    Ok(columns)
}

/// Build the first-page and next-page statements for the columns present.
fn build_queries(columns: &HashSet<String>) -> (String, String) {
    let mut select = vec![
        "rowid AS row_key".to_string(),
        "COALESCE(hostname, '') AS host_key".to_string(),
    ];
    for column in REQUIRED_COLUMNS.iter().chain(OPTIONAL_COLUMNS) {
        if columns.contains(*column) {
            select.push((*column).to_string());
        } else {
            select.push(format!("NULL AS {column}"));
        }
    }
    let select = select.join(", ");

    let first = format!(
        "SELECT {select} FROM {LOGINS_TABLE} ORDER BY host_key, rowid LIMIT ?1"
    );
    let next = format!(
        "SELECT {select} FROM {LOGINS_TABLE} \
         WHERE (COALESCE(hostname, ''), rowid) > (?2, ?3) \
         ORDER BY host_key, rowid LIMIT ?1"
    );
    (first, next)
}

/// Raw row before decryption.
struct LoginRow {
    hostname: String,
    http_realm: String,
    form_submit_url: String,
    username_field: String,
    password_field: String,
    encrypted_username: String,
    encrypted_password: String,
    time_created: Option<u64>,
    time_last_used: Option<u64>,
    time_password_changed: Option<u64>,
    times_used: u64,
}

impl LoginRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hostname: text(row, "hostname")?,
            http_realm: text(row, "httpRealm")?,
            form_submit_url: text(row, "formSubmitURL")?,
            username_field: text(row, "usernameField")?,
            password_field: text(row, "passwordField")?,
            encrypted_username: text(row, "encryptedUsername")?,
            encrypted_password: text(row, "encryptedPassword")?,
            time_created: nullable_u64(row, "timeCreated")?,
            time_last_used: nullable_u64(row, "timeLastUsed")?,
            time_password_changed: nullable_u64(row, "timePasswordChanged")?,
            times_used: nullable_u64(row, "timesUsed")?.unwrap_or(0),
        })
    }
}

/// NULL reads as an empty string.
fn text(row: &Row<'_>, column: &str) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(column)?.unwrap_or_default())
}

/// NULL and negative values read as `None`.
fn nullable_u64(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<u64>> {
    Ok(row
        .get::<_, Option<i64>>(column)?
        .and_then(|v| u64::try_from(v).ok()))
}

/// Pagination key beside the row it was read from.
type KeyedRow = ((String, i64), rusqlite::Result<LoginRow>);

/// Lazy sequence of records from one `signons.sqlite`.
pub struct TableSignons {
    conn: Connection,
    path: PathBuf,
    first_page_sql: String,
    next_page_sql: String,
    decryptor: SharedDecryptor,
    page_size: usize,
    page: VecDeque<rusqlite::Result<LoginRow>>,
    last_key: Option<(String, i64)>,
    exhausted: bool,
    done: bool,
    index: usize,
}

impl TableSignons {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch_page(&mut self) -> Result<()> {
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let mut rows = Vec::new();

        {
            let read = |row: &Row<'_>| -> rusqlite::Result<KeyedRow> {
                let key = (row.get::<_, String>("host_key")?, row.get::<_, i64>("row_key")?);
                Ok((key, LoginRow::from_row(row)))
            };

            match &self.last_key {
                None => {
                    let mut stmt = self.conn.prepare_cached(&self.first_page_sql)?;
                    for row in stmt.query_map(rusqlite::params![limit], read)? {
                        rows.push(row?);
                    }
                }
                Some((host, rowid)) => {
                    let mut stmt = self.conn.prepare_cached(&self.next_page_sql)?;
                    for row in stmt.query_map(rusqlite::params![limit, host, rowid], read)? {
                        rows.push(row?);
                    }
                }
            }
        }

        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        for (key, row) in rows {
            self.last_key = Some(key);
            self.page.push_back(row);
        }
        Ok(())
    }

    fn convert(&self, row: LoginRow) -> Result<SignonRecord> {
        let decryptor = self.decryptor.as_ref();
        let username = decrypt_field(decryptor, &row.encrypted_username)?;
        let password = Zeroizing::new(decrypt_field(decryptor, &row.encrypted_password)?);

        Ok(SignonRecord {
            hostname: row.hostname,
            http_realm: Some(row.http_realm),
            form_submit_url: Some(row.form_submit_url),
            username_field: row.username_field,
            password_field: row.password_field,
            username,
            password,
            time_created: optional_millis_to_utc(row.time_created),
            time_last_used: optional_millis_to_utc(row.time_last_used),
            time_password_changed: optional_millis_to_utc(row.time_password_changed),
            times_used: row.times_used,
        })
    }
}

impl Iterator for TableSignons {
    type Item = Result<SignonRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.done = true;
                return Some(Err(e));
            }
        }

        let Some(row) = self.page.pop_front() else {
            self.done = true;
            return None;
        };

        let index = self.index;
        self.index += 1;

        let result = row
            .map_err(|e| SignonError::invalid_record(index, e.to_string()))
            .and_then(|row| self.convert(row));
        if let Err(e) = &result {
            tracing::warn!(
                index,
                path = %self.path.display(),
                error = %e,
                "skipping invalid login row"
            );
        }
        Some(result)
    }
}

impl std::iter::FusedIterator for TableSignons {}

impl std::fmt::Debug for TableSignons {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSignons")
            .field("path", &self.path)
            .field("index", &self.index)
            .field("buffered", &self.page.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IdentityDecryptor;
    use std::sync::Arc;
    use tempfile::tempdir;

    const SCHEMA: &str = "CREATE TABLE moz_logins (
        id INTEGER PRIMARY KEY,
        hostname TEXT NOT NULL,
        httpRealm TEXT,
        formSubmitURL TEXT,
        usernameField TEXT NOT NULL,
        passwordField TEXT NOT NULL,
        encryptedUsername TEXT NOT NULL,
        encryptedPassword TEXT NOT NULL,
        guid TEXT,
        encType INTEGER,
        timeCreated INTEGER,
        timeLastUsed INTEGER,
        timePasswordChanged INTEGER,
        timesUsed INTEGER)";

    fn insert(conn: &Connection, host: &str, user: &str, pass: &str) {
        conn.execute(
            "INSERT INTO moz_logins (hostname, formSubmitURL, usernameField, passwordField,
                encryptedUsername, encryptedPassword, timeCreated, timesUsed)
             VALUES (?1, ?1, 'user', 'pass', ?2, ?3, 1000, 2)",
            rusqlite::params![host, user, pass],
        )
        .unwrap();
    }

    fn parser() -> TableFormatParser {
        TableFormatParser::new(Arc::new(IdentityDecryptor))
    }

    #[test]
    fn test_missing_database_is_store_not_found() {
        let dir = tempdir().unwrap();
        let err = parser().parse(dir.path().join("signons.sqlite")).unwrap_err();
        assert!(matches!(err, SignonError::StoreNotFound { .. }));
    }

    #[test]
    fn test_rows_ordered_by_hostname_across_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        insert(&conn, "https://c.example", "u1", "p1");
        insert(&conn, "https://a.example", "u2", "p2");
        insert(&conn, "https://b.example", "u3", "p3");
        insert(&conn, "https://a.example", "u4", "p4");
        insert(&conn, "https://c.example", "u5", "p5");
        drop(conn);

        let records: Vec<_> = parser()
            .page_size(2)
            .parse(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 5);
        let order: Vec<_> = records
            .iter()
            .map(|r| (r.hostname.as_str(), r.username.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("https://a.example", "u2"),
                ("https://a.example", "u4"),
                ("https://b.example", "u3"),
                ("https://c.example", "u1"),
                ("https://c.example", "u5"),
            ]
        );
    }

    #[test]
    fn test_null_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO moz_logins (hostname, usernameField, passwordField, encryptedUsername, encryptedPassword)
             VALUES ('https://x.example', '', '', '~dQ==', '~cA==')",
            [],
        )
        .unwrap();
        drop(conn);

        let record = parser().parse(&path).unwrap().next().unwrap().unwrap();
        assert_eq!(record.http_realm.as_deref(), Some(""));
        assert_eq!(record.form_submit_url.as_deref(), Some(""));
        assert_eq!(record.username, "u");
        assert_eq!(record.password.as_str(), "p");
        assert!(record.time_created.is_none());
        assert!(record.time_last_used.is_none());
        assert!(record.time_password_changed.is_none());
        assert_eq!(record.times_used, 0);
    }

    #[test]
    fn test_old_schema_without_time_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE moz_logins (id INTEGER PRIMARY KEY, hostname TEXT NOT NULL,
                httpRealm TEXT, formSubmitURL TEXT, usernameField TEXT NOT NULL,
                passwordField TEXT NOT NULL, encryptedUsername TEXT NOT NULL,
                encryptedPassword TEXT NOT NULL);
             INSERT INTO moz_logins (hostname, httpRealm, usernameField, passwordField, encryptedUsername, encryptedPassword)
                VALUES ('https://old.example', 'Realm', 'u', 'p', 'alice', 'secret');",
        )
        .unwrap();
        drop(conn);

        let record = parser().parse(&path).unwrap().next().unwrap().unwrap();
        assert_eq!(record.hostname, "https://old.example");
        assert_eq!(record.http_realm.as_deref(), Some("Realm"));
        assert_eq!(record.username, "alice");
        assert_eq!(record.times_used, 0);
    }

    #[test]
    fn test_missing_table_is_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE other (x INTEGER)").unwrap();
        drop(conn);

        let err = parser().parse(&path).unwrap_err();
        assert!(matches!(err, SignonError::Format { .. }));
    }

    #[test]
    fn test_early_abandon_fetches_one_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for i in 0..10 {
            insert(&conn, &format!("https://h{i:02}.example"), "u", "p");
        }
        drop(conn);

        let mut iter = parser().page_size(3).parse(&path).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert_eq!(iter.page.len(), 2);
        assert!(!iter.exhausted);
    }

    #[test]
    fn test_huge_page_size_is_clamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signons.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        insert(&conn, "https://one.example", "u", "p");
        drop(conn);

        let parser = parser().page_size(usize::MAX);
        assert_eq!(parser.page_size, crate::base::config::MAX_TABLE_PAGE_SIZE);

        let records: Vec<_> = parser.parse(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hostname, "https://one.example");
    }
}
