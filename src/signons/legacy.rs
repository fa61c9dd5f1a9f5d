//! `signons.txt` / `signons2.txt` / `signons3.txt` reader.
//!
//! The legacy format has no delimiters other than line order and a sentinel
//! line holding a single `.`:
//!
//! ```text
//! #2e                      header, fixed per version
//! excluded.example         zero or more excluded hosts
//! .                        end of excludes
//! https://site.example     site host
//! user                     username field name
//! MDIEEPgAAAAAAAAA...      encrypted username
//! *pass                    password field name, leading '*' dropped
//! MDIEEPgAAAAAAAAA...      encrypted password
//! https://site.example     form submit domain
//! ---                      filler, ignored
//! .                        end of site
//! ```
//!
//! [`LegacyGrammar`] turns lines into [`LegacyToken`]s and knows nothing about
//! decryption. [`LegacySignons`] drives it over a reader and decrypts each
//! entry as it is pulled.

use crate::base::config::{LegacyVersion, LEGACY_SENTINEL};
use crate::base::error::{Result, SignonError};
use crate::base::lines::LossyLines;
use crate::crypto::{decrypt_field, SharedDecryptor};
use crate::signons::record::{SignonRecord, SignonSite};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Marker some versions put in front of the password field name.
const PASSWORD_FIELD_MARKER: char = '*';

/// Where the grammar is within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarState {
    ReadingHeader,
    ReadingExcludes,
    /// First site host, right after the excludes.
    AwaitingSiteHost,
    /// Position within an entry: 0 username field, 1 encrypted username,
    /// 2 password field, 3 encrypted password, 4 domain, 5 filler.
    ReadingEntryField(u8),
    /// After a site's sentinel.
    AwaitingNextGroupOrEof,
}

/// Raw entry fields, still encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub username_field: String,
    pub encrypted_username: String,
    pub password_field: String,
    pub encrypted_password: String,
    /// `None` when the entry ended before the domain line.
    pub domain: Option<String>,
}

/// What a line (or end of file) produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyToken {
    Excluded(String),
    SiteStart(String),
    Entry(RawEntry),
}

/// Grammar violations, positioned by 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarViolation {
    EmptyFile,
    HeaderMismatch { expected: &'static str, found: String },
    SentinelForHost { line: usize },
}

impl GrammarViolation {
    fn into_error(self, path: &Path) -> SignonError {
        match self {
            GrammarViolation::EmptyFile => SignonError::format(path, "empty file"),
            GrammarViolation::HeaderMismatch { expected, found } => SignonError::format(
                path,
                format!("expected header {expected:?}, found {found:?}"),
            ),
            GrammarViolation::SentinelForHost { line } => {
                SignonError::corrupt(path, line, "sentinel where a site host was expected")
            }
        }
    }
}

/// Line-at-a-time state machine for one legacy file.
#[derive(Debug, Clone)]
pub struct LegacyGrammar {
    header: &'static str,
    state: GrammarState,
    pending: Option<RawEntry>,
    line: usize,
}

impl LegacyGrammar {
    pub fn new(version: LegacyVersion) -> Self {
        Self {
            header: version.header(),
            state: GrammarState::ReadingHeader,
            pending: None,
            line: 0,
        }
    }

    pub fn state(&self) -> GrammarState {
        self.state
    }

    /// Number of lines fed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Feed the next line, without its line terminator.
    pub fn feed(
        &mut self,
        line: &str,
    ) -> std::result::Result<Option<LegacyToken>, GrammarViolation> {
        self.line += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        let sentinel = line == LEGACY_SENTINEL;

        match self.state {
            GrammarState::ReadingHeader => {
                if line != self.header {
                    return Err(GrammarViolation::HeaderMismatch {
                        expected: self.header,
                        found: line.to_string(),
                    });
                }
                self.state = GrammarState::ReadingExcludes;
                Ok(None)
            }
            GrammarState::ReadingExcludes => {
                if sentinel {
                    self.state = GrammarState::AwaitingSiteHost;
                    Ok(None)
                } else {
                    Ok(Some(LegacyToken::Excluded(line.to_string())))
                }
            }
            GrammarState::AwaitingSiteHost | GrammarState::AwaitingNextGroupOrEof => {
                if sentinel {
                    return Err(GrammarViolation::SentinelForHost { line: self.line });
                }
                self.state = GrammarState::ReadingEntryField(0);
                Ok(Some(LegacyToken::SiteStart(line.to_string())))
            }
            GrammarState::ReadingEntryField(index) => {
                Ok(self.feed_entry_field(index, line, sentinel))
            }
        }
    }

    fn feed_entry_field(&mut self, index: u8, line: &str, sentinel: bool) -> Option<LegacyToken> {
        if sentinel {
            self.state = GrammarState::AwaitingNextGroupOrEof;
            return self.pending.take().map(LegacyToken::Entry);
        }

        match index {
            0 => {
                self.pending = Some(RawEntry {
                    username_field: line.to_string(),
                    ..RawEntry::default()
                });
            }
            5 => {
                self.state = GrammarState::ReadingEntryField(0);
                return None;
            }
            _ => {
                let entry = self.pending.get_or_insert_with(RawEntry::default);
                match index {
                    1 => entry.encrypted_username = line.to_string(),
                    2 => {
                        entry.password_field = line
                            .strip_prefix(PASSWORD_FIELD_MARKER)
                            .unwrap_or(line)
                            .to_string();
                    }
                    3 => entry.encrypted_password = line.to_string(),
                    _ => {
                        entry.domain = Some(line.to_string());
                        self.state = GrammarState::ReadingEntryField(5);
                        return self.pending.take().map(LegacyToken::Entry);
                    }
                }
            }
        }

        self.state = GrammarState::ReadingEntryField(index + 1);
        None
    }

    /// Signal end of file. Returns a trailing partial entry if one was open.
    pub fn finish(&mut self) -> std::result::Result<Option<LegacyToken>, GrammarViolation> {
        if self.state == GrammarState::ReadingHeader {
            return Err(GrammarViolation::EmptyFile);
        }
        self.state = GrammarState::AwaitingNextGroupOrEof;
        Ok(self.pending.take().map(LegacyToken::Entry))
    }
}

/// Parser for the legacy format.
#[derive(Clone)]
pub struct LegacyFormatParser {
    decryptor: SharedDecryptor,
}

impl LegacyFormatParser {
    pub fn new(decryptor: SharedDecryptor) -> Self {
        Self { decryptor }
    }

    /// Open `path`, choosing the version by its file name.
    ///
    /// The header and the excluded hosts are read before this returns; site
    /// records are read as the returned sequence is pulled.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<LegacySignons<BufReader<File>>> {
        let path = path.as_ref();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let version = LegacyVersion::from_file_name(name)
            .ok_or_else(|| SignonError::format(path, "not a legacy signons file name"))?;
        self.parse_as(path, version)
    }

    /// Open `path` as the given version, whatever its name.
    pub fn parse_as(
        &self,
        path: impl AsRef<Path>,
        version: LegacyVersion,
    ) -> Result<LegacySignons<BufReader<File>>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SignonError::io(path, &e))?;
        self.parse_reader(BufReader::new(file), version, path)
    }

    /// Parse from any buffered reader. `source` is only used in errors.
    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
        version: LegacyVersion,
        source: impl Into<PathBuf>,
    ) -> Result<LegacySignons<R>> {
        let mut signons = LegacySignons {
            lines: LossyLines::new(reader),
            grammar: LegacyGrammar::new(version),
            version,
            source: source.into(),
            decryptor: self.decryptor.clone(),
            excluded: BTreeSet::new(),
            host: None,
            lookahead: None,
            index: 0,
            done: false,
        };
        signons.read_preamble()?;
        tracing::debug!(
            path = %signons.source.display(),
            version = version.number(),
            excluded = signons.excluded.len(),
            "opened legacy signons file"
        );
        Ok(signons)
    }
}

impl std::fmt::Debug for LegacyFormatParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyFormatParser").finish_non_exhaustive()
    }
}

/// Lazy sequence of records from one legacy file.
pub struct LegacySignons<R> {
    lines: LossyLines<R>,
    grammar: LegacyGrammar,
    version: LegacyVersion,
    source: PathBuf,
    decryptor: SharedDecryptor,
    excluded: BTreeSet<String>,
    host: Option<String>,
    /// First site host, seen while reading the excludes.
    lookahead: Option<LegacyToken>,
    index: usize,
    done: bool,
}

impl<R: BufRead> LegacySignons<R> {
    pub fn version(&self) -> LegacyVersion {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.source
    }

    /// Hosts the user chose never to save logins for.
    pub fn excluded_hosts(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// Read the header and excludes, stopping at the first site host.
    fn read_preamble(&mut self) -> Result<()> {
        while matches!(
            self.grammar.state(),
            GrammarState::ReadingHeader | GrammarState::ReadingExcludes
        ) {
            match self.next_token() {
                Some(Ok(LegacyToken::Excluded(host))) => {
                    self.excluded.insert(host);
                }
                Some(Ok(token)) => {
                    self.lookahead = Some(token);
                    break;
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Option<Result<LegacyToken>> {
        if let Some(token) = self.lookahead.take() {
            return Some(Ok(token));
        }

        while !self.done {
            let step = match self.lines.next() {
                Some(Ok(line)) => self.grammar.feed(&line),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(SignonError::io(&self.source, &e)));
                }
                None => {
                    self.done = true;
                    self.grammar.finish()
                }
            };

            match step {
                Ok(Some(token)) => return Some(Ok(token)),
                Ok(None) => {}
                Err(violation) => {
                    self.done = true;
                    return Some(Err(violation.into_error(&self.source)));
                }
            }
        }
        None
    }

    fn decrypt_entry(&self, host: &str, entry: RawEntry) -> Result<SignonRecord> {
        let decryptor = self.decryptor.as_ref();
        let username = decrypt_field(decryptor, &entry.encrypted_username)?;
        let password = Zeroizing::new(decrypt_field(decryptor, &entry.encrypted_password)?);

        Ok(SignonRecord {
            hostname: host.to_string(),
            http_realm: None,
            form_submit_url: entry.domain,
            username_field: entry.username_field,
            password_field: entry.password_field,
            username,
            password,
            ..SignonRecord::default()
        })
    }

    fn convert(&mut self, entry: RawEntry) -> Result<SignonRecord> {
        let index = self.index;
        self.index += 1;
        let host = self.host.clone().unwrap_or_default();
        let result = self.decrypt_entry(&host, entry);
        if let Err(e) = &result {
            tracing::warn!(index, host = %host, error = %e, "skipping undecryptable legacy entry");
        }
        result
    }

    /// Read the remaining sites, keeping sites that have no entries.
    ///
    /// Entries that fail to decrypt are logged and left out; the first fatal
    /// error is returned.
    pub fn read_sites(mut self) -> Result<Vec<SignonSite>> {
        let mut sites: Vec<SignonSite> = Vec::new();
        while let Some(token) = self.next_token() {
            match token? {
                LegacyToken::SiteStart(host) => {
                    sites.push(SignonSite::new(host.clone()));
                    self.host = Some(host);
                }
                LegacyToken::Entry(entry) => {
                    if let Ok(record) = self.convert(entry) {
                        if let Some(site) = sites.last_mut() {
                            site.signons.push(record);
                        }
                    }
                }
                LegacyToken::Excluded(host) => {
                    self.excluded.insert(host);
                }
            }
        }
        Ok(sites)
    }
}

impl<R: BufRead> Iterator for LegacySignons<R> {
    type Item = Result<SignonRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_token()? {
                Ok(LegacyToken::SiteStart(host)) => self.host = Some(host),
                Ok(LegacyToken::Entry(entry)) => return Some(self.convert(entry)),
                Ok(LegacyToken::Excluded(host)) => {
                    self.excluded.insert(host);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for LegacySignons<R> {}

impl<R> std::fmt::Debug for LegacySignons<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacySignons")
            .field("source", &self.source)
            .field("version", &self.version)
            .field("excluded", &self.excluded.len())
            .field("index", &self.index)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
