//! `logins.json` reader.
//!
//! The document is one JSON object whose `logins` member is an array of login
//! objects:
//!
//! ```json
//! {"nextId": 3, "logins": [{"hostname": "https://example.com", ...}], "version": 3}
//! ```
//!
//! The array is not deserialized in one go. [`LoginArrayScanner`] walks the
//! raw bytes, finds the top-level `logins` array and cuts out one element at a
//! time; only that element is handed to `serde_json`. A caller that stops
//! after the first few records never reads the rest of the file.

use crate::base::error::{Result, SignonError};
use crate::crypto::{decrypt_field, SharedDecryptor};
use crate::signons::record::{optional_millis_to_utc, SignonRecord};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Name of the array member holding the logins.
const LOGINS_KEY: &str = "logins";

/// UTF-8 byte order mark, tolerated before the top-level object.
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// One element of the `logins` array as stored on disk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginEntry {
    hostname: String,
    #[serde(default)]
    http_realm: Option<String>,
    #[serde(rename = "formSubmitURL", default)]
    form_submit_url: Option<String>,
    username_field: String,
    password_field: String,
    encrypted_username: String,
    encrypted_password: String,
    #[serde(default)]
    time_created: Option<u64>,
    #[serde(default)]
    time_last_used: Option<u64>,
    #[serde(default)]
    time_password_changed: Option<u64>,
    #[serde(default)]
    times_used: Option<u64>,
}

/// Parser for the document format.
#[derive(Clone)]
pub struct DocumentFormatParser {
    decryptor: SharedDecryptor,
}

impl DocumentFormatParser {
    pub fn new(decryptor: SharedDecryptor) -> Self {
        Self { decryptor }
    }

    /// Open `path` and return a lazy sequence of its records.
    pub fn parse(&self, path: impl AsRef<Path>) -> Result<DocumentSignons<BufReader<File>>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SignonError::io(path, &e))?;
        Ok(self.parse_reader(BufReader::new(file), path))
    }

    /// Parse from any buffered reader. `source` is only used in errors.
    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
        source: impl Into<PathBuf>,
    ) -> DocumentSignons<R> {
        DocumentSignons {
            scanner: LoginArrayScanner::new(reader, source),
            decryptor: self.decryptor.clone(),
            index: 0,
            done: false,
        }
    }
}

impl std::fmt::Debug for DocumentFormatParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFormatParser").finish_non_exhaustive()
    }
}

/// Lazy sequence of records from one `logins.json`.
pub struct DocumentSignons<R> {
    scanner: LoginArrayScanner<R>,
    decryptor: SharedDecryptor,
    index: usize,
    done: bool,
}

impl<R: BufRead> DocumentSignons<R> {
    pub fn path(&self) -> &Path {
        &self.scanner.source
    }

    fn convert(&self, raw: &[u8]) -> Result<SignonRecord> {
        let entry: LoginEntry = serde_json::from_slice(raw)
            .map_err(|e| SignonError::invalid_record(self.index, e.to_string()))?;

        let decryptor = self.decryptor.as_ref();
        let username = decrypt_field(decryptor, &entry.encrypted_username)?;
        let password = Zeroizing::new(decrypt_field(decryptor, &entry.encrypted_password)?);

        Ok(SignonRecord {
            hostname: entry.hostname,
            http_realm: entry.http_realm,
            form_submit_url: entry.form_submit_url,
            username_field: entry.username_field,
            password_field: entry.password_field,
            username,
            password,
            time_created: optional_millis_to_utc(entry.time_created),
            time_last_used: optional_millis_to_utc(entry.time_last_used),
            time_password_changed: optional_millis_to_utc(entry.time_password_changed),
            times_used: entry.times_used.unwrap_or(0),
        })
    }
}

impl<R: BufRead> Iterator for DocumentSignons<R> {
    type Item = Result<SignonRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let raw = match self.scanner.next_element() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let result = self.convert(&raw);
        if let Err(e) = &result {
            tracing::warn!(index = self.index, error = %e, "skipping invalid login");
        }
        self.index += 1;
        Some(result)
    }
}

impl<R: BufRead> std::iter::FusedIterator for DocumentSignons<R> {}

impl<R> std::fmt::Debug for DocumentSignons<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSignons")
            .field("source", &self.scanner.source)
            .field("index", &self.index)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Before the top-level object has been opened.
    Start,
    /// Inside the `logins` array, before the first element.
    ArrayStart,
    /// Inside the `logins` array, after at least one element.
    ArrayNext,
    Finished,
}

/// Byte-level walker that extracts the elements of the top-level `logins`
/// array one at a time.
#[derive(Debug)]
pub struct LoginArrayScanner<R> {
    reader: R,
    source: PathBuf,
    state: ScanState,
}

impl<R: BufRead> LoginArrayScanner<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            source: source.into(),
            state: ScanState::Start,
        }
    }

    /// Raw bytes of the next array element, or `None` after the last one.
    /// A document without a `logins` member yields nothing.
    pub fn next_element(&mut self) -> Result<Option<Vec<u8>>> {
        if self.state == ScanState::Start {
            let found = self.seek_logins()?;
            self.state = if found {
                ScanState::ArrayStart
            } else {
                ScanState::Finished
            };
        }

        if self.state == ScanState::Finished {
            return Ok(None);
        }

        self.skip_whitespace()?;
        match self.peek()? {
            Some(b']') => {
                self.bump();
                self.state = ScanState::Finished;
                return Ok(None);
            }
            Some(b',') if self.state == ScanState::ArrayNext => {
                self.bump();
                self.skip_whitespace()?;
            }
            Some(_) if self.state == ScanState::ArrayStart => {}
            Some(b) => return Err(self.unexpected(b, "',' or ']'")),
            None => return Err(self.eof()),
        }

        let mut element = Vec::new();
        self.copy_value(&mut element)?;
        self.state = ScanState::ArrayNext;
        Ok(Some(element))
    }

    /// Advance to just after the `[` of the top-level `logins` member.
    fn seek_logins(&mut self) -> Result<bool> {
        self.skip_bom()?;
        self.skip_whitespace()?;
        self.expect(b'{')?;

        let mut first = true;
        loop {
            self.skip_whitespace()?;
            match self.peek()? {
                Some(b'}') => return Ok(false),
                Some(b',') if !first => {
                    self.bump();
                    self.skip_whitespace()?;
                }
                Some(_) if first => {}
                Some(b) => return Err(self.unexpected(b, "',' or '}'")),
                None => return Err(self.eof()),
            }
            first = false;

            let key = self.read_key()?;
            self.skip_whitespace()?;
            self.expect(b':')?;
            self.skip_whitespace()?;

            if key == LOGINS_KEY {
                return match self.peek()? {
                    Some(b'[') => {
                        self.bump();
                        Ok(true)
                    }
                    Some(b'n') => {
                        self.copy_value(&mut Vec::new())?;
                        Ok(false)
                    }
                    Some(b) => Err(self.unexpected(b, "'[' after \"logins\"")),
                    None => Err(self.eof()),
                };
            }

            tracing::trace!(key = %key, "skipping top-level member");
            self.copy_value(&mut Vec::new())?;
        }
    }

    /// Read an object key. The raw bytes are decoded by `serde_json` so
    /// escapes are handled the same way as in values.
    fn read_key(&mut self) -> Result<String> {
        if self.peek()? != Some(b'"') {
            return Err(match self.peek()? {
                Some(b) => self.unexpected(b, "object key"),
                None => self.eof(),
            });
        }
        let mut raw = Vec::new();
        self.copy_string(&mut raw)?;
        serde_json::from_slice(&raw).map_err(|e| SignonError::format(&self.source, e.to_string()))
    }

    /// Copy one complete JSON value into `out`.
    fn copy_value(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self.peek()? {
            Some(b'"') => self.copy_string(out),
            Some(b'{') | Some(b'[') => self.copy_container(out),
            Some(_) => self.copy_scalar(out),
            None => Err(self.eof()),
        }
    }

    fn copy_string(&mut self, out: &mut Vec<u8>) -> Result<()> {
        // opening quote
        out.push(self.next_byte()?);
        loop {
            let b = self.next_byte()?;
            out.push(b);
            match b {
                b'\\' => out.push(self.next_byte()?),
                b'"' => return Ok(()),
                _ => {}
            }
        }
    }

    fn copy_container(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                Some(b'"') => {
                    self.copy_string(out)?;
                    continue;
                }
                Some(b) => {
                    self.bump();
                    out.push(b);
                    match b {
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        _ => {}
                    }
                }
                None => return Err(self.eof()),
            }
        }
    }

    fn copy_scalar(&mut self, out: &mut Vec<u8>) -> Result<()> {
        while let Some(b) = self.peek()? {
            if matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace() {
                break;
            }
            self.bump();
            out.push(b);
        }
        if out.is_empty() {
            return Err(self.eof());
        }
        Ok(())
    }

    fn skip_bom(&mut self) -> Result<()> {
        if self.peek()? == Some(UTF8_BOM[0]) {
            for b in UTF8_BOM {
                self.expect(b)?;
            }
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b) = self.peek()? {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.bump();
        }
        Ok(())
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek()? {
            Some(b) if b == expected => {
                self.bump();
                Ok(())
            }
            Some(b) => Err(self.unexpected(b, &format!("'{}'", expected as char))),
            None => Err(self.eof()),
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SignonError::io(&self.source, &e)),
            }
        }
    }

    fn bump(&mut self) {
        self.reader.consume(1);
    }

    fn next_byte(&mut self) -> Result<u8> {
        match self.peek()? {
            Some(b) => {
                self.bump();
                Ok(b)
            }
            None => Err(self.eof()),
        }
    }

    fn unexpected(&self, found: u8, expected: &str) -> SignonError {
        SignonError::format(
            &self.source,
            format!("expected {expected}, found '{}'", found.escape_ascii()),
        )
    }

    fn eof(&self) -> SignonError {
        SignonError::format(&self.source, "unexpected end of document")
    }
}
