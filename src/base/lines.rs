//! Line reading for the text formats.
//!
//! Registry and legacy signon files predate UTF-8 everywhere; older Windows
//! installs write them in the native code page. Lines are therefore decoded
//! lossily instead of failing on the first stray byte, and a leading byte
//! order mark is dropped.

use std::io::{self, BufRead};

/// Byte order mark as it appears at the start of a decoded file.
pub const BOM: char = '\u{feff}';

/// Like [`BufRead::lines`], but invalid UTF-8 becomes U+FFFD.
///
/// Strips `\n` or `\r\n` from each line and the BOM from the first one.
#[derive(Debug)]
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
    first: bool,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            first: true,
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let mut bytes = self.buf.as_slice();
                if let Some(rest) = bytes.strip_suffix(b"\n") {
                    bytes = rest.strip_suffix(b"\r").unwrap_or(rest);
                }
                let text = String::from_utf8_lossy(bytes);
                let text = if std::mem::take(&mut self.first) {
                    text.strip_prefix(BOM).unwrap_or(&*text).to_string()
                } else {
                    text.into_owned()
                };
                Some(Ok(text))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
