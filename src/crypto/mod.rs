//! Field-level decryption of stored usernames and passwords.
//!
//! Gecko stores the two sensitive fields of every login as Base64 text. Two
//! encodings exist:
//!
//! - `~<base64>`: obfuscated only. The prefix is stripped and the payload is
//!   Base64-decoded here, without touching the key store.
//! - `<base64>`: encrypted with the profile key. The whole string is handed to
//!   an injected [`Decryptor`], which owns the native key handling.
//!
//! Parsers receive the decryptor as a dependency so they stay testable without
//! a native crypto runtime.

use crate::base::error::DecryptError;
use base64::{engine::general_purpose, Engine as _};
use std::fmt;
use std::sync::Arc;

/// Prefix marking a value that is only Base64 encoded.
pub const DECODE_ONLY_PREFIX: char = '~';

/// External capability that turns an encrypted Base64 string into cleartext.
pub trait Decryptor: Send + Sync {
    /// Decrypt one value. `value` is the stored text minus any
    /// [`DECODE_ONLY_PREFIX`] handling, which happens before this is called.
    fn decrypt(&self, value: &str) -> Result<String, DecryptError>;
}

impl<F> Decryptor for F
where
    F: Fn(&str) -> Result<String, DecryptError> + Send + Sync,
{
    fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        self(value)
    }
}

/// Shared handle passed to every parser.
pub type SharedDecryptor = Arc<dyn Decryptor>;

/// Returns its input unchanged. Useful for stores whose values were written
/// in clear text, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDecryptor;

impl Decryptor for IdentityDecryptor {
    fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        Ok(value.to_string())
    }
}

/// Base64-decodes without decrypting, for profiles whose values were only
/// obfuscated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Decryptor;

impl Decryptor for Base64Decryptor {
    fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        decode_base64(value)
    }
}

/// Base64-decode `value` into a UTF-8 string.
pub fn decode_base64(value: &str) -> Result<String, DecryptError> {
    let bytes = general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| DecryptError::InvalidBase64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| DecryptError::InvalidUtf8)
}

/// Decode or decrypt a stored value.
///
/// `None` maps to `None` and an empty string to an empty string; the
/// decryptor is not invoked for either.
pub fn decode_and_decrypt(
    decryptor: &dyn Decryptor,
    value: Option<&str>,
) -> Result<Option<String>, DecryptError> {
    let Some(value) = value else {
        return Ok(None);
    };

    if value.is_empty() {
        return Ok(Some(String::new()));
    }

    match value.strip_prefix(DECODE_ONLY_PREFIX) {
        Some(encoded) => decode_base64(encoded).map(Some),
        None => decryptor.decrypt(value).map(Some),
    }
}

/// Same as [`decode_and_decrypt`] for a value that is always present.
pub fn decrypt_field(decryptor: &dyn Decryptor, value: &str) -> Result<String, DecryptError> {
    decode_and_decrypt(decryptor, Some(value)).map(Option::unwrap_or_default)
}

/// Wraps a decryptor and counts how often it is invoked.
pub struct CountingDecryptor<D> {
    inner: D,
    calls: std::sync::atomic::AtomicUsize,
}

impl<D: Decryptor> CountingDecryptor<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of calls made to the wrapped decryptor so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl<D: Decryptor> Decryptor for CountingDecryptor<D> {
    fn decrypt(&self, value: &str) -> Result<String, DecryptError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.inner.decrypt(value)
    }
}

impl<D> fmt::Debug for CountingDecryptor<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingDecryptor")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDecryptor;

    impl Decryptor for FailingDecryptor {
        fn decrypt(&self, _value: &str) -> Result<String, DecryptError> {
            Err(DecryptError::Failed("no key slot".into()))
        }
    }

    #[test]
    fn test_decode_only_prefix_skips_decryptor() {
        let counting = CountingDecryptor::new(FailingDecryptor);
        let result = decode_and_decrypt(&counting, Some("~dXNlcg==")).unwrap();
        assert_eq!(result.as_deref(), Some("user"));
        assert_eq!(counting.calls(), 0);
    }

    #[test]
    fn test_unprefixed_goes_to_decryptor() {
        let counting = CountingDecryptor::new(IdentityDecryptor);
        let result = decode_and_decrypt(&counting, Some("MDIEEPgAAAAA")).unwrap();
        assert_eq!(result.as_deref(), Some("MDIEEPgAAAAA"));
        assert_eq!(counting.calls(), 1);
    }

    #[test]
    fn test_none_maps_to_none() {
        let counting = CountingDecryptor::new(FailingDecryptor);
        assert_eq!(decode_and_decrypt(&counting, None).unwrap(), None);
        assert_eq!(counting.calls(), 0);
    }

    #[test]
    fn test_empty_maps_to_empty() {
        assert_eq!(decrypt_field(&FailingDecryptor, "").unwrap(), "");
    }

    #[test]
    fn test_decryptor_failure_propagates() {
        let err = decrypt_field(&FailingDecryptor, "AAAA").unwrap_err();
        assert_eq!(err, DecryptError::Failed("no key slot".into()));
    }

    #[test]
    fn test_invalid_base64() {
        let err = decrypt_field(&IdentityDecryptor, "~not base64!").unwrap_err();
        assert!(matches!(err, DecryptError::InvalidBase64(_)));
    }

    #[test]
    fn test_invalid_utf8() {
        // 0xff 0xfe
        let err = decode_base64("//4=").unwrap_err();
        assert_eq!(err, DecryptError::InvalidUtf8);
    }

    #[test]
    fn test_closure_decryptor() {
        let upper = |v: &str| -> Result<String, DecryptError> { Ok(v.to_uppercase()) };
        assert_eq!(decrypt_field(&upper, "abc").unwrap(), "ABC");
    }

    #[test]
    fn test_base64_decryptor() {
        assert_eq!(decrypt_field(&Base64Decryptor, "cGFzcw==").unwrap(), "pass");
    }
}
