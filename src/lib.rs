//! # foxsignons
//!
//! Reads saved website logins out of Firefox, Thunderbird and SeaMonkey
//! profiles.
//!
//! `foxsignons` finds the profile to read from the `profiles.ini` registry,
//! works out which of the three signon store formats it holds and normalizes
//! every entry into one [`SignonRecord`] shape.
//!
//! ## Features
//!
//! - **Profile discovery**: all known install locations, default profile first
//! - **`logins.json`**: streamed, one array element at a time
//! - **`signons.sqlite`**: read-only, paged by hostname
//! - **`signons*.txt`**: the legacy sentinel-delimited format, all three versions
//! - **Pluggable decryption**: the key store is behind the [`Decryptor`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foxsignons::{ExtractorConfig, SignonExtractor};
//! use foxsignons::crypto::Base64Decryptor;
//! use std::sync::Arc;
//!
//! let extractor = SignonExtractor::new(ExtractorConfig::default(), Arc::new(Base64Decryptor));
//! let extraction = extractor.extract()?;
//! println!("{} logins ({})", extraction.report.records.len(), extraction.format);
//! # Ok::<(), foxsignons::SignonError>(())
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error types and configuration
//! - [`crypto`] - Field decryption seam
//! - [`profiles`] - Registry parsing and profile selection
//! - [`signons`] - Store detection and the three format parsers
//! - [`extractor`] - Discovery and reading in one call

pub mod base;
pub mod crypto;
pub mod extractor;
pub mod profiles;
pub mod signons;

pub use base::config::{ExtractorConfig, LocatorConfig};
pub use base::error::{DecryptError, Result, SignonError};
pub use crypto::{Decryptor, SharedDecryptor};
pub use extractor::{Extraction, SignonExtractor};
pub use profiles::{ProfileDescriptor, ProfileLocator};
pub use signons::{
    ExtractionReport, SignonRecord, SignonSite, SignonStore, SignonStoreReader, StoreFormat,
};
