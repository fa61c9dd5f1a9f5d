//! Signon store reading.
//!
//! Gecko profiles have used three on-disk formats for saved logins over time.
//! Each has its own parser; all of them produce [`SignonRecord`]s.
//!
//! | File | Parser | Notes |
//! |------|--------|-------|
//! | `logins.json` | [`DocumentFormatParser`](document::DocumentFormatParser) | streamed array elements |
//! | `signons.sqlite` | [`TableFormatParser`](table::TableFormatParser) | one row per record, paged |
//! | `signons3.txt`, `signons2.txt`, `signons.txt` | [`LegacyFormatParser`](legacy::LegacyFormatParser) | sentinel-delimited lines |
//!
//! [`SignonStoreReader`](store::SignonStoreReader) picks the parser by which
//! file exists.
//!
//! ```rust,no_run
//! use foxsignons::crypto::Base64Decryptor;
//! use foxsignons::signons::store::SignonStoreReader;
//! use std::sync::Arc;
//!
//! let store = SignonStoreReader::new(Arc::new(Base64Decryptor)).read("/path/to/profile")?;
//! println!("format: {}", store.format());
//! for record in store {
//!     let record = record?;
//!     println!("{} {}", record.hostname, record.username);
//! }
//! # Ok::<(), foxsignons::base::error::SignonError>(())
//! ```

pub mod document;
pub mod legacy;
pub mod record;
pub mod store;
pub mod table;

pub use record::{group_by_site, ExtractionReport, SignonRecord, SignonSite};
pub use store::{SignonStore, SignonStoreReader, StoreFormat};
