//! Base types: errors, configuration and line reading.
//!
//! - [`SignonError`](error::SignonError): error taxonomy shared by every parser
//! - [`ExtractorConfig`](config::ExtractorConfig): discovery and reader settings
//! - [`LossyLines`](lines::LossyLines): tolerant line reader for the text formats

pub mod config;
pub mod error;
pub mod lines;
