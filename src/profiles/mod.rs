//! Profile discovery.
//!
//! - [`registry`]: streaming `profiles.ini` parser
//! - [`locator`]: probes the known install locations and picks the primary profile
//! - [`descriptor`]: one parsed profile entry

pub mod descriptor;
pub mod locator;
pub mod registry;

pub use descriptor::ProfileDescriptor;
pub use locator::ProfileLocator;
