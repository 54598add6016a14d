//! # acdb Testkit
//!
//! Test utilities for acdb.
//!
//! This crate provides:
//! - A scripted origin standing in for the remote web service
//! - A JSON-array parser and body builders for scripted pages
//! - Engine fixtures over temporary directories or memory stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use acdb_testkit::prelude::*;
//!
//! #[test]
//! fn syncs_one_page() {
//!     let origin = ScriptedClient::new().page("https://x/1", rows_body(&[event(1, 1)]));
//!     let mut fx = MemoryFixture::new(registry, origin.clone());
//!     fx.engine.sync("events").unwrap();
//!     assert_eq!(origin.requests().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod origin;
pub mod pages;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::origin::*;
    pub use crate::pages::*;
}

pub use fixtures::*;
pub use generators::*;
pub use origin::*;
pub use pages::*;
