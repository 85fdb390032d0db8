//! bids-sidecar - rule-driven jq editing of BIDS JSON sidecar files.
//!
//! This library provides the core functionality for bids-sidecar, including:
//! - Edit rules pairing a path regex with a jq script
//! - Applying matching rules, in order, to sidecar documents
//! - BIDS file naming for logical item paths
//! - Configuration file parsing and cascade discovery
//!
//! # Example
//!
//! ```no_run
//! use bids_sidecar::edits::{EditRuleSet, apply_edits};
//! use serde_json::json;
//!
//! let rules = EditRuleSet::new([("anat/T.*w", ".a.b += 4")]).unwrap();
//! let edited = apply_edits("anat/T1w", json!({"a": {"b": 1.0}}), &rules).unwrap();
//! assert_eq!(edited, json!({"a": {"b": 5.0}}));
//! ```

pub mod bids;
pub mod config;
pub mod edits;
pub mod error;
pub mod script;

pub use error::{Result, SidecarError};

/// Crate version, fixed at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
