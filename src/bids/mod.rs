//! BIDS naming for dataset items.
//!
//! This module handles:
//! - Parsing logical item paths (`anat/T1w`, `func/bold/task=rest`)
//! - Resolving them to BIDS file names for a subject/session row
//! - Locating the JSON sidecar beside a data file

pub mod path;

pub use path::{BidsPath, Row, sidecar_path};
