//! jq script handling for sidecar edits.
//!
//! This module handles:
//! - Compiling jq scripts with the standard jq definitions
//! - Running a compiled script against a JSON document
//! - Substituting `{name}` placeholders before compilation

pub mod engine;
pub mod placeholder;

pub use engine::Script;
pub use placeholder::{Placeholders, substitute_placeholders};
