//! Sidecar editing.
//!
//! This module handles:
//! - Compiling path patterns into an ordered edit rule set
//! - Applying every matching rule's jq script to a sidecar document
//! - Reading and rewriting sidecar files at ingestion time

pub mod editor;
pub mod rule;

pub use editor::{EditOutcome, ItemRef, SidecarEditor, apply_edits, apply_edits_with, edit_sidecar};
pub use rule::{EditRuleSet, PathRule, compile_rule_set};
