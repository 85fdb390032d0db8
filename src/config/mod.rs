//! Configuration loading and parsing for bids-sidecar.
//!
//! This module handles:
//! - TOML config file parsing
//! - Directory cascade discovery
//! - Config merging

pub mod cascade;
pub mod parser;
pub mod template;
pub mod types;

pub use cascade::{discover_configs, load_merged_config, merge_configs, user_config_path};
pub use parser::{parse_config_file, parse_config_str};
pub use template::init_template;
pub use types::{CONFIG_FILE_NAME, Config, EditRule, LoadedConfig, MergedConfig, RuleWithSource};
