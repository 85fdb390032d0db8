use crate::error::SidecarError;
use serde::Deserialize;
use std::path::PathBuf;

/// Name of the per-directory config file.
pub const CONFIG_FILE_NAME: &str = ".bids-sidecar.toml";

/// Top-level configuration from a `.bids-sidecar.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
	/// If true, stop walking up the directory tree at this config.
	#[serde(default)]
	pub root: bool,

	/// If true, ~/.bids-sidecar.toml is not consulted.
	#[serde(default)]
	pub no_user_config: bool,

	/// Sidecar edits, applied in order to every item whose path matches.
	#[serde(default)]
	pub edits: Vec<EditRule>,
}

/// One `[[edits]]` entry: a path pattern and the jq script it triggers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EditRule {
	/// Regex searched for in the item's logical path, e.g. `anat/T.*w`.
	pub path: String,

	/// jq script applied to the sidecar of matching items.
	pub script: String,
}

/// A loaded configuration with its source path for debugging/display.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
	/// The parsed configuration.
	pub config: Config,

	/// The path this config was loaded from.
	pub path: PathBuf,
}

/// Merged configuration from multiple config files in the cascade.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
	/// All edit rules, outermost config first.
	pub rules: Vec<RuleWithSource>,
}

/// An edit rule with its source config path for debugging/display.
#[derive(Debug, Clone)]
pub struct RuleWithSource {
	/// The rule itself.
	pub rule: EditRule,

	/// The config file this rule came from.
	pub source: PathBuf,
}

impl EditRule {
	/// Reject rules that can never do anything useful.
	pub fn validate(&self) -> Result<(), SidecarError> {
		if self.script.trim().is_empty() {
			return Err(SidecarError::InvalidRule {
				pattern: self.path.clone(),
				reason: "script is empty".to_string(),
			});
		}

		Ok(())
	}
}

impl Config {
	/// Validate all rules in this config.
	pub fn validate(&self) -> Result<(), SidecarError> {
		for rule in &self.edits {
			rule.validate()?;
		}
		Ok(())
	}
}
