use crate::config::parser::parse_config_file;
use crate::config::types::{CONFIG_FILE_NAME, LoadedConfig, MergedConfig, RuleWithSource};
use crate::error::{Result, SidecarError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Discover and load all config files in the cascade.
///
/// The cascade order is:
/// 1. Start from `start_dir` and look for `.bids-sidecar.toml`
/// 2. Continue up the directory tree until a config with `root = true`
/// 3. Finally, check ~/.bids-sidecar.toml unless a config sets `no-user-config`
///
/// Returns configs in cascade order (most specific first).
pub fn discover_configs(start_dir: &Path) -> Result<Vec<LoadedConfig>> {
	let mut configs = Vec::new();
	let mut current_dir = start_dir.to_path_buf();

	// Walk up the directory tree
	loop {
		let config_path = current_dir.join(CONFIG_FILE_NAME);

		if config_path.exists() {
			let config = parse_config_file(&config_path)?;
			debug!(path = %config_path.display(), edits = config.edits.len(), "loaded config");

			let root = config.root;
			configs.push(LoadedConfig {
				config,
				path: config_path,
			});

			if root {
				break;
			}
		}

		// Move to parent directory
		if let Some(parent) = current_dir.parent() {
			current_dir = parent.to_path_buf();
		} else {
			break;
		}
	}

	if let Some(user_config) = load_user_config(&configs)? {
		configs.push(user_config);
	}

	Ok(configs)
}

/// Load the user's ~/.bids-sidecar.toml if it exists and isn't disabled.
fn load_user_config(existing_configs: &[LoadedConfig]) -> Result<Option<LoadedConfig>> {
	if existing_configs
		.iter()
		.any(|loaded| loaded.config.no_user_config)
	{
		return Ok(None);
	}

	let user_config_path = user_config_path()?;

	// The walk up may already have picked it up when run from under $HOME.
	if existing_configs
		.iter()
		.any(|loaded| loaded.path == user_config_path)
	{
		return Ok(None);
	}

	if user_config_path.exists() {
		let config = parse_config_file(&user_config_path)?;
		Ok(Some(LoadedConfig {
			config,
			path: user_config_path,
		}))
	} else {
		Ok(None)
	}
}

/// Merge multiple configs into a single effective config.
///
/// `configs` is in cascade order (most specific first). Rules are collected
/// outermost first, so edits from a directory's own config run after, and
/// see the output of, edits inherited from above.
pub fn merge_configs(configs: &[LoadedConfig]) -> MergedConfig {
	let mut merged = MergedConfig::default();

	for loaded in configs.iter().rev() {
		for rule in &loaded.config.edits {
			merged.rules.push(RuleWithSource {
				rule: rule.clone(),
				source: loaded.path.clone(),
			});
		}
	}

	merged
}

/// Convenience function to discover, load, and merge configs from a directory.
pub fn load_merged_config(start_dir: &Path) -> Result<MergedConfig> {
	let configs = discover_configs(start_dir)?;
	Ok(merge_configs(&configs))
}

/// Get the path to the user's config file.
pub fn user_config_path() -> Result<PathBuf> {
	let home_dir = dirs::home_dir().ok_or(SidecarError::HomeDirectoryNotFound)?;
	Ok(home_dir.join(CONFIG_FILE_NAME))
}
