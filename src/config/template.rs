/// Starter `.bids-sidecar.toml` written by `bids-sidecar --init`.
pub fn init_template() -> String {
	r#"# bids-sidecar configuration
#
# Edits are applied, in order, to the JSON sidecar of every item whose
# logical path (e.g. "anat/T1w", "func/bold/task=rest") matches `path`.
# `script` is a jq expression; `{name}` is replaced by the file name of the
# item passed as `--ref name=<logical path>`.

# Stop looking for .bids-sidecar.toml in parent directories.
root = true

# Skip ~/.bids-sidecar.toml.
# no-user-config = true

[[edits]]
path = "fmap/.*"
script = '.IntendedFor = "{bold}"'

# [[edits]]
# path = "anat/T.*w"
# script = 'del(.PatientName)'
"#
	.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::parse_config_str;
	use std::path::Path;

	#[test]
	fn test_template_parses() {
		let config = parse_config_str(&init_template(), Path::new(".bids-sidecar.toml")).unwrap();
		assert!(config.root);
		assert_eq!(config.edits.len(), 1);
		assert_eq!(config.edits[0].path, "fmap/.*");
	}
}
