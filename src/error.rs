use std::path::PathBuf;

/// Library-level structured errors for bids-sidecar.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
	#[error("Failed to read config file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Invalid edit rule for path pattern {pattern}: {reason}")]
	InvalidRule { pattern: String, reason: String },

	#[error("Invalid regex pattern in edit rule: {pattern}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("Failed to parse jq script `{script}`: {message}")]
	ScriptParse { script: String, message: String },

	#[error("jq script `{script}` failed on {item_path}: {message}")]
	ScriptEval {
		script: String,
		item_path: String,
		message: String,
	},

	#[error("jq script `{script}` produced no output for {item_path}")]
	ScriptNoOutput { script: String, item_path: String },

	#[error("Invalid BIDS path `{path}`: {reason}")]
	InvalidBidsPath { path: String, reason: String },

	#[error("Failed to read sidecar: {path}")]
	SidecarReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Sidecar is not valid JSON: {path}")]
	SidecarParseError {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("Failed to write sidecar: {path}")]
	SidecarWriteError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to resolve home directory")]
	HomeDirectoryNotFound,
}

impl SidecarError {
	/// True for failures of a transformation script (parse, evaluation or empty output).
	pub fn is_script_error(&self) -> bool {
		matches!(
			self,
			SidecarError::ScriptParse { .. }
				| SidecarError::ScriptEval { .. }
				| SidecarError::ScriptNoOutput { .. }
		)
	}

	/// True when a path pattern is not a valid regular expression.
	pub fn is_pattern_error(&self) -> bool {
		matches!(self, SidecarError::InvalidPattern { .. })
	}
}

/// Result type alias using SidecarError.
pub type Result<T> = std::result::Result<T, SidecarError>;
