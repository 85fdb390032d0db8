use crate::error::{Result, SidecarError};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Entity keys in the order BIDS places them in file names.
const ENTITY_ORDER: &[&str] = &[
	"sample", "task", "tracksys", "acq", "nuc", "voi", "ce", "trc", "stain", "rec", "dir", "run",
	"mod", "echo", "flip", "inv", "mt", "part", "proc", "hemi", "space", "split", "recording",
	"chunk", "seg", "res", "den", "label", "desc",
];

/// A dataset row: the subject and, optionally, the session an item belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
	pub subject: String,
	pub session: Option<String>,
}

impl Row {
	pub fn new(subject: impl Into<String>, session: Option<String>) -> Self {
		Row {
			subject: subject.into(),
			session,
		}
	}

	/// Directory of this row relative to the dataset root, e.g. `sub-1/ses-1`.
	pub fn session_dir(&self) -> PathBuf {
		let mut dir = PathBuf::from(format!("sub-{}", self.subject));
		if let Some(ref session) = self.session {
			dir.push(format!("ses-{}", session));
		}
		dir
	}

	fn prefix(&self) -> Vec<String> {
		let mut parts = vec![format!("sub-{}", self.subject)];
		if let Some(ref session) = self.session {
			parts.push(format!("ses-{}", session));
		}
		parts
	}
}

/// A logical dataset path such as `anat/T1w` or `func/bold/task=rest`.
///
/// The first segment is the BIDS datatype directory, the remaining plain
/// segment is the suffix and `key=value` segments are entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPath {
	logical: String,
	datatype: String,
	suffix: String,
	entities: Vec<(String, String)>,
}

impl BidsPath {
	/// Parse a logical path.
	pub fn parse(logical: &str) -> Result<Self> {
		let invalid = |reason: &str| SidecarError::InvalidBidsPath {
			path: logical.to_string(),
			reason: reason.to_string(),
		};

		let segments: Vec<&str> = logical.split('/').collect();
		if segments.len() < 2 {
			return Err(invalid("expected at least a datatype and a suffix"));
		}
		if segments.iter().any(|s| s.is_empty()) {
			return Err(invalid("empty path segment"));
		}

		let datatype = segments[0];
		if datatype.contains('=') {
			return Err(invalid("first segment must be a datatype"));
		}

		let mut suffix = None;
		let mut entities = Vec::new();

		for segment in &segments[1..] {
			match segment.split_once('=') {
				Some((key, value)) => {
					if !is_label(key) || !is_label(value) {
						return Err(invalid("entities must be alphanumeric key=value pairs"));
					}
					if key == "sub" || key == "ses" {
						return Err(invalid("subject and session come from the row"));
					}
					if entities.iter().any(|(k, _): &(String, String)| k == key) {
						return Err(invalid("duplicate entity"));
					}
					entities.push((key.to_string(), value.to_string()));
				}
				None => {
					if suffix.replace(*segment).is_some() {
						return Err(invalid("more than one suffix segment"));
					}
				}
			}
		}

		let suffix = suffix.ok_or_else(|| invalid("missing suffix"))?;

		// Canonical order first, unknown entities keep their written order.
		entities.sort_by_key(|(key, _)| {
			ENTITY_ORDER
				.iter()
				.position(|k| k == key)
				.unwrap_or(ENTITY_ORDER.len())
		});

		Ok(BidsPath {
			logical: logical.to_string(),
			datatype: datatype.to_string(),
			suffix: suffix.to_string(),
			entities,
		})
	}

	/// The logical path as written; this is what edit rules match against.
	pub fn logical(&self) -> &str {
		&self.logical
	}

	pub fn datatype(&self) -> &str {
		&self.datatype
	}

	pub fn suffix(&self) -> &str {
		&self.suffix
	}

	pub fn entities(&self) -> &[(String, String)] {
		&self.entities
	}

	/// Look up an entity value by key.
	pub fn entity(&self, key: &str) -> Option<&str> {
		self.entities
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}

	/// File name without extension, e.g. `sub-1_ses-1_task-rest_bold`.
	pub fn file_stem(&self, row: &Row) -> String {
		let mut parts = row.prefix();
		parts.extend(self.entities.iter().map(|(k, v)| format!("{k}-{v}")));
		parts.push(self.suffix.clone());
		parts.join("_")
	}

	/// Path of the data file relative to the row's session directory,
	/// e.g. `func/sub-1_ses-1_task-rest_bold.nii`. This is the form
	/// `IntendedFor` fields refer to.
	pub fn relative_file(&self, row: &Row, ext: &str) -> String {
		let ext = ext.trim_start_matches('.');
		if ext.is_empty() {
			format!("{}/{}", self.datatype, self.file_stem(row))
		} else {
			format!("{}/{}.{}", self.datatype, self.file_stem(row), ext)
		}
	}

	/// Path of the data file relative to the dataset root.
	pub fn dataset_file(&self, row: &Row, ext: &str) -> PathBuf {
		row.session_dir().join(self.relative_file(row, ext))
	}

	/// Sidecar fields BIDS requires for this kind of item.
	///
	/// Functional runs must name their task, so a `task` entity yields `TaskName`.
	pub fn implied_metadata(&self) -> Map<String, Value> {
		let mut metadata = Map::new();
		if let Some(task) = self.entity("task") {
			metadata.insert("TaskName".to_string(), Value::String(task.to_string()));
		}
		metadata
	}
}

impl FromStr for BidsPath {
	type Err = SidecarError;

	fn from_str(s: &str) -> Result<Self> {
		BidsPath::parse(s)
	}
}

impl fmt::Display for BidsPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.logical)
	}
}

fn is_label(s: &str) -> bool {
	!s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// The JSON sidecar that sits beside `data_file`: every extension is replaced
/// by `.json` (`x.nii.gz` -> `x.json`). A path already ending in `.json` is
/// returned unchanged.
pub fn sidecar_path(data_file: &Path) -> PathBuf {
	if data_file.extension().is_some_and(|ext| ext == "json") {
		return data_file.to_path_buf();
	}

	let name = data_file
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	let stem = match name.find('.') {
		Some(0) | None => name.as_str(),
		Some(idx) => &name[..idx],
	};

	data_file.with_file_name(format!("{stem}.json"))
}
