use crate::bids::{BidsPath, Row};
use crate::edits::rule::EditRuleSet;
use crate::error::{Result, SidecarError};
use crate::script::{Placeholders, Script, substitute_placeholders};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Apply every rule matching `item_path` to `document`, in declaration order.
///
/// Each matching rule's script receives the output of the previous one. A set
/// with no matching rule returns the document unchanged.
pub fn apply_edits(item_path: &str, document: Value, rules: &EditRuleSet) -> Result<Value> {
	apply_edits_with(item_path, document, rules, &Placeholders::new())
}

/// [`apply_edits`] with `{name}` placeholders substituted into each script
/// before it is compiled.
pub fn apply_edits_with(
	item_path: &str,
	document: Value,
	rules: &EditRuleSet,
	placeholders: &Placeholders,
) -> Result<Value> {
	let mut document = document;

	for rule in rules.matching(item_path) {
		let source = substitute_placeholders(&rule.script, placeholders);
		let script = Script::compile(&source)?;

		debug!(
			item_path,
			pattern = rule.pattern.as_str(),
			script = script.source(),
			"applying sidecar edit"
		);
		document = script.run(item_path, document)?;
	}

	Ok(document)
}

/// Result of editing one sidecar file.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
	/// The sidecar file.
	pub path: PathBuf,

	/// The document after all edits.
	pub document: Value,

	/// Number of rules whose pattern matched the item path.
	pub rules_applied: usize,

	/// Whether the file was rewritten.
	pub written: bool,
}

/// Read `sidecar`, apply the rules matching `item_path` and write the result
/// back to the same file.
///
/// The file is left untouched when no rule matches.
pub fn edit_sidecar(
	sidecar: &Path,
	item_path: &str,
	rules: &EditRuleSet,
	placeholders: &Placeholders,
) -> Result<EditOutcome> {
	let original = read_document(sidecar)?;
	let rules_applied = rules.matching(item_path).count();

	if rules_applied == 0 {
		debug!(item_path, path = %sidecar.display(), "no edit rule matches");
		return Ok(EditOutcome {
			path: sidecar.to_path_buf(),
			document: original,
			rules_applied,
			written: false,
		});
	}

	let document = apply_edits_with(item_path, original, rules, placeholders)?;
	write_document(sidecar, &document)?;

	Ok(EditOutcome {
		path: sidecar.to_path_buf(),
		document,
		rules_applied,
		written: true,
	})
}

/// Another item of the same row that scripts may refer to as `{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
	pub name: String,
	pub path: BidsPath,
}

impl ItemRef {
	pub fn new(name: impl Into<String>, path: BidsPath) -> Self {
		ItemRef {
			name: name.into(),
			path,
		}
	}
}

/// Edits sidecars as items are written into a BIDS dataset.
///
/// On top of the edit rules, the editor fills in metadata BIDS derives from
/// the item path (e.g. `TaskName`) and resolves `{name}` placeholders to the
/// file names of other items in the same row.
#[derive(Debug, Clone)]
pub struct SidecarEditor {
	rules: EditRuleSet,

	/// Extension used when resolving placeholder file names.
	extension: String,
}

impl SidecarEditor {
	pub fn new(rules: EditRuleSet) -> Self {
		SidecarEditor {
			rules,
			extension: "nii".to_string(),
		}
	}

	/// Set the data file extension used in resolved placeholders.
	pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
		self.extension = extension.into();
		self
	}

	pub fn rules(&self) -> &EditRuleSet {
		&self.rules
	}

	/// Map each reference name to its file path relative to the row's session
	/// directory. Without a row, references resolve to their logical path.
	pub fn placeholders(&self, row: Option<&Row>, refs: &[ItemRef]) -> Placeholders {
		refs.iter()
			.map(|item| {
				let value = match row {
					Some(row) => item.path.relative_file(row, &self.extension),
					None => item.path.logical().to_string(),
				};
				(item.name.clone(), value)
			})
			.collect()
	}

	/// Compute the ingested form of `document` without touching the filesystem.
	pub fn prepare(
		&self,
		item: &BidsPath,
		row: Option<&Row>,
		refs: &[ItemRef],
		document: Value,
	) -> Result<Value> {
		let mut document = document;

		if let Value::Object(ref mut fields) = document {
			for (key, value) in item.implied_metadata() {
				fields.entry(key).or_insert(value);
			}
		}

		let placeholders = self.placeholders(row, refs);
		apply_edits_with(item.logical(), document, &self.rules, &placeholders)
	}

	/// Read, prepare and rewrite the sidecar of `item`.
	///
	/// The file is only rewritten when its content changes.
	pub fn ingest(
		&self,
		sidecar: &Path,
		item: &BidsPath,
		row: Option<&Row>,
		refs: &[ItemRef],
	) -> Result<EditOutcome> {
		let (original, mut outcome) = self.edit(sidecar, item, row, refs)?;

		if outcome.document != original {
			write_document(sidecar, &outcome.document)?;
			outcome.written = true;
			info!(item_path = item.logical(), path = %sidecar.display(), "sidecar updated");
		}

		Ok(outcome)
	}

	/// Like [`SidecarEditor::ingest`] but never writes.
	pub fn preview(
		&self,
		sidecar: &Path,
		item: &BidsPath,
		row: Option<&Row>,
		refs: &[ItemRef],
	) -> Result<EditOutcome> {
		self.edit(sidecar, item, row, refs).map(|(_, outcome)| outcome)
	}

	fn edit(
		&self,
		sidecar: &Path,
		item: &BidsPath,
		row: Option<&Row>,
		refs: &[ItemRef],
	) -> Result<(Value, EditOutcome)> {
		let original = read_document(sidecar)?;
		let rules_applied = self.rules.matching(item.logical()).count();
		let document = self.prepare(item, row, refs, original.clone())?;

		let outcome = EditOutcome {
			path: sidecar.to_path_buf(),
			document,
			rules_applied,
			written: false,
		};
		Ok((original, outcome))
	}
}

/// Read and parse a sidecar file.
pub fn read_document(path: &Path) -> Result<Value> {
	let content = std::fs::read_to_string(path).map_err(|source| SidecarError::SidecarReadError {
		path: path.to_path_buf(),
		source,
	})?;

	serde_json::from_str(&content).map_err(|source| SidecarError::SidecarParseError {
		path: path.to_path_buf(),
		source,
	})
}

/// Serialize `document` as pretty JSON, overwriting `path`.
pub fn write_document(path: &Path, document: &Value) -> Result<()> {
	let write_error = |source| SidecarError::SidecarWriteError {
		path: path.to_path_buf(),
		source,
	};

	let mut content = serde_json::to_string_pretty(document)
		.map_err(|e| write_error(std::io::Error::other(e)))?;
	content.push('\n');

	std::fs::write(path, content).map_err(write_error)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn rules(pairs: &[(&str, &str)]) -> EditRuleSet {
		EditRuleSet::new(pairs.iter().copied()).unwrap()
	}

	fn row() -> Row {
		Row::new("1", Some("1".to_string()))
	}

	#[test]
	fn test_basic_edit() {
		let set = rules(&[("anat/T.*w", ".a.b += 4")]);
		let out = apply_edits("anat/T1w", json!({"a": {"b": 1.0}}), &set).unwrap();
		assert_eq!(out, json!({"a": {"b": 5.0}}));
	}

	#[test]
	fn test_multiple_updates_in_one_script() {
		let set = rules(&[("anat/T.*w", ".a.b += 4 | .a.c[] *= 2")]);
		let out = apply_edits(
			"anat/T1w",
			json!({"a": {"b": 1.0, "c": [2, 4, 6]}}),
			&set,
		)
		.unwrap();
		assert_eq!(out, json!({"a": {"b": 5.0, "c": [4, 8, 12]}}));
	}

	#[test]
	fn test_non_matching_rule_is_identity() {
		let set = rules(&[("fmap/.*", ".IntendedFor = \"x\"")]);
		let doc = json!({"a": 1});
		let out = apply_edits("anat/T1w", doc.clone(), &set).unwrap();
		assert_eq!(out, doc);
	}

	#[test]
	fn test_rules_compose_in_order() {
		let set = rules(&[("anat/.*", ".a = 2"), ("T1w", ".a *= 10"), ("anat/T1w", ".b = .a")]);
		let out = apply_edits("anat/T1w", json!({}), &set).unwrap();
		assert_eq!(out, json!({"a": 20, "b": 20}));
	}

	#[test]
	fn test_reapplying_is_not_idempotent() {
		let set = rules(&[("anat", ".n += 1")]);
		let once = apply_edits("anat/T1w", json!({"n": 0}), &set).unwrap();
		let twice = apply_edits("anat/T1w", once, &set).unwrap();
		assert_eq!(twice, json!({"n": 2}));
	}

	#[test]
	fn test_script_error_propagates() {
		let set = rules(&[("anat", ".a +=")]);
		let err = apply_edits("anat/T1w", json!({}), &set).unwrap_err();
		assert!(err.is_script_error());
	}

	#[test]
	fn test_bad_script_ignored_when_not_matching() {
		let set = rules(&[("fmap", ".a +=")]);
		assert!(apply_edits("anat/T1w", json!({}), &set).is_ok());
	}

	#[test]
	fn test_placeholders_substituted() {
		let set = rules(&[("fmap/.*", r#".IntendedFor = "{bold}""#)]);
		let mut placeholders = Placeholders::new();
		placeholders.insert("bold".to_string(), "func/bold.nii".to_string());

		let out = apply_edits_with("fmap/magnitude1", json!({}), &set, &placeholders).unwrap();
		assert_eq!(out, json!({"IntendedFor": "func/bold.nii"}));
	}

	#[test]
	fn test_edit_sidecar_rewrites_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("t1w.json");
		std::fs::write(&path, r#"{"a": {"b": 1.0}}"#).unwrap();

		let set = rules(&[("anat/T.*w", ".a.b += 4")]);
		let outcome = edit_sidecar(&path, "anat/T1w", &set, &Placeholders::new()).unwrap();

		assert!(outcome.written);
		assert_eq!(outcome.rules_applied, 1);
		let saved = read_document(&path).unwrap();
		assert_eq!(saved, json!({"a": {"b": 5.0}}));
	}

	#[test]
	fn test_edit_sidecar_leaves_unmatched_file_alone() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("dwi.json");
		std::fs::write(&path, "{\"test\":\"json-file\"}").unwrap();

		let set = rules(&[("anat/T.*w", ".a.b += 4")]);
		let outcome = edit_sidecar(&path, "dwi/dwi", &set, &Placeholders::new()).unwrap();

		assert!(!outcome.written);
		assert_eq!(
			std::fs::read_to_string(&path).unwrap(),
			"{\"test\":\"json-file\"}"
		);
	}

	#[test]
	fn test_edit_sidecar_invalid_json() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bad.json");
		std::fs::write(&path, "{not json").unwrap();

		let set = rules(&[("anat", ".")]);
		let err = edit_sidecar(&path, "anat/T1w", &set, &Placeholders::new()).unwrap_err();
		assert!(matches!(err, SidecarError::SidecarParseError { .. }));
	}

	#[test]
	fn test_edit_sidecar_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let set = rules(&[("anat", ".")]);
		let err = edit_sidecar(
			&dir.path().join("missing.json"),
			"anat/T1w",
			&set,
			&Placeholders::new(),
		)
		.unwrap_err();
		assert!(matches!(err, SidecarError::SidecarReadError { .. }));
	}

	#[test]
	fn test_editor_fmap_intended_for() {
		let editor = SidecarEditor::new(rules(&[("fmap/.*", r#".IntendedFor = "{bold}""#)]));
		let bold = BidsPath::parse("func/bold/task=rest").unwrap();
		let refs = vec![ItemRef::new("bold", bold.clone())];

		for fmap in ["fmap/magnitude1", "fmap/magnitude2", "fmap/phasediff"] {
			let item = BidsPath::parse(fmap).unwrap();
			let out = editor.prepare(&item, Some(&row()), &refs, json!({})).unwrap();
			assert_eq!(
				out,
				json!({"IntendedFor": "func/sub-1_ses-1_task-rest_bold.nii"})
			);
		}

		let out = editor.prepare(&bold, Some(&row()), &refs, json!({})).unwrap();
		assert_eq!(out, json!({"TaskName": "rest"}));
	}

	#[test]
	fn test_editor_keeps_existing_task_name() {
		let editor = SidecarEditor::new(EditRuleSet::default());
		let bold = BidsPath::parse("func/bold/task=rest").unwrap();
		let out = editor
			.prepare(&bold, None, &[], json!({"TaskName": "resting state"}))
			.unwrap();
		assert_eq!(out, json!({"TaskName": "resting state"}));
	}

	#[test]
	fn test_placeholders_without_row_use_logical_path() {
		let editor = SidecarEditor::new(EditRuleSet::default()).with_extension("nii.gz");
		let refs = vec![ItemRef::new(
			"bold",
			BidsPath::parse("func/bold/task=rest").unwrap(),
		)];

		let without_row = editor.placeholders(None, &refs);
		assert_eq!(without_row["bold"], "func/bold/task=rest");

		let with_row = editor.placeholders(Some(&row()), &refs);
		assert_eq!(with_row["bold"], "func/sub-1_ses-1_task-rest_bold.nii.gz");
	}

	#[test]
	fn test_ingest_writes_only_on_change() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bold.json");
		std::fs::write(&path, "{}").unwrap();

		let editor = SidecarEditor::new(EditRuleSet::default());
		let bold = BidsPath::parse("func/bold/task=rest").unwrap();

		let first = editor.ingest(&path, &bold, Some(&row()), &[]).unwrap();
		assert!(first.written);
		assert_eq!(read_document(&path).unwrap(), json!({"TaskName": "rest"}));

		let second = editor.ingest(&path, &bold, Some(&row()), &[]).unwrap();
		assert!(!second.written);
	}

	#[test]
	fn test_preview_does_not_write() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("t1w.json");
		std::fs::write(&path, "{}").unwrap();

		let editor = SidecarEditor::new(rules(&[("anat", ".Checked = true")]));
		let item = BidsPath::parse("anat/T1w").unwrap();
		let outcome = editor.preview(&path, &item, None, &[]).unwrap();

		assert_eq!(outcome.document, json!({"Checked": true}));
		assert_eq!(outcome.rules_applied, 1);
		assert!(!outcome.written);
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
	}
}
