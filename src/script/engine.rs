use crate::error::{Result, SidecarError};
use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Filter, Native, RcIter};
use jaq_json::Val;
use serde_json::Value;
use std::fmt;

/// A compiled jq script.
pub struct Script {
	/// The script source, after placeholder substitution.
	source: String,

	filter: Filter<Native<Val>>,
}

impl Script {
	/// Parse and compile a jq script.
	///
	/// Fails with [`SidecarError::ScriptParse`] on syntax errors and on
	/// references to undefined filters or variables.
	pub fn compile(source: &str) -> Result<Self> {
		let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
		let arena = Arena::default();
		let program = File {
			code: source,
			path: (),
		};

		let modules = loader
			.load(&arena, program)
			.map_err(|errs| parse_error(source, errs))?;

		let filter = Compiler::default()
			.with_funs(jaq_std::funs().chain(jaq_json::funs()))
			.compile(modules)
			.map_err(|errs| parse_error(source, errs))?;

		Ok(Script {
			source: source.to_string(),
			filter,
		})
	}

	/// The source text this script was compiled from.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Run the script with `document` as input and return its first output.
	///
	/// `item_path` is only used to label errors.
	pub fn run(&self, item_path: &str, document: Value) -> Result<Value> {
		let inputs = RcIter::new(core::iter::empty());
		let mut outputs = self
			.filter
			.run((Ctx::new([], &inputs), Val::from(document)));

		match outputs.next() {
			Some(Ok(value)) => Ok(Value::from(value)),
			Some(Err(err)) => Err(SidecarError::ScriptEval {
				script: self.source.clone(),
				item_path: item_path.to_string(),
				message: err.to_string(),
			}),
			None => Err(SidecarError::ScriptNoOutput {
				script: self.source.clone(),
				item_path: item_path.to_string(),
			}),
		}
	}
}

impl fmt::Debug for Script {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Script")
			.field("source", &self.source)
			.finish_non_exhaustive()
	}
}

/// Flatten loader/compiler errors into a single message.
fn parse_error<F, E: fmt::Debug>(source: &str, errs: Vec<(F, E)>) -> SidecarError {
	let message = errs
		.iter()
		.map(|(_, err)| format!("{err:?}"))
		.collect::<Vec<_>>()
		.join("; ");

	SidecarError::ScriptParse {
		script: source.to_string(),
		message,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn run(script: &str, input: Value) -> Result<Value> {
		Script::compile(script)?.run("anat/T1w", input)
	}

	#[test]
	fn test_update_assignment_on_float() {
		let out = run(".a.b += 4", json!({"a": {"b": 1.0}})).unwrap();
		assert_eq!(out, json!({"a": {"b": 5.0}}));
	}

	#[test]
	fn test_piped_updates() {
		let out = run(
			".a.b += 4 | .a.c[] *= 2",
			json!({"a": {"b": 1.0, "c": [2, 4, 6]}}),
		)
		.unwrap();
		assert_eq!(out, json!({"a": {"b": 5.0, "c": [4, 8, 12]}}));
	}

	#[test]
	fn test_assignment_creates_missing_key() {
		let out = run(r#".IntendedFor = "func/bold.nii""#, json!({})).unwrap();
		assert_eq!(out, json!({"IntendedFor": "func/bold.nii"}));
	}

	#[test]
	fn test_integers_stay_integers() {
		let out = run(".n += 4", json!({"n": 1})).unwrap();
		assert_eq!(out, json!({"n": 5}));
	}

	#[test]
	fn test_std_definitions_available() {
		let out = run(".xs |= map(. + 1)", json!({"xs": [1, 2]})).unwrap();
		assert_eq!(out, json!({"xs": [2, 3]}));

		let out = run("del(.drop)", json!({"keep": 1, "drop": 2})).unwrap();
		assert_eq!(out, json!({"keep": 1}));
	}

	#[test]
	fn test_first_output_is_kept() {
		let out = run(".[]", json!([1, 2, 3])).unwrap();
		assert_eq!(out, json!(1));
	}

	#[test]
	fn test_syntax_error() {
		let err = Script::compile(".a.b +=").unwrap_err();
		assert!(err.is_script_error());
		match err {
			SidecarError::ScriptParse { script, .. } => assert_eq!(script, ".a.b +="),
			other => panic!("Expected ScriptParse error, got {other:?}"),
		}
	}

	#[test]
	fn test_undefined_filter() {
		let err = Script::compile("no_such_filter").unwrap_err();
		assert!(matches!(err, SidecarError::ScriptParse { .. }));
	}

	#[test]
	fn test_evaluation_error() {
		let err = run(".a += 1", json!({"a": "text"})).unwrap_err();
		match err {
			SidecarError::ScriptEval { item_path, .. } => assert_eq!(item_path, "anat/T1w"),
			other => panic!("Expected ScriptEval error, got {other:?}"),
		}
	}

	#[test]
	fn test_empty_output() {
		let err = run("empty", json!({})).unwrap_err();
		assert!(matches!(err, SidecarError::ScriptNoOutput { .. }));
	}
}
