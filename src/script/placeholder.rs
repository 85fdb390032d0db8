use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Values substituted for `{name}` placeholders in jq scripts.
pub type Placeholders = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Replace every `{name}` whose name is a key of `placeholders`.
///
/// Unknown names are left as written, since `{name}` is also jq object
/// construction shorthand.
pub fn substitute_placeholders(script: &str, placeholders: &Placeholders) -> String {
	if placeholders.is_empty() {
		return script.to_string();
	}

	PLACEHOLDER
		.replace_all(script, |caps: &Captures| match placeholders.get(&caps[1]) {
			Some(value) => value.clone(),
			None => caps[0].to_string(),
		})
		.into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn placeholders(pairs: &[(&str, &str)]) -> Placeholders {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_substitute_known_name() {
		let p = placeholders(&[("bold", "func/sub-1_ses-1_task-rest_bold.nii")]);
		assert_eq!(
			substitute_placeholders(r#".IntendedFor = "{bold}""#, &p),
			r#".IntendedFor = "func/sub-1_ses-1_task-rest_bold.nii""#
		);
	}

	#[test]
	fn test_unknown_name_left_alone() {
		let p = placeholders(&[("bold", "x")]);
		assert_eq!(substitute_placeholders(". + {a}", &p), ". + {a}");
	}

	#[test]
	fn test_repeated_placeholder() {
		let p = placeholders(&[("t1", "anat/T1w.nii")]);
		assert_eq!(
			substitute_placeholders(r#"[ "{t1}", "{t1}" ]"#, &p),
			r#"[ "anat/T1w.nii", "anat/T1w.nii" ]"#
		);
	}

	#[test]
	fn test_no_placeholders() {
		let p = Placeholders::new();
		assert_eq!(substitute_placeholders(".a.b += 4", &p), ".a.b += 4");
	}

	#[test]
	fn test_object_literal_not_touched() {
		let p = placeholders(&[("bold", "x")]);
		assert_eq!(
			substitute_placeholders(". + {Units: \"s\"}", &p),
			". + {Units: \"s\"}"
		);
	}
}
