use crate::config::types::{MergedConfig, RuleWithSource};
use crate::error::{Result, SidecarError};
use crate::script::Script;
use regex::Regex;
use std::path::PathBuf;

/// A compiled path rule: documents whose item path matches `pattern` are
/// transformed by `script`.
#[derive(Debug, Clone)]
pub struct PathRule {
	/// Compiled path pattern (search semantics).
	pub pattern: Regex,

	/// jq script applied to matching documents.
	pub script: String,

	/// Config file the rule came from, if any (for display).
	pub source: Option<PathBuf>,
}

impl PathRule {
	/// Compile a rule from a pattern and a script.
	pub fn new(pattern: &str, script: impl Into<String>) -> Result<Self> {
		Ok(PathRule {
			pattern: compile_pattern(pattern)?,
			script: script.into(),
			source: None,
		})
	}

	/// Record the config file this rule was loaded from.
	pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
		self.source = Some(source.into());
		self
	}

	/// Compile a rule loaded from a config file.
	pub fn from_rule_with_source(rws: &RuleWithSource) -> Result<Self> {
		Ok(PathRule::new(&rws.rule.path, rws.rule.script.clone())?.with_source(&rws.source))
	}

	/// Check if this rule applies to the given item path.
	pub fn matches(&self, item_path: &str) -> bool {
		self.pattern.is_match(item_path)
	}
}

/// Compile a path pattern string.
fn compile_pattern(pattern: &str) -> Result<Regex> {
	Regex::new(pattern).map_err(|source| SidecarError::InvalidPattern {
		pattern: pattern.to_string(),
		source,
	})
}

/// Ordered sequence of path rules.
///
/// Every pattern is compiled on construction, so an invalid regex surfaces
/// before any item is processed.
#[derive(Debug, Clone, Default)]
pub struct EditRuleSet {
	rules: Vec<PathRule>,
}

impl EditRuleSet {
	/// Compile `(pattern, script)` pairs, keeping their order.
	pub fn new<I, P, S>(rules: I) -> Result<Self>
	where
		I: IntoIterator<Item = (P, S)>,
		P: AsRef<str>,
		S: Into<String>,
	{
		let rules = rules
			.into_iter()
			.map(|(pattern, script)| PathRule::new(pattern.as_ref(), script))
			.collect::<Result<Vec<_>>>()?;
		Ok(EditRuleSet { rules })
	}

	/// Build a set from already compiled rules.
	pub fn from_rules(rules: Vec<PathRule>) -> Self {
		EditRuleSet { rules }
	}

	/// Append the rules of `other` after this set's rules.
	pub fn extend(&mut self, other: EditRuleSet) {
		self.rules.extend(other.rules);
	}

	pub fn push(&mut self, rule: PathRule) {
		self.rules.push(rule);
	}

	pub fn rules(&self) -> &[PathRule] {
		&self.rules
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	/// Compile every script as written, without placeholder values, to catch
	/// syntax errors before any item is processed.
	pub fn check_scripts(&self) -> Result<()> {
		for rule in &self.rules {
			Script::compile(&rule.script)?;
		}
		Ok(())
	}

	/// All rules matching `item_path`, in declaration order.
	pub fn matching<'a>(&'a self, item_path: &'a str) -> impl Iterator<Item = &'a PathRule> + 'a {
		self.rules.iter().filter(move |rule| rule.matches(item_path))
	}
}

/// Compile all rules in a merged config, keeping cascade order.
pub fn compile_rule_set(config: &MergedConfig) -> Result<EditRuleSet> {
	config
		.rules
		.iter()
		.map(PathRule::from_rule_with_source)
		.collect::<Result<Vec<_>>>()
		.map(EditRuleSet::from_rules)
}
