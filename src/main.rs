use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bids_sidecar::bids::{BidsPath, Row, sidecar_path};
use bids_sidecar::config::{
	CONFIG_FILE_NAME, LoadedConfig, discover_configs, init_template, load_merged_config,
	merge_configs, parse_config_file, user_config_path,
};
use bids_sidecar::edits::{
	EditOutcome, EditRuleSet, ItemRef, SidecarEditor, apply_edits, compile_rule_set, edit_sidecar,
};
use bids_sidecar::script::{Placeholders, Script};

#[derive(Parser)]
#[command(name = "bids-sidecar")]
#[command(
	author,
	version,
	about = "Rule-driven jq editing of BIDS JSON sidecar files"
)]
#[command(arg_required_else_help = true)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Create a template .bids-sidecar.toml in the current directory
	#[arg(long)]
	init: bool,

	/// Overwrite existing .bids-sidecar.toml when using --init
	#[arg(long, requires = "init")]
	force: bool,

	/// Increase log verbosity (-v info, -vv debug); BIDS_SIDECAR_LOG overrides
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
	/// Apply matching edit rules to an item's JSON sidecar
	Edit(EditArgs),

	/// Run a jq script against a JSON file (or stdin) and print the first result
	Eval {
		/// jq script
		script: String,

		/// JSON file to read; stdin when omitted
		file: Option<PathBuf>,
	},

	/// Print the BIDS file names of a logical item path
	Resolve {
		/// Logical item path, e.g. func/bold/task=rest
		path: String,

		#[command(flatten)]
		row: RowArgs,

		/// Data file extension
		#[arg(long, default_value = "nii")]
		ext: String,
	},

	/// Configuration management commands
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(clap::Args)]
struct EditArgs {
	/// Sidecar JSON file, or the data file it sits beside
	file: PathBuf,

	/// Logical dataset path of the item, e.g. anat/T1w
	#[arg(long = "path", value_name = "LOGICAL_PATH")]
	item_path: String,

	/// Extra edit rule, applied after configured rules
	#[arg(
		long = "edit",
		num_args = 2,
		value_names = ["PATTERN", "SCRIPT"],
		allow_hyphen_values = true
	)]
	edits: Vec<String>,

	/// Additional config file, applied after discovered configs
	#[arg(long = "config", value_name = "FILE")]
	configs: Vec<PathBuf>,

	/// Don't discover .bids-sidecar.toml files
	#[arg(long)]
	no_config: bool,

	#[command(flatten)]
	row: OptionalRowArgs,

	/// Another item of the row, usable as {NAME} in scripts
	#[arg(long = "ref", value_name = "NAME=LOGICAL_PATH", value_parser = parse_ref)]
	refs: Vec<(String, String)>,

	/// Data file extension used when resolving {NAME} references
	#[arg(long, default_value = "nii")]
	ext: String,

	/// Print the edited sidecar instead of writing it
	#[arg(long)]
	dry_run: bool,
}

#[derive(clap::Args)]
struct RowArgs {
	/// Subject label (without the sub- prefix)
	#[arg(long)]
	subject: String,

	/// Session label (without the ses- prefix)
	#[arg(long)]
	session: Option<String>,
}

#[derive(clap::Args)]
struct OptionalRowArgs {
	/// Subject label (without the sub- prefix)
	#[arg(long)]
	subject: Option<String>,

	/// Session label (without the ses- prefix)
	#[arg(long, requires = "subject")]
	session: Option<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Display discovered configuration files and their edit rules
	Show,
	/// Check all config files, patterns and scripts without editing anything
	Validate,
}

fn parse_ref(s: &str) -> std::result::Result<(String, String), String> {
	match s.split_once('=') {
		Some((name, path)) if !name.is_empty() && !path.is_empty() => {
			Ok((name.to_string(), path.to_string()))
		}
		_ => Err(format!("expected NAME=LOGICAL_PATH, got `{s}`")),
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	match run(cli) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::FAILURE
		}
	}
}

fn init_tracing(verbose: u8) {
	let default_level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_env("BIDS_SIDECAR_LOG")
		.unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();
}

fn run(cli: Cli) -> Result<ExitCode> {
	// Handle --init
	if cli.init {
		return handle_init(cli.force);
	}

	// Handle subcommands
	if let Some(command) = cli.command {
		return match command {
			Commands::Edit(args) => handle_edit(args),
			Commands::Eval { script, file } => handle_eval(&script, file.as_deref()),
			Commands::Resolve { path, row, ext } => handle_resolve(&path, row, &ext),
			Commands::Config { action } => match action {
				ConfigAction::Show => handle_config_show(),
				ConfigAction::Validate => handle_config_validate(),
			},
		};
	}

	// No command specified - this shouldn't happen due to arg_required_else_help
	Ok(ExitCode::SUCCESS)
}

fn handle_init(force: bool) -> Result<ExitCode> {
	let config_path = PathBuf::from(CONFIG_FILE_NAME);

	if config_path.exists() && !force {
		anyhow::bail!("{CONFIG_FILE_NAME} already exists. Use --force to overwrite.");
	}

	std::fs::write(&config_path, init_template())
		.with_context(|| format!("Failed to write {}", config_path.display()))?;

	println!("Created {CONFIG_FILE_NAME}");
	Ok(ExitCode::SUCCESS)
}

fn handle_edit(args: EditArgs) -> Result<ExitCode> {
	let rules = load_rules(&args)?;
	let sidecar = sidecar_path(&args.file);

	let row = args
		.row
		.subject
		.as_ref()
		.map(|subject| Row::new(subject.clone(), args.row.session.clone()));

	let refs = args
		.refs
		.iter()
		.map(|(name, path)| {
			let path = BidsPath::parse(path)
				.with_context(|| format!("Invalid --ref path for {name}"))?;
			Ok(ItemRef::new(name.clone(), path))
		})
		.collect::<Result<Vec<_>>>()?;

	let outcome = match BidsPath::parse(&args.item_path) {
		Ok(item) => {
			let editor = SidecarEditor::new(rules).with_extension(args.ext.clone());
			if args.dry_run {
				editor.preview(&sidecar, &item, row.as_ref(), &refs)
			} else {
				editor.ingest(&sidecar, &item, row.as_ref(), &refs)
			}
		}
		// Plain rule application still works for paths outside the BIDS layout.
		Err(e) if refs.is_empty() && row.is_none() => {
			warn!("{e}; applying edit rules without BIDS naming");
			if args.dry_run {
				let document = read_json(&sidecar)?;
				let rules_applied = rules.matching(&args.item_path).count();
				apply_edits(&args.item_path, document, &rules).map(|document| {
					EditOutcome {
						path: sidecar.clone(),
						document,
						rules_applied,
						written: false,
					}
				})
			} else {
				edit_sidecar(&sidecar, &args.item_path, &rules, &Placeholders::new())
			}
		}
		Err(e) => return Err(e).context("Invalid --path"),
	}
	.with_context(|| format!("Failed to edit {}", sidecar.display()))?;

	if args.dry_run {
		println!("{}", serde_json::to_string_pretty(&outcome.document)?);
	} else if outcome.written {
		println!(
			"Updated {} ({} rules applied)",
			outcome.path.display(),
			outcome.rules_applied
		);
	} else {
		println!("Unchanged {}", outcome.path.display());
	}

	Ok(ExitCode::SUCCESS)
}

/// Discovered config rules first, then --config files, then --edit pairs.
fn load_rules(args: &EditArgs) -> Result<EditRuleSet> {
	let mut rules = EditRuleSet::default();

	if !args.no_config {
		let cwd = std::env::current_dir().context("Failed to get current directory")?;
		let merged = load_merged_config(&cwd).context("Failed to load configuration")?;
		rules.extend(compile_rule_set(&merged).context("Failed to compile edit rules")?);
	}

	for path in &args.configs {
		let config = parse_config_file(path)
			.with_context(|| format!("Failed to load {}", path.display()))?;
		let merged = merge_configs(&[LoadedConfig {
			config,
			path: path.clone(),
		}]);
		rules.extend(
			compile_rule_set(&merged)
				.with_context(|| format!("Failed to compile edit rules in {}", path.display()))?,
		);
	}

	let pairs = args
		.edits
		.chunks_exact(2)
		.map(|pair| (pair[0].as_str(), pair[1].clone()));
	rules.extend(EditRuleSet::new(pairs).context("Invalid --edit rule")?);

	Ok(rules)
}

fn handle_eval(script: &str, file: Option<&Path>) -> Result<ExitCode> {
	let document = match file {
		Some(path) => read_json(path)?,
		None => {
			let mut content = String::new();
			std::io::stdin()
				.read_to_string(&mut content)
				.context("Failed to read stdin")?;
			serde_json::from_str(&content).context("stdin is not valid JSON")?
		}
	};

	let script = Script::compile(script)?;
	let output = script.run("<eval>", document)?;
	println!("{}", serde_json::to_string_pretty(&output)?);

	Ok(ExitCode::SUCCESS)
}

fn handle_resolve(path: &str, row: RowArgs, ext: &str) -> Result<ExitCode> {
	let item = BidsPath::parse(path)?;
	let row = Row::new(row.subject, row.session);

	let data_file = item.dataset_file(&row, ext);
	println!("data: {}", data_file.display());
	println!("sidecar: {}", sidecar_path(&data_file).display());
	println!("relative: {}", item.relative_file(&row, ext));

	for (key, value) in item.implied_metadata() {
		println!("{key}: {value}");
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_config_show() -> Result<ExitCode> {
	let cwd = std::env::current_dir().context("Failed to get current directory")?;
	let configs = discover_configs(&cwd).context("Failed to discover config files")?;

	if configs.is_empty() {
		println!("No configuration files found.");
		return Ok(ExitCode::SUCCESS);
	}

	println!("Configuration files (in cascade order):\n");

	for loaded in &configs {
		println!("# Source: {}", loaded.path.display());
		println!("# root: {}", loaded.config.root);
		println!("# no-user-config: {}", loaded.config.no_user_config);
		println!("# edits: {}", loaded.config.edits.len());
		println!();

		for (i, rule) in loaded.config.edits.iter().enumerate() {
			println!("  Edit {}:", i + 1);
			println!("    path: {}", rule.path);
			println!("    script: {}", rule.script);
			println!();
		}
	}

	// Show user config path
	if let Ok(user_path) = user_config_path() {
		println!("User config path: {}", user_path.display());
		if user_path.exists() {
			println!("  (exists)");
		} else {
			println!("  (not found)");
		}
	}

	Ok(ExitCode::SUCCESS)
}

fn handle_config_validate() -> Result<ExitCode> {
	let cwd = std::env::current_dir().context("Failed to get current directory")?;

	let configs = match discover_configs(&cwd) {
		Ok(configs) => configs,
		Err(e) => {
			eprintln!("Configuration error: {}", e);
			return Ok(ExitCode::FAILURE);
		}
	};

	if configs.is_empty() {
		println!("No configuration files found.");
		return Ok(ExitCode::SUCCESS);
	}

	let mut valid = true;
	for loaded in &configs {
		let merged = merge_configs(std::slice::from_ref(loaded));
		let checked = compile_rule_set(&merged).and_then(|rules| rules.check_scripts());
		if let Err(e) = checked {
			eprintln!("Configuration error in {}: {}", loaded.path.display(), e);
			valid = false;
		}
	}

	if !valid {
		return Ok(ExitCode::FAILURE);
	}

	println!("All configuration files are valid:");
	for loaded in &configs {
		println!(
			"  {} ({} edits)",
			loaded.path.display(),
			loaded.config.edits.len()
		);
	}
	Ok(ExitCode::SUCCESS)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("Failed to read {}", path.display()))?;
	serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}
