use clap::{Arg, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rowsync::logging::{debug, info};
use rowsync::store::{MemoryStore, TableStore};
use rowsync::validation::Validator;
use rowsync::{AuditEntry, CellValue, Config, EditEvent, EngineContext, Router, TransferEngine};

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = match matches.get_one::<String>("config") {
		Some(path) => Config::load(Path::new(path))?,
		None => {
			let fallback = Path::new("rowsync.toml");
			if fallback.exists() {
				Config::load(fallback)?
			} else {
				Config::default()
			}
		}
	};
	config.apply_env_overrides()?;
	config.validate()?;
	Ok(config)
}

async fn load_store(path: &Path) -> Result<Arc<MemoryStore>, Box<dyn Error>> {
	let store = MemoryStore::load_json(path)
		.await
		.map_err(|e| format!("Cannot load store {}: {}", path.display(), e))?;
	Ok(Arc::new(store))
}

fn parse_index(matches: &ArgMatches, name: &str) -> Result<usize, Box<dyn Error>> {
	let raw = matches.get_one::<String>(name).ok_or_else(|| format!("{} argument required", name))?;
	let value: usize = raw.parse().map_err(|_| format!("{} must be a positive number, got '{}'", name, raw))?;
	if value == 0 {
		return Err(format!("{} is 1-based, got 0", name).into());
	}
	Ok(value)
}

fn print_entries(entries: &[AuditEntry]) -> Result<(), Box<dyn Error>> {
	for entry in entries {
		println!("{}", serde_json::to_string_pretty(entry)?);
	}
	Ok(())
}

fn print_summary(config: &Config) {
	println!("acting user: {}", config.acting_user);
	println!("lock: {} ms{}", config.lock.timeout_ms, match &config.lock.lock_file {
		Some(path) => format!(" (file {})", path.display()),
		None => String::new(),
	});
	println!("retry: {} attempt(s), {} ms initial delay", config.retry.max_attempts, config.retry.initial_delay_ms);
	for spec in &config.transfers {
		let trigger = match &spec.trigger {
			Some(t) => format!(" when column {} = '{}'", t.column, t.value),
			None => String::new(),
		};
		let dedup = if spec.active_duplicate_check().is_some() { ", duplicate-checked" } else { "" };
		println!("transfer {}: {} -> {}{}{}", spec.name, spec.source_table, spec.destination, trigger, dedup);
	}
	for pair in &config.syncs {
		println!(
			"sync {}: {} column {} <-> {} column {}",
			pair.name, pair.left.table, pair.left.field_column, pair.right.table, pair.right.field_column
		);
	}
}

async fn show_table(store: &MemoryStore, table: &str) -> Result<(), Box<dyn Error>> {
	let last_row = store.last_row(table).await?;
	let width = store.width(table).await?;
	if last_row == 0 || width == 0 {
		println!("{} is empty", table);
		return Ok(());
	}
	let rows = store.read_range(table, 1, 1, last_row, width).await?;
	for (i, row) in rows.iter().enumerate() {
		let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
		println!("{:>4}  {}", i + 1, cells.join("\t"));
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("rowsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Row transfer and field sync engine for tabular stores")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Configuration file (toml, json or json5)"),
		)
		.arg(
			Arg::new("store")
				.short('s')
				.long("store")
				.value_name("FILE")
				.default_value("tables.json")
				.help("JSON table store"),
		)
		.subcommand(Command::new("check").about("Validate the configuration and print a summary"))
		.subcommand(
			Command::new("transfer")
				.about("Run a named transfer for one source row")
				.arg(Arg::new("name").required(true))
				.arg(Arg::new("row").required(true)),
		)
		.subcommand(
			Command::new("edit")
				.about("Edit a cell and run every handler the edit triggers")
				.arg(Arg::new("table").required(true))
				.arg(Arg::new("row").required(true))
				.arg(Arg::new("column").required(true))
				.arg(Arg::new("value").required(true).help("Cell value; date:YYYY-MM-DD for dates, empty to clear")),
		)
		.subcommand(
			Command::new("show").about("Print a table").arg(Arg::new("table").required(true)),
		)
		.get_matches();

	let config = load_config(&matches)?;
	rowsync::logging::init_tracing(&config.log_level);

	let store_path = PathBuf::from(matches.get_one::<String>("store").ok_or("store argument required")?);

	if matches.subcommand_matches("check").is_some() {
		print_summary(&config);
		println!("configuration ok");
	} else if let Some(sub) = matches.subcommand_matches("transfer") {
		let name = sub.get_one::<String>("name").ok_or("transfer: name argument required")?;
		let row = parse_index(sub, "row")?;
		let store = load_store(&store_path).await?;
		let engine = TransferEngine::new(EngineContext::builder(config, store.clone()).build());

		let entry = engine.transfer_row(name, row).await;
		store.save_json(&store_path).await?;
		print_entries(&[entry])?;
	} else if let Some(sub) = matches.subcommand_matches("edit") {
		let table = sub.get_one::<String>("table").ok_or("edit: table argument required")?;
		let row = parse_index(sub, "row")?;
		let column = parse_index(sub, "column")?;
		let value = CellValue::parse_literal(sub.get_one::<String>("value").map(|s| s.as_str()).unwrap_or(""));

		let store = load_store(&store_path).await?;
		let old_value = store
			.read_range(table, row, column, 1, 1)
			.await?
			.into_iter()
			.next()
			.and_then(|r| r.into_iter().next())
			.unwrap_or_default();
		store.write_cell(table, row, column, value.clone()).await?;
		debug!("{}!{} column {}: '{}' -> '{}'", table, row, column, old_value, value);

		let event = EditEvent::new(table.as_str(), row, column).with_values(old_value, value);
		let user = config.acting_user.clone();
		let router = Router::new(EngineContext::builder(config, store.clone()).build());
		let entries = router.dispatch(&event.with_user(user)).await;

		store.save_json(&store_path).await?;
		info!("{} handler(s) ran", entries.len());
		print_entries(&entries)?;
	} else if let Some(sub) = matches.subcommand_matches("show") {
		let table = sub.get_one::<String>("table").ok_or("show: table argument required")?;
		let store = load_store(&store_path).await?;
		show_table(&store, table).await?;
	}

	Ok(())
}

// vim: ts=4
