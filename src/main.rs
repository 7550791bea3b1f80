use std::env;
use std::error::Error;
use std::io::{self, Write};

use inlet_trends::logging::{self, Stage};
use inlet_trends::{attach_records, load_config, load_snapshot, run_batch};

const DEFAULT_CONFIG: &str = "inlets.toml";
const DEFAULT_SNAPSHOT: &str = "snapshot.json";

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    logging::init_logger(log::LevelFilter::Info);

    let config_path = env::var("INLET_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let snapshot_path = env::var("INLET_SNAPSHOT").unwrap_or_else(|_| DEFAULT_SNAPSHOT.to_string());

    let config = load_config(&config_path).inspect_err(|e| {
        logging::error(Stage::Config, None, &e.to_string());
    })?;
    logging::info(
        Stage::Config,
        None,
        &format!(
            "{} inlets, {} queries, cutoff {}",
            config.inlets.len(),
            config.settings.queries.len(),
            config.settings.before
        ),
    );

    let mut inlets = config.inlets;
    let snapshot = load_snapshot(&snapshot_path).inspect_err(|e| {
        logging::error(Stage::Snapshot, None, &e.to_string());
    })?;
    let attached = attach_records(&mut inlets, snapshot)?;
    logging::info(Stage::Store, None, &format!("attached {} records", attached));

    let report = run_batch(&inlets, &config.settings);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}
