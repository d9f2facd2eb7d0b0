pub mod cli;
pub mod model;
pub mod parser;
pub mod processor;
pub mod writer;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use log::info;

use crate::model::SignalConfig;
use crate::processor::SignalScripts;

pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // 1. ── Parse ──────────────────────────────────────────────────────
    let (config, scripts) = load(&args.config)?;

    // 2. ── Evaluate ───────────────────────────────────────────────────
    let results = match &args.scenario {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Reading {}", path.display()))?;
            let scenario = parser::load_scenario(&json)
                .with_context(|| format!("Parsing scenario {}", path.display()))?;
            let results = processor::run_scenario(&scripts, &config, &scenario)
                .with_context(|| "Running scenario")?;
            for r in &results {
                info!(
                    "{} ({}): {} draw_state {}{}",
                    r.name,
                    r.signal_type,
                    r.state.name(),
                    r.draw_state,
                    if r.scripted { "" } else { " [default]" }
                );
            }
            Some(results)
        }
        None => None,
    };

    // 3. ── Write outputs ──────────────────────────────────────────────
    let Some(out) = &args.out else {
        return Ok(());
    };
    std::fs::create_dir_all(out).with_context(|| format!("Creating {}", out.display()))?;

    writer::listing::emit(&scripts, &config, out).with_context(|| "Writing script listing")?;
    writer::json::emit_scripts(&scripts, out)?;
    if let Some(results) = &results {
        writer::json::emit_results(results, out)?;
    }

    Ok(())
}

/// Load the configuration at `path` and every script file it names.
pub fn load(path: &Path) -> anyhow::Result<(SignalConfig, SignalScripts)> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Reading {}", path.display()))?;
    let config = parser::load_config(&json)
        .with_context(|| format!("Parsing config {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let sources = parser::read_script_files(&config, base)?;
    let scripts = SignalScripts::load(&config, &sources);

    Ok((config, scripts))
}
