//! JSON dumps of the parsed scripts and of scenario results.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::HeadResult;
use crate::processor::SignalScripts;
use crate::processor::ast::Script;

#[derive(Serialize)]
struct ScriptDump<'a> {
    /// Signal type → script name.
    signal_types: BTreeMap<&'a str, &'a str>,
    /// Script name → AST.
    scripts: BTreeMap<&'a str, &'a Script>,
    failures: Vec<FailureDump<'a>>,
}

#[derive(Serialize)]
struct FailureDump<'a> {
    file: &'a Path,
    script: &'a str,
    error: String,
}

pub fn emit_scripts(scripts: &SignalScripts, out_dir: &Path) -> Result<PathBuf> {
    let mut dump = ScriptDump {
        signal_types: BTreeMap::new(),
        scripts: BTreeMap::new(),
        failures: Vec::new(),
    };
    for (signal_type, script) in scripts.iter() {
        dump.signal_types.insert(signal_type, script.name.as_str());
        dump.scripts.insert(script.name.as_str(), script.as_ref());
    }
    dump.failures = scripts
        .failures()
        .iter()
        .map(|f| FailureDump {
            file: &f.file,
            script: &f.script,
            error: f.error.to_string(),
        })
        .collect();

    write(&dump, &out_dir.join("scripts.json"))
}

pub fn emit_results(results: &[HeadResult], out_dir: &Path) -> Result<PathBuf> {
    write(&results, &out_dir.join("results.json"))
}

fn write<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(value).context("Serializing JSON")?;
    fs::write(path, json).with_context(|| format!("Writing {}", path.display()))?;
    Ok(path.to_path_buf())
}
