//! The functional core: signal script compiler and interpreter.
//!
//! `SignalScripts::load` parses every configured script file once and
//! allocates the resulting scripts to signal types. After that the table is
//! read only; `update` evaluates a type's script (or the default two-state
//! behaviour) for one signal head.
pub mod ast;
pub mod block_parser;
pub mod condition_parser;
pub mod context;
pub mod error;
pub mod lexer;
pub mod script_parser;
pub mod vm;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::model::{HeadResult, Scenario, SignalConfig};

pub use ast::Script;
pub use context::{SignalContext, StaticHead};
pub use error::ScriptError;
pub use vm::LocalFloats;

use script_parser::NameTables;

/// A script that was dropped while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub file: PathBuf,
    pub script: String,
    pub error: ScriptError,
}

/// Signal type → parsed script.
///
/// Keys are uppercase type names. Several types may share one script.
#[derive(Debug, Clone, Default)]
pub struct SignalScripts {
    scripts: BTreeMap<String, Arc<Script>>,
    failures: Vec<ScriptFailure>,
}

impl SignalScripts {
    /// Parse `sources` (file name, text) in order and allocate every script
    /// to the signal types of `config`.
    pub fn load(config: &SignalConfig, sources: &[(PathBuf, String)]) -> Self {
        let tables = NameTables::from_config(config);
        let mut table = Self::default();

        for (file, src) in sources {
            let blocks = script_parser::split_scripts(src);
            debug!("{}: {} script blocks", file.display(), blocks.len());

            for block in &blocks {
                match script_parser::parse_script(block, &tables) {
                    Ok(script) => table.allocate(config, file, Arc::new(script)),
                    Err(error) => table.fail(file, &block.name, error),
                }
            }
        }

        info!(
            "loaded scripts for {} signal types, {} failures",
            table.scripts.len(),
            table.failures.len()
        );
        table
    }

    fn allocate(&mut self, config: &SignalConfig, file: &Path, script: Arc<Script>) {
        let name = script.name.as_str();
        let targets: Vec<&str> = config
            .signal_types
            .iter()
            .filter(|t| {
                t.name.eq_ignore_ascii_case(name)
                    || t.script.as_deref().is_some_and(|s| s.trim().eq_ignore_ascii_case(name))
            })
            .map(|t| t.name.as_str())
            .collect();

        if targets.is_empty() {
            let error = ScriptError::UnknownSignalType {
                name: name.to_string(),
            };
            self.fail(file, name, error);
            return;
        }

        for signal_type in targets {
            let key = signal_type.to_ascii_uppercase();
            if self.scripts.contains_key(&key) {
                let error = ScriptError::DuplicateSignalType {
                    script: name.to_string(),
                    signal_type: signal_type.to_string(),
                };
                self.fail(file, name, error);
                continue;
            }
            debug!("script {name} → signal type {signal_type}");
            self.scripts.insert(key, Arc::clone(&script));
        }
    }

    fn fail(&mut self, file: &Path, script: &str, error: ScriptError) {
        warn!("{}: script {script}: {error}", file.display());
        self.failures.push(ScriptFailure {
            file: file.to_path_buf(),
            script: script.to_string(),
            error,
        });
    }

    pub fn get(&self, signal_type: &str) -> Option<&Arc<Script>> {
        self.scripts.get(&signal_type.trim().to_ascii_uppercase())
    }

    /// `(signal type, script)` in type order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Script>)> {
        self.scripts.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn failures(&self) -> &[ScriptFailure] {
        &self.failures
    }

    /// Evaluate one head of `signal_type`. Returns whether a script ran;
    /// otherwise the default two-state behaviour was applied.
    pub fn update(
        &self,
        signal_type: &str,
        ctx: &mut dyn SignalContext,
        locals: &mut LocalFloats,
    ) -> bool {
        match self.get(signal_type) {
            Some(script) => {
                vm::update(script, ctx, locals);
                true
            }
            None => {
                vm::update_basic(ctx);
                false
            }
        }
    }
}

/// Run every head of `scenario` for the requested number of ticks.
pub fn run_scenario(
    scripts: &SignalScripts,
    config: &SignalConfig,
    scenario: &Scenario,
) -> Result<Vec<HeadResult>> {
    let mut heads = scenario
        .heads
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let name = spec.name.clone().unwrap_or_else(|| format!("head{i}"));
            let head = StaticHead::from_spec(spec, config)
                .with_context(|| format!("Building signal head {name}"))?;
            Ok((name, spec, head, LocalFloats::new()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut scripted = vec![false; heads.len()];
    for _ in 0..scenario.ticks {
        for (i, (_, spec, head, locals)) in heads.iter_mut().enumerate() {
            scripted[i] = scripts.update(&spec.signal_type, head, locals);
        }
    }

    Ok(heads
        .into_iter()
        .zip(scripted)
        .map(|((name, spec, head, locals), scripted)| HeadResult {
            name,
            signal_type: spec.signal_type.clone(),
            scripted,
            state: head.state,
            draw_state: head.draw_state,
            local_floats: locals.values().to_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SignalAspect;

    fn config() -> SignalConfig {
        serde_json::from_str(
            r#"{
                "signal_types": [
                    { "name": "Home" },
                    { "name": "Home_LH", "script": "home" },
                    { "name": "Dist" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_allocation() {
        let src = "SCRIPT HOME\nSTATE = SIGASP_CLEAR_1;\nSCRIPT HOME\nSTATE = 1;\nSCRIPT NOWHERE\nSTATE = 1;\nSCRIPT DIST\nSTATE = BOGUS;";
        let table = SignalScripts::load(&config(), &[(PathBuf::from("a.dat"), src.to_string())]);

        let types: Vec<&str> = table.iter().map(|(t, _)| t).collect();
        assert_eq!(types, vec!["HOME", "HOME_LH"]);
        assert!(Arc::ptr_eq(&table.scripts["HOME"], &table.scripts["HOME_LH"]));

        let errors: Vec<_> = table.failures().iter().map(|f| (f.script.as_str(), &f.error)).collect();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0].1, ScriptError::DuplicateSignalType { .. }));
        assert!(matches!(errors[2].1, ScriptError::UnknownSignalType { .. }));
        assert!(matches!(errors[3].1, ScriptError::UnknownIdentifier { .. }));
    }

    #[test]
    fn test_unscripted_types_fall_back() {
        let table = SignalScripts::load(&config(), &[]);
        let mut head = StaticHead::new();
        head.block_state = crate::model::BlockState::Occupied;
        head.state = SignalAspect::Clear2;

        let ran = table.update("DIST", &mut head, &mut LocalFloats::new());
        assert!(!ran);
        assert_eq!(head.state, SignalAspect::Stop);
    }
}
