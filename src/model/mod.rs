use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Aspect shown by a signal head, ordered from most to least restrictive.
///
/// The discriminant is the integer value scripts see through `STATE` and
/// `SIGASP_<name>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum SignalAspect {
    #[default]
    #[serde(rename = "STOP")]
    Stop = 0,
    #[serde(rename = "STOP_AND_PROCEED")]
    StopAndProceed = 1,
    #[serde(rename = "RESTRICTING")]
    Restricting = 2,
    #[serde(rename = "APPROACH_1")]
    Approach1 = 3,
    #[serde(rename = "APPROACH_2")]
    Approach2 = 4,
    #[serde(rename = "APPROACH_3")]
    Approach3 = 5,
    #[serde(rename = "CLEAR_1")]
    Clear1 = 6,
    #[serde(rename = "CLEAR_2")]
    Clear2 = 7,
    #[serde(rename = "UNKNOWN")]
    Unknown = 8,
}

impl SignalAspect {
    /// Index == numeric value.
    pub const ALL: [SignalAspect; 9] = [
        SignalAspect::Stop,
        SignalAspect::StopAndProceed,
        SignalAspect::Restricting,
        SignalAspect::Approach1,
        SignalAspect::Approach2,
        SignalAspect::Approach3,
        SignalAspect::Clear1,
        SignalAspect::Clear2,
        SignalAspect::Unknown,
    ];

    pub const NAMES: &'static [&'static str] = &[
        "STOP",
        "STOP_AND_PROCEED",
        "RESTRICTING",
        "APPROACH_1",
        "APPROACH_2",
        "APPROACH_3",
        "CLEAR_1",
        "CLEAR_2",
        "UNKNOWN",
    ];

    pub fn value(self) -> i32 {
        self as i32
    }

    /// Out-of-range values collapse to `Unknown`.
    pub fn from_value(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(SignalAspect::Unknown)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self::ALL[i])
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

/// Occupancy state of the block protected by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockState {
    #[default]
    #[serde(rename = "CLEAR")]
    Clear = 0,
    #[serde(rename = "OCCUPIED")]
    Occupied = 1,
    #[serde(rename = "JN_OBSTRUCTED")]
    JnObstructed = 2,
}

impl BlockState {
    pub const ALL: [BlockState; 3] = [
        BlockState::Clear,
        BlockState::Occupied,
        BlockState::JnObstructed,
    ];

    pub const NAMES: &'static [&'static str] = &["CLEAR", "OCCUPIED", "JN_OBSTRUCTED"];

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Self::ALL[i])
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

/// Signal function type: an index into the function table of the loaded
/// configuration. The first entries are always the built-in types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignalFunction(pub usize);

impl SignalFunction {
    pub const NORMAL: SignalFunction = SignalFunction(0);
    pub const DISTANCE: SignalFunction = SignalFunction(1);
    pub const REPEATER: SignalFunction = SignalFunction(2);
    pub const SHUNTING: SignalFunction = SignalFunction(3);
    pub const INFO: SignalFunction = SignalFunction(4);
    pub const SPEED: SignalFunction = SignalFunction(5);
    pub const ALERT: SignalFunction = SignalFunction(6);

    pub const BUILTIN_NAMES: &'static [&'static str] = &[
        "NORMAL", "DISTANCE", "REPEATER", "SHUNTING", "INFO", "SPEED", "ALERT",
    ];

    pub fn value(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }
}

/// Sub-object kinds of a signal shape, addressed by `SIGFEAT_<name>`.
pub const SIGNAL_FEATURES: &[&str] = &[
    "DECOR",
    "SIGNAL_HEAD",
    "DUMMY1",
    "DUMMY2",
    "NUMBER_PLATE",
    "GRADIENT_PLATE",
    "USER1",
    "USER2",
    "USER3",
    "USER4",
];

// ─────────────────────────────────────────────────────
// Configuration (subset of the route's signal config)
// ─────────────────────────────────────────────────────

/// Signal configuration as it comes out of the JSON loader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalConfig {
    /// Script files, relative to the config file, processed in order.
    #[serde(default)]
    pub script_files: Vec<PathBuf>,
    pub signal_types: Vec<SignalTypeDef>,
    /// Custom function types appended after the built-in ones.
    #[serde(default)]
    pub function_types: Vec<String>,
    #[serde(default)]
    pub normal_subtypes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalTypeDef {
    pub name: String,
    /// Name of a script shared with other types, if not the type's own name.
    #[serde(default)]
    pub script: Option<String>,
}

impl SignalConfig {
    /// Built-in function types followed by the custom ones, all uppercase.
    pub fn function_table(&self) -> Vec<String> {
        let mut table: Vec<String> = SignalFunction::BUILTIN_NAMES
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in &self.function_types {
            let name = name.trim().to_ascii_uppercase();
            if !table.contains(&name) {
                table.push(name);
            }
        }
        table
    }

    pub fn function_by_name(&self, name: &str) -> Option<SignalFunction> {
        self.function_table()
            .iter()
            .position(|f| f.eq_ignore_ascii_case(name.trim()))
            .map(SignalFunction)
    }
}

// ─────────────────────────────────────────────────────
// Scenario (offline evaluation of a set of heads)
// ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_ticks")]
    pub ticks: u32,
    pub heads: Vec<HeadSpec>,
}

fn default_ticks() -> u32 {
    1
}

/// One signal head together with the answers its surroundings give.
///
/// Maps keyed by function type name (`"NORMAL"`, `"DISTANCE"`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct HeadSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub signal_type: String,
    #[serde(default)]
    pub state: SignalAspect,
    #[serde(default)]
    pub draw_state: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub block_state: BlockState,
    #[serde(default)]
    pub route_set: bool,
    #[serde(default)]
    pub next_sig_lr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub next_sig_mr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub this_sig_lr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub this_sig_mr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub opp_sig_lr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub opp_sig_mr: HashMap<String, SignalAspect>,
    #[serde(default)]
    pub dist_multi_sig_mr: Option<SignalAspect>,
    /// Names from `SIGNAL_FEATURES` present on this head.
    #[serde(default)]
    pub features: Vec<String>,
    /// Aspect name → draw state index.
    #[serde(default)]
    pub draw_states: HashMap<String, i32>,
    #[serde(default)]
    pub approach_control_position: Option<i32>,
    #[serde(default)]
    pub approach_control_speed: Option<i32>,
}

fn default_true() -> bool {
    true
}

/// Outcome of evaluating one head in a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct HeadResult {
    pub name: String,
    pub signal_type: String,
    pub scripted: bool,
    pub state: SignalAspect,
    pub draw_state: i32,
    pub local_floats: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_values() {
        let test_cases = vec![
            (0, SignalAspect::Stop),
            (3, SignalAspect::Approach1),
            (7, SignalAspect::Clear2),
            (8, SignalAspect::Unknown),
            (42, SignalAspect::Unknown),
            (-1, SignalAspect::Unknown),
        ];

        for (value, expected) in test_cases {
            assert_eq!(SignalAspect::from_value(value), expected, "value {value}");
        }
        assert_eq!(SignalAspect::from_name("clear_1"), Some(SignalAspect::Clear1));
        assert_eq!(SignalAspect::from_name("GREEN"), None);
    }

    #[test]
    fn test_function_table_appends_custom_types() {
        let cfg = SignalConfig {
            function_types: vec!["speed".into(), "ORTS_CUSTOM".into()],
            ..Default::default()
        };
        let table = cfg.function_table();
        assert_eq!(table.len(), SignalFunction::BUILTIN_NAMES.len() + 1);
        assert_eq!(cfg.function_by_name("orts_custom"), Some(SignalFunction(7)));
        assert_eq!(cfg.function_by_name("NORMAL"), Some(SignalFunction::NORMAL));
    }

    #[test]
    fn test_head_spec_defaults() {
        let head: HeadSpec =
            serde_json::from_str(r#"{ "signal_type": "US_HOME", "block_state": "OCCUPIED" }"#)
                .unwrap();
        assert_eq!(head.state, SignalAspect::Stop);
        assert!(head.enabled);
        assert_eq!(head.block_state, BlockState::Occupied);
        assert!(head.next_sig_lr.is_empty());
    }
}
