use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::model::{Scenario, SignalConfig};

/// Parse the signal configuration JSON.
///
/// Every signal type needs a name; repeated names are reported and the
/// later ones never receive a script.
pub fn load_config(json: &str) -> Result<SignalConfig> {
    let config: SignalConfig =
        serde_json::from_str(json).map_err(|e| anyhow!("Failed to parse config JSON: {e}"))?;

    for (i, t) in config.signal_types.iter().enumerate() {
        if t.name.trim().is_empty() {
            bail!("signal type {i} has an empty `name`");
        }
        let seen = config.signal_types[..i]
            .iter()
            .any(|other| other.name.eq_ignore_ascii_case(&t.name));
        if seen {
            warn!("signal type `{}` is defined more than once", t.name);
        }
    }

    info!(
        "config: {} signal types, {} script files, {} custom function types",
        config.signal_types.len(),
        config.script_files.len(),
        config.function_types.len()
    );
    Ok(config)
}

pub fn load_scenario(json: &str) -> Result<Scenario> {
    let scenario: Scenario =
        serde_json::from_str(json).map_err(|e| anyhow!("Failed to parse scenario JSON: {e}"))?;
    debug!("scenario: {} heads, {} ticks", scenario.heads.len(), scenario.ticks);
    Ok(scenario)
}

/// Read every configured script file, relative to `base`.
pub fn read_script_files(config: &SignalConfig, base: &Path) -> Result<Vec<(PathBuf, String)>> {
    config
        .script_files
        .iter()
        .map(|file| {
            let path = base.join(file);
            let bytes =
                std::fs::read(&path).with_context(|| format!("Reading {}", path.display()))?;
            let text = decode_text(&bytes).with_context(|| format!("Decoding {}", path.display()))?;
            debug!("{}: {} bytes", path.display(), bytes.len());
            Ok((path, text))
        })
        .collect()
}

/// Script files come as UTF-16 (with BOM) or UTF-8.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let utf16 = |rest: &[u8], from: fn([u8; 2]) -> u16| -> Result<String> {
        if rest.len() % 2 != 0 {
            bail!("odd number of bytes in UTF-16 text");
        }
        let units: Vec<u16> = rest.chunks_exact(2).map(|c| from([c[0], c[1]])).collect();
        String::from_utf16(&units).map_err(|e| anyhow!("invalid UTF-16: {e}"))
    };

    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => Ok(std::str::from_utf8(rest)?.to_string()),
        _ => Ok(std::str::from_utf8(bytes)?.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text() {
        let mut utf16le = vec![0xFF, 0xFE];
        for unit in "SCRIPT A".encode_utf16() {
            utf16le.extend_from_slice(&unit.to_le_bytes());
        }

        let test_cases = vec![
            (b"SCRIPT A".to_vec(), "SCRIPT A"),
            (vec![0xEF, 0xBB, 0xBF, b'X'], "X"),
            (utf16le, "SCRIPT A"),
        ];
        for (bytes, expected) in test_cases {
            assert_eq!(decode_text(&bytes).unwrap(), expected);
        }
        assert!(decode_text(&[0xFF, 0xFE, 0x41]).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(load_config(r#"{ "signal_types": [{ "name": " " }] }"#).is_err());
        assert!(load_config(r#"{ "signal_types": "nope" }"#).is_err());

        let cfg = load_config(
            r#"{ "script_files": ["sigscr.dat"], "signal_types": [{ "name": "A" }, { "name": "B", "script": "A" }] }"#,
        )
        .unwrap();
        assert_eq!(cfg.script_files, vec![PathBuf::from("sigscr.dat")]);
        assert_eq!(cfg.signal_types[1].script.as_deref(), Some("A"));
    }
}
