use std::fs;
use std::path::{Path, PathBuf};

use sigscr::model::{SignalAspect, SignalConfig};
use sigscr::parser::{load_config, load_scenario};
use sigscr::processor::{LocalFloats, ScriptError, SignalScripts, StaticHead, run_scenario};
use sigscr::writer::listing::Names;

fn load_source(config: &SignalConfig, src: &str) -> SignalScripts {
    SignalScripts::load(config, &[(PathBuf::from("inline.dat"), src.to_string())])
}

#[test]
fn loads_route_scripts() {
    let (_, scripts) = sigscr::load(Path::new("tests/sigcfg.json")).expect("valid config");

    let types: Vec<&str> = scripts.iter().map(|(t, _)| t).collect();
    assert_eq!(types, vec!["UKDISTANT", "UKHOME", "UKHOME_LEFT", "UKSHUNT"]);
    assert_eq!(scripts.get("ukhome_left").map(|s| s.name.as_str()), Some("UKHOME"));
    assert!(scripts.get("UKOLD").is_none());

    let failures: Vec<(&str, bool)> = scripts
        .failures()
        .iter()
        .map(|f| {
            let unknown_ident = matches!(f.error, ScriptError::UnknownIdentifier { .. });
            (f.script.as_str(), unknown_ident)
        })
        .collect();
    assert_eq!(failures, vec![("UKBROKEN", true), ("UKORPHAN", false)]);
}

#[test]
fn evaluates_scenario() {
    let (config, scripts) = sigscr::load(Path::new("tests/sigcfg.json")).expect("valid config");
    let json = fs::read_to_string("tests/scenario.json").expect("scenario file");
    let scenario = load_scenario(&json).expect("valid scenario");

    let results = run_scenario(&scripts, &config, &scenario).expect("heads build");

    let expected = vec![
        ("home_clear", true, SignalAspect::Clear2, 2, vec![7]),
        ("home_caution", true, SignalAspect::Approach1, 1, vec![0]),
        ("home_occupied", true, SignalAspect::Stop, 0, vec![7]),
        ("distant", true, SignalAspect::Clear2, 1, vec![6, 3]),
        ("shunt", true, SignalAspect::StopAndProceed, 1, vec![]),
        ("broken", false, SignalAspect::Stop, 0, vec![]),
        ("old", false, SignalAspect::Clear1, 1, vec![]),
    ];
    assert_eq!(results.len(), expected.len());
    for (result, (name, scripted, state, draw_state, locals)) in results.iter().zip(expected) {
        assert_eq!(result.name, name);
        assert_eq!(result.scripted, scripted, "{name}");
        assert_eq!(result.state, state, "{name}");
        assert_eq!(result.draw_state, draw_state, "{name}");
        assert_eq!(result.local_floats, locals, "{name}");
    }
}

#[test]
fn repeated_runs_agree() {
    let (config, scripts) = sigscr::load(Path::new("tests/sigcfg.json")).expect("valid config");
    let json = fs::read_to_string("tests/scenario.json").expect("scenario file");
    let scenario = load_scenario(&json).expect("valid scenario");

    let first = run_scenario(&scripts, &config, &scenario).expect("heads build");
    let second = run_scenario(&scripts, &config, &scenario).expect("heads build");
    let key = |r: &sigscr::model::HeadResult| (r.state, r.draw_state, r.local_floats.clone());
    assert_eq!(
        first.iter().map(key).collect::<Vec<_>>(),
        second.iter().map(key).collect::<Vec<_>>()
    );
}

#[test]
fn comments_do_not_change_scripts() {
    let config = load_config(r#"{ "signal_types": [{ "name": "A" }] }"#).expect("valid config");
    let plain = load_source(
        &config,
        "SCRIPT A\nFLOAT X;\nX = 1;\nIF (X == 1) STATE = SIGASP_CLEAR_1;\n",
    );
    let commented = load_source(
        &config,
        "// header\nSCRIPT A\nFLOAT X; // counter\nX = 1; /* set\n   once */\nIF (X == 1) STATE = SIGASP_CLEAR_1; // done\n",
    );

    let names = Names::new(&config);
    let listing = |scripts: &SignalScripts| {
        scripts.get("A").map(|s| names.script(s).expect("listing renders"))
    };
    assert!(listing(&plain).is_some());
    assert_eq!(listing(&plain), listing(&commented));
}

#[test]
fn local_floats_are_per_head() {
    let config =
        load_config(r#"{ "signal_types": [{ "name": "A" }, { "name": "B" }] }"#).expect("valid config");
    let scripts = load_source(
        &config,
        "SCRIPT A\nFLOAT N;\nN = N + 1;\nSCRIPT B\nFLOAT N;\nFLOAT M;\nN = N + 10;\nM = N * 2;",
    );

    let mut a1 = (StaticHead::new(), LocalFloats::new());
    let mut a2 = (StaticHead::new(), LocalFloats::new());
    let mut b = (StaticHead::new(), LocalFloats::new());
    for _ in 0..3 {
        scripts.update("A", &mut a1.0, &mut a1.1);
        scripts.update("B", &mut b.0, &mut b.1);
    }
    scripts.update("A", &mut a2.0, &mut a2.1);

    assert_eq!(a1.1.values(), &[3]);
    assert_eq!(a2.1.values(), &[1]);
    assert_eq!(b.1.values(), &[30, 60]);
}
