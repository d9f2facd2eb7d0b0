//! The window a script has onto the simulation.
//!
//! `SignalContext` is implemented by whatever owns a signal head. Only the
//! first block of methods is required; the rest have neutral defaults so a
//! minimal context stays small.

use std::collections::HashMap;

use anyhow::{Result, anyhow};

use crate::model::{
    BlockState, HeadSpec, SIGNAL_FEATURES, SignalAspect, SignalConfig, SignalFunction,
};

pub trait SignalContext {
    fn state(&self) -> SignalAspect;
    fn set_state(&mut self, aspect: SignalAspect);
    fn draw_state(&self) -> i32;
    fn set_draw_state(&mut self, draw_state: i32);
    fn enabled(&self) -> bool;
    fn block_state(&self) -> BlockState;
    fn route_set(&self) -> bool;

    fn next_sig_lr(&self, function: SignalFunction) -> SignalAspect;
    fn next_sig_mr(&self, function: SignalFunction) -> SignalAspect;
    /// `None` when this signal has no head of that function.
    fn this_sig_lr(&self, function: SignalFunction) -> Option<SignalAspect>;
    fn this_sig_mr(&self, function: SignalFunction) -> Option<SignalAspect>;
    fn opp_sig_lr(&self, function: SignalFunction) -> SignalAspect;
    fn opp_sig_mr(&self, function: SignalFunction) -> SignalAspect;
    fn dist_multi_sig_mr(&self, from: SignalFunction, to: SignalFunction) -> SignalAspect;
    fn sig_feature(&self, feature: usize) -> bool;
    fn def_draw_state(&self, aspect: SignalAspect) -> i32;

    fn request_least_restrictive_aspect(&mut self);
    fn request_most_restrictive_aspect(&mut self);

    // ─── optional ───────────────────────────────────────

    fn next_nsig_lr(&self, function: SignalFunction, _count: i32) -> SignalAspect {
        self.next_sig_lr(function)
    }

    fn dist_multi_sig_mr_of_lr(&self, from: SignalFunction, to: SignalFunction) -> SignalAspect {
        self.dist_multi_sig_mr(from, to)
    }

    /// Signal ids are -1 when there is no such signal.
    fn next_sig_id(&self, _function: SignalFunction) -> i32 {
        -1
    }

    fn opp_sig_id(&self, _function: SignalFunction) -> i32 {
        -1
    }

    fn id_sig_enabled(&self, _id: i32) -> bool {
        false
    }

    fn id_sig_lr(&self, _id: i32, _function: SignalFunction) -> SignalAspect {
        SignalAspect::Stop
    }

    fn has_head(&self, _head: i32) -> bool {
        false
    }

    fn store_lvar(&mut self, _index: i32, _value: i32) {}

    fn this_sig_lvar(&self, _index: i32) -> i32 {
        0
    }

    fn next_sig_lvar(&self, _function: SignalFunction, _index: i32) -> i32 {
        0
    }

    fn id_sig_lvar(&self, _id: i32, _index: i32) -> i32 {
        0
    }

    fn this_sig_noupdate(&mut self) {}

    fn train_has_call_on(&self) -> bool {
        false
    }

    fn train_has_call_on_restricted(&self) -> bool {
        false
    }

    fn route_cleared_to_signal(&self, _function: SignalFunction) -> bool {
        false
    }

    fn route_cleared_to_signal_call_on(&self, _function: SignalFunction) -> bool {
        false
    }

    fn allow_clear_to_partial_route(&mut self, _allow: bool) {}

    fn approach_control_position(&mut self, _distance: i32) -> bool {
        false
    }

    fn approach_control_speed(&mut self, _distance: i32, _speed: i32) -> bool {
        false
    }

    fn approach_control_req_position(&self) -> Option<i32> {
        None
    }

    fn approach_control_req_speed(&self) -> Option<i32> {
        None
    }
}

/// Signal head whose surroundings are a fixed table of answers.
///
/// Used by the scenario runner and by the interpreter tests.
#[derive(Debug, Clone, Default)]
pub struct StaticHead {
    pub state: SignalAspect,
    pub draw_state: i32,
    pub enabled: bool,
    pub block_state: BlockState,
    pub route_set: bool,
    pub next_sig_lr: HashMap<SignalFunction, SignalAspect>,
    pub next_sig_mr: HashMap<SignalFunction, SignalAspect>,
    pub this_sig_lr: HashMap<SignalFunction, SignalAspect>,
    pub this_sig_mr: HashMap<SignalFunction, SignalAspect>,
    pub opp_sig_lr: HashMap<SignalFunction, SignalAspect>,
    pub opp_sig_mr: HashMap<SignalFunction, SignalAspect>,
    pub dist_multi_sig_mr: Option<SignalAspect>,
    pub features: Vec<usize>,
    pub draw_states: HashMap<SignalAspect, i32>,
    pub approach_control_position: Option<i32>,
    pub approach_control_speed: Option<i32>,
    pub lvars: HashMap<i32, i32>,
    pub no_update: bool,
}

impl StaticHead {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Build from a scenario entry, resolving function and feature names
    /// against `config`.
    pub fn from_spec(spec: &HeadSpec, config: &SignalConfig) -> Result<Self> {
        let functions = |map: &HashMap<String, SignalAspect>| -> Result<HashMap<SignalFunction, SignalAspect>> {
            map.iter()
                .map(|(name, aspect)| {
                    config
                        .function_by_name(name)
                        .map(|f| (f, *aspect))
                        .ok_or_else(|| anyhow!("unknown signal function type `{name}`"))
                })
                .collect()
        };

        let features = spec
            .features
            .iter()
            .map(|name| {
                SIGNAL_FEATURES
                    .iter()
                    .position(|f| f.eq_ignore_ascii_case(name))
                    .ok_or_else(|| anyhow!("unknown signal feature `{name}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        let draw_states = spec
            .draw_states
            .iter()
            .map(|(name, index)| {
                SignalAspect::from_name(name)
                    .map(|a| (a, *index))
                    .ok_or_else(|| anyhow!("unknown aspect `{name}`"))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            state: spec.state,
            draw_state: spec.draw_state,
            enabled: spec.enabled,
            block_state: spec.block_state,
            route_set: spec.route_set,
            next_sig_lr: functions(&spec.next_sig_lr)?,
            next_sig_mr: functions(&spec.next_sig_mr)?,
            this_sig_lr: functions(&spec.this_sig_lr)?,
            this_sig_mr: functions(&spec.this_sig_mr)?,
            opp_sig_lr: functions(&spec.opp_sig_lr)?,
            opp_sig_mr: functions(&spec.opp_sig_mr)?,
            dist_multi_sig_mr: spec.dist_multi_sig_mr,
            features,
            draw_states,
            approach_control_position: spec.approach_control_position,
            approach_control_speed: spec.approach_control_speed,
            lvars: HashMap::new(),
            no_update: false,
        })
    }

    fn request(&mut self, aspect: SignalAspect) {
        self.state = aspect;
        self.draw_state = self.def_draw_state(aspect);
    }
}

fn answer(map: &HashMap<SignalFunction, SignalAspect>, function: SignalFunction) -> SignalAspect {
    map.get(&function).copied().unwrap_or(SignalAspect::Stop)
}

impl SignalContext for StaticHead {
    fn state(&self) -> SignalAspect {
        self.state
    }

    fn set_state(&mut self, aspect: SignalAspect) {
        self.state = aspect;
    }

    fn draw_state(&self) -> i32 {
        self.draw_state
    }

    fn set_draw_state(&mut self, draw_state: i32) {
        self.draw_state = draw_state;
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn block_state(&self) -> BlockState {
        self.block_state
    }

    fn route_set(&self) -> bool {
        self.route_set
    }

    fn next_sig_lr(&self, function: SignalFunction) -> SignalAspect {
        answer(&self.next_sig_lr, function)
    }

    fn next_sig_mr(&self, function: SignalFunction) -> SignalAspect {
        answer(&self.next_sig_mr, function)
    }

    fn this_sig_lr(&self, function: SignalFunction) -> Option<SignalAspect> {
        self.this_sig_lr.get(&function).copied()
    }

    fn this_sig_mr(&self, function: SignalFunction) -> Option<SignalAspect> {
        self.this_sig_mr.get(&function).copied()
    }

    fn opp_sig_lr(&self, function: SignalFunction) -> SignalAspect {
        answer(&self.opp_sig_lr, function)
    }

    fn opp_sig_mr(&self, function: SignalFunction) -> SignalAspect {
        answer(&self.opp_sig_mr, function)
    }

    fn dist_multi_sig_mr(&self, _from: SignalFunction, _to: SignalFunction) -> SignalAspect {
        self.dist_multi_sig_mr.unwrap_or(SignalAspect::Clear2)
    }

    fn sig_feature(&self, feature: usize) -> bool {
        self.features.contains(&feature)
    }

    fn def_draw_state(&self, aspect: SignalAspect) -> i32 {
        self.draw_states.get(&aspect).copied().unwrap_or(-1)
    }

    /// Least restrictive aspect this head can show.
    fn request_least_restrictive_aspect(&mut self) {
        let aspect = self
            .draw_states
            .keys()
            .copied()
            .filter(|a| *a != SignalAspect::Unknown)
            .max()
            .unwrap_or(SignalAspect::Clear2);
        self.request(aspect);
    }

    fn request_most_restrictive_aspect(&mut self) {
        let aspect = self
            .draw_states
            .keys()
            .copied()
            .min()
            .unwrap_or(SignalAspect::Stop);
        self.request(aspect);
    }

    fn store_lvar(&mut self, index: i32, value: i32) {
        self.lvars.insert(index, value);
    }

    fn this_sig_lvar(&self, index: i32) -> i32 {
        self.lvars.get(&index).copied().unwrap_or(0)
    }

    fn this_sig_noupdate(&mut self) {
        self.no_update = true;
    }

    fn approach_control_req_position(&self) -> Option<i32> {
        self.approach_control_position
    }

    fn approach_control_req_speed(&self) -> Option<i32> {
        self.approach_control_speed
    }
}
