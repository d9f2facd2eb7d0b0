//! Tree-walking interpreter for parsed signal scripts.
//!
//! Evaluation never fails: a parsed `Script` only refers to names that
//! exist, division and modulo by zero give 0 and arithmetic wraps.

use log::trace;

use crate::model::{BlockState, SignalAspect, SignalFunction};

use super::ast::*;
use super::context::SignalContext;

/// Local floats of one signal head instance.
///
/// Sized on first use and kept across evaluations; never shared between
/// heads, not even heads of the same type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFloats {
    values: Vec<i32>,
}

impl LocalFloats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    fn ensure(&mut self, count: usize) {
        if self.values.len() < count {
            self.values.resize(count, 0);
        }
    }
}

/// Evaluate `script` once for the head behind `ctx`.
pub fn update(script: &Script, ctx: &mut dyn SignalContext, locals: &mut LocalFloats) {
    locals.ensure(script.local_count());
    let mut vm = Vm {
        ctx,
        locals: &mut locals.values,
    };
    if let Flow::Return = vm.exec_block(&script.body) {
        trace!("script {} returned early", script.name);
    }
}

/// Two-state behaviour for heads without a usable script.
pub fn update_basic(ctx: &mut dyn SignalContext) {
    if ctx.block_state() == BlockState::Clear {
        ctx.request_least_restrictive_aspect();
    } else {
        ctx.request_most_restrictive_aspect();
    }
}

enum Flow {
    Continue,
    Return,
}

struct Vm<'a> {
    ctx: &'a mut dyn SignalContext,
    locals: &'a mut [i32],
}

impl Vm<'_> {
    fn exec_block(&mut self, body: &[Stmt]) -> Flow {
        for stmt in body {
            if let Flow::Return = self.exec(stmt) {
                return Flow::Return;
            }
        }
        Flow::Continue
    }

    fn exec(&mut self, stmt: &Stmt) -> Flow {
        match stmt {
            Stmt::Assign(s) => {
                let value = self.eval(&s.expr);
                self.assign(s.target, value);
                Flow::Continue
            }
            Stmt::If(block) => self.exec_if(block),
            Stmt::Return { .. } => Flow::Return,
        }
    }

    fn exec_if(&mut self, block: &ConditionBlock) -> Flow {
        if self.test(&block.if_branch.conditions) {
            return self.exec_block(&block.if_branch.body);
        }
        for branch in &block.else_ifs {
            if self.test(&branch.conditions) {
                return self.exec_block(&branch.body);
            }
        }
        match &block.else_body {
            Some(body) => self.exec_block(body),
            None => Flow::Continue,
        }
    }

    fn assign(&mut self, target: Target, value: i32) {
        match target {
            Target::External(x) if !x.is_writable() => {}
            Target::External(ExternalFloat::State) => {
                self.ctx.set_state(SignalAspect::from_value(value));
            }
            Target::External(_) => self.ctx.set_draw_state(value),
            Target::Local(i) => {
                if let Some(slot) = self.locals.get_mut(i) {
                    *slot = value;
                }
            }
            Target::None => {}
        }
    }

    // ─────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> i32 {
        match expr {
            Expr::Value(op) => self.operand(*op),
            Expr::Call(call) => self.call(call),
            Expr::Not(inner) => i32::from(self.eval(inner) == 0),
            Expr::Neg(inner) => self.eval(inner).wrapping_neg(),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                apply(*op, l, r)
            }
        }
    }

    fn operand(&self, op: Operand) -> i32 {
        match op {
            Operand::Const(v) => v,
            Operand::External(x) => self.external(x),
            Operand::Local(i) => self.locals.get(i).copied().unwrap_or(0),
            Operand::Block(b) => b.value(),
            Operand::Aspect(a) => a.value(),
            Operand::Function(f) => f.value(),
            Operand::Feature(i) | Operand::NormalSubtype(i) => i32::try_from(i).unwrap_or(-1),
        }
    }

    fn external(&self, x: ExternalFloat) -> i32 {
        match x {
            ExternalFloat::State => self.ctx.state().value(),
            ExternalFloat::DrawState => self.ctx.draw_state(),
            ExternalFloat::Enabled => i32::from(self.ctx.enabled()),
            ExternalFloat::BlockState => self.ctx.block_state().value(),
            ExternalFloat::ApproachControlReqPosition => {
                self.ctx.approach_control_req_position().unwrap_or(-1)
            }
            ExternalFloat::ApproachControlReqSpeed => {
                self.ctx.approach_control_req_speed().unwrap_or(-1)
            }
        }
    }

    fn call(&mut self, call: &Call) -> i32 {
        let arg = |n: usize| call.args.get(n).map_or(0, |a| self.operand(*a));
        let (a0, a1) = (arg(0), arg(1));
        let (f0, f1) = (function_arg(call, 0), function_arg(call, 1));
        let ctx = &mut *self.ctx;

        match call.function {
            Function::BlockState => ctx.block_state().value(),
            Function::RouteSet => i32::from(ctx.route_set()),
            Function::NextSigLr => ctx.next_sig_lr(f0).value(),
            Function::NextSigMr => ctx.next_sig_mr(f0).value(),
            Function::ThisSigLr => ctx.this_sig_lr(f0).map_or(-1, SignalAspect::value),
            Function::ThisSigMr => ctx.this_sig_mr(f0).map_or(-1, SignalAspect::value),
            Function::OppSigLr => ctx.opp_sig_lr(f0).value(),
            Function::OppSigMr => ctx.opp_sig_mr(f0).value(),
            Function::NextNsigLr => ctx.next_nsig_lr(f0, a1).value(),
            Function::DistMultiSigMr => ctx.dist_multi_sig_mr(f0, f1).value(),
            Function::DistMultiSigMrOfLr => ctx.dist_multi_sig_mr_of_lr(f0, f1).value(),
            Function::NextSigId => ctx.next_sig_id(f0),
            Function::OppSigId => ctx.opp_sig_id(f0),
            Function::IdSigEnabled => i32::from(ctx.id_sig_enabled(a0)),
            Function::IdSigLr => ctx.id_sig_lr(a0, f1).value(),
            Function::SigFeature => {
                i32::from(usize::try_from(a0).is_ok_and(|i| ctx.sig_feature(i)))
            }
            Function::DefDrawState => ctx.def_draw_state(SignalAspect::from_value(a0)),
            Function::AllowClearToPartialRoute => {
                ctx.allow_clear_to_partial_route(a0 != 0);
                0
            }
            Function::ApproachControlPosition => i32::from(ctx.approach_control_position(a0)),
            Function::ApproachControlSpeed => i32::from(ctx.approach_control_speed(a0, a1)),
            Function::TrainHasCallOn => i32::from(ctx.train_has_call_on()),
            Function::TrainHasCallOnRestricted => i32::from(ctx.train_has_call_on_restricted()),
            Function::RouteClearedToSignal => i32::from(ctx.route_cleared_to_signal(f0)),
            Function::RouteClearedToSignalCallOn => {
                i32::from(ctx.route_cleared_to_signal_call_on(f0))
            }
            Function::HasHead => i32::from(ctx.has_head(a0)),
            Function::StoreLvar => {
                ctx.store_lvar(a0, a1);
                0
            }
            Function::ThisSigLvar => ctx.this_sig_lvar(a0),
            Function::NextSigLvar => ctx.next_sig_lvar(f0, a1),
            Function::IdSigLvar => ctx.id_sig_lvar(a0, a1),
            Function::ThisSigNoUpdate => {
                ctx.this_sig_noupdate();
                0
            }
            Function::DebugHeader | Function::DebugOut => {
                trace!("{}({a0}, {a1})", call.function.name());
                0
            }
        }
    }

    // ─────────────────────────────────────────────────────
    // Conditions
    // ─────────────────────────────────────────────────────

    /// Left-to-right fold, both sides always evaluated.
    fn test(&mut self, conds: &Conditions) -> bool {
        let mut result = self.cond_operand(&conds.first);
        for (logic, operand) in &conds.rest {
            let value = self.cond_operand(operand);
            match logic {
                Logic::And => result &= value,
                Logic::Or => result |= value,
            }
        }
        result
    }

    fn cond_operand(&mut self, operand: &CondOperand) -> bool {
        let value = match &operand.term {
            CondTerm::Test(cond) => self.condition(cond),
            CondTerm::Group(group) => self.test(group),
        };
        value != operand.negated
    }

    fn condition(&mut self, cond: &Condition) -> bool {
        let lhs = self.eval(&cond.lhs);
        match &cond.compare {
            None => (lhs != 0) != cond.negate_lhs,
            Some((cmp, rhs)) => {
                let rhs = self.eval(rhs);
                cmp.holds(lhs, rhs)
            }
        }
    }
}

/// Only a `SIGFN_` operand names a function type; anything else is `NORMAL`.
fn function_arg(call: &Call, n: usize) -> SignalFunction {
    match call.args.get(n) {
        Some(Operand::Function(f)) => *f,
        _ => SignalFunction::NORMAL,
    }
}

fn apply(op: Operator, l: i32, r: i32) -> i32 {
    match op {
        Operator::Mul => l.wrapping_mul(r),
        Operator::Add => l.wrapping_add(r),
        Operator::Sub => l.wrapping_sub(r),
        Operator::Div if r == 0 => 0,
        Operator::Div => l.wrapping_div(r),
        Operator::Mod if r == 0 => 0,
        Operator::Mod => l.wrapping_rem(r),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::processor::context::StaticHead;
    use crate::processor::script_parser::{NameTables, parse_script, split_scripts};

    fn script(src: &str) -> Script {
        let tables = NameTables {
            functions: SignalFunction::BUILTIN_NAMES.iter().map(|s| s.to_string()).collect(),
            normal_subtypes: Vec::new(),
        };
        let blocks = split_scripts(&format!("SCRIPT T\n{src}"));
        parse_script(&blocks[0], &tables).unwrap()
    }

    fn run(src: &str, head: &mut dyn SignalContext) -> Vec<i32> {
        let mut locals = LocalFloats::new();
        update(&script(src), head, &mut locals);
        locals.values().to_vec()
    }

    #[test]
    fn test_arithmetic() {
        let test_cases = vec![
            ("FLOAT A; A = 2 + 3 * 4;", 20),
            ("FLOAT A; A = 10 - 2 - 3;", 5),
            ("FLOAT A; A = 7 / 0;", 0),
            ("FLOAT A; A = 7 % 0;", 0),
            ("FLOAT A; A = 7 % 4;", 3),
            ("FLOAT A; A = -3;", -3),
            ("FLOAT A; A = 2 * (3 + 4);", 14),
            ("FLOAT A; A = !0;", 1),
            ("FLOAT A; A = !5;", 0),
            ("FLOAT A; A = 2147483647 + 1;", i32::MIN),
            ("FLOAT A; A = SIGASP_CLEAR_1 - 1;", 5),
            ("FLOAT A; A = 3 - ROUTE_SET();", 4),
            ("FLOAT A; A = THIS_SIG_LR(SIGFN_SHUNTING);", -1),
            ("FLOAT A; A = APPROACH_CONTROL_REQ_SPEED;", -1),
        ];

        for (src, expected) in test_cases {
            let mut head = StaticHead::new();
            head.route_set = true;
            assert_eq!(run(src, &mut head), vec![expected], "script: {src}");
        }
    }

    #[test]
    fn test_branch_selection() {
        let src = "IF ((STATE == 0) || (STATE == 1)) DRAW_STATE = 1; ELSE DRAW_STATE = 2;";
        let test_cases = vec![
            (SignalAspect::Stop, 1),
            (SignalAspect::StopAndProceed, 1),
            (SignalAspect::Restricting, 2),
        ];

        for (state, expected) in test_cases {
            let mut head = StaticHead::new();
            head.state = state;
            run(src, &mut head);
            assert_eq!(head.draw_state, expected, "state {state:?}");
        }
    }

    #[test]
    fn test_bracket_groups() {
        let src = "FLOAT A; FLOAT B; FLOAT C; FLOAT R;
            A = THIS_SIG_LVAR(1); B = THIS_SIG_LVAR(2); C = THIS_SIG_LVAR(3);
            IF ((A==1 && B==1) || C==1) R = 1; ELSE R = 2;";
        let test_cases = vec![((1, 1, 0), 1), ((1, 0, 1), 1), ((1, 0, 0), 2)];

        for ((a, b, c), expected) in test_cases {
            let mut head = StaticHead::new();
            head.lvars = HashMap::from([(1, a), (2, b), (3, c)]);
            let locals = run(src, &mut head);
            assert_eq!(locals[3], expected, "a={a} b={b} c={c}");
        }
    }

    #[test]
    fn test_flat_and_or_fold() {
        // (1 || 0) && 0 → false, not 1 || (0 && 0)
        let mut head = StaticHead::new();
        run("IF (1 == 1 || 1 == 0 && 1 == 0) STATE = SIGASP_CLEAR_1;", &mut head);
        assert_eq!(head.state, SignalAspect::Stop);
    }

    #[test]
    fn test_negation() {
        let test_cases = vec![
            ("IF (!(ENABLED)) STATE = SIGASP_CLEAR_1;", SignalAspect::Stop),
            ("IF (NOT ENABLED) STATE = SIGASP_CLEAR_1;", SignalAspect::Stop),
            ("IF (!ENABLED == 1) STATE = SIGASP_CLEAR_1;", SignalAspect::Stop),
            ("IF ((!ENABLED) == 0) STATE = SIGASP_CLEAR_1;", SignalAspect::Clear1),
            ("IF (ENABLED != 0) STATE = SIGASP_CLEAR_1;", SignalAspect::Clear1),
        ];

        for (src, expected) in test_cases {
            let mut head = StaticHead::new();
            run(src, &mut head);
            assert_eq!(head.state, expected, "script: {src}");
        }
    }

    #[test]
    fn test_else_if_first_match_and_return() {
        let src = "FLOAT X;
            IF (STATE == 9) X = 1;
            ELSEIF (STATE == 0) X = 2;
            ELSEIF (STATE < 5) X = 3;
            ELSE X = 4;
            IF (X == 2) { DRAW_STATE = 7; RETURN; }
            DRAW_STATE = 8;";
        let mut head = StaticHead::new();
        let locals = run(src, &mut head);
        assert_eq!(locals, vec![2]);
        assert_eq!(head.draw_state, 7);
    }

    #[test]
    fn test_function_type_arguments() {
        let src = "FLOAT A; FLOAT B; FLOAT C; FLOAT D;
            A = NEXT_SIG_LR(99);
            B = NEXT_SIG_LR(SIGFN_NORMAL);
            C = NEXT_SIG_LR(SIGFN_DISTANCE);
            D = NEXT_SIG_LR(B);";
        let mut head = StaticHead::new();
        head.next_sig_lr = HashMap::from([
            (SignalFunction::NORMAL, SignalAspect::Clear2),
            (SignalFunction::DISTANCE, SignalAspect::Approach1),
        ]);
        assert_eq!(run(src, &mut head), vec![7, 7, 3, 7]);
    }

    #[test]
    fn test_read_only_targets_are_ignored() {
        let mut head = StaticHead::new();
        run("ENABLED = 0; BLOCK_STATE = BLOCK_OCCUPIED; STATE = 42;", &mut head);
        assert!(head.enabled);
        assert_eq!(head.block_state, BlockState::Clear);
        assert_eq!(head.state, SignalAspect::Unknown);
    }

    #[test]
    fn test_locals_persist_per_instance() {
        let s = script("FLOAT X; X = X + 1;");
        let mut head = StaticHead::new();
        let (mut first, mut second) = (LocalFloats::new(), LocalFloats::new());

        update(&s, &mut head, &mut first);
        update(&s, &mut head, &mut first);
        update(&s, &mut head, &mut second);

        assert_eq!(first.values(), &[2]);
        assert_eq!(second.values(), &[1]);
    }

    #[test]
    fn test_update_basic() {
        let test_cases = vec![
            (BlockState::Clear, SignalAspect::Clear2),
            (BlockState::Occupied, SignalAspect::Stop),
            (BlockState::JnObstructed, SignalAspect::Stop),
        ];

        for (block, expected) in test_cases {
            let mut head = StaticHead::new();
            head.block_state = block;
            update_basic(&mut head);
            assert_eq!(head.state, expected, "{block:?}");
        }
    }
}
