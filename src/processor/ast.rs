//! Parsed form of a signal script.
//!
//! A `Script` is built once when the script files are loaded and is never
//! mutated afterwards; every signal head of the matching type evaluates the
//! same tree.

use serde::Serialize;

use crate::model::{BlockState, SignalAspect, SignalFunction};

/// Slots of the owning signal head that scripts can name directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExternalFloat {
    State,
    DrawState,
    /// read only
    Enabled,
    /// read only
    BlockState,
    /// read only
    ApproachControlReqPosition,
    /// read only
    ApproachControlReqSpeed,
}

impl ExternalFloat {
    pub const ALL: [ExternalFloat; 6] = [
        ExternalFloat::State,
        ExternalFloat::DrawState,
        ExternalFloat::Enabled,
        ExternalFloat::BlockState,
        ExternalFloat::ApproachControlReqPosition,
        ExternalFloat::ApproachControlReqSpeed,
    ];

    pub const NAMES: &'static [&'static str] = &[
        "STATE",
        "DRAW_STATE",
        "ENABLED",
        "BLOCK_STATE",
        "APPROACH_CONTROL_REQ_POSITION",
        "APPROACH_CONTROL_REQ_SPEED",
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    pub fn is_writable(self) -> bool {
        matches!(self, ExternalFloat::State | ExternalFloat::DrawState)
    }
}

/// Functions served by the signal/topology model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Function {
    BlockState,
    RouteSet,
    NextSigLr,
    NextSigMr,
    ThisSigLr,
    ThisSigMr,
    OppSigLr,
    OppSigMr,
    NextNsigLr,
    DistMultiSigMr,
    DistMultiSigMrOfLr,
    NextSigId,
    OppSigId,
    IdSigEnabled,
    IdSigLr,
    SigFeature,
    DefDrawState,
    AllowClearToPartialRoute,
    ApproachControlPosition,
    ApproachControlSpeed,
    TrainHasCallOn,
    TrainHasCallOnRestricted,
    RouteClearedToSignal,
    RouteClearedToSignalCallOn,
    HasHead,
    StoreLvar,
    ThisSigLvar,
    NextSigLvar,
    IdSigLvar,
    ThisSigNoUpdate,
    DebugHeader,
    DebugOut,
}

impl Function {
    pub const ALL: [Function; 32] = [
        Function::BlockState,
        Function::RouteSet,
        Function::NextSigLr,
        Function::NextSigMr,
        Function::ThisSigLr,
        Function::ThisSigMr,
        Function::OppSigLr,
        Function::OppSigMr,
        Function::NextNsigLr,
        Function::DistMultiSigMr,
        Function::DistMultiSigMrOfLr,
        Function::NextSigId,
        Function::OppSigId,
        Function::IdSigEnabled,
        Function::IdSigLr,
        Function::SigFeature,
        Function::DefDrawState,
        Function::AllowClearToPartialRoute,
        Function::ApproachControlPosition,
        Function::ApproachControlSpeed,
        Function::TrainHasCallOn,
        Function::TrainHasCallOnRestricted,
        Function::RouteClearedToSignal,
        Function::RouteClearedToSignalCallOn,
        Function::HasHead,
        Function::StoreLvar,
        Function::ThisSigLvar,
        Function::NextSigLvar,
        Function::IdSigLvar,
        Function::ThisSigNoUpdate,
        Function::DebugHeader,
        Function::DebugOut,
    ];

    /// Script spelling; index == discriminant.
    pub const NAMES: &'static [&'static str] = &[
        "BLOCK_STATE",
        "ROUTE_SET",
        "NEXT_SIG_LR",
        "NEXT_SIG_MR",
        "THIS_SIG_LR",
        "THIS_SIG_MR",
        "OPP_SIG_LR",
        "OPP_SIG_MR",
        "NEXT_NSIG_LR",
        "DIST_MULTI_SIG_MR",
        "DIST_MULTI_SIG_MR_OF_LR",
        "NEXT_SIG_ID",
        "OPP_SIG_ID",
        "ID_SIG_ENABLED",
        "ID_SIG_LR",
        "SIG_FEATURE",
        "DEF_DRAW_STATE",
        "ALLOW_CLEAR_TO_PARTIAL_ROUTE",
        "APPROACH_CONTROL_POSITION",
        "APPROACH_CONTROL_SPEED",
        "TRAINHASCALLON",
        "TRAINHASCALLON_RESTRICTED",
        "ROUTE_CLEARED_TO_SIGNAL",
        "ROUTE_CLEARED_TO_SIGNAL_CALLON",
        "HASHEAD",
        "STORE_LVAR",
        "THIS_SIG_LVAR",
        "NEXT_SIG_LVAR",
        "ID_SIG_LVAR",
        "THIS_SIG_NOUPDATE",
        "DEBUG_HEADER",
        "DEBUG_OUT",
    ];

    /// Functions take at most this many arguments.
    pub const MAX_ARGS: usize = 2;

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

/// Arithmetic operator leading a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    Mul,
    Add,
    Sub,
    Div,
    Mod,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '*' => Some(Operator::Mul),
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '/' => Some(Operator::Div),
            '%' => Some(Operator::Mod),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Mul => '*',
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Div => '/',
            Operator::Mod => '%',
        }
    }
}

/// Relational operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    const TABLE: &'static [(&'static str, Comparison)] = &[
        (">", Comparison::Gt),
        (">=", Comparison::Ge),
        ("<", Comparison::Lt),
        ("<=", Comparison::Le),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
    ];

    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::TABLE.iter().find(|(sym, _)| *sym == s).map(|(_, c)| *c)
    }

    pub fn symbol(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, c)| *c == self)
            .map(|(sym, _)| *sym)
            .unwrap_or("?")
    }

    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

/// Connective between two condition operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn symbol(self) -> &'static str {
        match self {
            Logic::And => "&&",
            Logic::Or => "||",
        }
    }
}

/// Resolved plain value: constant, variable or enum literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Const(i32),
    External(ExternalFloat),
    Local(usize),
    Block(BlockState),
    Aspect(SignalAspect),
    Function(SignalFunction),
    Feature(usize),
    NormalSubtype(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub function: Function,
    /// At most `Function::MAX_ARGS` entries.
    pub args: Vec<Operand>,
}

/// Right-hand side expression.
///
/// Built strictly left to right with no precedence: `A + B * C` is
/// `Binary(Mul, Binary(Add, A, B), C)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expr {
    Value(Operand),
    Call(Call),
    /// 0 ↔ 1 flip from a `!` or `NOT` prefix.
    Not(Box<Expr>),
    /// Sign flip of a function result whose term operator is `-`.
    Neg(Box<Expr>),
    Binary {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: i32) -> Self {
        Expr::Value(Operand::Const(value))
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Target {
    External(ExternalFloat),
    Local(usize),
    /// Bare function call, result discarded.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub target: Target,
    pub expr: Expr,
    pub line: usize,
}

/// One relational test. The negate flags only matter when there is no
/// comparison (plain truthiness test of `lhs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub lhs: Expr,
    pub negate_lhs: bool,
    pub compare: Option<(Comparison, Expr)>,
    pub negate_rhs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CondTerm {
    Test(Condition),
    /// Bracketed sub-expression containing its own `&&`/`||`.
    Group(Box<Conditions>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CondOperand {
    pub negated: bool,
    pub term: CondTerm,
}

/// Flat AND/OR chain, folded left to right without short-circuit and
/// without precedence between `&&` and `||`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conditions {
    pub first: CondOperand,
    pub rest: Vec<(Logic, CondOperand)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub conditions: Conditions,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionBlock {
    pub if_branch: Branch,
    /// Source order, first match wins.
    pub else_ifs: Vec<Branch>,
    pub else_body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Stmt {
    Assign(Statement),
    If(ConditionBlock),
    /// Stops the whole script for this evaluation.
    Return { line: usize },
}

/// One complete signal script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    pub name: String,
    /// Local float names; the position is the slot index.
    pub locals: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Script {
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_tables_line_up() {
        assert_eq!(Function::ALL.len(), Function::NAMES.len());
        for f in Function::ALL {
            assert_eq!(Function::from_name(f.name()), Some(f));
        }
        for x in ExternalFloat::ALL {
            assert_eq!(ExternalFloat::from_name(x.name()), Some(x));
        }
        assert_eq!(Function::from_name("NEXT_SIG_XX"), None);
    }

    #[test]
    fn test_comparison_symbols() {
        let test_cases = vec![
            (">", Some(Comparison::Gt)),
            (">=", Some(Comparison::Ge)),
            ("<", Some(Comparison::Lt)),
            ("<=", Some(Comparison::Le)),
            ("==", Some(Comparison::Eq)),
            ("!=", Some(Comparison::Ne)),
            ("=", None),
            ("<>", None),
        ];

        for (sym, expected) in test_cases {
            assert_eq!(Comparison::from_symbol(sym), expected, "symbol {sym}");
        }
        assert!(Comparison::Le.holds(2, 2));
        assert!(!Comparison::Gt.holds(2, 2));
    }
}
