//! Errors raised while turning script text into a `Script`.
//!
//! Every variant is scoped to one script: the loader logs it, drops that
//! script and carries on with the next `SCRIPT` block.

use std::fmt;

use thiserror::Error;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentKind {
    Function,
    Variable,
    Block,
    Aspect,
    SignalFunction,
    NormalSubtype,
    Feature,
}

impl fmt::Display for IdentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentKind::Function => "function",
            IdentKind::Variable => "variable",
            IdentKind::Block => "BLOCK_ value",
            IdentKind::Aspect => "SIGASP_ value",
            IdentKind::SignalFunction => "SIGFN_ value",
            IdentKind::NormalSubtype => "ORSUBTYPE_ value",
            IdentKind::Feature => "SIGFEAT_ value",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: unterminated block comment")]
    Lex { line: usize },

    #[error("line {line}: {message}")]
    StatementSyntax { line: usize, message: String },

    #[error("line {line}: {message}")]
    ConditionSyntax { line: usize, message: String },

    #[error("line {line}: unknown {kind} `{name}`")]
    UnknownIdentifier {
        line: usize,
        kind: IdentKind,
        name: String,
    },

    #[error("script `{name}` does not belong to any signal type")]
    UnknownSignalType { name: String },

    #[error("duplicate script `{script}` for signal type `{signal_type}`")]
    DuplicateSignalType { script: String, signal_type: String },
}

impl ScriptError {
    pub fn statement(line: usize, message: impl Into<String>) -> Self {
        Self::StatementSyntax {
            line,
            message: message.into(),
        }
    }

    pub fn condition(line: usize, message: impl Into<String>) -> Self {
        Self::ConditionSyntax {
            line,
            message: message.into(),
        }
    }

    pub fn unknown(line: usize, kind: IdentKind, name: impl Into<String>) -> Self {
        Self::UnknownIdentifier {
            line,
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
