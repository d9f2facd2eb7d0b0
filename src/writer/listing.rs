//! Human readable listing of the loaded scripts.
//!
//! One section per script: the signal types it serves, its local floats and
//! the statement tree, one statement per line, nested blocks indented.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::Path;

use crate::model::{SIGNAL_FEATURES, SignalConfig};
use crate::processor::SignalScripts;
use crate::processor::ast::*;

pub fn emit(scripts: &SignalScripts, config: &SignalConfig, out_dir: &Path) -> io::Result<()> {
    let out = render(scripts, config).map_err(io::Error::other)?;
    fs::write(out_dir.join("scripts.txt"), out)
}

fn render(scripts: &SignalScripts, config: &SignalConfig) -> Result<String, fmt::Error> {
    let mut by_name: BTreeMap<&str, (Vec<&str>, &Script)> = BTreeMap::new();
    for (signal_type, script) in scripts.iter() {
        by_name
            .entry(script.name.as_str())
            .or_insert_with(|| (Vec::new(), script))
            .0
            .push(signal_type);
    }

    let names = Names::new(config);
    let mut out = String::new();
    for (types, script) in by_name.values() {
        writeln!(out, "SCRIPT {}    // {}", script.name, types.join(", "))?;
        out.push_str(&names.script(script)?);
        out.push('\n');
    }

    if !scripts.failures().is_empty() {
        out.push_str("// rejected\n");
        for f in scripts.failures() {
            writeln!(out, "//   {} {}: {}", f.file.display(), f.script, f.error)?;
        }
    }
    Ok(out)
}

/// Renders AST nodes back into script syntax.
pub struct Names {
    functions: Vec<String>,
    normal_subtypes: Vec<String>,
}

impl Names {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            functions: config.function_table(),
            normal_subtypes: config
                .normal_subtypes
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn script(&self, script: &Script) -> Result<String, fmt::Error> {
        let mut out = String::new();
        for (i, name) in script.locals.iter().enumerate() {
            writeln!(out, "    FLOAT {name};    // [{i}]")?;
        }
        self.block(&mut out, script, &script.body, 1)?;
        Ok(out)
    }

    fn block(&self, out: &mut String, script: &Script, body: &[Stmt], depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        for stmt in body {
            match stmt {
                Stmt::Assign(s) => {
                    let expr = self.expr(script, &s.expr);
                    match s.target {
                        Target::None => writeln!(out, "{pad}{expr};")?,
                        Target::External(x) => writeln!(out, "{pad}{} = {expr};", x.name())?,
                        Target::Local(i) => {
                            writeln!(out, "{pad}{} = {expr};", local_name(script, i))?
                        }
                    }
                }
                Stmt::Return { .. } => writeln!(out, "{pad}RETURN;")?,
                Stmt::If(block) => {
                    let branch = &block.if_branch;
                    writeln!(out, "{pad}IF ({})", self.conditions(script, &branch.conditions))?;
                    self.braced(out, script, &branch.body, depth)?;
                    for branch in &block.else_ifs {
                        writeln!(out, "{pad}ELSEIF ({})", self.conditions(script, &branch.conditions))?;
                        self.braced(out, script, &branch.body, depth)?;
                    }
                    if let Some(body) = &block.else_body {
                        writeln!(out, "{pad}ELSE")?;
                        self.braced(out, script, body, depth)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn braced(&self, out: &mut String, script: &Script, body: &[Stmt], depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        writeln!(out, "{pad}{{")?;
        self.block(out, script, body, depth + 1)?;
        writeln!(out, "{pad}}}")
    }

    pub fn conditions(&self, script: &Script, conds: &Conditions) -> String {
        let mut parts = vec![self.cond_operand(script, &conds.first)];
        for (logic, operand) in &conds.rest {
            parts.push(logic.symbol().to_string());
            parts.push(self.cond_operand(script, operand));
        }
        parts.join(" ")
    }

    fn cond_operand(&self, script: &Script, operand: &CondOperand) -> String {
        let text = match &operand.term {
            CondTerm::Group(group) => format!("({})", self.conditions(script, group)),
            CondTerm::Test(cond) => {
                let lhs = self.side(script, &cond.lhs, cond.negate_lhs);
                match &cond.compare {
                    None => lhs,
                    Some((cmp, rhs)) => {
                        format!("{lhs} {} {}", cmp.symbol(), self.side(script, rhs, cond.negate_rhs))
                    }
                }
            }
        };
        if operand.negated {
            format!("!({text})")
        } else {
            text
        }
    }

    fn side(&self, script: &Script, expr: &Expr, negated: bool) -> String {
        let text = self.expr(script, expr);
        if negated { format!("!{text}") } else { text }
    }

    pub fn expr(&self, script: &Script, expr: &Expr) -> String {
        match expr {
            Expr::Value(op) => self.operand(script, *op),
            Expr::Call(call) => {
                let args: Vec<String> = call.args.iter().map(|a| self.operand(script, *a)).collect();
                format!("{}({})", call.function.name(), args.join(", "))
            }
            Expr::Not(inner) => format!("!{}", self.atom(script, inner)),
            Expr::Neg(inner) => format!("-{}", self.atom(script, inner)),
            Expr::Binary { op, lhs, rhs } => {
                // `A - F()` is stored as `A - Neg(F())`
                let rhs = match (op, &**rhs) {
                    (Operator::Sub, Expr::Neg(call)) => self.expr(script, call),
                    _ => self.atom(script, rhs),
                };
                format!("{} {} {rhs}", self.expr(script, lhs), op.symbol())
            }
        }
    }

    /// Binary right operands and negated terms need brackets to re-parse.
    fn atom(&self, script: &Script, expr: &Expr) -> String {
        match expr {
            Expr::Binary { .. } => format!("({})", self.expr(script, expr)),
            _ => self.expr(script, expr),
        }
    }

    fn operand(&self, script: &Script, op: Operand) -> String {
        match op {
            Operand::Const(v) => v.to_string(),
            Operand::External(x) => x.name().to_string(),
            Operand::Local(i) => local_name(script, i),
            Operand::Block(b) => format!("BLOCK_{}", b.name()),
            Operand::Aspect(a) => format!("SIGASP_{}", a.name()),
            Operand::Function(f) => match self.functions.get(f.0) {
                Some(name) => format!("SIGFN_{name}"),
                None => f.value().to_string(),
            },
            Operand::Feature(i) => match SIGNAL_FEATURES.get(i) {
                Some(name) => format!("SIGFEAT_{name}"),
                None => i.to_string(),
            },
            Operand::NormalSubtype(i) => match self.normal_subtypes.get(i) {
                Some(name) => format!("ORSUBTYPE_{name}"),
                None => i.to_string(),
            },
        }
    }
}

fn local_name(script: &Script, i: usize) -> String {
    script
        .locals
        .get(i)
        .cloned()
        .unwrap_or_else(|| format!("LOCAL_{i}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::script_parser::{NameTables, parse_script, split_scripts};

    fn listing(src: &str) -> String {
        let config = SignalConfig::default();
        let blocks = split_scripts(src);
        let script = parse_script(&blocks[0], &NameTables::from_config(&config)).unwrap();
        Names::new(&config).script(&script).unwrap()
    }

    #[test]
    fn test_listing() {
        let src = "SCRIPT T
            float x;
            x = 2 + 3 * 4;
            if (!(x == 1) && (block_state == block_clear || enabled))
                state = next_sig_lr(sigfn_normal);
            else { draw_state = def_draw_state(sigasp_stop); return; }";
        let expected = "    FLOAT X;    // [0]
    X = 2 + 3 * 4;
    IF (!(X == 1) && (BLOCK_STATE == BLOCK_CLEAR || ENABLED))
    {
        STATE = NEXT_SIG_LR(SIGFN_NORMAL);
    }
    ELSE
    {
        DRAW_STATE = DEF_DRAW_STATE(SIGASP_STOP);
        RETURN;
    }
";
        assert_eq!(listing(src), expected);
    }

    #[test]
    fn test_emit_lists_scripts_and_failures() {
        let config: SignalConfig =
            serde_json::from_str(r#"{ "signal_types": [{ "name": "A" }, { "name": "B", "script": "A" }] }"#)
                .unwrap();
        let src = "SCRIPT A\nSTATE = SIGASP_STOP;\nSCRIPT C\nSTATE = 1;";
        let sources = [(std::path::PathBuf::from("x.dat"), src.to_string())];
        let scripts = SignalScripts::load(&config, &sources);

        let out = render(&scripts, &config).unwrap();
        assert_eq!(
            out,
            "SCRIPT A    // A, B\n    STATE = SIGASP_STOP;\n\n// rejected\n//   x.dat C: script `C` does not belong to any signal type\n"
        );

        let dir = std::env::temp_dir().join(format!("sigscr-listing-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        emit(&scripts, &config, &dir).unwrap();
        assert_eq!(fs::read_to_string(dir.join("scripts.txt")).unwrap(), out);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_listing_reparses_to_same_tree() {
        let src = "SCRIPT T\nFLOAT A;\nA = 2 * (3 + A) - -1;\nIF ((A > 1 && A < 9) || !ENABLED) A = A % 3;";
        let first = listing(src);
        let second = listing(&format!("SCRIPT T\n{first}"));
        assert_eq!(first, second);
    }
}
