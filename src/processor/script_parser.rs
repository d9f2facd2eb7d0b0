//! Parser that consumes the line preprocessor and builds `Script` ASTs.
//!
//! A script file is first cut into `SCRIPT <name>` blocks. Each block is then
//! parsed on its own: declarations, then the body through the block
//! structurer, with statements and terms resolved against the name tables
//! of the signal configuration.

use crate::model::{BlockState, SIGNAL_FEATURES, SignalAspect, SignalConfig, SignalFunction};

use super::ast::*;
use super::block_parser::{
    BranchKind, IfExtent, LineBuffer, find_end_block, find_end_statement, structure_if,
};
use super::condition_parser;
use super::error::{IdentKind, Result, ScriptError};
use super::lexer::{
    LineReader, SourceLine, is_ident_char, keyword_rest, matching_paren, strip_enclosing_parens,
};

/// Raw lines of one `SCRIPT` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// Header name, uppercase.
    pub name: String,
    /// Line of the `SCRIPT` header.
    pub line: usize,
    /// Body lines, or the preprocessor error that cut it short.
    pub body: Result<Vec<SourceLine>>,
}

/// Cut a script file into its `SCRIPT` blocks.
///
/// Lines before the first header are ignored, as is everything from a
/// `REM SCRIPT` up to the next header.
pub fn split_scripts(src: &str) -> Vec<ScriptBlock> {
    let mut blocks: Vec<ScriptBlock> = Vec::new();
    let mut skipping = true;

    for item in LineReader::new(src) {
        let line = match item {
            Ok(line) => line,
            Err(e) => {
                if let Some(current) = blocks.last_mut().filter(|_| !skipping) {
                    current.body = Err(e);
                }
                break;
            }
        };

        if let Some(name) = keyword_rest(&line.text, "SCRIPT") {
            blocks.push(ScriptBlock {
                name: name.to_string(),
                line: line.line,
                body: Ok(Vec::new()),
            });
            skipping = false;
            continue;
        }
        if keyword_rest(&line.text, "REM")
            .and_then(|rest| keyword_rest(rest, "SCRIPT"))
            .is_some()
        {
            skipping = true;
            continue;
        }
        if skipping {
            continue;
        }
        if let Some(ScriptBlock { body: Ok(body), .. }) = blocks.last_mut() {
            body.push(line);
        }
    }

    blocks
}

/// Names a script may refer to besides its own floats.
#[derive(Debug, Clone, Default)]
pub struct NameTables {
    /// Signal function types, built-ins first.
    pub functions: Vec<String>,
    pub normal_subtypes: Vec<String>,
}

impl NameTables {
    pub fn from_config(config: &SignalConfig) -> Self {
        Self {
            functions: config.function_table(),
            normal_subtypes: config
                .normal_subtypes
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .collect(),
        }
    }
}

/// Parse one `SCRIPT` block into a `Script`.
pub fn parse_script(block: &ScriptBlock, tables: &NameTables) -> Result<Script> {
    let lines = block.body.clone()?;
    let mut buf = LineBuffer::new(lines);

    let locals = scan_declarations(&mut buf)?;
    let parser = ScriptParser::new(tables, locals);
    let body = parser.parse_block(&mut buf)?;

    Ok(Script {
        name: block.name.clone(),
        locals: parser.locals,
        body,
    })
}

/// Consume leading `EXTERN FLOAT` / `FLOAT` declarations.
///
/// Returns the local float names in index order; the buffer is left holding
/// only the body. Repeated names keep their first index.
pub fn scan_declarations(buf: &mut LineBuffer) -> Result<Vec<String>> {
    let mut locals: Vec<String> = Vec::new();
    let mut consumed = 0;

    while consumed < buf.len() {
        let text = buf.text(consumed).to_string();
        let is_extern = keyword_rest(&text, "EXTERN")
            .and_then(|rest| keyword_rest(rest, "FLOAT"))
            .is_some();
        let is_local = keyword_rest(&text, "FLOAT").is_some();
        if !is_extern && !is_local {
            break;
        }

        find_end_statement(buf, consumed)?;
        let line = buf.line(consumed);
        let text = buf.text(consumed).trim_end_matches(';').to_string();
        consumed += 1;
        if is_extern {
            continue;
        }

        let name = keyword_rest(&text, "FLOAT").unwrap_or_default();
        if name.is_empty() || !name.chars().all(is_ident_char) {
            return Err(ScriptError::statement(
                line,
                format!("invalid float declaration `{text}`"),
            ));
        }
        if !locals.iter().any(|l| l == name) {
            locals.push(name.to_string());
        }
    }

    *buf = buf.slice(consumed..buf.len());
    Ok(locals)
}

/// Resolves names and builds statements for a single script.
pub struct ScriptParser<'a> {
    tables: &'a NameTables,
    locals: Vec<String>,
}

impl<'a> ScriptParser<'a> {
    pub fn new(tables: &'a NameTables, locals: Vec<String>) -> Self {
        Self { tables, locals }
    }

    /// Parse every statement in `buf`.
    pub fn parse_block(&self, buf: &mut LineBuffer) -> Result<Vec<Stmt>> {
        let mut body = Vec::new();
        let mut i = 0;

        while i < buf.len() {
            let text = buf.text(i).to_string();
            let line = buf.line(i);

            if text == "{" {
                let end = find_end_block(buf, i)?;
                let mut inner = buf.slice(i + 1..end);
                body.extend(self.parse_block(&mut inner)?);
                i = end + 1;
                continue;
            }
            if text == "}" {
                return Err(ScriptError::statement(line, "unexpected `}`"));
            }
            if keyword_rest(&text, "IF").is_some() {
                let extent = structure_if(buf, i)?;
                body.push(Stmt::If(self.parse_if(buf, &extent)?));
                i = extent.end;
                continue;
            }
            if keyword_rest(&text, "ELSE").is_some() || keyword_rest(&text, "ELSEIF").is_some() {
                return Err(ScriptError::statement(line, "`ELSE` without `IF`"));
            }

            find_end_statement(buf, i)?;
            let stmt = buf.get(i).cloned().unwrap_or_else(|| SourceLine::new("", line));
            match keyword_rest(&stmt.text, "RETURN") {
                Some(";") => body.push(Stmt::Return { line }),
                Some(_) => {
                    return Err(ScriptError::statement(line, "`RETURN` takes no value"));
                }
                None => body.push(Stmt::Assign(self.parse_statement(&stmt)?)),
            }
            i += 1;
        }

        Ok(body)
    }

    fn parse_if(&self, buf: &LineBuffer, extent: &IfExtent) -> Result<ConditionBlock> {
        let mut if_branch = None;
        let mut else_ifs = Vec::new();
        let mut else_body = None;

        for branch in &extent.branches {
            let header = buf.text(branch.header);
            let line = buf.line(branch.header);
            let mut sub = buf.slice(branch.body.clone());

            match branch.kind {
                BranchKind::If | BranchKind::ElseIf => {
                    let kw = if branch.kind == BranchKind::If { "IF" } else { "ELSEIF" };
                    let cond = keyword_rest(header, kw).unwrap_or_default();
                    let conditions = self.parse_condition_header(cond, line)?;
                    let body = self.parse_block(&mut sub)?;
                    let parsed = Branch {
                        conditions,
                        body,
                        line,
                    };
                    if if_branch.is_none() {
                        if_branch = Some(parsed);
                    } else {
                        else_ifs.push(parsed);
                    }
                }
                BranchKind::Else => else_body = Some(self.parse_block(&mut sub)?),
            }
        }

        let if_branch = if_branch
            .ok_or_else(|| ScriptError::condition(buf.line(extent.end), "missing `IF`"))?;
        Ok(ConditionBlock {
            if_branch,
            else_ifs,
            else_body,
        })
    }

    /// `(<conditions>)` as left on an `IF` / `ELSEIF` line.
    fn parse_condition_header(&self, text: &str, line: usize) -> Result<Conditions> {
        if !text.starts_with('(') || matching_paren(text, 0) != Some(text.len() - 1) {
            return Err(ScriptError::condition(line, format!("expected `(..)`, found `{text}`")));
        }
        let inner = text[1..text.len() - 1].trim();
        condition_parser::parse_conditions(inner, line, self)
    }

    // ─────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────

    /// `<target> = <expr>;` or `<call>;`
    pub fn parse_statement(&self, src: &SourceLine) -> Result<Statement> {
        let line = src.line;
        let mut text = src.text.replace(';', "").replace("=#", "=");
        if let Some(pos) = text.find('=') {
            if text[pos + 1..].starts_with('=') {
                text.remove(pos + 1);
            }
        }

        let parts: Vec<&str> = text.split('=').map(str::trim).collect();
        match parts.as_slice() {
            [expr] => {
                let expr = self.parse_expr(expr, line)?;
                if !matches!(expr, Expr::Call(_)) {
                    return Err(ScriptError::statement(line, "expected assignment or function call"));
                }
                Ok(Statement {
                    target: Target::None,
                    expr,
                    line,
                })
            }
            [target, expr] => {
                if target.is_empty() {
                    return Err(ScriptError::statement(line, "missing assignment target"));
                }
                Ok(Statement {
                    target: self.resolve_target(target, line)?,
                    expr: self.parse_expr(expr, line)?,
                    line,
                })
            }
            _ => Err(ScriptError::statement(line, "more than one `=`")),
        }
    }

    fn resolve_target(&self, name: &str, line: usize) -> Result<Target> {
        let name = name.trim_start_matches('#');
        if let Some(x) = ExternalFloat::from_name(name) {
            return Ok(Target::External(x));
        }
        self.local_index(name)
            .map(Target::Local)
            .ok_or_else(|| ScriptError::unknown(line, IdentKind::Variable, name))
    }

    fn local_index(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|l| l == name)
    }

    // ─────────────────────────────────────────────────────
    // Terms
    // ─────────────────────────────────────────────────────

    /// Parse a right-hand side into a left-to-right expression tree.
    pub fn parse_expr(&self, text: &str, line: usize) -> Result<Expr> {
        let mut acc: Option<Expr> = None;

        for (op, term_text) in split_terms(text, line)? {
            let (negated, base) = self.parse_term(&term_text, line)?;
            let base = match (op, base) {
                (Some(Operator::Sub), call @ Expr::Call(_)) => Expr::Neg(Box::new(call)),
                (_, base) => base,
            };
            let term = if negated {
                Expr::Not(Box::new(base))
            } else {
                base
            };

            acc = Some(match (acc, op) {
                (None, None) => term,
                (None, Some(op)) => Expr::binary(op, Expr::constant(0), term),
                (Some(lhs), Some(op)) => Expr::binary(op, lhs, term),
                (Some(_), None) => {
                    return Err(ScriptError::statement(line, "missing operator"));
                }
            });
        }

        acc.ok_or_else(|| ScriptError::statement(line, "missing expression"))
    }

    /// One term: `(<expr>)`, `FUNCTION(args)` or a plain operand, with an
    /// optional `!` / `NOT` prefix. Returns the negate flag separately.
    fn parse_term(&self, text: &str, line: usize) -> Result<(bool, Expr)> {
        let mut text = text.trim();
        let mut negated = false;
        if let Some(rest) = text.strip_prefix('!') {
            negated = true;
            text = rest.trim_start();
        } else if let Some(rest) = keyword_rest(text, "NOT") {
            negated = true;
            text = rest;
        }

        if text.starts_with('(') {
            if matching_paren(text, 0) != Some(text.len() - 1) {
                return Err(ScriptError::statement(line, format!("unexpected text after `)` in `{text}`")));
            }
            return Ok((negated, self.parse_expr(&text[1..text.len() - 1], line)?));
        }

        if let Some(open) = text.find('(') {
            return Ok((negated, Expr::Call(self.parse_call(text, open, line)?)));
        }

        Ok((negated, Expr::Value(self.parse_operand(text, line)?)))
    }

    fn parse_call(&self, text: &str, open: usize, line: usize) -> Result<Call> {
        let name = text[..open].trim();
        if matching_paren(text, open) != Some(text.len() - 1) {
            return Err(ScriptError::statement(line, format!("malformed call `{text}`")));
        }
        let function = Function::from_name(name)
            .ok_or_else(|| ScriptError::unknown(line, IdentKind::Function, name))?;

        let inner = text[open + 1..text.len() - 1].trim();
        let args = if inner.is_empty() {
            Vec::new()
        } else {
            inner
                .split(',')
                .map(|arg| self.parse_operand(arg, line))
                .collect::<Result<Vec<_>>>()?
        };
        if args.len() > Function::MAX_ARGS {
            return Err(ScriptError::statement(
                line,
                format!("`{name}` takes at most {} arguments", Function::MAX_ARGS),
            ));
        }

        Ok(Call { function, args })
    }

    /// Classify a plain operand: integer, float name or prefixed enum value.
    pub fn parse_operand(&self, text: &str, line: usize) -> Result<Operand> {
        let text = strip_enclosing_parens(text.trim());
        let text = text.strip_prefix('#').unwrap_or(text).trim();
        if text.is_empty() {
            return Err(ScriptError::statement(line, "missing operand"));
        }

        if let Ok(v) = text.parse::<i32>() {
            return Ok(Operand::Const(v));
        }
        if let Some(x) = ExternalFloat::from_name(text) {
            return Ok(Operand::External(x));
        }
        if let Some(i) = self.local_index(text) {
            return Ok(Operand::Local(i));
        }

        let unknown = |kind| ScriptError::unknown(line, kind, text);
        if let Some(name) = text.strip_prefix("BLOCK_") {
            return BlockState::from_name(name)
                .map(Operand::Block)
                .ok_or_else(|| unknown(IdentKind::Block));
        }
        if let Some(name) = text.strip_prefix("SIGASP_") {
            return SignalAspect::from_name(name)
                .map(Operand::Aspect)
                .ok_or_else(|| unknown(IdentKind::Aspect));
        }
        if let Some(name) = text.strip_prefix("SIGFN_") {
            return self
                .tables
                .functions
                .iter()
                .position(|f| f == name)
                .map(|i| Operand::Function(SignalFunction(i)))
                .ok_or_else(|| unknown(IdentKind::SignalFunction));
        }
        if let Some(name) = text.strip_prefix("ORSUBTYPE_") {
            return self
                .tables
                .normal_subtypes
                .iter()
                .position(|s| s == name)
                .map(Operand::NormalSubtype)
                .ok_or_else(|| unknown(IdentKind::NormalSubtype));
        }
        if let Some(name) = text.strip_prefix("SIGFEAT_") {
            return SIGNAL_FEATURES
                .iter()
                .position(|f| *f == name)
                .map(Operand::Feature)
                .ok_or_else(|| unknown(IdentKind::Feature));
        }

        Err(unknown(IdentKind::Variable))
    }
}

/// Split at top-level operators into `(leading operator, term text)`.
///
/// An operator that directly follows another one (or opens the first term
/// after a leading operator) belongs to the operand: `A * -1`.
fn split_terms(text: &str, line: usize) -> Result<Vec<(Option<Operator>, String)>> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut pending: Option<Operator> = None;
    let mut depth = 0usize;

    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ScriptError::statement(line, format!("unbalanced parentheses in `{text}`"))
                })?;
            }
            _ => {}
        }

        let op = if depth == 0 { Operator::from_char(c) } else { None };
        match op {
            Some(op) if !current.trim().is_empty() => {
                terms.push((pending, current.trim().to_string()));
                current.clear();
                pending = Some(op);
            }
            Some(op) if terms.is_empty() && pending.is_none() => pending = Some(op),
            _ => current.push(c),
        }
    }

    if depth != 0 {
        return Err(ScriptError::statement(line, format!("unbalanced parentheses in `{text}`")));
    }
    if current.trim().is_empty() {
        return Err(ScriptError::statement(line, format!("missing operand in `{text}`")));
    }
    terms.push((pending, current.trim().to_string()));
    Ok(terms)
}
