//! Block structurer.
//!
//! Works on a mutable buffer of logical lines. Given the index of an `IF`
//! line it finds where the condition ends, where each branch body starts and
//! stops, and where the whole construct ends. While doing so it normalises
//! the buffer in place:
//
//  - a condition or statement spread over several lines is joined into one
//  - anything after the closing `)` of a condition moves to its own line
//  - `ELSE IF`, `ELSE` + `IF` on the next line → `ELSEIF`
//  - `ELSE <stmt>;` → `ELSE` followed by `<stmt>;`
//  - a nested `IF` used as a single-statement body is wrapped in `{` / `}`

use std::ops::Range;

use super::error::{Result, ScriptError};
use super::lexer::{SourceLine, keyword_rest};

/// Indexable, editable sequence of logical lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<SourceLine>,
}

impl LineBuffer {
    pub fn new(lines: Vec<SourceLine>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn get(&self, i: usize) -> Option<&SourceLine> {
        self.lines.get(i)
    }

    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    /// Text at `i`, empty past the end.
    pub fn text(&self, i: usize) -> &str {
        self.lines.get(i).map_or("", |l| l.text.as_str())
    }

    /// Source line number at `i`; past the end, that of the last line.
    pub fn line(&self, i: usize) -> usize {
        self.lines
            .get(i)
            .or(self.lines.last())
            .map_or(0, |l| l.line)
    }

    pub fn replace(&mut self, i: usize, text: impl Into<String>) {
        if let Some(l) = self.lines.get_mut(i) {
            l.text = text.into();
        }
    }

    pub fn insert(&mut self, i: usize, text: impl Into<String>, line: usize) {
        self.lines.insert(i, SourceLine::new(text, line));
    }

    /// Cut line `i` at byte `pos`; a non-empty tail becomes line `i + 1`.
    pub fn split(&mut self, i: usize, pos: usize) {
        let Some(l) = self.lines.get_mut(i) else {
            return;
        };
        let tail = l.text[pos..].trim().to_string();
        l.text = l.text[..pos].trim().to_string();
        let line = l.line;
        if !tail.is_empty() {
            self.insert(i + 1, tail, line);
        }
    }

    /// Append line `i + 1` to line `i`.
    pub fn join_next(&mut self, i: usize) {
        if i + 1 >= self.lines.len() {
            return;
        }
        let next = self.lines.remove(i + 1);
        let l = &mut self.lines[i];
        l.text.push(' ');
        l.text.push_str(&next.text);
    }

    /// Copy of the lines in `range`.
    pub fn slice(&self, range: Range<usize>) -> LineBuffer {
        let end = range.end.min(self.lines.len());
        let start = range.start.min(end);
        LineBuffer::new(self.lines[start..end].to_vec())
    }
}

fn is_brace(text: &str) -> bool {
    text == "{" || text == "}"
}

/// Whether line `i + 1` exists and may be glued onto line `i`.
fn can_join(buf: &LineBuffer, i: usize) -> bool {
    buf.get(i + 1).is_some_and(|l| !is_brace(&l.text))
}

/// Make line `i` one complete `;`-terminated statement.
pub fn find_end_statement(buf: &mut LineBuffer, i: usize) -> Result<()> {
    loop {
        let text = buf.text(i);
        if let Some(pos) = text.find(';') {
            if pos + 1 < text.len() {
                buf.split(i, pos + 1);
            }
            return Ok(());
        }
        if !can_join(buf, i) {
            return Err(ScriptError::statement(buf.line(i), "missing `;`"));
        }
        buf.join_next(i);
    }
}

enum ParenScan {
    Closed(usize),
    Open,
    Missing,
    Stray,
}

fn scan_parens(text: &str) -> ParenScan {
    let mut depth = 0usize;
    let mut opened = false;
    for (i, c) in text.char_indices() {
        match c {
            '(' => {
                depth += 1;
                opened = true;
            }
            ')' => {
                if depth == 0 {
                    return ParenScan::Stray;
                }
                depth -= 1;
                if depth == 0 {
                    return ParenScan::Closed(i);
                }
            }
            _ => {}
        }
    }
    if opened {
        ParenScan::Open
    } else {
        ParenScan::Missing
    }
}

/// Make line `i` end exactly at the `)` closing its condition.
pub fn find_end_condition(buf: &mut LineBuffer, i: usize) -> Result<()> {
    loop {
        let line = buf.line(i);
        match scan_parens(buf.text(i)) {
            ParenScan::Closed(pos) => {
                if pos + 1 < buf.text(i).len() {
                    buf.split(i, pos + 1);
                }
                return Ok(());
            }
            ParenScan::Stray => {
                return Err(ScriptError::condition(line, "unbalanced parentheses"));
            }
            ParenScan::Open if !can_join(buf, i) => {
                return Err(ScriptError::condition(line, "unbalanced parentheses"));
            }
            ParenScan::Missing if !can_join(buf, i) => {
                return Err(ScriptError::condition(line, "missing condition"));
            }
            ParenScan::Open | ParenScan::Missing => buf.join_next(i),
        }
    }
}

/// Index of the `}` matching the `{` at line `i`.
pub fn find_end_block(buf: &LineBuffer, i: usize) -> Result<usize> {
    let mut depth = 0usize;
    for j in i..buf.len() {
        match buf.text(j) {
            "{" => depth += 1,
            "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(j);
                }
            }
            _ => {}
        }
    }
    Err(ScriptError::statement(buf.line(i), "missing `}`"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchExtent {
    pub kind: BranchKind,
    /// Line holding `IF (..)`, `ELSEIF (..)` or `ELSE`.
    pub header: usize,
    /// Statements of the branch, braces excluded.
    pub body: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfExtent {
    pub branches: Vec<BranchExtent>,
    /// First line after the construct.
    pub end: usize,
}

/// Resolve the `IF` construct starting at line `i`.
pub fn structure_if(buf: &mut LineBuffer, i: usize) -> Result<IfExtent> {
    find_end_condition(buf, i)?;
    let header_line = buf.line(i);
    let (body, mut next) = body_extent(buf, i + 1, header_line)?;
    let mut branches = vec![BranchExtent {
        kind: BranchKind::If,
        header: i,
        body,
    }];

    while let Some(kind) = normalise_else(buf, next) {
        let header = next;
        if kind == BranchKind::ElseIf {
            find_end_condition(buf, header)?;
        }
        let header_line = buf.line(header);
        let (body, after) = body_extent(buf, header + 1, header_line)?;
        branches.push(BranchExtent { kind, header, body });
        next = after;
        if kind == BranchKind::Else {
            break;
        }
    }

    Ok(IfExtent {
        branches,
        end: next,
    })
}

/// Body lines starting at `i` and the index just past them.
fn body_extent(buf: &mut LineBuffer, i: usize, header_line: usize) -> Result<(Range<usize>, usize)> {
    let Some(first) = buf.get(i) else {
        return Err(ScriptError::statement(header_line, "missing body"));
    };
    let (text, line) = (first.text.clone(), first.line);

    match text.as_str() {
        "{" => {
            let end = find_end_block(buf, i)?;
            Ok((i + 1..end, end + 1))
        }
        "}" => Err(ScriptError::statement(line, "missing body")),
        text if keyword_rest(text, "IF").is_some() => {
            let nested = structure_if(buf, i)?;
            let close_line = buf.line(nested.end.saturating_sub(1));
            buf.insert(nested.end, "}", close_line);
            buf.insert(i, "{", line);
            Ok((i + 1..nested.end + 1, nested.end + 2))
        }
        _ => {
            find_end_statement(buf, i)?;
            Ok((i..i + 1, i + 1))
        }
    }
}

/// Bring an else-continuation at line `i` into canonical `ELSEIF (..)` /
/// `ELSE` form. `None` when line `i` does not continue the chain.
fn normalise_else(buf: &mut LineBuffer, i: usize) -> Option<BranchKind> {
    let text = buf.get(i)?.text.clone();
    if keyword_rest(&text, "ELSEIF").is_some() {
        return Some(BranchKind::ElseIf);
    }
    let rest = keyword_rest(&text, "ELSE")?;

    if rest.is_empty() {
        if !buf.get(i + 1).is_some_and(|l| keyword_rest(&l.text, "IF").is_some()) {
            return Some(BranchKind::Else);
        }
        buf.join_next(i);
    }

    let text = buf.text(i).to_string();
    let rest = keyword_rest(&text, "ELSE").unwrap_or_default();
    if let Some(cond) = keyword_rest(rest, "IF") {
        buf.replace(i, format!("ELSEIF {cond}"));
        return Some(BranchKind::ElseIf);
    }

    let line = buf.line(i);
    buf.replace(i, "ELSE");
    buf.insert(i + 1, rest, line);
    Some(BranchKind::Else)
}
