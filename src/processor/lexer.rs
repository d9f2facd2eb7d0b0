//! Line preprocessor for signal script files.
//!
//! Script text is not tokenised; it is cut into *logical lines* that the
//! block structurer and the statement parsers work on:
//
//  - `//` comments run to end of line, `/* ... */` may span lines
//  - everything is uppercased, tabs become spaces, lines are trimmed
//  - `;`, `{` and `}` end a logical line. A `;` stays with the text before
//    it, a brace always stands on its own line. Whatever follows on the same
//    physical line is buffered and handed out by the next call.
//  - `IF(` is normalised to `IF (`
//  - empty lines are skipped

use std::str::Lines;

use super::error::{Result, ScriptError};

/// One cleaned logical line together with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub text: String,
    pub line: usize,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
        }
    }
}

pub struct LineReader<'a> {
    lines: Lines<'a>,
    line_number: usize,
    /// Rest of a physical line after a `;`/`{`/`}` split.
    pending: Option<SourceLine>,
    in_comment: bool,
    comment_start: usize,
    finished: bool,
}

impl<'a> LineReader<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            lines: src.lines(),
            line_number: 0,
            pending: None,
            in_comment: false,
            comment_start: 0,
            finished: false,
        }
    }

    fn clean(&mut self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if self.in_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_comment = false;
                }
                continue;
            }
            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_comment = true;
                    self.comment_start = self.line_number;
                    // keep words on both sides of the comment apart
                    out.push(' ');
                }
                '\t' => out.push(' '),
                c => out.extend(c.to_uppercase()),
            }
        }
        out
    }

    /// Cut `text` (already cleaned and trimmed, non-empty) at the first
    /// splitter and buffer the remainder.
    fn split(&mut self, text: &str, line: usize) -> SourceLine {
        let (head, rest) = match text.find([';', '{', '}']) {
            Some(pos) if text[pos..].starts_with(';') => (&text[..=pos], &text[pos + 1..]),
            Some(0) => (&text[..1], &text[1..]),
            Some(pos) => (&text[..pos], &text[pos..]),
            None => (text, ""),
        };

        let rest = rest.trim();
        if !rest.is_empty() {
            self.pending = Some(SourceLine::new(rest, line));
        }

        SourceLine::new(space_if_paren(head.trim()), line)
    }
}

impl Iterator for LineReader<'_> {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let (text, line) = match self.pending.take() {
                Some(p) => (p.text, p.line),
                None => match self.lines.next() {
                    Some(raw) => {
                        self.line_number += 1;
                        (self.clean(raw), self.line_number)
                    }
                    None => {
                        self.finished = true;
                        if self.in_comment {
                            return Some(Err(ScriptError::Lex {
                                line: self.comment_start,
                            }));
                        }
                        return None;
                    }
                },
            };

            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let text = text.to_string();
            return Some(Ok(self.split(&text, line)));
        }
    }
}

/// `IF(` → `IF (` wherever `IF` starts a keyword (including `ELSEIF(`).
fn space_if_paren(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if rest.starts_with("IF(") && starts_keyword(&text[..i]) {
            out.push_str("IF (");
            i += 3;
            continue;
        }
        match rest.chars().next() {
            Some(c) => {
                out.push(c);
                i += c.len_utf8();
            }
            None => break,
        }
    }
    out
}

fn starts_keyword(before: &str) -> bool {
    if before.ends_with("ELSE") {
        return true;
    }
    match before.chars().last() {
        Some(c) => !(c.is_ascii_alphanumeric() || c == '_'),
        None => true,
    }
}

// ─────────────────────────────────────────────────────
// Helpers shared by the parsers
// ─────────────────────────────────────────────────────

/// Whether `c` may appear in a script identifier.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// If `text` starts with the keyword `kw` as a whole word, the trimmed rest.
///
/// `keyword_rest("IF (A)", "IF") == Some("(A)")`, `keyword_rest("IFX", "IF") == None`.
pub fn keyword_rest<'t>(text: &'t str, kw: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(kw)?;
    match rest.chars().next() {
        Some(c) if is_ident_char(c) => None,
        _ => Some(rest.trim()),
    }
}

/// Byte index of the `)` matching the `(` at byte index `open`.
pub fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Peel parentheses that enclose the whole of `text`: `((A))` → `A`.
pub fn strip_enclosing_parens(mut text: &str) -> &str {
    while text.starts_with('(') && matching_paren(text, 0) == Some(text.len() - 1) {
        text = text[1..text.len() - 1].trim();
    }
    text
}
