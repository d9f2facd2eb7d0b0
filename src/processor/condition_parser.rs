//! Condition parser for `IF` / `ELSEIF` headers.
//!
//! The text between the outer parentheses is split at top-level `&&` / `||`
//! (or `AND` / `OR`) into a flat chain. A segment that is a bracketed group
//! with its own connectives becomes a nested chain; any other segment is a
//! single relational test.

use super::ast::{Comparison, CondOperand, CondTerm, Condition, Conditions, Expr, Logic};
use super::error::{Result, ScriptError};
use super::lexer::{keyword_rest, strip_enclosing_parens};
use super::script_parser::ScriptParser;

/// Parse a condition chain. `line` is used for error reporting only.
pub fn parse_conditions(text: &str, line: usize, parser: &ScriptParser) -> Result<Conditions> {
    let mut segments = split_logic(text, line)?.into_iter();
    let first = match segments.next() {
        Some((_, seg)) => parse_operand(&seg, line, parser)?,
        None => return Err(ScriptError::condition(line, "empty condition")),
    };

    let mut rest = Vec::new();
    for (logic, seg) in segments {
        let logic = logic.ok_or_else(|| ScriptError::condition(line, "missing `&&` / `||`"))?;
        rest.push((logic, parse_operand(&seg, line, parser)?));
    }

    Ok(Conditions { first, rest })
}

fn parse_operand(segment: &str, line: usize, parser: &ScriptParser) -> Result<CondOperand> {
    let (negated, body) = strip_negation(segment);
    let body = strip_enclosing_parens(body);
    if body.is_empty() {
        return Err(ScriptError::condition(line, "missing condition"));
    }

    let term = if split_logic(body, line)?.len() > 1 {
        CondTerm::Group(Box::new(parse_conditions(body, line, parser)?))
    } else {
        CondTerm::Test(parse_condition(body, line, parser)?)
    };
    Ok(CondOperand { negated, term })
}

/// Leading `!` (not `!=`) or `NOT`.
fn strip_negation(segment: &str) -> (bool, &str) {
    let segment = segment.trim();
    if let Some(rest) = segment.strip_prefix('!') {
        if !rest.starts_with('=') {
            return (true, rest.trim_start());
        }
    }
    match keyword_rest(segment, "NOT") {
        Some(rest) => (true, rest),
        None => (false, segment),
    }
}

/// Split at top-level connectives into `(preceding connective, segment)`.
fn split_logic(text: &str, line: usize) -> Result<Vec<(Option<Logic>, String)>> {
    let mut segments = Vec::new();
    let mut pending = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        match rest.as_bytes()[0] {
            b'(' => depth += 1,
            b')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ScriptError::condition(line, "unbalanced parentheses"))?;
            }
            _ => {}
        }

        if depth == 0 {
            if let Some((logic, len)) = connective(rest) {
                segments.push((pending, text[start..i].trim().to_string()));
                pending = Some(logic);
                i += len;
                start = i;
                continue;
            }
        }
        i += rest.chars().next().map_or(1, char::len_utf8);
    }

    if depth != 0 {
        return Err(ScriptError::condition(line, "unbalanced parentheses"));
    }
    segments.push((pending, text[start..].trim().to_string()));

    if segments.iter().any(|(_, s)| s.is_empty()) {
        return Err(ScriptError::condition(line, "missing condition"));
    }
    Ok(segments)
}

fn connective(rest: &str) -> Option<(Logic, usize)> {
    if rest.starts_with("&&") {
        return Some((Logic::And, 2));
    }
    if rest.starts_with("||") {
        return Some((Logic::Or, 2));
    }
    for (word, logic) in [(" AND", Logic::And), (" OR", Logic::Or)] {
        if let Some(after) = rest.strip_prefix(word) {
            if after.starts_with(' ') || after.starts_with('(') {
                return Some((logic, word.len()));
            }
        }
    }
    None
}

/// One relational test: `<expr> [<cmp> <expr>]`.
///
/// A `!` prefix on either side sets that side's negate flag; the flags are
/// only honoured when there is no comparison.
pub fn parse_condition(text: &str, line: usize, parser: &ScriptParser) -> Result<Condition> {
    let marked = mark_logical_not(strip_enclosing_parens(text.trim()));

    let Some((pos, sep)) = find_comparison(&marked) else {
        let (negate_lhs, lhs) = side(&marked, line, parser)?;
        return Ok(Condition {
            lhs,
            negate_lhs,
            compare: None,
            negate_rhs: false,
        });
    };

    let cmp = match sep {
        "=" => Comparison::Eq,
        sep => Comparison::from_symbol(sep)
            .ok_or_else(|| ScriptError::condition(line, format!("invalid comparison `{sep}`")))?,
    };
    let (negate_lhs, lhs) = side(&marked[..pos], line, parser)?;
    let (negate_rhs, rhs) = side(&marked[pos + sep.len()..], line, parser)?;

    Ok(Condition {
        lhs,
        negate_lhs,
        compare: Some((cmp, rhs)),
        negate_rhs,
    })
}

/// `!` that is not part of `!=` → `^`.
fn mark_logical_not(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '!' && chars.peek() != Some(&'=') {
            out.push('^');
        } else {
            out.push(c);
        }
    }
    out
}

/// First top-level relational separator and its byte position.
fn find_comparison(text: &str) -> Option<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'<' | b'>' | b'!' | b'=' if depth == 0 => {
                let len = if bytes.get(i + 1) == Some(&b'=') { 2 } else { 1 };
                return Some((i, &text[i..i + len]));
            }
            _ => {}
        }
    }
    None
}

fn side(text: &str, line: usize, parser: &ScriptParser) -> Result<(bool, Expr)> {
    let text = text.trim();
    let (negated, text) = match text.strip_prefix('^') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    if text.is_empty() {
        return Err(ScriptError::condition(line, "missing operand"));
    }
    let expr = parser.parse_expr(&text.replace('^', "!"), line)?;
    Ok((negated, expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ast::{ExternalFloat, Operand};
    use crate::processor::script_parser::NameTables;

    fn parse(text: &str) -> Result<Conditions> {
        let tables = NameTables::default();
        let parser = ScriptParser::new(&tables, vec!["A".into(), "B".into(), "C".into()]);
        parse_conditions(text, 1, &parser)
    }

    fn cmp_test(lhs: Operand, cmp: Comparison, rhs: i32) -> CondOperand {
        CondOperand {
            negated: false,
            term: CondTerm::Test(Condition {
                lhs: Expr::Value(lhs),
                negate_lhs: false,
                compare: Some((cmp, Expr::constant(rhs))),
                negate_rhs: false,
            }),
        }
    }

    #[test]
    fn test_flat_chain() {
        let test_cases = vec![
            ("A == 1", 0),
            ("(STATE == 0) || (STATE == 1)", 1),
            ("A == 1 && B == 1 || C == 1", 2),
            ("A == 1 AND B == 1 OR C == 1", 2),
            ("A == 1 AND(B == 1)", 1),
        ];

        for (text, rest) in test_cases {
            let conds = parse(text).unwrap();
            assert_eq!(conds.rest.len(), rest, "condition: {text}");
        }

        let conds = parse("(STATE == 0) || (STATE == 1)").unwrap();
        assert_eq!(conds.first, cmp_test(Operand::External(ExternalFloat::State), Comparison::Eq, 0));
        assert_eq!(
            conds.rest,
            vec![(Logic::Or, cmp_test(Operand::External(ExternalFloat::State), Comparison::Eq, 1))]
        );
    }

    #[test]
    fn test_bracket_group() {
        let conds = parse("(A==1 && B==1) || C==1").unwrap();
        let CondTerm::Group(group) = &conds.first.term else {
            panic!("expected group, got {:?}", conds.first);
        };
        assert_eq!(group.first, cmp_test(Operand::Local(0), Comparison::Eq, 1));
        assert_eq!(group.rest, vec![(Logic::And, cmp_test(Operand::Local(1), Comparison::Eq, 1))]);
        assert_eq!(conds.rest, vec![(Logic::Or, cmp_test(Operand::Local(2), Comparison::Eq, 1))]);
    }

    #[test]
    fn test_nested_groups() {
        let conds = parse("((A==1 && (B==1 || C==1)) || A==2)").unwrap();
        let CondTerm::Group(outer) = &conds.first.term else {
            panic!("expected group, got {:?}", conds.first);
        };
        assert!(conds.rest.is_empty());

        let CondTerm::Group(inner) = &outer.first.term else {
            panic!("expected group, got {:?}", outer.first);
        };
        assert_eq!(outer.rest, vec![(Logic::Or, cmp_test(Operand::Local(0), Comparison::Eq, 2))]);
        assert_eq!(inner.first, cmp_test(Operand::Local(0), Comparison::Eq, 1));

        let (logic, innermost) = &inner.rest[0];
        assert_eq!(*logic, Logic::And);
        let CondTerm::Group(innermost) = &innermost.term else {
            panic!("expected group, got {innermost:?}");
        };
        assert_eq!(
            innermost.rest,
            vec![(Logic::Or, cmp_test(Operand::Local(2), Comparison::Eq, 1))]
        );
    }

    #[test]
    fn test_negation() {
        let conds = parse("!(ENABLED)").unwrap();
        assert!(conds.first.negated);
        let CondTerm::Test(cond) = &conds.first.term else {
            panic!("expected test");
        };
        assert_eq!(cond.compare, None);
        assert!(!cond.negate_lhs);

        let conds = parse("NOT A != 2").unwrap();
        assert!(conds.first.negated);

        let conds = parse("(!A)").unwrap();
        let CondTerm::Test(cond) = &conds.first.term else {
            panic!("expected test");
        };
        assert!(!conds.first.negated);
        assert!(cond.negate_lhs);
    }

    #[test]
    fn test_comparisons() {
        let test_cases = vec![
            ("A > 1", Comparison::Gt),
            ("A >= 1", Comparison::Ge),
            ("A < 1", Comparison::Lt),
            ("A <= 1", Comparison::Le),
            ("A == 1", Comparison::Eq),
            ("A ==# 1", Comparison::Eq),
            ("A != 1", Comparison::Ne),
            ("A = 1", Comparison::Eq),
        ];

        for (text, expected) in test_cases {
            let cond = parse_condition(text, 1, &ScriptParser::new(&NameTables::default(), vec!["A".into()]))
                .unwrap();
            assert_eq!(cond.compare.map(|(c, _)| c), Some(expected), "condition: {text}");
        }
    }

    #[test]
    fn test_condition_errors() {
        let test_cases = vec![
            "A == 1 &&",
            "(A == 1",
            "A == 1) || (B == 1",
            "()",
            "A == ",
        ];

        for text in test_cases {
            assert!(
                matches!(parse(text), Err(ScriptError::ConditionSyntax { .. })),
                "condition: {text}"
            );
        }
    }
}
