//! Word Parsing
//!
//! Parses single shell words: literal runs, quoting, parameter expansion,
//! command substitution and arithmetic expansion. Words are the boundary
//! between the parser and the dataflow engine's value expressions.

use crate::ast::types::{ParamExp, Word, WordPart};
use crate::parser::parser::Parser;
use crate::parser::types::ParseError;

/// Characters that terminate an unquoted word.
pub fn is_word_delim(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\n' | '\r' | ';' | '&' | '|' | '<' | '>' | '(' | ')'
    )
}

/// Characters valid in a variable name.
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Parse one word at the current position. Errors if no word characters are
/// present.
pub fn parse_word(p: &mut Parser) -> Result<Word, ParseError> {
    let mut parts: Vec<WordPart> = Vec::new();
    loop {
        p.tick()?;
        let Some(c) = p.peek() else { break };
        if is_word_delim(c) {
            break;
        }
        match c {
            '\'' => {
                p.advance();
                parts.push(WordPart::SglQuoted(scan_single_quoted(p)?));
            }
            '"' => {
                p.advance();
                parts.push(WordPart::DblQuoted(parse_double_quoted(p)?));
            }
            '\\' => {
                p.advance();
                match p.advance() {
                    // Line continuation joins the word across lines.
                    Some('\n') => continue,
                    Some(esc) => parts.push(WordPart::Lit(esc.to_string())),
                    None => {
                        return Err(ParseError::UnexpectedEof {
                            expected: "escaped character".into(),
                        })
                    }
                }
            }
            '$' => parts.push(parse_dollar(p)?),
            '`' => {
                p.advance();
                parts.push(WordPart::CmdSubst(scan_backquoted(p)?));
            }
            _ => {
                parts.push(WordPart::Lit(scan_literal_run(p)));
            }
        }
    }
    if parts.is_empty() {
        return Err(match p.peek() {
            Some(found) => ParseError::Unexpected {
                found,
                line: p.line(),
            },
            None => ParseError::UnexpectedEof {
                expected: "word".into(),
            },
        });
    }
    Ok(Word::new(parts))
}

/// Scan a run of plain literal characters.
fn scan_literal_run(p: &mut Parser) -> String {
    let mut out = String::new();
    while let Some(c) = p.peek() {
        if is_word_delim(c) || matches!(c, '\'' | '"' | '\\' | '$' | '`') {
            break;
        }
        out.push(c);
        p.advance();
    }
    out
}

/// Scan the remainder of a single-quoted string (opening quote consumed).
fn scan_single_quoted(p: &mut Parser) -> Result<String, ParseError> {
    let mut out = String::new();
    loop {
        match p.advance() {
            Some('\'') => return Ok(out),
            Some(c) => out.push(c),
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing single quote".into(),
                })
            }
        }
    }
}

/// Parse the contents of a double-quoted string (opening quote consumed).
pub fn parse_double_quoted(p: &mut Parser) -> Result<Vec<WordPart>, ParseError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();
    loop {
        p.tick()?;
        match p.peek() {
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing double quote".into(),
                })
            }
            Some('"') => {
                p.advance();
                break;
            }
            Some('\\') => {
                p.advance();
                match p.advance() {
                    Some('\n') => {}
                    Some(c @ ('"' | '$' | '`' | '\\')) => lit.push(c),
                    Some(c) => {
                        lit.push('\\');
                        lit.push(c);
                    }
                    None => {
                        return Err(ParseError::UnexpectedEof {
                            expected: "escaped character".into(),
                        })
                    }
                }
            }
            Some('$') => {
                if !lit.is_empty() {
                    parts.push(WordPart::Lit(std::mem::take(&mut lit)));
                }
                parts.push(parse_dollar(p)?);
            }
            Some('`') => {
                if !lit.is_empty() {
                    parts.push(WordPart::Lit(std::mem::take(&mut lit)));
                }
                p.advance();
                parts.push(WordPart::CmdSubst(scan_backquoted(p)?));
            }
            Some(c) => {
                lit.push(c);
                p.advance();
            }
        }
    }
    if !lit.is_empty() {
        parts.push(WordPart::Lit(lit));
    }
    Ok(parts)
}

/// Parse a `$`-introduced expansion: `$VAR`, `${...}`, `$(...)`, `$((...))`.
fn parse_dollar(p: &mut Parser) -> Result<WordPart, ParseError> {
    p.advance(); // consume '$'
    match p.peek() {
        Some('(') => {
            p.advance();
            if p.peek() == Some('(') {
                p.advance();
                Ok(WordPart::ArithExp(scan_arith_expansion(p)?))
            } else {
                Ok(WordPart::CmdSubst(scan_balanced_parens(p)?))
            }
        }
        Some('{') => {
            p.advance();
            let content = scan_braced(p)?;
            Ok(WordPart::ParamExp(parse_param_content(&content)))
        }
        Some(c) if is_name_start(c) => {
            let mut name = String::new();
            while let Some(c) = p.peek() {
                if !is_name_char(c) {
                    break;
                }
                name.push(c);
                p.advance();
            }
            Ok(WordPart::ParamExp(ParamExp {
                param: name,
                op_text: None,
            }))
        }
        Some(c) if c.is_ascii_digit() || matches!(c, '?' | '@' | '*' | '#' | '!' | '$' | '-') => {
            // Positional and special parameters are retained but are not
            // simple variable reads.
            p.advance();
            Ok(WordPart::ParamExp(ParamExp {
                param: c.to_string(),
                op_text: Some(c.to_string()),
            }))
        }
        _ => Ok(WordPart::Lit("$".to_string())),
    }
}

/// Split a `${...}` body into parameter name and trailing operator text.
fn parse_param_content(content: &str) -> ParamExp {
    let mut chars = content.chars().peekable();
    let mut prefix = String::new();
    // Leading '!' (indirection) or '#' (length) make the read non-simple.
    if matches!(chars.peek(), Some('!') | Some('#')) {
        prefix.push(chars.next().unwrap_or_default());
    }
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if !is_name_char(c) {
            break;
        }
        name.push(c);
        chars.next();
    }
    let rest: String = chars.collect();
    if prefix.is_empty() && rest.is_empty() {
        ParamExp {
            param: name,
            op_text: None,
        }
    } else {
        ParamExp {
            param: name,
            op_text: Some(format!("{prefix}{rest}")),
        }
    }
}

/// Scan to the matching `}` of a `${...}` expansion, tracking nesting.
fn scan_braced(p: &mut Parser) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        p.tick()?;
        match p.advance() {
            Some('}') if depth == 0 => return Ok(out),
            Some('}') => {
                depth -= 1;
                out.push('}');
            }
            Some('{') => {
                depth += 1;
                out.push('{');
            }
            Some(c) => out.push(c),
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing brace".into(),
                })
            }
        }
    }
}

/// Scan to the matching `)` of a `$(...)` substitution, tracking nesting.
fn scan_balanced_parens(p: &mut Parser) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        p.tick()?;
        match p.advance() {
            Some(')') if depth == 0 => return Ok(out),
            Some(')') => {
                depth -= 1;
                out.push(')');
            }
            Some('(') => {
                depth += 1;
                out.push('(');
            }
            Some(c) => out.push(c),
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing parenthesis".into(),
                })
            }
        }
    }
}

/// Scan to the closing `))` of a `$((...))` expansion.
fn scan_arith_expansion(p: &mut Parser) -> Result<String, ParseError> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        p.tick()?;
        match p.peek() {
            Some(')') if depth == 0 => {
                p.advance();
                if p.peek() == Some(')') {
                    p.advance();
                    return Ok(out);
                }
                out.push(')');
            }
            Some(')') => {
                depth -= 1;
                out.push(')');
                p.advance();
            }
            Some('(') => {
                depth += 1;
                out.push('(');
                p.advance();
            }
            Some(c) => {
                out.push(c);
                p.advance();
            }
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing arithmetic parentheses".into(),
                })
            }
        }
    }
}

/// Scan the body of a backquoted command substitution (opening quote consumed).
fn scan_backquoted(p: &mut Parser) -> Result<String, ParseError> {
    let mut out = String::new();
    loop {
        p.tick()?;
        match p.advance() {
            Some('`') => return Ok(out),
            Some('\\') => match p.advance() {
                Some(c @ ('`' | '\\' | '$')) => out.push(c),
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "escaped character".into(),
                    })
                }
            },
            Some(c) => out.push(c),
            None => {
                return Err(ParseError::UnexpectedEof {
                    expected: "closing backquote".into(),
                })
            }
        }
    }
}
