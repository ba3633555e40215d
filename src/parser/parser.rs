//! Recursive Descent Parser for Bash Scripts
//!
//! Consumes characters directly and produces the AST in `crate::ast`.
//!
//! Grammar (simplified):
//!   script       ::= statement*
//!   statement    ::= pipeline ((&&|'||') statement)?
//!   pipeline     ::= command ((| or |&) pipeline)?
//!   command      ::= call_expr | if | for | block | func_decl | (( ))
//!   call_expr    ::= (assignment)* (word | redirection)*
//!
//! Constructs outside the supported subset (while/until/case/subshell,
//! heredocs) produce a `ParseError`; callers degrade per the analysis error
//! policy.

use crate::ast::types::{
    ArithmCmd, Assign, BinOp, BinaryCmd, Block, CallExpr, Cmd, ElsePart, File, ForClause,
    FuncDecl, IfClause, Loop, Position, Redirect, RedirOp, Stmt, Word,
};
use crate::parser::types::{ParseError, MAX_INPUT_SIZE, MAX_PARSER_DEPTH, MAX_PARSE_ITERATIONS};
use crate::parser::word_parser::{is_name_char, is_name_start, is_word_delim, parse_word};

/// Keywords that introduce constructs the analysis does not model.
const UNSUPPORTED_KEYWORDS: &[&str] = &["while", "until", "case", "select", "coproc", "time"];

/// Parse a complete script.
pub fn parse(source: &str) -> Result<File, ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse_file()
}

/// Parse a string as a sequence of shell words (tokenization only).
///
/// Used to decide whether a dynamically resolved value splits into multiple
/// command arguments. Operators anywhere in the input are an error.
pub fn parse_expr(source: &str) -> Result<Vec<Word>, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut words = Vec::new();
    loop {
        parser.skip_blank();
        if parser.eof() {
            break;
        }
        if let Some(c) = parser.peek() {
            if is_word_delim(c) {
                return Err(ParseError::Unexpected {
                    found: c,
                    line: parser.line(),
                });
            }
        }
        words.push(parse_word(&mut parser)?);
    }
    Ok(words)
}

/// Character-cursor parser state.
pub struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    iterations: usize,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        if source.len() > MAX_INPUT_SIZE {
            return Err(ParseError::InputTooLarge);
        }
        Ok(Parser {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            iterations: 0,
            depth: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Cursor primitives
    // -------------------------------------------------------------------------

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(ch) = c {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
            }
        }
        c
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            col: 0,
            offset: self.pos,
        }
    }

    /// Iteration guard shared by all parsing loops.
    pub fn tick(&mut self) -> Result<(), ParseError> {
        self.iterations += 1;
        if self.iterations > MAX_PARSE_ITERATIONS {
            return Err(ParseError::IterationLimit);
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(ParseError::DepthLimit);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek_str(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn consume_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.advance();
        }
    }

    // -------------------------------------------------------------------------
    // Whitespace, comments, separators
    // -------------------------------------------------------------------------

    /// Skip spaces, tabs, line continuations and comments (not newlines).
    pub fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Skip blanks plus statement separators: newlines, `;` and background `&`.
    fn skip_separators(&mut self) {
        loop {
            self.skip_blank();
            match self.peek() {
                Some('\n') | Some(';') => {
                    self.advance();
                }
                Some('&') if !self.peek_str("&&") && !self.peek_str("&>") => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// Skip blanks and newlines; used after `&&`, `||` and `|` where a
    /// command may continue on the next line.
    fn skip_linespace(&mut self) {
        loop {
            self.skip_blank();
            if self.peek() == Some('\n') {
                self.advance();
            } else {
                break;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Keyword handling
    // -------------------------------------------------------------------------

    /// Return the unquoted keyword-like token at the cursor, if any.
    fn peek_keyword(&self) -> Option<String> {
        let mut out = String::new();
        let mut i = 0;
        loop {
            match self.peek_at(i) {
                Some(c) if c == '{' || c == '}' => {
                    if out.is_empty() {
                        out.push(c);
                        i += 1;
                    }
                    break;
                }
                Some(c) if !is_word_delim(c) && !matches!(c, '\'' | '"' | '\\' | '$' | '`' | '=') => {
                    out.push(c);
                    i += 1;
                }
                _ => break,
            }
        }
        // A keyword must be followed by a delimiter (or end of input).
        match self.peek_at(i) {
            None => {}
            Some(c) if is_word_delim(c) => {}
            Some(_) => return None,
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek_keyword().as_deref() == Some(kw)
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        self.skip_separators();
        if self.at_keyword(kw) {
            self.consume_str(kw);
            Ok(())
        } else {
            match self.peek() {
                Some(found) => Err(ParseError::Unexpected {
                    found,
                    line: self.line,
                }),
                None => Err(ParseError::UnexpectedEof {
                    expected: kw.to_string(),
                }),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn parse_file(&mut self) -> Result<File, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.tick()?;
            self.skip_separators();
            if self.eof() {
                break;
            }
            stmts.push(self.parse_and_or()?);
        }
        Ok(File { stmts })
    }

    /// Parse a statement list until one of the terminator keywords is seen in
    /// command position. The terminator is not consumed.
    fn parse_stmts_until(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.tick()?;
            self.skip_separators();
            if self.eof() {
                return Err(ParseError::UnexpectedEof {
                    expected: terminators.join(" | "),
                });
            }
            if let Some(kw) = self.peek_keyword() {
                if terminators.contains(&kw.as_str()) {
                    break;
                }
            }
            stmts.push(self.parse_and_or()?);
        }
        Ok(stmts)
    }

    /// Statement: pipeline optionally chained with `&&` / `||`.
    ///
    /// Chains associate to the right; the analysis executes both sides in
    /// sequence regardless, so associativity carries no meaning here.
    fn parse_and_or(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let result = self.parse_and_or_inner();
        self.leave();
        result
    }

    fn parse_and_or_inner(&mut self) -> Result<Stmt, ParseError> {
        let lhs = self.parse_pipeline()?;
        self.skip_blank();
        let op = if self.peek_str("&&") {
            Some(BinOp::AndStmt)
        } else if self.peek_str("||") {
            Some(BinOp::OrStmt)
        } else {
            None
        };
        let Some(op) = op else { return Ok(lhs) };
        let pos = lhs.pos;
        self.consume_str("&&"); // same length as "||"
        self.skip_linespace();
        let rhs = self.parse_and_or()?;
        Ok(Stmt::new(
            Cmd::BinaryCmd(BinaryCmd {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }),
            pos,
        ))
    }

    /// Pipeline: command optionally piped into another pipeline.
    fn parse_pipeline(&mut self) -> Result<Stmt, ParseError> {
        let lhs = self.parse_command()?;
        self.skip_blank();
        let op = if self.peek_str("|&") {
            self.consume_str("|&");
            Some(BinOp::PipeAll)
        } else if self.peek() == Some('|') && !self.peek_str("||") {
            self.advance();
            Some(BinOp::Pipe)
        } else {
            None
        };
        let Some(op) = op else { return Ok(lhs) };
        let pos = lhs.pos;
        self.skip_linespace();
        let rhs = self.parse_pipeline()?;
        Ok(Stmt::new(
            Cmd::BinaryCmd(BinaryCmd {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }),
            pos,
        ))
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn parse_command(&mut self) -> Result<Stmt, ParseError> {
        self.enter()?;
        let result = self.parse_command_inner();
        self.leave();
        result
    }

    fn parse_command_inner(&mut self) -> Result<Stmt, ParseError> {
        self.skip_blank();
        let pos = self.position();

        if let Some(kw) = self.peek_keyword() {
            if UNSUPPORTED_KEYWORDS.contains(&kw.as_str()) {
                return Err(ParseError::Unsupported {
                    what: kw,
                    line: self.line,
                });
            }
            match kw.as_str() {
                "if" => {
                    self.consume_str("if");
                    let clause = self.parse_if_clause()?;
                    let mut stmt = Stmt::new(Cmd::IfClause(clause), pos);
                    stmt.redirs = self.parse_trailing_redirects()?;
                    return Ok(stmt);
                }
                "for" => {
                    self.consume_str("for");
                    let clause = self.parse_for_clause(pos)?;
                    let mut stmt = Stmt::new(Cmd::ForClause(clause), pos);
                    stmt.redirs = self.parse_trailing_redirects()?;
                    return Ok(stmt);
                }
                "{" => {
                    self.advance();
                    let stmts = self.parse_stmts_until(&["}"])?;
                    self.expect_keyword("}")?;
                    let mut stmt = Stmt::new(Cmd::Block(Block { stmts }), pos);
                    stmt.redirs = self.parse_trailing_redirects()?;
                    return Ok(stmt);
                }
                "function" => {
                    self.consume_str("function");
                    return self.parse_function_decl(pos);
                }
                _ => {}
            }
        }

        if self.peek_str("((") {
            self.consume_str("((");
            let expr = self.scan_arith_command()?;
            return Ok(Stmt::new(Cmd::ArithmCmd(ArithmCmd { expr }), pos));
        }
        if self.peek() == Some('(') {
            return Err(ParseError::Unsupported {
                what: "subshell".into(),
                line: self.line,
            });
        }

        self.parse_call_expr(pos)
    }

    fn parse_if_clause(&mut self) -> Result<IfClause, ParseError> {
        let cond = self.parse_stmts_until(&["then"])?;
        self.expect_keyword("then")?;
        let then_stmts = self.parse_stmts_until(&["elif", "else", "fi"])?;
        self.skip_separators();
        if self.at_keyword("elif") {
            self.consume_str("elif");
            let nested = self.parse_if_clause()?;
            return Ok(IfClause {
                cond,
                then_stmts,
                else_part: Some(ElsePart::Elif(Box::new(nested))),
            });
        }
        if self.at_keyword("else") {
            self.consume_str("else");
            let else_stmts = self.parse_stmts_until(&["fi"])?;
            self.expect_keyword("fi")?;
            return Ok(IfClause {
                cond,
                then_stmts,
                else_part: Some(ElsePart::Else(else_stmts)),
            });
        }
        self.expect_keyword("fi")?;
        Ok(IfClause {
            cond,
            then_stmts,
            else_part: None,
        })
    }

    fn parse_for_clause(&mut self, pos: Position) -> Result<ForClause, ParseError> {
        self.skip_blank();
        if self.peek_str("((") {
            self.consume_str("((");
            let init = self.scan_arith_section(';')?;
            let cond = self.scan_arith_section(';')?;
            let post = self.scan_arith_section(')')?;
            if self.peek() == Some(')') {
                self.advance();
            }
            let wrap = |expr: String| -> Option<Box<Stmt>> {
                let trimmed = expr.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Box::new(Stmt::new(
                        Cmd::ArithmCmd(ArithmCmd { expr: trimmed }),
                        pos,
                    )))
                }
            };
            self.expect_keyword("do")?;
            let body = self.parse_stmts_until(&["done"])?;
            self.expect_keyword("done")?;
            return Ok(ForClause {
                loop_header: Loop::CStyle {
                    init: wrap(init),
                    cond: wrap(cond),
                    post: wrap(post),
                },
                body,
            });
        }

        let var = self.read_name()?;
        self.skip_blank();
        let mut items = Vec::new();
        if self.at_keyword("in") {
            self.consume_str("in");
            loop {
                self.tick()?;
                self.skip_blank();
                match self.peek() {
                    None | Some('\n') | Some(';') => break,
                    _ => items.push(parse_word(self)?),
                }
            }
        }
        self.expect_keyword("do")?;
        let body = self.parse_stmts_until(&["done"])?;
        self.expect_keyword("done")?;
        Ok(ForClause {
            loop_header: Loop::ForEach { var, items },
            body,
        })
    }

    fn parse_function_decl(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        self.skip_blank();
        let name = self.read_name()?;
        self.skip_blank();
        if self.peek_str("()") {
            self.consume_str("()");
        }
        self.parse_function_body(name, pos)
    }

    fn parse_function_body(&mut self, name: String, pos: Position) -> Result<Stmt, ParseError> {
        self.skip_linespace();
        if self.peek() != Some('{') {
            return Err(ParseError::Unsupported {
                what: "non-block function body".into(),
                line: self.line,
            });
        }
        self.advance();
        let stmts = self.parse_stmts_until(&["}"])?;
        self.expect_keyword("}")?;
        let body = Stmt::new(Cmd::Block(Block { stmts }), pos);
        Ok(Stmt::new(
            Cmd::FuncDecl(FuncDecl {
                name,
                body: Box::new(body),
            }),
            pos,
        ))
    }

    fn parse_call_expr(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let mut assigns: Vec<Assign> = Vec::new();
        let mut args: Vec<Word> = Vec::new();
        let mut redirs: Vec<Redirect> = Vec::new();

        loop {
            self.tick()?;
            self.skip_blank();
            match self.peek() {
                None | Some('\n') | Some(';') | Some(')') => break,
                Some('&') if !self.peek_str("&>") => break,
                Some('|') => break,
                Some('}') if self.at_keyword("}") => break,
                _ => {}
            }

            if self.at_redirect_start() {
                redirs.push(self.parse_redirect()?);
                continue;
            }

            if args.is_empty() {
                if let Some(assign) = self.try_parse_assignment()? {
                    assigns.push(assign);
                    continue;
                }
            }

            let word = parse_word(self)?;

            // Function declaration of the form `name() { ... }`.
            if args.is_empty() && assigns.is_empty() && redirs.is_empty() && self.peek_str("()") {
                if let Some(name) = word_as_plain_name(&word) {
                    self.consume_str("()");
                    return self.parse_function_body(name, pos);
                }
            }
            args.push(word);
        }

        if assigns.is_empty() && args.is_empty() && redirs.is_empty() {
            return match self.peek() {
                Some(found) => Err(ParseError::Unexpected {
                    found,
                    line: self.line,
                }),
                None => Err(ParseError::UnexpectedEof {
                    expected: "command".into(),
                }),
            };
        }

        let mut stmt = Stmt::new(Cmd::CallExpr(CallExpr { assigns, args }), pos);
        stmt.redirs = redirs;
        Ok(stmt)
    }

    /// Attempt to parse `NAME=value` / `NAME+=value` at the cursor.
    fn try_parse_assignment(&mut self) -> Result<Option<Assign>, ParseError> {
        let Some(c) = self.peek() else { return Ok(None) };
        if !is_name_start(c) {
            return Ok(None);
        }
        let mut i = 0;
        while let Some(c) = self.peek_at(i) {
            if !is_name_char(c) {
                break;
            }
            i += 1;
        }
        if i == 0 {
            return Ok(None);
        }
        let append = self.peek_at(i) == Some('+') && self.peek_at(i + 1) == Some('=');
        let plain = self.peek_at(i) == Some('=');
        if !append && !plain {
            return Ok(None);
        }

        let mut name = String::new();
        for _ in 0..i {
            if let Some(c) = self.advance() {
                name.push(c);
            }
        }
        self.consume_str(if append { "+=" } else { "=" });

        let value = match self.peek() {
            None => None,
            Some(c) if is_word_delim(c) => None,
            _ => Some(parse_word(self)?),
        };
        Ok(Some(Assign {
            name,
            value,
            append,
        }))
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            name.push(c);
            self.advance();
        }
        if name.is_empty() {
            return match self.peek() {
                Some(found) => Err(ParseError::Unexpected {
                    found,
                    line: self.line,
                }),
                None => Err(ParseError::UnexpectedEof {
                    expected: "name".into(),
                }),
            };
        }
        Ok(name)
    }

    // -------------------------------------------------------------------------
    // Redirections
    // -------------------------------------------------------------------------

    fn at_redirect_start(&self) -> bool {
        match self.peek() {
            Some('<') | Some('>') => true,
            Some('&') => self.peek_str("&>"),
            Some(c) if c.is_ascii_digit() => {
                // A digit run immediately followed by a redirect operator.
                let mut i = 0;
                while matches!(self.peek_at(i), Some(d) if d.is_ascii_digit()) {
                    i += 1;
                }
                matches!(self.peek_at(i), Some('<') | Some('>'))
            }
            _ => false,
        }
    }

    fn parse_redirect(&mut self) -> Result<Redirect, ParseError> {
        let mut fd: Option<u32> = None;
        if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            let mut digits = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                digits.push(self.advance().unwrap_or_default());
            }
            fd = digits.parse().ok();
        }

        let op = if self.peek_str("&>>") {
            self.consume_str("&>>");
            RedirOp::AppAll
        } else if self.peek_str("&>") {
            self.consume_str("&>");
            RedirOp::RdrAll
        } else if self.peek_str(">>") {
            self.consume_str(">>");
            RedirOp::AppOut
        } else if self.peek_str(">&") {
            self.consume_str(">&");
            RedirOp::DplOut
        } else if self.peek_str("<<") {
            return Err(ParseError::Unsupported {
                what: "heredoc".into(),
                line: self.line,
            });
        } else if self.peek() == Some('>') {
            self.advance();
            RedirOp::RdrOut
        } else if self.peek() == Some('<') {
            self.advance();
            RedirOp::RdrIn
        } else {
            return Err(ParseError::Unexpected {
                found: self.peek().unwrap_or_default(),
                line: self.line,
            });
        };

        self.skip_blank();
        let word = match self.peek() {
            None => None,
            Some(c) if is_word_delim(c) => None,
            _ => Some(parse_word(self)?),
        };
        Ok(Redirect { op, fd, word })
    }

    fn parse_trailing_redirects(&mut self) -> Result<Vec<Redirect>, ParseError> {
        let mut redirs = Vec::new();
        loop {
            self.skip_blank();
            if self.at_redirect_start() {
                redirs.push(self.parse_redirect()?);
            } else {
                break;
            }
        }
        Ok(redirs)
    }

    // -------------------------------------------------------------------------
    // Arithmetic scanning
    // -------------------------------------------------------------------------

    /// Scan the body of `(( ... ))` up to the closing `))`.
    fn scan_arith_command(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        let mut depth = 0usize;
        loop {
            self.tick()?;
            match self.peek() {
                Some(')') if depth == 0 && self.peek_str("))") => {
                    self.consume_str("))");
                    return Ok(out.trim().to_string());
                }
                Some(')') => {
                    depth = depth.saturating_sub(1);
                    out.push(')');
                    self.advance();
                }
                Some('(') => {
                    depth += 1;
                    out.push('(');
                    self.advance();
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "))".into(),
                    })
                }
            }
        }
    }

    /// Scan one section of a C-style loop header, ending at `terminator`
    /// (or at the closing `))` for the last section).
    fn scan_arith_section(&mut self, terminator: char) -> Result<String, ParseError> {
        let mut out = String::new();
        let mut depth = 0usize;
        loop {
            self.tick()?;
            match self.peek() {
                Some(c) if c == terminator && depth == 0 => {
                    self.advance();
                    return Ok(out);
                }
                Some('(') => {
                    depth += 1;
                    out.push('(');
                    self.advance();
                }
                Some(')') => {
                    depth = depth.saturating_sub(1);
                    out.push(')');
                    self.advance();
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: terminator.to_string(),
                    })
                }
            }
        }
    }
}

/// If the word is a single plain literal usable as a function name, return it.
fn word_as_plain_name(word: &Word) -> Option<String> {
    use crate::ast::types::WordPart;
    if word.parts.len() != 1 {
        return None;
    }
    match &word.parts[0] {
        WordPart::Lit(name)
            if !name.is_empty() && name.chars().all(is_name_char) && !name.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            Some(name.clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::WordPart;

    fn first_cmd(src: &str) -> Cmd {
        parse(src).expect("parse failed").stmts.remove(0).cmd
    }

    fn single(mut file: File) -> Stmt {
        assert_eq!(file.stmts.len(), 1);
        file.stmts.remove(0)
    }

    #[test]
    fn test_simple_command() {
        let stmt = single(parse("echo hello world").unwrap());
        let Cmd::CallExpr(call) = stmt.cmd else {
            panic!("expected call expr");
        };
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[0], Word::lit("echo"));
        assert_eq!(call.args[2], Word::lit("world"));
    }

    #[test]
    fn test_assignment_only() {
        let stmt = single(parse("FOO=bar").unwrap());
        let Cmd::CallExpr(call) = stmt.cmd else {
            panic!("expected call expr");
        };
        assert!(call.args.is_empty());
        assert_eq!(call.assigns.len(), 1);
        assert_eq!(call.assigns[0].name, "FOO");
        assert_eq!(call.assigns[0].value, Some(Word::lit("bar")));
    }

    #[test]
    fn test_assignment_with_expansion() {
        let stmt = single(parse("OUT=\"$DIR/file\"").unwrap());
        let Cmd::CallExpr(call) = stmt.cmd else {
            panic!("expected call expr");
        };
        let value = call.assigns[0].value.clone().unwrap();
        let WordPart::DblQuoted(parts) = &value.parts[0] else {
            panic!("expected double quoted");
        };
        assert!(matches!(&parts[0], WordPart::ParamExp(p) if p.param == "DIR" && p.is_simple()));
        assert_eq!(parts[1], WordPart::Lit("/file".into()));
    }

    #[test]
    fn test_pipe() {
        let stmt = single(parse("echo hello | base64").unwrap());
        let Cmd::BinaryCmd(bin) = stmt.cmd else {
            panic!("expected binary cmd");
        };
        assert_eq!(bin.op, BinOp::Pipe);
        assert!(matches!(bin.lhs.cmd, Cmd::CallExpr(_)));
        assert!(matches!(bin.rhs.cmd, Cmd::CallExpr(_)));
    }

    #[test]
    fn test_and_or() {
        let stmt = single(parse("make build && make test || echo failed").unwrap());
        let Cmd::BinaryCmd(bin) = stmt.cmd else {
            panic!("expected binary cmd");
        };
        assert_eq!(bin.op, BinOp::AndStmt);
        let Cmd::BinaryCmd(inner) = bin.rhs.cmd else {
            panic!("expected nested binary cmd");
        };
        assert_eq!(inner.op, BinOp::OrStmt);
    }

    #[test]
    fn test_if_else() {
        let cmd = first_cmd("if test -f x; then echo yes; else echo no; fi");
        let Cmd::IfClause(clause) = cmd else {
            panic!("expected if clause");
        };
        assert_eq!(clause.cond.len(), 1);
        assert_eq!(clause.then_stmts.len(), 1);
        assert!(matches!(clause.else_part, Some(ElsePart::Else(_))));
    }

    #[test]
    fn test_elif_chain() {
        let cmd = first_cmd("if a; then b; elif c; then d; fi");
        let Cmd::IfClause(clause) = cmd else {
            panic!("expected if clause");
        };
        let Some(ElsePart::Elif(nested)) = clause.else_part else {
            panic!("expected elif");
        };
        assert!(nested.else_part.is_none());
    }

    #[test]
    fn test_for_each() {
        let cmd = first_cmd("for f in a b c; do echo \"$f\"; done");
        let Cmd::ForClause(clause) = cmd else {
            panic!("expected for clause");
        };
        let Loop::ForEach { var, items } = clause.loop_header else {
            panic!("expected for-each loop");
        };
        assert_eq!(var, "f");
        assert_eq!(items.len(), 3);
        assert_eq!(clause.body.len(), 1);
    }

    #[test]
    fn test_cstyle_for() {
        let cmd = first_cmd("for ((i=0; i<10; i++)); do echo x; done");
        let Cmd::ForClause(clause) = cmd else {
            panic!("expected for clause");
        };
        let Loop::CStyle { init, cond, post } = clause.loop_header else {
            panic!("expected c-style loop");
        };
        assert!(init.is_some() && cond.is_some() && post.is_some());
        let Cmd::ArithmCmd(a) = &init.unwrap().cmd else {
            panic!("expected arithm cmd");
        };
        assert_eq!(a.expr, "i=0");
    }

    #[test]
    fn test_func_decl_paren_form() {
        let cmd = first_cmd("greet() { echo hi; }");
        let Cmd::FuncDecl(decl) = cmd else {
            panic!("expected func decl");
        };
        assert_eq!(decl.name, "greet");
        assert!(matches!(decl.body.cmd, Cmd::Block(_)));
    }

    #[test]
    fn test_func_decl_keyword_form() {
        let cmd = first_cmd("function greet { echo hi; }");
        assert!(matches!(cmd, Cmd::FuncDecl(d) if d.name == "greet"));
    }

    #[test]
    fn test_redirect_append() {
        let stmt = single(parse("echo \"version=1.0\" >> \"$GITHUB_OUTPUT\"").unwrap());
        assert_eq!(stmt.redirs.len(), 1);
        assert_eq!(stmt.redirs[0].op, RedirOp::AppOut);
        let word = stmt.redirs[0].word.clone().unwrap();
        let WordPart::DblQuoted(parts) = &word.parts[0] else {
            panic!("expected double quoted redirect target");
        };
        assert!(matches!(&parts[0], WordPart::ParamExp(p) if p.param == "GITHUB_OUTPUT"));
    }

    #[test]
    fn test_stderr_redirect_has_fd() {
        let stmt = single(parse("cmd 2>err.log").unwrap());
        assert_eq!(stmt.redirs[0].fd, Some(2));
        assert_eq!(stmt.redirs[0].op, RedirOp::RdrOut);
    }

    #[test]
    fn test_command_substitution_word() {
        let stmt = single(parse("echo $(date)").unwrap());
        let Cmd::CallExpr(call) = stmt.cmd else {
            panic!("expected call expr");
        };
        assert!(matches!(&call.args[1].parts[0], WordPart::CmdSubst(s) if s == "date"));
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(matches!(
            parse("while true; do x; done"),
            Err(ParseError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("cat <<EOF\nhi\nEOF"),
            Err(ParseError::Unsupported { .. })
        ));
        assert!(matches!(
            parse("(echo subshell)"),
            Err(ParseError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let file = parse("# build\n\necho one # trailing\necho two\n").unwrap();
        assert_eq!(file.stmts.len(), 2);
    }

    #[test]
    fn test_parse_expr_tokenization() {
        let words = parse_expr("-Dmaven.test.skip=true").unwrap();
        assert_eq!(words.len(), 1);
        let words = parse_expr("package install").unwrap();
        assert_eq!(words.len(), 2);
        assert!(parse_expr("a | b").is_err());
    }

    #[test]
    fn test_single_quotes_preserve_dollar() {
        let stmt = single(parse("echo '$HOME'").unwrap());
        let Cmd::CallExpr(call) = stmt.cmd else {
            panic!("expected call expr");
        };
        assert_eq!(call.args[1].parts[0], WordPart::SglQuoted("$HOME".into()));
    }

    #[test]
    fn test_block_statement() {
        let cmd = first_cmd("{ echo a; echo b; }");
        let Cmd::Block(block) = cmd else {
            panic!("expected block");
        };
        assert_eq!(block.stmts.len(), 2);
    }

    #[test]
    fn test_positions_advance_by_line() {
        let file = parse("echo one\necho two").unwrap();
        assert_eq!(file.stmts[0].pos.line, 1);
        assert_eq!(file.stmts[1].pos.line, 2);
    }
}
