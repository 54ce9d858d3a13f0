//! Parser for the scripted engine's line-oriented toy language.
//!
//! Statements end at `;` or at the end of a line. Supported statements:
//! `var`/`let`/`const` declarations, assignment to a name, `debugger`,
//! `throw <expr>`, `try { throw <expr> } catch {}` (caught throw),
//! `return <expr>`, expression statements, and `function name(a, b) {`
//! blocks closed by a line holding only `}`. Expressions cover literals,
//! names, `this`, member and index access, calls, object and array
//! literals, `new Error(...)`, unary `-`/`!`, arithmetic, comparisons and
//! single-expression function literals `function (a) { return a }`.

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    BigInt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    This,
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    NewError(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Box<Expr>,
    },
    Throw(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Debugger,
    Declare {
        name: String,
        init: Expr,
        lexical: bool,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Throw {
        value: Expr,
        caught: bool,
    },
    Return(Expr),
    Expr(Expr),
}

/// A statement with its 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub line: u32,
    pub column: u32,
    pub stmt: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Line>,
    pub functions: Vec<FunctionDecl>,
    pub source_map_url: Option<String>,
}

impl Program {
    /// Position of the first executable statement.
    pub fn first_position(&self) -> (u32, u32) {
        self.body
            .first()
            .map(|l| (l.line, l.column))
            .unwrap_or((1, 1))
    }
}

const SOURCE_MAP_PREFIX: &str = "//# sourceMappingURL=";

/// Parse a whole script.
///
/// # Errors
///
/// [`EngineError::Syntax`] on the first malformed statement.
pub fn parse_program(source: &str) -> Result<Program, EngineError> {
    let mut program = Program::default();
    let mut open_function: Option<FunctionDecl> = None;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index as u32 + 1;
        let trimmed = raw.trim();

        if let Some(url) = trimmed.strip_prefix(SOURCE_MAP_PREFIX) {
            program.source_map_url = Some(url.trim().to_string());
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        if trimmed == "}" {
            match open_function.take() {
                Some(decl) => program.functions.push(decl),
                None => return Err(syntax(line_no, "unmatched `}`")),
            }
            continue;
        }

        if let Some(header) = trimmed.strip_prefix("function ") {
            if open_function.is_some() {
                return Err(syntax(line_no, "nested function declarations are not supported"));
            }
            let header = header
                .strip_suffix('{')
                .ok_or_else(|| syntax(line_no, "expected `{` after function header"))?;
            let (name, params) = parse_function_header(header, line_no)?;
            open_function = Some(FunctionDecl {
                name,
                params,
                body: Vec::new(),
            });
            continue;
        }

        let indent = raw.len() - raw.trim_start().len();
        for (offset, text) in split_statements(raw.trim_start()) {
            let stmt = parse_statement(text, line_no)?;
            let line = Line {
                line: line_no,
                column: (indent + offset) as u32 + 1,
                stmt,
            };
            match open_function.as_mut() {
                Some(decl) => decl.body.push(line),
                None => program.body.push(line),
            }
        }
    }

    if let Some(decl) = open_function {
        return Err(syntax(
            source.lines().count() as u32,
            &format!("function `{}` is never closed", decl.name),
        ));
    }
    Ok(program)
}

/// Parse a standalone expression, as used for evaluation requests and
/// breakpoint conditions. A leading `throw` is accepted.
pub fn parse_expression(source: &str) -> Result<Expr, EngineError> {
    let text = source.trim().trim_end_matches(';');
    if let Some(rest) = keyword_rest(text, "throw") {
        return Ok(Expr::Throw(Box::new(parse_expr_text(rest, 1)?)));
    }
    parse_expr_text(text, 1)
}

/// Deepest expression nesting the parser accepts.
const MAX_NESTING: usize = 256;

fn syntax(line: u32, message: &str) -> EngineError {
    EngineError::Syntax {
        line,
        message: message.to_string(),
    }
}

fn keyword_rest<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

/// Split a line on top-level `;`, returning each non-empty statement with
/// its byte offset.
fn split_statements(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ';' if depth == 0 => {
                    push_statement(&mut out, line, start, i);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    push_statement(&mut out, line, start, line.len());
    out
}

fn push_statement<'a>(out: &mut Vec<(usize, &'a str)>, line: &'a str, start: usize, end: usize) {
    let piece = &line[start..end];
    let lead = piece.len() - piece.trim_start().len();
    let text = piece.trim();
    if !text.is_empty() && !text.starts_with("//") {
        out.push((start + lead, text));
    }
}

fn parse_function_header(header: &str, line: u32) -> Result<(String, Vec<String>), EngineError> {
    let open = header
        .find('(')
        .ok_or_else(|| syntax(line, "expected `(` in function header"))?;
    let close = header
        .rfind(')')
        .ok_or_else(|| syntax(line, "expected `)` in function header"))?;
    let name = header[..open].trim().to_string();
    if !is_identifier(&name) {
        return Err(syntax(line, "function declarations need a name"));
    }
    let params = header[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Ok((name, params))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn parse_statement(text: &str, line: u32) -> Result<Stmt, EngineError> {
    if text == "debugger" {
        return Ok(Stmt::Debugger);
    }
    for (keyword, lexical) in [("var", false), ("let", true), ("const", true)] {
        if let Some(rest) = keyword_rest(text, keyword) {
            let (name, init) = match rest.split_once('=') {
                Some((name, init)) => (name.trim(), parse_expr_text(init, line)?),
                None => (rest.trim(), Expr::Literal(Literal::Undefined)),
            };
            if !is_identifier(name) {
                return Err(syntax(line, &format!("invalid binding name `{name}`")));
            }
            return Ok(Stmt::Declare {
                name: name.to_string(),
                init,
                lexical,
            });
        }
    }
    if let Some(rest) = keyword_rest(text, "throw") {
        return Ok(Stmt::Throw {
            value: parse_expr_text(rest, line)?,
            caught: false,
        });
    }
    if let Some(rest) = keyword_rest(text, "try") {
        let inner = rest.trim_start_matches('{').trim();
        let thrown = keyword_rest(inner, "throw")
            .ok_or_else(|| syntax(line, "only `try { throw ... }` is supported"))?;
        let expr_text = thrown.split('}').next().unwrap_or_default();
        return Ok(Stmt::Throw {
            value: parse_expr_text(expr_text, line)?,
            caught: true,
        });
    }
    if let Some(rest) = keyword_rest(text, "return") {
        let value = if rest.is_empty() {
            Expr::Literal(Literal::Undefined)
        } else {
            parse_expr_text(rest, line)?
        };
        return Ok(Stmt::Return(value));
    }
    if let Some((name, value)) = split_assignment(text) {
        return Ok(Stmt::Assign {
            name: name.to_string(),
            value: parse_expr_text(value, line)?,
        });
    }
    Ok(Stmt::Expr(parse_expr_text(text, line)?))
}

/// `name = expr`, but not `name == expr`.
fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, rest) = text.split_once('=')?;
    let name = name.trim();
    if rest.starts_with('=') || !is_identifier(name) {
        return None;
    }
    Some((name, rest))
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    BigInt(String),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

const PUNCTUATION: [&str; 22] = [
    "===", "!==", "==", "!=", "<=", ">=", "(", ")", "{", "}", "[", "]", ",", ".", ":", "+", "-",
    "*", "/", "<", ">", "!",
];

fn tokenize(text: &str, line: u32) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            if i < chars.len() && chars[i] == 'n' {
                i += 1;
                tokens.push(Token::BigInt(digits));
            } else {
                let n = digits
                    .parse::<f64>()
                    .map_err(|_| syntax(line, &format!("invalid number `{digits}`")))?;
                tokens.push(Token::Number(n));
            }
        } else if c == '"' || c == '\'' {
            let start = i + 1;
            i = start;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i == chars.len() {
                return Err(syntax(line, "unterminated string literal"));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let punct = PUNCTUATION
                .iter()
                .find(|p| rest.starts_with(**p))
                .ok_or_else(|| syntax(line, &format!("unexpected character `{c}`")))?;
            i += punct.len();
            tokens.push(Token::Punct(punct));
        }
    }
    Ok(tokens)
}

fn parse_expr_text(text: &str, line: u32) -> Result<Expr, EngineError> {
    let tokens = tokenize(text, line)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        line,
        depth: 0,
    };
    let expr = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(syntax(line, &format!("unexpected trailing input in `{}`", text.trim())));
    }
    Ok(expr)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    line: u32,
    depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), EngineError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(syntax(self.line, &format!("expected `{punct}`")))
        }
    }

    fn ident(&mut self) -> Result<String, EngineError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(syntax(self.line, "expected identifier")),
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, EngineError>,
    ) -> Result<Expr, EngineError> {
        if self.depth >= MAX_NESTING {
            return Err(syntax(self.line, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expression(&mut self) -> Result<Expr, EngineError> {
        self.nested(Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, EngineError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Punct("==" | "===")) => BinaryOp::Eq,
            Some(Token::Punct("!=" | "!==")) => BinaryOp::NotEq,
            Some(Token::Punct("<")) => BinaryOp::Lt,
            Some(Token::Punct(">")) => BinaryOp::Gt,
            Some(Token::Punct("<=")) => BinaryOp::LtEq,
            Some(Token::Punct(">=")) => BinaryOp::GtEq,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, EngineError> {
        let op = if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("!") {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, EngineError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                let name = self.ident()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn list(&mut self, close: &str) -> Result<Vec<Expr>, EngineError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, EngineError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Literal::Number(n))),
            Some(Token::BigInt(digits)) => Ok(Expr::Literal(Literal::BigInt(digits))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::Punct("(")) => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Token::Punct("[")) => Ok(Expr::Array(self.list("]")?)),
            Some(Token::Punct("{")) => self.object_literal(),
            Some(Token::Ident(word)) => self.word(word),
            Some(other) => Err(syntax(self.line, &format!("unexpected token {other:?}"))),
            None => Err(syntax(self.line, "unexpected end of expression")),
        }
    }

    fn word(&mut self, word: String) -> Result<Expr, EngineError> {
        Ok(match word.as_str() {
            "undefined" => Expr::Literal(Literal::Undefined),
            "null" => Expr::Literal(Literal::Null),
            "true" => Expr::Literal(Literal::Bool(true)),
            "false" => Expr::Literal(Literal::Bool(false)),
            "NaN" => Expr::Literal(Literal::Number(f64::NAN)),
            "Infinity" => Expr::Literal(Literal::Number(f64::INFINITY)),
            "this" => Expr::This,
            "new" => {
                let class = self.ident()?;
                if class != "Error" {
                    return Err(syntax(self.line, &format!("unsupported constructor `{class}`")));
                }
                self.expect("(")?;
                Expr::NewError(self.list(")")?)
            }
            "function" => self.function_literal()?,
            _ => Expr::Ident(word),
        })
    }

    fn object_literal(&mut self) -> Result<Expr, EngineError> {
        let mut fields = Vec::new();
        if self.eat("}") {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.next() {
                Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                _ => return Err(syntax(self.line, "expected property name")),
            };
            self.expect(":")?;
            fields.push((key, self.expression()?));
            if self.eat("}") {
                return Ok(Expr::Object(fields));
            }
            self.expect(",")?;
        }
    }

    /// `function name?(params) { return expr }`
    fn function_literal(&mut self) -> Result<Expr, EngineError> {
        let name = match self.peek() {
            Some(Token::Ident(_)) => Some(self.ident()?),
            _ => None,
        };
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.eat(")") {
            loop {
                params.push(self.ident()?);
                if self.eat(")") {
                    break;
                }
                self.expect(",")?;
            }
        }
        self.expect("{")?;
        let body = if self.eat("}") {
            Expr::Literal(Literal::Undefined)
        } else {
            if self.ident()? != "return" {
                return Err(syntax(self.line, "function literals must be `{ return <expr> }`"));
            }
            let body = self.expression()?;
            self.expect("}")?;
            body
        };
        Ok(Expr::Function {
            name,
            params,
            body: Box::new(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_splits_statements_with_columns() {
        let program = parse_program("var a = 1 + 2; debugger; var b = a / 2;").unwrap();
        assert_eq!(program.body.len(), 3);
        assert_eq!(program.body[1].stmt, Stmt::Debugger);
        assert_eq!(program.body[1].line, 1);
        assert_eq!(program.body[1].column, 16);
        assert_eq!(program.body[2].column, 26);
    }

    #[test]
    fn parser_records_source_map_and_skips_comments() {
        let program = parse_program("// hello\nvar x = 1\n//# sourceMappingURL=x.js.map\n").unwrap();
        assert_eq!(program.body.len(), 1);
        assert_eq!(program.body[0].line, 2);
        assert_eq!(program.source_map_url.as_deref(), Some("x.js.map"));
    }

    #[test]
    fn parser_collects_function_bodies() {
        let src = "function add(a, b) {\n  return a + b\n}\nvar c = add(1, 2)\n";
        let program = parse_program(src).unwrap();
        assert_eq!(program.functions.len(), 1);
        let decl = &program.functions[0];
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(decl.body.len(), 1);
        assert_eq!(decl.body[0].line, 2);
        assert_eq!(decl.body[0].column, 3);
        assert_eq!(program.body[0].line, 4);
    }

    #[test]
    fn parser_caught_and_uncaught_throw() {
        let program = parse_program("try { throw 1 } catch (e) {}\nthrow 'x'").unwrap();
        assert!(matches!(program.body[0].stmt, Stmt::Throw { caught: true, .. }));
        assert!(matches!(program.body[1].stmt, Stmt::Throw { caught: false, .. }));
    }

    #[test]
    fn parser_assignment_is_not_comparison() {
        let program = parse_program("x = 2\nx == 2").unwrap();
        assert!(matches!(program.body[0].stmt, Stmt::Assign { .. }));
        assert!(matches!(
            program.body[1].stmt,
            Stmt::Expr(Expr::Binary(BinaryOp::Eq, _, _))
        ));
    }

    #[test]
    fn parser_expression_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                assert_eq!(*lhs, Expr::Literal(Literal::Number(1.0)));
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn parser_function_literal() {
        let expr = parse_expression("function (x) { return this.base + x }").unwrap();
        match expr {
            Expr::Function { name, params, .. } => {
                assert!(name.is_none());
                assert_eq!(params, vec!["x".to_string()]);
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn parser_object_and_array_literals() {
        let expr = parse_expression("{a: 1, 'b': [1, 2]}").unwrap();
        match expr {
            Expr::Object(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].0, "b");
                assert!(matches!(fields[1].1, Expr::Array(_)));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
    }

    #[test]
    fn parser_leading_throw_in_expression() {
        assert!(matches!(
            parse_expression("throw new Error('bad')").unwrap(),
            Expr::Throw(_)
        ));
    }

    #[test]
    fn parser_limits_nesting() {
        let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));

        let negations = format!("{}1", "-".repeat(100_000));
        assert!(parse_expression(&negations).is_err());
        let arrays = format!("{}{}", "[".repeat(100_000), "]".repeat(100_000));
        assert!(parse_program(&format!("var a = {arrays}")).is_err());

        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(
            parse_expression(&shallow).unwrap(),
            Expr::Literal(Literal::Number(1.0))
        );
    }

    #[test]
    fn parser_rejects_garbage() {
        let err = parse_program("var = ;").unwrap_err();
        assert!(err.to_string().contains("syntax error at line 1"));
        assert!(parse_expression("1 +").is_err());
        assert!(parse_program("function f() {\n  var x = 1\n").is_err());
    }
}
