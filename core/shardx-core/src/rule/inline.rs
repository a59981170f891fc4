//! Inline expressions — `${...}` templates used by data nodes and algorithms.
//!
//! Two flavours share the `${...}` (or `$->{...}`) delimiter:
//!
//! - **Data-node expansion**: `ds_${0..1}.t_order_${[0, 2]}` expands to the
//!   cartesian product of every range/list segment, left to right.
//! - **Sharding expressions**: `t_order_${order_id % 4}` is evaluated against
//!   the sharding values of one row. Supports integer arithmetic
//!   (`+ - * / %`), parentheses, unary minus, column references and literals;
//!   `+` concatenates when either side is text.

use crate::error::{ShardxError, ShardxResult};
use crate::value::ScalarValue;

fn inline_error(expression: &str, message: impl Into<String>) -> ShardxError {
    ShardxError::InlineExpression {
        expression: expression.to_string(),
        message: message.into(),
    }
}

/// Raw template piece before interpretation.
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Placeholder(String),
}

/// Split a template into literal text and `${...}` placeholder bodies.
fn split_template(template: &str) -> ShardxResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let open = if template[i..].starts_with("${") {
            Some(2)
        } else if template[i..].starts_with("$->{") {
            Some(4)
        } else {
            None
        };
        match open {
            Some(skip) => {
                let body_start = i + skip;
                let mut depth = 1;
                let mut j = body_start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(inline_error(template, "unterminated placeholder"));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Placeholder(
                    template[body_start..j - 1].trim().to_string(),
                ));
                i = j;
            }
            None => {
                let ch = template[i..].chars().next().unwrap_or_default();
                text.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

/// Split on commas that sit outside any `${...}` placeholder.
fn split_top_level(expression: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in expression.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn expand_placeholder(expression: &str, body: &str) -> ShardxResult<Vec<String>> {
    if let Some((lo, hi)) = body.split_once("..") {
        let lo: i64 = lo
            .trim()
            .parse()
            .map_err(|_| inline_error(expression, format!("bad range start in '{body}'")))?;
        let hi: i64 = hi
            .trim()
            .parse()
            .map_err(|_| inline_error(expression, format!("bad range end in '{body}'")))?;
        if lo > hi {
            return Err(inline_error(expression, format!("empty range '{body}'")));
        }
        return Ok((lo..=hi).map(|v| v.to_string()).collect());
    }
    if let Some(list) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        let items: Vec<String> = list
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return Err(inline_error(expression, "empty list"));
        }
        return Ok(items);
    }
    Err(inline_error(
        expression,
        format!("'{body}' is neither a range nor a list"),
    ))
}

/// Expand a data-node style expression into every concrete string it names.
///
/// Order is deterministic: comma-separated parts left to right, and inside a
/// part the leftmost placeholder varies slowest.
pub fn expand(expression: &str) -> ShardxResult<Vec<String>> {
    let mut result = Vec::new();
    for part in split_top_level(expression) {
        let mut partial = vec![String::new()];
        for segment in split_template(&part)? {
            match segment {
                Segment::Text(text) => partial.iter_mut().for_each(|p| p.push_str(&text)),
                Segment::Placeholder(body) => {
                    let values = expand_placeholder(expression, &body)?;
                    partial = partial
                        .iter()
                        .flat_map(|prefix| values.iter().map(move |v| format!("{prefix}{v}")))
                        .collect();
                }
            }
        }
        result.extend(partial);
    }
    if result.is_empty() {
        return Err(inline_error(expression, "expression expands to nothing"));
    }
    Ok(result)
}

// ===== Sharding expressions =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Str(String),
    Column(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(expression: &str, body: &str) -> ShardxResult<Vec<Token>> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let value = digits
                .parse()
                .map_err(|_| inline_error(expression, format!("integer overflow: {digits}")))?;
            tokens.push(Token::Int(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let start = i + 1;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err(inline_error(expression, "unterminated string literal"));
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if matches!(c, '+' | '-' | '*' | '/' | '%') {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else {
            return Err(inline_error(expression, format!("unexpected character '{c}'")));
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> ShardxResult<Expr> {
        let expr = self.parse_binary(0)?;
        if self.pos != self.tokens.len() {
            return Err(inline_error(self.expression, "trailing tokens"));
        }
        Ok(expr)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ShardxResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(c)) = self.peek() {
            let (op, precedence) = match c {
                '+' => (BinaryOp::Add, 1),
                '-' => (BinaryOp::Sub, 1),
                '*' => (BinaryOp::Mul, 2),
                '/' => (BinaryOp::Div, 2),
                _ => (BinaryOp::Mod, 2),
            };
            if precedence <= min_precedence {
                break;
            }
            self.bump();
            let right = self.parse_binary(precedence)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ShardxResult<Expr> {
        match self.bump() {
            Some(Token::Op('-')) => Ok(Expr::Neg(Box::new(self.parse_unary()?))),
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::LParen) => {
                let inner = self.parse_binary(0)?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(inline_error(self.expression, "missing ')'")),
                }
            }
            other => Err(inline_error(
                self.expression,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Int(i64),
    Str(String),
}

impl Evaluated {
    fn into_text(self) -> String {
        match self {
            Evaluated::Int(v) => v.to_string(),
            Evaluated::Str(s) => s,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Evaluated::Int(v) => Some(*v),
            Evaluated::Str(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Expr(Expr),
}

/// Parsed sharding expression such as `t_order_${order_id % 4}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    parts: Vec<Part>,
}

impl InlineExpression {
    /// Parse; fails on malformed placeholders at rule load time.
    pub fn parse(source: &str) -> ShardxResult<Self> {
        let mut parts = Vec::new();
        for segment in split_template(source)? {
            match segment {
                Segment::Text(text) => parts.push(Part::Text(text)),
                Segment::Placeholder(body) => {
                    let tokens = tokenize(source, &body)?;
                    if tokens.is_empty() {
                        return Err(inline_error(source, "empty placeholder"));
                    }
                    let parser = Parser {
                        expression: source,
                        tokens,
                        pos: 0,
                    };
                    parts.push(Part::Expr(parser.parse()?));
                }
            }
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by the expression, in first-use order.
    pub fn columns(&self) -> Vec<String> {
        fn walk(expr: &Expr, out: &mut Vec<String>) {
            match expr {
                Expr::Column(name) => {
                    if !out.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                        out.push(name.clone());
                    }
                }
                Expr::Neg(inner) => walk(inner, out),
                Expr::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Expr::Int(_) | Expr::Str(_) => {}
            }
        }
        let mut out = Vec::new();
        for part in &self.parts {
            if let Part::Expr(expr) = part {
                walk(expr, &mut out);
            }
        }
        out
    }

    /// Evaluate with column values supplied by `lookup` (case-insensitive names).
    pub fn evaluate<F>(&self, lookup: F) -> ShardxResult<String>
    where
        F: Fn(&str) -> Option<ScalarValue>,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&self.eval(expr, &lookup)?.into_text()),
            }
        }
        Ok(out)
    }

    fn eval<F>(&self, expr: &Expr, lookup: &F) -> ShardxResult<Evaluated>
    where
        F: Fn(&str) -> Option<ScalarValue>,
    {
        match expr {
            Expr::Int(v) => Ok(Evaluated::Int(*v)),
            Expr::Str(s) => Ok(Evaluated::Str(s.clone())),
            Expr::Column(name) => match lookup(name) {
                Some(ScalarValue::Utf8(s)) => Ok(Evaluated::Str(s)),
                Some(ScalarValue::Null) | None => Err(inline_error(
                    &self.source,
                    format!("no value for column '{name}'"),
                )),
                Some(value) => value.as_i64().map(Evaluated::Int).ok_or_else(|| {
                    inline_error(&self.source, format!("'{value}' is not an integer"))
                }),
            },
            Expr::Neg(inner) => {
                let v = self.eval(inner, lookup)?;
                let n = v
                    .as_int()
                    .ok_or_else(|| inline_error(&self.source, "cannot negate text"))?;
                Ok(Evaluated::Int(-n))
            }
            Expr::Binary(op, l, r) => {
                let left = self.eval(l, lookup)?;
                let right = self.eval(r, lookup)?;
                if *op == BinaryOp::Add
                    && (matches!(left, Evaluated::Str(_)) || matches!(right, Evaluated::Str(_)))
                {
                    return Ok(Evaluated::Str(left.into_text() + &right.into_text()));
                }
                let (a, b) = match (left.as_int(), right.as_int()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        return Err(inline_error(
                            &self.source,
                            "arithmetic on non-integer operand",
                        ));
                    }
                };
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Mod => a.checked_rem(b),
                };
                result
                    .map(Evaluated::Int)
                    .ok_or_else(|| inline_error(&self.source, "arithmetic overflow or division by zero"))
            }
        }
    }
}
