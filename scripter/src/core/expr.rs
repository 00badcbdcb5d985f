//! Expression evaluation for STATEMENT rows.
//!
//! A deliberately small language producing integer or string values:
//!
//! - integer literals and `'single'` / `"double"` quoted strings
//! - bare variable names, resolved against the variable environment
//! - arithmetic `+ - * / // %` (integer, floor semantics), unary `-` and `+`
//! - string concatenation with `+`, repetition with `*`
//! - comparisons `== != < <= > >=` yielding `1` or `0`
//! - logical `and`/`&&`, `or`/`||`, `not`/`!` with short-circuiting
//! - built-ins `int`, `str`, `len`, `abs`, `min`, `max`
//!
//! There are no assignments, statements or loops.

use anyhow::{Context, Result, bail};

use crate::core::types::Value;
use crate::core::vars::Variables;

/// Upper bound on strings produced by repetition.
const MAX_STRING_LEN: usize = 1 << 20;
/// Upper bound on nested parentheses, calls and prefix operators.
const MAX_NESTING: usize = 256;
/// Upper bound on the depth of the parsed tree, operator chains included.
const MAX_EVAL_DEPTH: usize = 1024;
/// Upper bound on tokens in one expression.
const MAX_TOKENS: usize = 8192;

/// Parse and evaluate `source`.
pub fn evaluate(source: &str, vars: &Variables) -> Result<Value> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        bail!("unexpected {} after end of expression", token.describe());
    }
    eval(&expr, vars, 0)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {n}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Ident(name) => format!("name '{name}'"),
            Token::Op(op) => format!("'{op}'"),
        }
    }
}

const OPERATORS: [&str; 19] = [
    "//", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(", ")",
    ",", "=",
];

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = source;

    while let Some(ch) = rest.chars().next() {
        if tokens.len() >= MAX_TOKENS {
            bail!("expression has more than {MAX_TOKENS} tokens");
        }
        if ch.is_whitespace() {
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if ch.is_ascii_digit() {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let digits = &rest[..end];
            let n = digits
                .parse::<i64>()
                .with_context(|| format!("integer literal {digits} out of range"))?;
            tokens.push(Token::Int(n));
            rest = &rest[end..];
            continue;
        }
        if ch.is_alphabetic() || ch == '_' {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let word = &rest[..end];
            tokens.push(match word {
                "and" => Token::Op("&&"),
                "or" => Token::Op("||"),
                "not" => Token::Op("!"),
                _ => Token::Ident(word.to_string()),
            });
            rest = &rest[end..];
            continue;
        }
        if ch == '\'' || ch == '"' {
            let (literal, consumed) = read_string(rest, ch)?;
            tokens.push(Token::Str(literal));
            rest = &rest[consumed..];
            continue;
        }
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            // A lone `=` is almost always a mistyped `==`.
            Some(&"=") => bail!("assignment is not supported, use '==' to compare"),
            Some(op) => {
                tokens.push(Token::Op(*op));
                rest = &rest[op.len()..];
            }
            None => bail!("unexpected character {ch:?}"),
        }
    }

    Ok(tokens)
}

/// Read a quoted string starting at `input[0] == quote`.
///
/// Returns the unescaped literal and the number of bytes consumed.
fn read_string(input: &str, quote: char) -> Result<(String, usize)> {
    let mut literal = String::new();
    let mut chars = input.char_indices().skip(1);

    while let Some((idx, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((literal, idx + c.len_utf8())),
            '\\' => match chars.next() {
                Some((_, 'n')) => literal.push('\n'),
                Some((_, 't')) => literal.push('\t'),
                Some((_, escaped @ ('\\' | '\'' | '"'))) => literal.push(escaped),
                Some((_, other)) => {
                    literal.push('\\');
                    literal.push(other);
                }
                None => break,
            },
            c => literal.push(c),
        }
    }

    bail!("unterminated string literal")
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Call(String, Vec<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            bail!("expression nested too deeply (limit {MAX_NESTING})");
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consume the next token if it is one of `ops`.
    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect_op(&mut self, op: &'static str) -> Result<()> {
        match self.next() {
            Some(Token::Op(found)) if found == op => Ok(()),
            Some(token) => bail!("expected '{op}', found {}", token.describe()),
            None => bail!("expected '{op}', found end of expression"),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while let Some(op) = self.eat_op(&["||"]) {
            let right = self.parse_and()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while let Some(op) = self.eat_op(&["&&"]) {
            let right = self.parse_not()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if let Some(op) = self.eat_op(&["!"]) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        const COMPARISONS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];
        let left = self.parse_additive()?;
        let Some(op) = self.eat_op(&COMPARISONS) else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        if self.eat_op(&COMPARISONS).is_some() {
            bail!("chained comparisons are not supported");
        }
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "//", "/", "%"]) {
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(op) = self.eat_op(&["-", "+"]) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Ident(name)) => {
                if self.eat_op(&["("]).is_none() {
                    return Ok(Expr::Var(name));
                }
                let mut args = Vec::new();
                if self.eat_op(&[")"]).is_none() {
                    loop {
                        args.push(self.nested(Self::parse_or)?);
                        if self.eat_op(&[","]).is_none() {
                            break;
                        }
                    }
                    self.expect_op(")")?;
                }
                Ok(Expr::Call(name, args))
            }
            Some(Token::Op("(")) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Some(token) => bail!("unexpected {}", token.describe()),
            None => bail!("unexpected end of expression"),
        }
    }
}

fn eval(expr: &Expr, vars: &Variables, depth: usize) -> Result<Value> {
    if depth > MAX_EVAL_DEPTH {
        bail!("expression nested too deeply (limit {MAX_EVAL_DEPTH})");
    }
    let depth = depth + 1;
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => vars
            .lookup(name)
            .with_context(|| format!("name '{name}' is not defined")),
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, vars, depth))
                .collect::<Result<Vec<_>>>()?;
            call(name, args)
        }
        Expr::Unary(op, operand) => match (*op, eval(operand, vars, depth)?) {
            ("!", value) => Ok(bool_value(!value.is_truthy())),
            ("-", Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .context("integer overflow in negation"),
            ("+", Value::Int(n)) => Ok(Value::Int(n)),
            (op, value) => bail!("bad operand type for unary {op}: {}", value.type_name()),
        },
        Expr::Binary("&&", left, right) => {
            let left = eval(left, vars, depth)?;
            if !left.is_truthy() {
                return Ok(bool_value(false));
            }
            Ok(bool_value(eval(right, vars, depth)?.is_truthy()))
        }
        Expr::Binary("||", left, right) => {
            let left = eval(left, vars, depth)?;
            if left.is_truthy() {
                return Ok(bool_value(true));
            }
            Ok(bool_value(eval(right, vars, depth)?.is_truthy()))
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, vars, depth)?;
            let right = eval(right, vars, depth)?;
            binary(op, left, right)
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(i64::from(b))
}

fn binary(op: &str, left: Value, right: Value) -> Result<Value> {
    use Value::{Int, Str};

    let value = match (op, left, right) {
        ("+", Int(a), Int(b)) => Int(a.checked_add(b).context("integer overflow in addition")?),
        ("+", Str(a), Str(b)) => Str(a + &b),
        ("-", Int(a), Int(b)) => Int(a.checked_sub(b).context("integer overflow in subtraction")?),
        ("*", Int(a), Int(b)) => Int(a.checked_mul(b).context("integer overflow in multiplication")?),
        ("*", Str(s), Int(n)) | ("*", Int(n), Str(s)) => Str(repeat(&s, n)?),
        ("/" | "//", Int(a), Int(b)) => Int(floor_div(a, b)?),
        ("%", Int(a), Int(b)) => Int(floor_mod(a, b)?),
        ("==", a, b) => bool_value(a == b),
        ("!=", a, b) => bool_value(a != b),
        (cmp @ ("<" | "<=" | ">" | ">="), a, b) => {
            let ordering = match (&a, &b) {
                (Int(x), Int(y)) => x.cmp(y),
                (Str(x), Str(y)) => x.cmp(y),
                _ => bail!(
                    "'{cmp}' not supported between {} and {}",
                    a.type_name(),
                    b.type_name()
                ),
            };
            bool_value(match cmp {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        (op, a, b) => bail!(
            "unsupported operand types for {op}: {} and {}",
            a.type_name(),
            b.type_name()
        ),
    };
    Ok(value)
}

fn repeat(s: &str, n: i64) -> Result<String> {
    let count = usize::try_from(n).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_STRING_LEN => Ok(s.repeat(count)),
        _ => bail!("repeated string exceeds {MAX_STRING_LEN} bytes"),
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        bail!("division by zero");
    }
    let q = a.checked_div(b).context("integer overflow in division")?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        return Ok(q - 1);
    }
    Ok(q)
}

fn floor_mod(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        bail!("modulo by zero");
    }
    let r = a.checked_rem(b).context("integer overflow in modulo")?;
    if r != 0 && ((r < 0) != (b < 0)) {
        return Ok(r + b);
    }
    Ok(r)
}

fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    match (name, args.as_slice()) {
        ("int", [value]) => to_int(value).map(Value::Int),
        ("str", [value]) => Ok(Value::Str(value.to_string())),
        ("len", [Value::Str(s)]) => {
            Ok(Value::Int(i64::try_from(s.chars().count()).context("string too long")?))
        }
        ("abs", [Value::Int(n)]) => n.checked_abs().map(Value::Int).context("integer overflow in abs"),
        ("min" | "max", [first, rest @ ..]) => {
            let mut best = first.clone();
            for value in rest {
                let ordering = match (&best, value) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => bail!("{name}() arguments must share one type"),
                };
                let replace = if name == "min" {
                    ordering.is_gt()
                } else {
                    ordering.is_lt()
                };
                if replace {
                    best = value.clone();
                }
            }
            Ok(best)
        }
        ("int" | "str" | "len" | "abs", args) if args.len() != 1 => {
            bail!("{name}() takes exactly one argument ({} given)", args.len())
        }
        ("min" | "max", []) => bail!("{name}() expects at least one argument"),
        ("len" | "abs", [value]) => {
            bail!("{name}() does not accept a {} argument", value.type_name())
        }
        _ => bail!("unknown function '{name}'"),
    }
}

/// Convert a value to an integer the way `int()` does: integers pass through,
/// strings are trimmed and parsed as decimal.
pub fn to_int(value: &Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid literal for int(): {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vars::EnvLayer;

    fn vars() -> Variables {
        let mut vars = Variables::new(EnvLayer::from_vars([(
            "USER".to_string(),
            "alice".to_string(),
        )]));
        vars.set("x", Value::Int(3)).expect("set x");
        vars.set("greeting", Value::from("hello")).expect("set greeting");
        vars
    }

    fn eval_ok(source: &str) -> Value {
        evaluate(source, &vars()).unwrap_or_else(|err| panic!("{source}: {err:#}"))
    }

    fn eval_err(source: &str) -> String {
        format!("{:#}", evaluate(source, &vars()).expect_err(source))
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval_ok("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval_ok("-x + 10"), Value::Int(7));
        assert_eq!(eval_ok("2 * -3"), Value::Int(-6));
    }

    #[test]
    fn division_floors() {
        assert_eq!(eval_ok("7 / 2"), Value::Int(3));
        assert_eq!(eval_ok("-7 // 2"), Value::Int(-4));
        assert_eq!(eval_ok("-7 % 3"), Value::Int(2));
        assert_eq!(eval_ok("7 % -3"), Value::Int(-2));
        assert!(eval_err("1 / 0").contains("division by zero"));
    }

    #[test]
    fn strings_concatenate_and_repeat() {
        assert_eq!(eval_ok("greeting + ', ' + USER"), Value::from("hello, alice"));
        assert_eq!(eval_ok("'ab' * 3"), Value::from("ababab"));
        assert_eq!(eval_ok(r#""say \"hi\"""#), Value::from("say \"hi\""));
    }

    #[test]
    fn comparisons_yield_integers() {
        assert_eq!(eval_ok("x == 3"), Value::Int(1));
        assert_eq!(eval_ok("x > 5"), Value::Int(0));
        assert_eq!(eval_ok("greeting != 'bye'"), Value::Int(1));
        assert_eq!(eval_ok("'a' < 'b'"), Value::Int(1));
        assert!(eval_err("1 < 2 < 3").contains("chained"));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval_ok("x > 1 and x < 5"), Value::Int(1));
        assert_eq!(eval_ok("0 && 1 / 0"), Value::Int(0));
        assert_eq!(eval_ok("1 || undefined_name"), Value::Int(1));
        assert_eq!(eval_ok("not ''"), Value::Int(1));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval_ok("int(' 42 ') + 1"), Value::Int(43));
        assert_eq!(eval_ok("str(x) + 'px'"), Value::from("3px"));
        assert_eq!(eval_ok("len(greeting)"), Value::Int(5));
        assert_eq!(eval_ok("abs(-4)"), Value::Int(4));
        assert_eq!(eval_ok("max(1, x, 2)"), Value::Int(3));
        assert_eq!(eval_ok("min('b', 'a')"), Value::from("a"));
    }

    #[test]
    fn type_errors_are_reported() {
        assert!(eval_err("'a' + 1").contains("unsupported operand types for +"));
        assert!(eval_err("-'a'").contains("bad operand type"));
        assert!(eval_err("int('abc')").contains("invalid literal"));
        assert!(eval_err("len(3)").contains("does not accept"));
    }

    #[test]
    fn undefined_names_and_syntax_errors() {
        assert!(eval_err("nobody + 1").contains("name 'nobody' is not defined"));
        assert!(eval_err("(1 + 2").contains("expected ')'"));
        assert!(eval_err("1 2").contains("after end of expression"));
        assert!(eval_err("x = 1").contains("assignment is not supported"));
        assert!(eval_err("'open").contains("unterminated"));
        assert!(eval_err("__import__('os')").contains("unknown function"));
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert!(eval_err(&parens).contains("nested too deeply"));
        assert!(eval_err(&format!("{}1", "-".repeat(5000))).contains("nested too deeply"));
        assert!(eval_err(&format!("{}1", "not ".repeat(5000))).contains("nested too deeply"));
        assert!(eval_err(&format!("{}1)", "abs(".repeat(2000))).contains("nested too deeply"));
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let chain = vec!["1"; 2000].join(" + ");
        assert!(eval_err(&chain).contains("nested too deeply"));
        let short = vec!["1"; 100].join(" + ");
        assert_eq!(eval_ok(&short), Value::Int(100));
        let huge = vec!["1"; 5000].join("+");
        assert!(eval_err(&huge).contains("tokens"));
    }

    #[test]
    fn moderate_nesting_still_evaluates() {
        let parens = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval_ok(&parens), Value::Int(3));
    }
}
