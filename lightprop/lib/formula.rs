//! Compiled scalar formulas over named variables.
//!
//! Formulas are parsed once into a small expression tree and then evaluated as
//! many times as needed, e.g. once per grid point or once per time step.
//! Supported syntax:
//! - numbers (`1`, `2.5`, `1e-3`)
//! - variables, given at compile time by name, and constants, whose values
//!   are folded into the tree at compile time (`_pi` and `_e` are always
//!   defined)
//! - binary `+`, `-`, `*`, `/`, and right-associative `^`
//! - unary `-` and `+`
//! - single-argument functions: `sin`, `cos`, `tan`, `asin`, `acos`, `atan`,
//!   `sinh`, `cosh`, `tanh`, `exp`, `log`, `ln`, `log10`, `sqrt`, `abs`,
//!   `sign`

use std::f64::consts::{ E, PI };
use crate::error::FormulaError;

pub type FResult<T> = Result<T, FormulaError>;

/// Numeric codes reported in [`FormulaError::code`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    UnexpectedToken = 1,
    UnexpectedEnd = 2,
    UnknownName = 3,
    UnknownFunction = 4,
    UnbalancedParens = 5,
    BadNumber = 6,
    Empty = 7,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Func {
    Sin, Cos, Tan, Asin, Acos, Atan, Sinh, Cosh, Tanh,
    Exp, Ln, Log10, Sqrt, Abs, Sign,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "asin" => Some(Self::Asin),
            "acos" => Some(Self::Acos),
            "atan" => Some(Self::Atan),
            "sinh" => Some(Self::Sinh),
            "cosh" => Some(Self::Cosh),
            "tanh" => Some(Self::Tanh),
            "exp" => Some(Self::Exp),
            "log" | "ln" => Some(Self::Ln),
            "log10" => Some(Self::Log10),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            "sign" => Some(Self::Sign),
            _ => None,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Log10 => x.log10(),
            Self::Sqrt => x.sqrt(),
            Self::Abs => x.abs(),
            Self::Sign => if x == 0.0 { 0.0 } else { x.signum() },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum BinOp { Add, Sub, Mul, Div, Pow }

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Num(f64),
    Var(usize),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, vars: &[f64]) -> f64 {
        match self {
            Self::Num(x) => *x,
            Self::Var(k) => vars.get(*k).copied().unwrap_or(f64::NAN),
            Self::Neg(a) => -a.eval(vars),
            Self::Bin(op, a, b) => {
                let (a, b) = (a.eval(vars), b.eval(vars));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            },
            Self::Call(f, a) => f.apply(a.eval(vars)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

#[derive(Clone, Debug)]
struct Lexed {
    tok: Tok,
    text: String,
    pos: usize,
}

/// A compiled formula.
#[derive(Clone, Debug)]
pub struct Formula {
    expr: String,
    vars: Vec<String>,
    root: Node,
}

impl Formula {
    /// Compile `expr` with free variables `vars` (bound by position at
    /// evaluation time) and named constants `consts`.
    ///
    /// Variables shadow constants of the same name.
    pub fn compile(expr: &str, vars: &[&str], consts: &[(String, f64)])
        -> FResult<Self>
    {
        let toks = lex(expr)?;
        let mut parser = Parser { expr, toks: &toks, at: 0, vars, consts };
        let root = parser.parse()?;
        Ok(Self {
            expr: expr.to_string(),
            vars: vars.iter().map(|v| v.to_string()).collect(),
            root,
        })
    }

    /// Evaluate with variable values given in the order passed to
    /// [`Self::compile`]. Missing values evaluate as NaN.
    pub fn eval(&self, vals: &[f64]) -> f64 { self.root.eval(vals) }

    /// The source text.
    pub fn expr(&self) -> &str { &self.expr }

    /// The free variable names, in binding order.
    pub fn vars(&self) -> &[String] { &self.vars }
}

fn error(expr: &str, message: &str, token: &str, pos: usize, code: ErrorCode)
    -> FormulaError
{
    FormulaError {
        message: message.to_string(),
        expr: expr.to_string(),
        token: token.to_string(),
        pos,
        code: code as u32,
    }
}

fn lex(expr: &str) -> FResult<Vec<Lexed>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut out: Vec<Lexed> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') { j += 1; }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let val: f64 = text.parse()
                .map_err(|_| {
                    error(expr, "invalid number", &text, start, ErrorCode::BadNumber)
                })?;
            out.push(Lexed { tok: Tok::Num(val), text, pos: start });
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            out.push(Lexed { tok: Tok::Ident(text.clone()), text, pos: start });
        } else {
            let tok = match c {
                '+' | '-' | '*' | '/' | '^' => Tok::Op(c),
                '(' => Tok::LParen,
                ')' => Tok::RParen,
                _ => {
                    return Err(error(
                        expr,
                        "unexpected character",
                        &c.to_string(),
                        start,
                        ErrorCode::UnexpectedToken,
                    ));
                },
            };
            i += 1;
            out.push(Lexed { tok, text: c.to_string(), pos: start });
        }
    }
    Ok(out)
}

struct Parser<'a> {
    expr: &'a str,
    toks: &'a [Lexed],
    at: usize,
    vars: &'a [&'a str],
    consts: &'a [(String, f64)],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Lexed> { self.toks.get(self.at) }

    fn next(&mut self) -> Option<&'a Lexed> {
        let tok = self.toks.get(self.at);
        self.at += 1;
        tok
    }

    fn end_pos(&self) -> usize { self.expr.chars().count() }

    fn unexpected(&self, lexed: Option<&Lexed>) -> FormulaError {
        match lexed {
            Some(l) => error(
                self.expr, "unexpected token", &l.text, l.pos,
                ErrorCode::UnexpectedToken,
            ),
            None => error(
                self.expr, "unexpected end of formula", "", self.end_pos(),
                ErrorCode::UnexpectedEnd,
            ),
        }
    }

    fn parse(&mut self) -> FResult<Node> {
        if self.toks.is_empty() {
            return Err(error(
                self.expr, "empty formula", "", 0, ErrorCode::Empty));
        }
        let node = self.sum()?;
        match self.peek() {
            None => Ok(node),
            Some(l) if l.tok == Tok::RParen => Err(error(
                self.expr, "unbalanced parenthesis", &l.text, l.pos,
                ErrorCode::UnbalancedParens,
            )),
            other => Err(self.unexpected(other)),
        }
    }

    // sum := product (('+' | '-') product)*
    fn sum(&mut self) -> FResult<Node> {
        let mut lhs = self.product()?;
        while let Some(Lexed { tok: Tok::Op(c @ ('+' | '-')), .. }) = self.peek() {
            self.at += 1;
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            let rhs = self.product()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // product := unary (('*' | '/') unary)*
    fn product(&mut self) -> FResult<Node> {
        let mut lhs = self.unary()?;
        while let Some(Lexed { tok: Tok::Op(c @ ('*' | '/')), .. }) = self.peek() {
            self.at += 1;
            let op = if *c == '*' { BinOp::Mul } else { BinOp::Div };
            let rhs = self.unary()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // unary := ('-' | '+') unary | power
    fn unary(&mut self) -> FResult<Node> {
        match self.peek() {
            Some(Lexed { tok: Tok::Op('-'), .. }) => {
                self.at += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            },
            Some(Lexed { tok: Tok::Op('+'), .. }) => {
                self.at += 1;
                self.unary()
            },
            _ => self.power(),
        }
    }

    // power := atom ('^' unary)?
    fn power(&mut self) -> FResult<Node> {
        let base = self.atom()?;
        if let Some(Lexed { tok: Tok::Op('^'), .. }) = self.peek() {
            self.at += 1;
            let exp = self.unary()?;
            return Ok(Node::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn closing(&mut self, open: &Lexed) -> FResult<()> {
        match self.next() {
            Some(Lexed { tok: Tok::RParen, .. }) => Ok(()),
            None => Err(error(
                self.expr, "missing closing parenthesis", &open.text, open.pos,
                ErrorCode::UnbalancedParens,
            )),
            other => Err(self.unexpected(other)),
        }
    }

    // atom := number | name | name '(' sum ')' | '(' sum ')'
    fn atom(&mut self) -> FResult<Node> {
        let lexed = self.next();
        match lexed {
            Some(Lexed { tok: Tok::Num(x), .. }) => Ok(Node::Num(*x)),
            Some(open @ Lexed { tok: Tok::LParen, .. }) => {
                let inner = self.sum()?;
                self.closing(open)?;
                Ok(inner)
            },
            Some(l @ Lexed { tok: Tok::Ident(name), .. }) => {
                if let Some(Lexed { tok: Tok::LParen, .. }) = self.peek() {
                    let open = self.next().unwrap_or(l);
                    let func = Func::from_name(name)
                        .ok_or_else(|| error(
                            self.expr, "unknown function", name, l.pos,
                            ErrorCode::UnknownFunction,
                        ))?;
                    let arg = self.sum()?;
                    self.closing(open)?;
                    return Ok(Node::Call(func, Box::new(arg)));
                }
                self.name(name, l.pos)
            },
            other => Err(self.unexpected(other)),
        }
    }

    fn name(&self, name: &str, pos: usize) -> FResult<Node> {
        if let Some(k) = self.vars.iter().position(|v| *v == name) {
            return Ok(Node::Var(k));
        }
        if let Some((_, val)) = self.consts.iter().find(|(c, _)| c == name) {
            return Ok(Node::Num(*val));
        }
        match name {
            "_pi" => Ok(Node::Num(PI)),
            "_e" => Ok(Node::Num(E)),
            _ => Err(error(
                self.expr, "unknown variable or constant", name, pos,
                ErrorCode::UnknownName,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str, vars: &[&str], vals: &[f64]) -> f64 {
        Formula::compile(expr, vars, &[]).unwrap().eval(vals)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1 + 2 * 3", &[], &[]), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &[], &[]), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", &[], &[]), 512.0);
        assert_eq!(eval("-2 ^ 2", &[], &[]), -4.0);
        assert_eq!(eval("8 / 4 / 2", &[], &[]), 1.0);
        assert_eq!(eval("1.5e1 - 5", &[], &[]), 10.0);
    }

    #[test]
    fn variables_functions_and_constants() {
        let consts = vec![("w".to_string(), 2.0)];
        let f = Formula::compile("exp(-x^2 / w) * cos(_pi * y)", &["x", "y"], &consts)
            .unwrap();
        let val = f.eval(&[1.0, 1.0]);
        assert!((val + (-0.5_f64).exp()).abs() < 1e-15);
        assert_eq!(f.vars(), &["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn variables_shadow_constants() {
        let consts = vec![("t".to_string(), 5.0)];
        let f = Formula::compile("t", &["t"], &consts).unwrap();
        assert_eq!(f.eval(&[1.0]), 1.0);
    }

    #[test]
    fn unknown_name_reports_context() {
        let err = Formula::compile("1 + foo * x", &["x"], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownName as u32);
        assert_eq!(err.token, "foo");
        assert_eq!(err.pos, 4);
        assert_eq!(err.expr, "1 + foo * x");
        let shown = err.to_string();
        assert!(shown.contains("Token:    foo"));
        assert!(shown.contains("Position: 4"));
    }

    #[test]
    fn syntax_errors() {
        let err = Formula::compile("(1 + 2", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnbalancedParens as u32);
        let err = Formula::compile("1 + 2)", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnbalancedParens as u32);
        let err = Formula::compile("1 +", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedEnd as u32);
        let err = Formula::compile("  ", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Empty as u32);
        let err = Formula::compile("2 # 3", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedToken as u32);
        assert_eq!(err.pos, 2);
        let err = Formula::compile("bogus(1)", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownFunction as u32);
        let err = Formula::compile("1..2", &[], &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadNumber as u32);
    }
}
