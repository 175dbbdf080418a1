use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Variables a custom condition may reference. The set is fixed.
pub const VARIABLES: [&str; 10] = [
    "price",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "avg_volume_20",
    "monthly_high",
    "monthly_low",
    "daily_change_pct",
];

/// Nesting limit for parenthesised / unary chains in user supplied text
const MAX_DEPTH: usize = 64;

/// Literals and variables allowed in one condition. Binary chains nest one
/// level per operator, so this also bounds the depth of the parsed tree.
const MAX_OPERANDS: usize = 256;

/// Error types for expression parsing and evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Disallowed construct at position {position}: {construct}")]
    Disallowed { position: usize, construct: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type error: {0}")]
    Type(String),

    #[error("Arithmetic result is not a finite number")]
    NonFinite,
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Variable bindings for one evaluation
pub type Bindings = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    NotEq,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        position,
        message: message.into(),
    }
}

fn disallowed(position: usize, construct: impl Into<String>) -> ExpressionError {
    ExpressionError::Disallowed {
        position,
        construct: construct.into(),
    }
}

fn tokenize(source: &str) -> ExpressionResult<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).map(|(_, ch)| *ch);

        if c.is_ascii_digit() || (c == '.' && next.map_or(false, |ch| ch.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            // Optional exponent
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            if i < chars.len() && (chars[i].1.is_alphabetic() || chars[i].1 == '_') {
                return Err(syntax(chars[i].0, "invalid numeric literal"));
            }

            let text: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| syntax(position, format!("invalid numeric literal '{}'", text)))?;
            tokens.push(Spanned {
                token: Token::Number(value),
                position,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            let token = match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned { token, position });
            continue;
        }

        let (token, width) = match (c, next) {
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', Some('*')) => return Err(disallowed(position, "exponentiation '**'")),
            ('*', _) => (Token::Star, 1),
            ('/', Some('/')) => return Err(disallowed(position, "floor division '//'")),
            ('/', _) => (Token::Slash, 1),
            ('>', Some('=')) => (Token::Ge, 2),
            ('>', _) => (Token::Gt, 1),
            ('<', Some('=')) => (Token::Le, 2),
            ('<', _) => (Token::Lt, 1),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('=', _) => return Err(disallowed(position, "assignment '='")),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('.', _) => return Err(disallowed(position, "attribute access '.'")),
            _ => return Err(disallowed(position, format!("character '{}'", c))),
        };
        tokens.push(Spanned { token, position });
        i += width;
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` evaluates as `a < b and b <= c`
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    operands: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> ExpressionResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(self.position(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ExpressionResult<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.descend()?;
            let operand = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::EqEq) => CompareOp::Eq,
                Some(Token::NotEq) => CompareOp::Ne,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ExpressionResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        match self.peek() {
            Some(Token::Minus) | Some(Token::Plus) => {
                let negate = self.advance() == Some(Token::Minus);
                self.descend()?;
                let operand = self.parse_unary()?;
                self.depth -= 1;
                Ok(if negate {
                    Expr::Negate(Box::new(operand))
                } else {
                    operand
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn operand(&mut self, position: usize) -> ExpressionResult<()> {
        self.operands += 1;
        if self.operands > MAX_OPERANDS {
            return Err(syntax(
                position,
                format!("expression has more than {} operands", MAX_OPERANDS),
            ));
        }
        Ok(())
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        if matches!(self.peek(), Some(Token::Number(_)) | Some(Token::Ident(_))) {
            self.operand(position)?;
        }
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(disallowed(position, format!("function call '{}(...)'", name)));
                }
                Ok(Expr::Variable(name))
            }
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax(position, "unclosed parenthesis")),
                }
            }
            Some(token) => Err(syntax(position, format!("unexpected token {:?}", token))),
            None => Err(syntax(position, "unexpected end of expression")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn number(self, context: &str) -> ExpressionResult<f64> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Bool(_) => Err(ExpressionError::Type(format!(
                "{} expects a number, found a boolean",
                context
            ))),
        }
    }

    fn boolean(self, context: &str) -> ExpressionResult<bool> {
        match self {
            Value::Bool(b) => Ok(b),
            Value::Number(_) => Err(ExpressionError::Type(format!(
                "{} expects a boolean, found a number",
                context
            ))),
        }
    }
}

fn eval(expr: &Expr, bindings: &Bindings) -> ExpressionResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Variable(name) => bindings
            .get(name)
            .copied()
            .map(Value::Number)
            .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),
        Expr::Negate(operand) => Ok(Value::Number(-eval(operand, bindings)?.number("'-'")?)),
        Expr::Arith(op, lhs, rhs) => {
            let a = eval(lhs, bindings)?.number("arithmetic")?;
            let b = eval(rhs, bindings)?.number("arithmetic")?;
            let result = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => {
                    if b == 0.0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    a / b
                }
            };
            if !result.is_finite() {
                return Err(ExpressionError::NonFinite);
            }
            Ok(Value::Number(result))
        }
        Expr::Compare(first, rest) => {
            let mut lhs = eval(first, bindings)?.number("comparison")?;
            let mut holds = true;
            for (op, operand) in rest {
                let rhs = eval(operand, bindings)?.number("comparison")?;
                holds = holds && op.apply(lhs, rhs);
                lhs = rhs;
            }
            Ok(Value::Bool(holds))
        }
        Expr::Not(operand) => Ok(Value::Bool(!eval(operand, bindings)?.boolean("'not'")?)),
        Expr::And(lhs, rhs) => {
            if !eval(lhs, bindings)?.boolean("'and'")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, bindings)?.boolean("'and'")?))
        }
        Expr::Or(lhs, rhs) => {
            if eval(lhs, bindings)?.boolean("'or'")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, bindings)?.boolean("'or'")?))
        }
    }
}

fn collect_variables<'a>(expr: &'a Expr, out: &mut BTreeSet<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => {
            out.insert(name.as_str());
        }
        Expr::Negate(operand) | Expr::Not(operand) => collect_variables(operand, out),
        Expr::Arith(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            collect_variables(lhs, out);
            collect_variables(rhs, out);
        }
        Expr::Compare(first, rest) => {
            collect_variables(first, out);
            for (_, operand) in rest {
                collect_variables(operand, out);
            }
        }
    }
}

/// A parsed condition over the closed grammar: numeric literals, variables,
/// `+ - * /`, comparisons, `and`/`or`/`not` and parentheses. Nothing else
/// (calls, attribute access, indexing, strings) can be expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse an expression without checking which variables it references
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(syntax(0, "empty expression"));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            operands: 0,
            end: source.len(),
        };
        let root = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            let position = parser.position();
            let token = parser.tokens[parser.pos].token.clone();
            if token == Token::LParen {
                return Err(disallowed(position, "call syntax '('"));
            }
            return Err(syntax(position, format!("unexpected token {:?}", token)));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Parse and check that every referenced name is one of [`VARIABLES`]
    pub fn compile(source: &str) -> ExpressionResult<Self> {
        let expression = Self::parse(source)?;
        if let Some(unknown) = expression
            .variables()
            .into_iter()
            .find(|name| !VARIABLES.contains(name))
        {
            return Err(ExpressionError::UnknownVariable(unknown.to_string()));
        }
        Ok(expression)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names referenced by the expression
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        collect_variables(&self.root, &mut names);
        names
    }

    /// Evaluate against bindings; the expression must produce a boolean
    pub fn evaluate(&self, bindings: &Bindings) -> ExpressionResult<bool> {
        eval(&self.root, bindings)?.boolean("condition")
    }
}

/// Parse and evaluate `expression` in one step
pub fn evaluate(expression: &str, bindings: &Bindings) -> ExpressionResult<bool> {
    Expression::parse(expression)?.evaluate(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        for name in VARIABLES {
            b.insert(name.to_string(), 0.0);
        }
        b.insert("price".to_string(), 140.0);
        b.insert("daily_change_pct".to_string(), -4.0);
        b.insert("volume".to_string(), 150_000_000.0);
        b.insert("monthly_high".to_string(), 188.0);
        b
    }

    #[test]
    fn test_compound_condition() {
        let result = evaluate("price < 150 and daily_change_pct < -3", &bindings());
        assert_eq!(result, Ok(true));
    }

    #[test]
    fn test_or_and_not() {
        let b = bindings();
        assert_eq!(evaluate("daily_change_pct > 5 or daily_change_pct < -3", &b), Ok(true));
        assert_eq!(evaluate("not price > 150", &b), Ok(true));
        assert_eq!(evaluate("not (price < 150 and volume > 1)", &b), Ok(false));
    }

    #[test]
    fn test_precedence_and_arithmetic() {
        let b = bindings();
        assert_eq!(evaluate("price + 10 * 2 == 160", &b), Ok(true));
        assert_eq!(evaluate("(price + 10) * 2 == 300", &b), Ok(true));
        assert_eq!(evaluate("price / monthly_high < 0.75", &b), Ok(true));
        assert_eq!(evaluate("-price < -100", &b), Ok(true));
        assert_eq!(evaluate("volume > 1e8", &b), Ok(true));
    }

    #[test]
    fn test_chained_comparison() {
        let b = bindings();
        assert_eq!(evaluate("100 < price < 150", &b), Ok(true));
        assert_eq!(evaluate("100 < price < 120", &b), Ok(false));
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let b = bindings();
        // false and false or true -> (false and false) or true
        assert_eq!(evaluate("price > 500 and price > 600 or price > 1", &b), Ok(true));
    }

    #[test]
    fn test_unknown_variable() {
        let err = evaluate("bogus > 1", &bindings()).unwrap_err();
        assert_eq!(err, ExpressionError::UnknownVariable("bogus".to_string()));

        let err = Expression::compile("price > __import__").unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownVariable(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = evaluate("price / 0 > 1", &bindings()).unwrap_err();
        assert_eq!(err, ExpressionError::DivisionByZero);

        // A bare arithmetic expression still reports the division first
        let err = evaluate("price / 0", &bindings()).unwrap_err();
        assert_eq!(err, ExpressionError::DivisionByZero);
    }

    #[test]
    fn test_disallowed_constructs() {
        for source in [
            "abs(price) > 1",
            "price.real > 1",
            "price ** 2 > 1",
            "price % 2 == 0",
            "[price][0] > 1",
            "price = 1",
            "'a' == 'a'",
            "price > 1; volume > 1",
            "price // 2 > 1",
        ] {
            let err = Expression::parse(source).unwrap_err();
            assert!(
                matches!(err, ExpressionError::Disallowed { .. }),
                "{} should be disallowed, got {:?}",
                source,
                err
            );
        }
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "price >", "(price > 1", "price > 1)", "price ??? 100", "1abc > 2"] {
            assert!(Expression::parse(source).is_err(), "{} should fail", source);
        }
        assert!(matches!(
            Expression::parse("price > > 1").unwrap_err(),
            ExpressionError::Syntax { .. }
        ));
    }

    #[test]
    fn test_result_must_be_boolean() {
        let err = evaluate("price + 1", &bindings()).unwrap_err();
        assert!(matches!(err, ExpressionError::Type(_)));

        let err = evaluate("price and volume", &bindings()).unwrap_err();
        assert!(matches!(err, ExpressionError::Type(_)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}price > 1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(
            Expression::parse(&source).unwrap_err(),
            ExpressionError::Syntax { .. }
        ));
    }

    #[test]
    fn test_long_operator_chains_are_rejected() {
        let source = format!("price{} > 0", " + 1".repeat(20_000));
        assert!(matches!(
            Expression::compile(&source).unwrap_err(),
            ExpressionError::Syntax { .. }
        ));

        let source = format!("price > 0{}", " and volume > 0".repeat(5_000));
        assert!(Expression::compile(&source).is_err());

        // 1 + 254 + 1 operands fits the budget
        let source = format!("price{} > 0", " + 1".repeat(254));
        assert!(Expression::compile(&source).unwrap().evaluate(&bindings()).unwrap());
    }

    #[test]
    fn test_variables_collected() {
        let expression = Expression::compile("price > monthly_high and volume > 1").unwrap();
        let names: Vec<&str> = expression.variables().into_iter().collect();
        assert_eq!(names, vec!["monthly_high", "price", "volume"]);
        assert_eq!(expression.source(), "price > monthly_high and volume > 1");
    }
}
