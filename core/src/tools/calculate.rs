use crate::tools::extract_string_arg;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

const ALLOWED_CHARS: &str = "0123456789+-*/.() ";
const MAX_DEPTH: usize = 64;

/// Arithmetic over `+ - * / // **` and parentheses. Integer operands stay
/// integral unless true division is involved, so `2+2` yields `4` and `7/2`
/// yields `3.5`.
pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Safely evaluate a mathematical expression"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let expression = extract_string_arg(&args, "expression")?;

        match evaluate(&expression) {
            Ok(value) => Ok(ToolResult::success(value.to_string())),
            Err(e) => Ok(ToolResult::error(e)),
        }
    }
}

pub fn evaluate(expression: &str) -> Result<Number, String> {
    if !expression.chars().all(|c| ALLOWED_CHARS.contains(c)) {
        return Err("Invalid characters in expression".to_string());
    }

    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("Invalid expression".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{x:.1}")
            }
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Power,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if start == i {
                    return Err("Invalid characters in expression".to_string());
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_literal(&literal)?));
            }
        }
    }

    Ok(tokens)
}

fn parse_literal(literal: &str) -> Result<Number, String> {
    if literal.contains('.') {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| format!("Invalid number '{literal}'"))
    } else {
        literal
            .parse::<i128>()
            .map(Number::Int)
            .map_err(|_| format!("Invalid number '{literal}'"))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Number, String> {
        let mut left = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = apply(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Number, String> {
        let mut left = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash)) = self.peek() {
            self.pos += 1;
            let right = self.factor()?;
            left = apply(op, left, right)?;
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Number, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Expression is nested too deeply".to_string());
        }
        let result = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.factor().and_then(negate)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.factor()
            }
            _ => self.power(),
        };
        self.depth -= 1;
        result
    }

    fn power(&mut self) -> Result<Number, String> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Power) {
            self.pos += 1;
            let exponent = self.factor()?;
            return apply(Token::Power, base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("Unbalanced parentheses".to_string()),
                }
            }
            _ => Err("Invalid expression".to_string()),
        }
    }
}

fn negate(n: Number) -> Result<Number, String> {
    match n {
        Number::Int(i) => i.checked_neg().map(Number::Int).ok_or_else(overflow),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn overflow() -> String {
    "Result is too large".to_string()
}

fn apply(op: Token, left: Number, right: Number) -> Result<Number, String> {
    use Number::{Float, Int};

    let is_zero = match right {
        Int(i) => i == 0,
        Float(f) => f == 0.0,
    };
    if is_zero && matches!(op, Token::Slash | Token::DoubleSlash) {
        return Err("division by zero".to_string());
    }

    let result = match (op, left, right) {
        (Token::Plus, Int(a), Int(b)) => Int(a.checked_add(b).ok_or_else(overflow)?),
        (Token::Minus, Int(a), Int(b)) => Int(a.checked_sub(b).ok_or_else(overflow)?),
        (Token::Star, Int(a), Int(b)) => Int(a.checked_mul(b).ok_or_else(overflow)?),
        (Token::DoubleSlash, Int(a), Int(b)) => {
            let quotient = a.checked_div_euclid(b).ok_or_else(overflow)?;
            let remainder = a.checked_rem_euclid(b).ok_or_else(overflow)?;
            Int(quotient - i128::from(remainder != 0 && b < 0))
        }
        (Token::Power, Int(a), Int(b)) if b >= 0 => {
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            Int(a.checked_pow(exp).ok_or_else(overflow)?)
        }
        (Token::Plus, a, b) => Float(a.as_f64() + b.as_f64()),
        (Token::Minus, a, b) => Float(a.as_f64() - b.as_f64()),
        (Token::Star, a, b) => Float(a.as_f64() * b.as_f64()),
        (Token::Slash, a, b) => Float(a.as_f64() / b.as_f64()),
        (Token::DoubleSlash, a, b) => Float((a.as_f64() / b.as_f64()).floor()),
        (Token::Power, a, b) => {
            if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                return Err("division by zero".to_string());
            }
            Float(a.as_f64().powf(b.as_f64()))
        }
        _ => return Err("Invalid expression".to_string()),
    };

    if let Float(f) = result
        && !f.is_finite()
    {
        return Err(overflow());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> String {
        evaluate(expr).map(|n| n.to_string()).unwrap_or_else(|e| format!("Error: {e}"))
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval("2+2"), "4");
        assert_eq!(eval("15*23+47"), "392");
        assert_eq!(eval("(1 + 2) * 3 - 4"), "5");
        assert_eq!(eval("2**10"), "1024");
        assert_eq!(eval("-3 + 5"), "2");
    }

    #[test]
    fn python_style_division() {
        assert_eq!(eval("7/2"), "3.5");
        assert_eq!(eval("4/2"), "2.0");
        assert_eq!(eval("7//2"), "3");
        assert_eq!(eval("-7//2"), "-4");
        assert_eq!(eval("1.5*2"), "3.0");
    }

    #[test]
    fn precedence_of_power_and_unary_minus() {
        assert_eq!(eval("-2**2"), "-4");
        assert_eq!(eval("2**3**2"), "512");
    }

    #[test]
    fn rejects_characters_outside_whitelist() {
        assert_eq!(eval("2+2; ls"), "Error: Invalid characters in expression");
        assert_eq!(eval("__import__('os')"), "Error: Invalid characters in expression");
        assert_eq!(eval("2^3"), "Error: Invalid characters in expression");
    }

    #[test]
    fn reports_math_errors() {
        assert_eq!(eval("1/0"), "Error: division by zero");
        assert_eq!(eval("(1+2"), "Error: Unbalanced parentheses");
        assert_eq!(eval(""), "Error: Invalid expression");
        assert_eq!(eval("1 2"), "Error: Invalid expression");
        assert!(eval("1..2").starts_with("Error: Invalid number"));
    }

    #[test]
    fn integer_overflow_is_an_error_not_a_panic() {
        assert_eq!(eval("(-2)**127//-1"), "Error: Result is too large");
        assert_eq!(eval("(-2)**127*-1"), "Error: Result is too large");
        assert_eq!(eval("(-2)**127//1"), "-170141183460469231731687303715884105728");
    }

    #[tokio::test]
    async fn tool_returns_result_text() {
        let result = CalculateTool
            .execute(json!({ "expression": "2+2" }))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("4"));

        let result = CalculateTool
            .execute(json!({ "expression": "2+2 && rm" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Invalid characters in expression"));
    }
}
