//! Integer arithmetic over sharding-key columns, e.g. `tenant_id << 16 | user_id`.
//!
//! Operators follow C precedence: unary `-`, then `* / %`, `+ -`, `<< >>`,
//! `&`, `^`, `|`.

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{map, map_res, recognize},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::core::{ShardingError, Value};
use crate::parser::common::{identifier, ws};

/// Computes a numeric shard input from named key values.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, params: &HashMap<String, Value>) -> Result<Value, ShardingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Int(i64),
    Float(f64),
    Var(String),
    Neg(Box<Node>),
    Bin(Box<Node>, Op, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

fn fold(first: Node, rest: Vec<(Op, Node)>) -> Node {
    rest.into_iter()
        .fold(first, |l, (op, r)| Node::Bin(Box::new(l), op, Box::new(r)))
}

fn atom(input: &str) -> IResult<&str, Node> {
    ws(alt((
        map_res(
            recognize(tuple((digit1, char('.'), digit1))),
            |s: &str| s.parse::<f64>().map(Node::Float),
        ),
        map_res(digit1, |s: &str| s.parse::<i64>().map(Node::Int)),
        map(identifier, Node::Var),
        delimited(char('('), bit_or, char(')')),
    )))(input)
}

fn unary(input: &str) -> IResult<&str, Node> {
    alt((
        map(preceded(ws(char('-')), unary), |n| Node::Neg(Box::new(n))),
        atom,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Node> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('*'), |_| Op::Mul),
            map(char('/'), |_| Op::Div),
            map(char('%'), |_| Op::Rem),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn additive(input: &str) -> IResult<&str, Node> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        ws(alt((map(char('+'), |_| Op::Add), map(char('-'), |_| Op::Sub)))),
        term,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn shift(input: &str) -> IResult<&str, Node> {
    let (input, first) = additive(input)?;
    let (input, rest) = many0(pair(
        ws(alt((map(tag("<<"), |_| Op::Shl), map(tag(">>"), |_| Op::Shr)))),
        additive,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn bit_and(input: &str) -> IResult<&str, Node> {
    let (input, first) = shift(input)?;
    let (input, rest) = many0(pair(map(ws(char('&')), |_| Op::BitAnd), shift))(input)?;
    Ok((input, fold(first, rest)))
}

fn bit_xor(input: &str) -> IResult<&str, Node> {
    let (input, first) = bit_and(input)?;
    let (input, rest) = many0(pair(map(ws(char('^')), |_| Op::BitXor), bit_and))(input)?;
    Ok((input, fold(first, rest)))
}

fn bit_or(input: &str) -> IResult<&str, Node> {
    let (input, first) = bit_xor(input)?;
    let (input, rest) = many0(pair(map(ws(char('|')), |_| Op::BitOr), bit_xor))(input)?;
    Ok((input, fold(first, rest)))
}

fn to_number(name: &str, value: &Value) -> Result<Number, ShardingError> {
    let number = match value {
        Value::Integer(i) => Some(Number::Int(*i)),
        Value::Unsigned(u) => Some(i64::try_from(*u).map_or(Number::Float(*u as f64), Number::Int)),
        Value::Boolean(b) => Some(Number::Int(i64::from(*b))),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Number::Int)
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(Number::Float)),
        other => other.as_f64().map(|f| {
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                Number::Int(f as i64)
            } else {
                Number::Float(f)
            }
        }),
    };
    number.ok_or_else(|| ShardingError::Expression(format!("'{name}' is not numeric: {value}")))
}

fn apply(l: Number, op: Op, r: Number) -> Result<Number, ShardingError> {
    let overflow = || ShardingError::Expression(format!("{op:?} overflowed"));

    if let (Number::Int(a), Number::Int(b)) = (l, r) {
        let result = match op {
            Op::Add => a.checked_add(b),
            Op::Sub => a.checked_sub(b),
            Op::Mul => a.checked_mul(b),
            Op::Div | Op::Rem if b == 0 => {
                return Err(ShardingError::Expression("division by zero".to_string()));
            }
            Op::Div => a.checked_div(b),
            Op::Rem => a.checked_rem(b),
            Op::Shl | Op::Shr => {
                let amount = u32::try_from(b).ok().filter(|s| *s < 64).ok_or_else(overflow)?;
                if op == Op::Shl { a.checked_shl(amount) } else { a.checked_shr(amount) }
            }
            Op::BitAnd => Some(a & b),
            Op::BitXor => Some(a ^ b),
            Op::BitOr => Some(a | b),
        };
        return result.map(Number::Int).ok_or_else(overflow);
    }

    let (a, b) = (l.as_f64(), r.as_f64());
    match op {
        Op::Add => Ok(Number::Float(a + b)),
        Op::Sub => Ok(Number::Float(a - b)),
        Op::Mul => Ok(Number::Float(a * b)),
        Op::Div => Ok(Number::Float(a / b)),
        Op::Rem => Ok(Number::Float(a % b)),
        _ => Err(ShardingError::Expression(format!("{op:?} needs integer operands"))),
    }
}

/// Built-in [`ExpressionEvaluator`] over the sharding-key columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticExpression {
    source: String,
    root: Node,
}

impl ArithmeticExpression {
    pub fn parse(source: &str) -> Result<Self, ShardingError> {
        match bit_or(source) {
            Ok((rest, root)) if rest.trim().is_empty() => {
                Ok(Self { source: source.to_string(), root })
            }
            Ok((rest, _)) => Err(ShardingError::Expression(format!("unexpected input: {rest}"))),
            Err(e) => Err(ShardingError::Expression(format!("{e:?}"))),
        }
    }

    /// Column names the expression reads, in first-use order.
    pub fn variables(&self) -> Vec<String> {
        fn collect(node: &Node, out: &mut Vec<String>) {
            match node {
                Node::Var(name) if !out.contains(name) => out.push(name.clone()),
                Node::Neg(inner) => collect(inner, out),
                Node::Bin(l, _, r) => {
                    collect(l, out);
                    collect(r, out);
                }
                _ => {}
            }
        }
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn eval(node: &Node, params: &HashMap<String, Value>) -> Result<Number, ShardingError> {
        match node {
            Node::Int(i) => Ok(Number::Int(*i)),
            Node::Float(f) => Ok(Number::Float(*f)),
            Node::Var(name) => {
                let value = params
                    .get(name)
                    .or_else(|| {
                        params
                            .iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case(name))
                            .map(|(_, v)| v)
                    })
                    .ok_or_else(|| ShardingError::MissingShardingKey(name.clone()))?;
                to_number(name, value)
            }
            Node::Neg(inner) => match Self::eval(inner, params)? {
                Number::Int(i) => i
                    .checked_neg()
                    .map(Number::Int)
                    .ok_or_else(|| ShardingError::Expression("negation overflowed".to_string())),
                Number::Float(f) => Ok(Number::Float(-f)),
            },
            Node::Bin(l, op, r) => apply(Self::eval(l, params)?, *op, Self::eval(r, params)?),
        }
    }
}

impl ExpressionEvaluator for ArithmeticExpression {
    fn evaluate(&self, params: &HashMap<String, Value>) -> Result<Value, ShardingError> {
        Ok(match Self::eval(&self.root, params)? {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Real(f),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, params: &[(&str, Value)]) -> Result<Value, ShardingError> {
        let params = params.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        ArithmeticExpression::parse(source)?.evaluate(&params)
    }

    #[test]
    fn test_c_precedence() {
        assert_eq!(eval("1 + 2 * 3", &[]).unwrap(), Value::Integer(7));
        assert_eq!(eval("(1 + 2) * 3", &[]).unwrap(), Value::Integer(9));
        assert_eq!(eval("1 << 4 | 3", &[]).unwrap(), Value::Integer(19));
        assert_eq!(eval("6 & 3 ^ 1", &[]).unwrap(), Value::Integer(3));
        assert_eq!(eval("10 - 4 - 3", &[]).unwrap(), Value::Integer(3));
        assert_eq!(eval("-7 % 3", &[]).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn test_variables_from_keys() {
        let params = [("tenant_id", Value::Integer(3)), ("user_id", Value::Text("5".to_string()))];
        assert_eq!(eval("tenant_id << 16 | user_id", &params).unwrap(), Value::Integer((3 << 16) | 5));

        let expr = ArithmeticExpression::parse("tenant_id * 100 + user_id + tenant_id").unwrap();
        assert_eq!(expr.variables(), vec!["tenant_id", "user_id"]);
    }

    #[test]
    fn test_float_results() {
        assert_eq!(eval("user_id / 2.0", &[("user_id", Value::Integer(5))]).unwrap(), Value::Real(2.5));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(eval("1 / 0", &[]), Err(ShardingError::Expression(_))));
        assert!(matches!(eval("1.5 | 1", &[]), Err(ShardingError::Expression(_))));
        assert!(matches!(eval("user_id + 1", &[]), Err(ShardingError::MissingShardingKey(_))));
        assert!(matches!(eval("region + 1", &[("region", Value::Text("eu".into()))]), Err(ShardingError::Expression(_))));
        assert!(ArithmeticExpression::parse("1 +").is_err());
        assert!(ArithmeticExpression::parse("a b").is_err());
    }
}
