use super::common::{ident, keyword, placeholder, value, ws};
use super::statement::{BinaryOperator, ColumnRef, Expr};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

fn fold_binary(first: Expr, rest: Vec<(BinaryOperator, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expr::binary(left, op, right))
}

// Parse OR chains (lowest priority)
pub fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(
        map(ws(keyword("OR")), |_| BinaryOperator::Or),
        and_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

// Parse AND chains (higher priority than OR)
fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(pair(
        map(ws(keyword("AND")), |_| BinaryOperator::And),
        not_expr,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("NOT")), not_expr), |e| Expr::Not(Box::new(e))),
        predicate,
    ))(input)
}

fn comparison_operator(input: &str) -> IResult<&str, BinaryOperator> {
    ws(alt((
        map(tag(">="), |_| BinaryOperator::GtEq),
        map(tag("<="), |_| BinaryOperator::LtEq),
        map(tag("<>"), |_| BinaryOperator::NotEq),
        map(tag("!="), |_| BinaryOperator::NotEq),
        map(tag("="), |_| BinaryOperator::Eq),
        map(tag(">"), |_| BinaryOperator::Gt),
        map(tag("<"), |_| BinaryOperator::Lt),
    )))(input)
}

fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(ws(keyword("NOT"))), |n| n.is_some())(input)
}

// Comparison, IS [NOT] NULL, [NOT] IN, [NOT] BETWEEN, [NOT] LIKE
fn predicate(input: &str) -> IResult<&str, Expr> {
    let (input, left) = additive(input)?;

    if let Ok((rest, op)) = comparison_operator(input) {
        let (rest, right) = additive(rest)?;
        return Ok((rest, Expr::binary(left, op, right)));
    }

    if let Ok((rest, (_, negated, _))) =
        tuple((ws(keyword("IS")), negation, ws(keyword("NULL"))))(input)
    {
        return Ok((rest, Expr::IsNull { expr: Box::new(left), negated }));
    }

    if let Ok((rest, (negated, _, list))) = tuple((
        negation,
        ws(keyword("IN")),
        delimited(ws(char('(')), separated_list1(ws(char(',')), expr), ws(char(')'))),
    ))(input)
    {
        return Ok((rest, Expr::InList { expr: Box::new(left), list, negated }));
    }

    if let Ok((rest, (negated, _, low, _, high))) = tuple((
        negation,
        ws(keyword("BETWEEN")),
        additive,
        ws(keyword("AND")),
        additive,
    ))(input)
    {
        return Ok((
            rest,
            Expr::Between { expr: Box::new(left), low: Box::new(low), high: Box::new(high), negated },
        ));
    }

    if let Ok((rest, (negated, _, pattern))) =
        tuple((negation, ws(keyword("LIKE")), additive))(input)
    {
        return Ok((rest, Expr::Like { expr: Box::new(left), pattern: Box::new(pattern), negated }));
    }

    Ok((input, left))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = multiplicative(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('+'), |_| BinaryOperator::Plus),
            map(char('-'), |_| BinaryOperator::Minus),
        ))),
        multiplicative,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(char('*'), |_| BinaryOperator::Multiply),
            map(char('/'), |_| BinaryOperator::Divide),
            map(char('%'), |_| BinaryOperator::Modulo),
        ))),
        primary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

// name(*) / name([DISTINCT] arg, ...)
fn function_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = ws(ident)(input)?;
    let (input, _) = char('(')(input)?;
    let (input, distinct) = map(opt(ws(keyword("DISTINCT"))), |d| d.is_some())(input)?;
    let (input, args) = alt((
        map(ws(char('*')), |_| vec![Expr::Wildcard]),
        separated_list0(ws(char(',')), expr),
    ))(input)?;
    let (input, _) = ws(char(')'))(input)?;
    Ok((input, Expr::Function { name: name.value, args, distinct }))
}

/// `column` or `table.column`.
pub fn column_ref(input: &str) -> IResult<&str, ColumnRef> {
    let (input, first) = ws(ident)(input)?;
    let (input, second) = opt(preceded(char('.'), ident))(input)?;
    let column = match second {
        Some(column) => ColumnRef { table: Some(first), column },
        None => ColumnRef { table: None, column: first },
    };
    Ok((input, column))
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(delimited(char('('), expr, ws(char(')'))), |e| Expr::Nested(Box::new(e))),
        map(value, Expr::Literal),
        map(placeholder, Expr::Placeholder),
        function_call,
        map(column_ref, Expr::Column),
    )))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::parser::statement::Placeholder;

    #[test]
    fn test_and_binds_tighter_than_or() {
        let (rest, e) = expr("a = 1 OR b = 2 AND c = 3").unwrap();
        assert!(rest.is_empty());
        match e {
            Expr::Binary { op: BinaryOperator::Or, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOperator::And, .. }));
            }
            other => panic!("Expected OR at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_qualified_column_and_placeholder() {
        let (_, e) = expr("orders.user_id = $2").unwrap();
        match e {
            Expr::Binary { left, op: BinaryOperator::Eq, right } => {
                match *left {
                    Expr::Column(ColumnRef { table: Some(t), column }) => {
                        assert_eq!(t.value, "orders");
                        assert_eq!(column.value, "user_id");
                    }
                    other => panic!("Expected qualified column, got {other:?}"),
                }
                assert_eq!(*right, Expr::Placeholder(Placeholder::Numbered(2)));
            }
            other => panic!("Expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_predicates() {
        assert!(matches!(expr("x IS NOT NULL").unwrap().1, Expr::IsNull { negated: true, .. }));
        assert!(matches!(expr("x NOT IN (1, 2)").unwrap().1, Expr::InList { negated: true, .. }));
        assert!(matches!(expr("x BETWEEN 1 AND 5").unwrap().1, Expr::Between { negated: false, .. }));
        assert!(matches!(expr("name LIKE 'a%'").unwrap().1, Expr::Like { .. }));
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        // "order_total" and "nullable" must not be read as keywords
        let (rest, e) = expr("order_total = nullable").unwrap();
        assert!(rest.is_empty());
        assert!(matches!(e, Expr::Binary { op: BinaryOperator::Eq, .. }));
    }

    #[test]
    fn test_arithmetic_is_left_associative() {
        let (_, e) = expr("a - 1 - 2").unwrap();
        match e {
            Expr::Binary { left, op: BinaryOperator::Minus, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOperator::Minus, .. }));
                assert_eq!(*right, Expr::Literal(Value::Integer(2)));
            }
            other => panic!("Expected subtraction, got {other:?}"),
        }
    }

    #[test]
    fn test_function_calls() {
        assert!(matches!(
            expr("COUNT(*)").unwrap().1,
            Expr::Function { ref args, .. } if args == &vec![Expr::Wildcard]
        ));
        assert!(matches!(expr("COUNT(DISTINCT user_id)").unwrap().1, Expr::Function { distinct: true, .. }));
    }
}
