use super::common::{ident, keyword, placeholder, value, ws};
use super::expr::expr;
use super::statement::{
    Compound, Expr, Ident, JoinClause, JoinType, OrderByItem, SelectItem, SelectStatement,
    SetOperator, SortOrder, TableRef,
};
use nom::{
    branch::alt,
    character::complete::char,
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

fn alias(input: &str) -> IResult<&str, Ident> {
    preceded(opt(ws(keyword("AS"))), ws(ident))(input)
}

/// `table [AS] alias`
pub fn table_ref(input: &str) -> IResult<&str, TableRef> {
    let (input, name) = ws(ident)(input)?;
    let (input, alias) = opt(alias)(input)?;
    Ok((input, TableRef { name, alias }))
}

// Parse select item: *, table.*, or expression with optional alias
pub fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((
        map(ws(char('*')), |_| SelectItem::Wildcard),
        map(terminated(ws(ident), pair(char('.'), ws(char('*')))), SelectItem::QualifiedWildcard),
        map(pair(expr, opt(alias)), |(expr, alias)| SelectItem::Expr { expr, alias }),
    ))(input)
}

pub fn select_items(input: &str) -> IResult<&str, Vec<SelectItem>> {
    separated_list1(ws(char(',')), select_item)(input)
}

// Parse JOIN clause: [INNER|LEFT|RIGHT|FULL [OUTER]] JOIN table [alias] ON condition
pub fn join_clause(input: &str) -> IResult<&str, JoinClause> {
    let outer = |kw: &'static str| tuple((ws(keyword(kw)), opt(ws(keyword("OUTER"))), ws(keyword("JOIN"))));
    let (input, join_type) = alt((
        map(tuple((ws(keyword("INNER")), ws(keyword("JOIN")))), |_| JoinType::Inner),
        map(outer("LEFT"), |_| JoinType::Left),
        map(outer("RIGHT"), |_| JoinType::Right),
        map(outer("FULL"), |_| JoinType::Full),
        map(ws(keyword("JOIN")), |_| JoinType::Inner), // Default to INNER
    ))(input)?;

    let (input, table) = table_ref(input)?;
    let (input, _) = ws(keyword("ON"))(input)?;
    let (input, on) = expr(input)?;

    Ok((input, JoinClause { join_type, table, on }))
}

// Parse optional WHERE clause
pub fn where_clause(input: &str) -> IResult<&str, Option<Expr>> {
    opt(preceded(ws(keyword("WHERE")), expr))(input)
}

fn group_by(input: &str) -> IResult<&str, Vec<Expr>> {
    map(
        opt(preceded(
            tuple((ws(keyword("GROUP")), ws(keyword("BY")))),
            separated_list1(ws(char(',')), expr),
        )),
        Option::unwrap_or_default,
    )(input)
}

fn order_by_item(input: &str) -> IResult<&str, OrderByItem> {
    let (input, expr) = expr(input)?;
    let (input, order) = opt(alt((
        map(ws(keyword("ASC")), |_| SortOrder::Asc),
        map(ws(keyword("DESC")), |_| SortOrder::Desc),
    )))(input)?;
    Ok((input, OrderByItem { expr, order }))
}

fn order_by(input: &str) -> IResult<&str, Vec<OrderByItem>> {
    map(
        opt(preceded(
            tuple((ws(keyword("ORDER")), ws(keyword("BY")))),
            separated_list1(ws(char(',')), order_by_item),
        )),
        Option::unwrap_or_default,
    )(input)
}

// LIMIT/OFFSET take a literal or a bound parameter
fn count_expr(input: &str) -> IResult<&str, Expr> {
    ws(alt((map(value, Expr::Literal), map(placeholder, Expr::Placeholder))))(input)
}

fn set_operator(input: &str) -> IResult<&str, SetOperator> {
    alt((
        map(tuple((ws(keyword("UNION")), ws(keyword("ALL")))), |_| SetOperator::UnionAll),
        map(ws(keyword("UNION")), |_| SetOperator::Union),
        map(ws(keyword("INTERSECT")), |_| SetOperator::Intersect),
        map(ws(keyword("EXCEPT")), |_| SetOperator::Except),
    ))(input)
}

pub fn select(input: &str) -> IResult<&str, SelectStatement> {
    let (input, _) = ws(keyword("SELECT"))(input)?;

    // Parse optional DISTINCT keyword
    let (input, distinct) = map(opt(ws(keyword("DISTINCT"))), |d| d.is_some())(input)?;

    let (input, columns) = select_items(input)?;
    let (input, _) = ws(keyword("FROM"))(input)?;
    let (input, from) = table_ref(input)?;

    // Parse optional JOIN clauses
    let (input, joins) = many0(join_clause)(input)?;

    let (input, filter) = where_clause(input)?;
    let (input, group_by) = group_by(input)?;
    let (input, having) = opt(preceded(ws(keyword("HAVING")), expr))(input)?;
    let (input, order_by) = order_by(input)?;
    let (input, limit) = opt(preceded(ws(keyword("LIMIT")), count_expr))(input)?;
    let (input, offset) = opt(preceded(ws(keyword("OFFSET")), count_expr))(input)?;

    // Parse the rest of a UNION/INTERSECT/EXCEPT chain
    let (input, compound) = opt(pair(set_operator, select))(input)?;
    let compound = compound.map(|(op, next)| Compound { op, select: Box::new(next) });

    Ok((
        input,
        SelectStatement {
            distinct,
            columns,
            from,
            joins,
            filter,
            group_by,
            having,
            order_by,
            limit,
            offset,
            compound,
        },
    ))
}
