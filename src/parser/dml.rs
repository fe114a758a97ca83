use super::common::{ident, keyword, ws};
use super::expr::expr;
use super::queries::{select_items, table_ref, where_clause};
use super::statement::{Assignment, DeleteStatement, InsertStatement, SelectItem, UpdateStatement};
use nom::{
    character::complete::char,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

fn returning(input: &str) -> IResult<&str, Vec<SelectItem>> {
    map(
        opt(preceded(ws(keyword("RETURNING")), select_items)),
        Option::unwrap_or_default,
    )(input)
}

pub fn insert(input: &str) -> IResult<&str, InsertStatement> {
    let (input, _) = ws(keyword("INSERT"))(input)?;
    let (input, _) = ws(keyword("INTO"))(input)?;
    let (input, table) = ws(ident)(input)?;
    let (input, columns) = opt(delimited(
        ws(char('(')),
        separated_list1(ws(char(',')), ws(ident)),
        ws(char(')')),
    ))(input)?;
    let (input, _) = ws(keyword("VALUES"))(input)?;
    let (input, rows) = separated_list1(
        ws(char(',')),
        delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), expr),
            ws(char(')')),
        ),
    )(input)?;
    let (input, returning) = returning(input)?;

    Ok((
        input,
        InsertStatement {
            table,
            columns: columns.unwrap_or_default(),
            rows,
            returning,
        },
    ))
}

pub fn update(input: &str) -> IResult<&str, UpdateStatement> {
    let (input, _) = ws(keyword("UPDATE"))(input)?;
    let (input, table) = table_ref(input)?;
    let (input, _) = ws(keyword("SET"))(input)?;
    let (input, assignments) = separated_list1(
        ws(char(',')),
        map(
            separated_pair(ws(ident), ws(char('=')), expr),
            |(column, value)| Assignment { column, value },
        ),
    )(input)?;
    let (input, filter) = where_clause(input)?;
    let (input, returning) = returning(input)?;

    Ok((
        input,
        UpdateStatement {
            table,
            assignments,
            filter,
            returning,
        },
    ))
}

pub fn delete(input: &str) -> IResult<&str, DeleteStatement> {
    let (input, _) = ws(keyword("DELETE"))(input)?;
    let (input, _) = ws(keyword("FROM"))(input)?;
    let (input, table) = table_ref(input)?;
    let (input, filter) = where_clause(input)?;
    let (input, returning) = returning(input)?;

    Ok((input, DeleteStatement { table, filter, returning }))
}
