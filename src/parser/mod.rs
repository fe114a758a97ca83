// Module declarations
mod statement;
pub(crate) mod common;
mod expr;
mod queries;
mod dml;
mod format;

// Re-export all public types
pub use statement::{
    Assignment,
    BinaryOperator,
    ColumnRef,
    Compound,
    DeleteStatement,
    Expr,
    Ident,
    InsertStatement,
    JoinClause,
    JoinType,
    OrderByItem,
    Placeholder,
    SelectItem,
    SelectStatement,
    SetOperator,
    SortOrder,
    Statement,
    TableRef,
    UpdateStatement,
};

use crate::core::{DataType, ShardingError, Value};
use nom::branch::alt;
use nom::combinator::map;

/// Parses one DML statement (INSERT / SELECT / UPDATE / DELETE).
///
/// Anything else, including DDL, is a `ParseError`.
pub fn parse_statement(input: &str) -> Result<Statement, ShardingError> {
    let input = input.trim();
    let input = input.trim_end_matches(';');

    let result = alt((
        map(dml::insert, Statement::Insert),
        map(queries::select, Statement::Select),
        map(dml::update, Statement::Update),
        map(dml::delete, Statement::Delete),
    ))(input);

    match result {
        Ok((remaining, mut stmt)) => {
            if remaining.trim().is_empty() {
                number_positional_placeholders(&mut stmt);
                Ok(stmt)
            } else {
                Err(ShardingError::ParseError(format!("Unexpected input after statement: {remaining}")))
            }
        }
        Err(e) => Err(ShardingError::ParseError(format!("{e:?}"))),
    }
}

/// `?` slots are numbered in the order they appear in the text.
fn number_positional_placeholders(stmt: &mut Statement) {
    let mut next = 0;
    stmt.walk_exprs_mut(&mut |e| {
        if let Expr::Placeholder(Placeholder::Positional(index)) = e {
            *index = next;
            next += 1;
        }
    });
}

/// Parses a column type name such as `BIGINT` or `VARCHAR(64)`.
pub fn parse_data_type(input: &str) -> Option<DataType> {
    match common::data_type(input.trim()) {
        Ok((rest, data_type)) if rest.trim().is_empty() => Some(data_type),
        _ => None,
    }
}

/// Parses a single SQL literal (`42`, `'eu'`, `NULL`).
pub fn parse_value(input: &str) -> Option<Value> {
    match common::value(input.trim()) {
        Ok((rest, value)) if rest.is_empty() => Some(value),
        _ => None,
    }
}
