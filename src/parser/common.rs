use super::statement::{Ident, Placeholder};
use crate::core::{DataType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;
use rust_decimal::Decimal;
use std::str::FromStr;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, recognize, verify},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Words that end a clause and can never be a bare identifier or alias.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "JOIN", "INNER", "LEFT", "RIGHT", "FULL",
    "OUTER", "CROSS", "ON", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION",
    "INTERSECT", "EXCEPT", "ALL", "AS", "IN", "IS", "NULL", "LIKE", "BETWEEN", "VALUES", "SET",
    "RETURNING", "INSERT", "INTO", "UPDATE", "DELETE", "ASC", "DESC", "DISTINCT", "TRUE",
    "FALSE", "EXISTS",
];

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Case-insensitive keyword that is not the prefix of a longer word.
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| {
        let (rest, matched) = tag_no_case(kw)(input)?;
        let (rest, ()) = not(satisfy(is_ident_char))(rest)?;
        Ok((rest, matched))
    }
}

pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

pub fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            take_while(is_ident_char),
        )),
        |s: &str| s.to_string(),
    )(input)
}

fn quoted_identifier(quote: char) -> impl FnMut(&str) -> IResult<&str, Ident> {
    move |input| {
        let (rest, inner) = delimited(
            char(quote),
            take_while1(move |c| c != quote),
            char(quote),
        )(input)?;
        Ok((rest, Ident::quoted(inner, quote)))
    }
}

/// Bare (non-reserved) or quoted identifier.
pub fn ident(input: &str) -> IResult<&str, Ident> {
    alt((
        quoted_identifier('"'),
        quoted_identifier('`'),
        map(verify(identifier, |s: &String| !is_reserved(s)), Ident::new),
    ))(input)
}

/// `'...'` with `''` escapes; may be empty.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let Some(pos) = rest.find('\'') else {
            return Err(nom::Err::Error(Error::new(rest, ErrorKind::Char)));
        };
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(escaped) = after.strip_prefix('\'') {
            out.push('\'');
            rest = escaped;
        } else {
            return Ok((after, out));
        }
    }
}

/// Typed value of a quoted literal. Only forms that re-serialize to the
/// exact same text are promoted from plain text.
fn classify_quoted(s: String) -> Value {
    if s.len() == 36 {
        if let Ok(u) = Uuid::parse_str(&s) {
            if u.to_string() == s {
                return Value::Uuid(u);
            }
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        if d.format("%Y-%m-%d").to_string() == s {
            return Value::Date(d);
        }
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        if t.format("%Y-%m-%d %H:%M:%S").to_string() == s {
            return Value::Timestamp(t);
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(&s) {
        let utc = t.with_timezone(&Utc);
        if utc.to_rfc3339() == s {
            return Value::TimestampTz(utc);
        }
    }
    Value::Text(s)
}

pub fn value(input: &str) -> IResult<&str, Value> {
    alt((
        map(keyword("NULL"), |_| Value::Null),
        map(keyword("TRUE"), |_| Value::Boolean(true)),
        map(keyword("FALSE"), |_| Value::Boolean(false)),
        map(string_literal, classify_quoted),
        // Numeric with decimal point
        map_res(
            recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
            |s: &str| -> Result<Value, String> {
                if let Ok(d) = Decimal::from_str(s) {
                    Ok(Value::Numeric(d))
                } else {
                    Ok(Value::Real(s.parse().map_err(|e| format!("{e:?}"))?))
                }
            },
        ),
        // Integer: i64, then u64 for large ids
        map_res(
            recognize(pair(opt(char('-')), digit1)),
            |s: &str| -> Result<Value, String> {
                if let Ok(num) = s.parse::<i64>() {
                    Ok(Value::Integer(num))
                } else {
                    s.parse::<u64>().map(Value::Unsigned).map_err(|e| format!("{e:?}"))
                }
            },
        ),
    ))(input)
}

/// `$n` or `?`. Positional slots are numbered after the whole statement is parsed.
pub fn placeholder(input: &str) -> IResult<&str, Placeholder> {
    alt((
        map(
            verify(
                map_res(preceded(char('$'), digit1), |s: &str| s.parse::<usize>()),
                |n: &usize| *n > 0,
            ),
            Placeholder::Numbered,
        ),
        map(char('?'), |_| Placeholder::Positional(0)),
    ))(input)
}

/// Unsigned integer (type sizes).
fn size<T: FromStr>(input: &str) -> IResult<&str, T> {
    ws(map_res(digit1, |s: &str| s.parse::<T>()))(input)
}

pub fn data_type(input: &str) -> IResult<&str, DataType> {
    alt((
        // Auto-increment types
        map(keyword("BIGSERIAL"), |_| DataType::BigSerial),
        map(keyword("SERIAL"), |_| DataType::Serial),
        // Numeric types with precision/scale
        map(
            tuple((
                alt((keyword("NUMERIC"), keyword("DECIMAL"))),
                opt(delimited(
                    ws(char('(')),
                    tuple((size::<u8>, opt(preceded(ws(char(',')), size::<u8>)))),
                    ws(char(')')),
                )),
            )),
            |(_, params)| match params {
                Some((p, Some(s))) => DataType::Numeric { precision: p, scale: s },
                Some((p, None)) => DataType::Numeric { precision: p, scale: 0 },
                None => DataType::Numeric { precision: 10, scale: 0 },
            },
        ),
        // Integer types
        map(keyword("SMALLINT"), |_| DataType::SmallInt),
        map(alt((keyword("INTEGER"), keyword("INT"))), |_| DataType::Integer),
        map(keyword("BIGINT"), |_| DataType::BigInt),
        // Floating point
        map(tuple((keyword("DOUBLE"), ws(keyword("PRECISION")))), |_| DataType::Real),
        map(alt((keyword("REAL"), keyword("FLOAT"))), |_| DataType::Real),
        // String types with length
        map(
            tuple((keyword("VARCHAR"), opt(delimited(ws(char('(')), size::<usize>, ws(char(')')))))),
            |(_, len)| DataType::Varchar { max_length: len.unwrap_or(255) },
        ),
        map(
            tuple((keyword("CHAR"), opt(delimited(ws(char('(')), size::<usize>, ws(char(')')))))),
            |(_, len)| DataType::Char { length: len.unwrap_or(1) },
        ),
        map(keyword("TEXT"), |_| DataType::Text),
        map(alt((keyword("BOOLEAN"), keyword("BOOL"))), |_| DataType::Boolean),
        // Date/Time types
        map(keyword("TIMESTAMPTZ"), |_| DataType::TimestampTz),
        map(keyword("TIMESTAMP"), |_| DataType::Timestamp),
        map(keyword("DATE"), |_| DataType::Date),
        // Special types
        map(keyword("UUID"), |_| DataType::Uuid),
        map(keyword("JSONB"), |_| DataType::Jsonb),
        map(keyword("JSON"), |_| DataType::Json),
        map(keyword("BYTEA"), |_| DataType::Bytea),
        // Enums and domains
        map(identifier, DataType::Custom),
    ))(input)
}
