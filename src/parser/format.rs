// SQL re-serialization of the statement tree

use super::statement::{
    BinaryOperator, ColumnRef, DeleteStatement, Expr, Ident, InsertStatement, JoinClause,
    JoinType, OrderByItem, Placeholder, SelectItem, SelectStatement, SetOperator, SortOrder,
    Statement, TableRef, UpdateStatement,
};
use super::common::is_reserved;
use std::fmt::{self, Display, Formatter};

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Whether `name` would re-parse as the same bare identifier.
fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved(name)
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.quote {
            Some(q) => write!(f, "{q}{}{q}", self.value),
            None if is_bare_identifier(&self.value) => write!(f, "{}", self.value),
            // Names like `orders_us-east` only survive a round trip quoted
            None => write!(f, "\"{}\"", self.value),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} {alias}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

impl Display for Placeholder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numbered(n) => write!(f, "${n}"),
            Self::Positional(_) => write!(f, "?"),
        }
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        };
        write!(f, "{op}")
    }
}

const fn not_prefix(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(c) => write!(f, "{c}"),
            Self::Literal(v) => write!(f, "{}", v.to_sql_literal()),
            Self::Placeholder(p) => write!(f, "{p}"),
            Self::Binary { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::Not(e) => write!(f, "NOT {e}"),
            Self::IsNull { expr, negated } => write!(f, "{expr} IS {}NULL", not_prefix(*negated)),
            Self::InList { expr, list, negated } => {
                write!(f, "{expr} {}IN (", not_prefix(*negated))?;
                write_list(f, list)?;
                write!(f, ")")
            }
            Self::Between { expr, low, high, negated } => {
                write!(f, "{expr} {}BETWEEN {low} AND {high}", not_prefix(*negated))
            }
            Self::Like { expr, pattern, negated } => {
                write!(f, "{expr} {}LIKE {pattern}", not_prefix(*negated))
            }
            Self::Function { name, args, distinct } => {
                write!(f, "{name}({}", if *distinct { "DISTINCT " } else { "" })?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Self::Wildcard => write!(f, "*"),
            Self::Nested(e) => write!(f, "({e})"),
        }
    }
}

impl Display for SelectItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::QualifiedWildcard(table) => write!(f, "{table}.*"),
            Self::Expr { expr, alias: Some(alias) } => write!(f, "{expr} AS {alias}"),
            Self::Expr { expr, alias: None } => write!(f, "{expr}"),
        }
    }
}

impl Display for JoinClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self.join_type {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        };
        write!(f, "{kind} {} ON {}", self.table, self.on)
    }
}

impl Display for OrderByItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.order {
            Some(SortOrder::Asc) => write!(f, "{} ASC", self.expr),
            Some(SortOrder::Desc) => write!(f, "{} DESC", self.expr),
            None => write!(f, "{}", self.expr),
        }
    }
}

impl Display for SetOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "UNION"),
            Self::UnionAll => write!(f, "UNION ALL"),
            Self::Intersect => write!(f, "INTERSECT"),
            Self::Except => write!(f, "EXCEPT"),
        }
    }
}

impl Display for SelectStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write_list(f, &self.columns)?;
        write!(f, " FROM {}", self.from)?;
        for join in &self.joins {
            write!(f, " {join}")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {having}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            write_list(f, &self.order_by)?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = &self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        if let Some(compound) = &self.compound {
            write!(f, " {} {}", compound.op, compound.select)?;
        }
        Ok(())
    }
}

fn write_returning(f: &mut Formatter<'_>, items: &[SelectItem]) -> fmt::Result {
    if items.is_empty() {
        return Ok(());
    }
    write!(f, " RETURNING ")?;
    write_list(f, items)
}

impl Display for InsertStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.table)?;
        if !self.columns.is_empty() {
            write!(f, " (")?;
            write_list(f, &self.columns)?;
            write!(f, ")")?;
        }
        write!(f, " VALUES ")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "(")?;
            write_list(f, row)?;
            write!(f, ")")?;
        }
        write_returning(f, &self.returning)
    }
}

impl Display for UpdateStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {} SET ", self.table)?;
        for (i, assignment) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", assignment.column, assignment.value)?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        write_returning(f, &self.returning)
    }
}

impl Display for DeleteStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        write_returning(f, &self.returning)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert(s) => write!(f, "{s}"),
            Self::Select(s) => write!(f, "{s}"),
            Self::Update(s) => write!(f, "{s}"),
            Self::Delete(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    #[test]
    fn test_bare_identifiers_print_unquoted() {
        assert_eq!(Ident::new("orders_06").to_string(), "orders_06");
        assert_eq!(Ident::new("_tmp").to_string(), "_tmp");
        assert_eq!(Ident::quoted("Orders", '`').to_string(), "`Orders`");
    }

    #[test]
    fn test_non_identifier_names_are_quoted() {
        assert_eq!(Ident::new("orders_us-east").to_string(), "\"orders_us-east\"");
        assert_eq!(Ident::new("2024_orders").to_string(), "\"2024_orders\"");
        assert_eq!(Ident::new("region").to_string(), "region");
        assert_eq!(Ident::new("order").to_string(), "\"order\"");
    }

    #[test]
    fn test_renamed_table_reparses() {
        let Statement::Delete(mut delete) = parse_statement("DELETE FROM orders WHERE orders.id = 1").unwrap() else {
            panic!("expected DELETE");
        };
        delete.table.name = delete.table.name.renamed("orders_us-east");
        let sql = Statement::Delete(delete).to_string();
        assert_eq!(sql, "DELETE FROM \"orders_us-east\" WHERE orders.id = 1");
        match parse_statement(&sql).unwrap() {
            Statement::Delete(reparsed) => assert_eq!(reparsed.table.name.value, "orders_us-east"),
            other => panic!("expected DELETE, got {}", other.kind()),
        }
    }
}
