//! Sharding-key equalities in WHERE and ON conditions.

use crate::core::{ShardingError, Value};
use crate::parser::{BinaryOperator, ColumnRef, Expr, Ident};

use super::table::ShardedTable;

/// Literal or bound-parameter value of an expression, if it is one.
pub fn bound_value(expr: &Expr, params: &[Value]) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::Placeholder(p) => params.get(p.index()).cloned(),
        Expr::Nested(inner) => bound_value(inner, params),
        _ => None,
    }
}

/// Conjuncts of the top-level AND chain. OR and NOT subtrees are opaque.
fn conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary { left, op: BinaryOperator::And, right } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        Expr::Nested(inner) if matches!(**inner, Expr::Binary { op: BinaryOperator::And, .. }) => {
            conjuncts(inner, out);
        }
        other => out.push(other),
    }
}

fn refers_to(column: &ColumnRef, name: &str, binding: &Ident) -> bool {
    column.column.matches(name)
        && column.table.as_ref().is_none_or(|qualifier| qualifier.matches(&binding.value))
}

/// Value the conjunct pins `key` to: `key = v`, `v = key` or `key IN (v)`.
fn pinned_value(conjunct: &Expr, key: &str, binding: &Ident, params: &[Value]) -> Option<Value> {
    match conjunct {
        Expr::Binary { left, op: BinaryOperator::Eq, right } => match (&**left, &**right) {
            (Expr::Column(c), other) | (other, Expr::Column(c)) if refers_to(c, key, binding) => {
                bound_value(other, params)
            }
            _ => None,
        },
        Expr::InList { expr, list, negated: false } if list.len() == 1 => match &**expr {
            Expr::Column(c) if refers_to(c, key, binding) => bound_value(&list[0], params),
            _ => None,
        },
        _ => None,
    }
}

/// Key values of `table` fixed by equality conditions on the table bound as `binding`.
///
/// Every key must be pinned in the top-level AND chain of one of `conditions`.
pub fn key_values(
    table: &ShardedTable,
    conditions: &[&Expr],
    binding: &Ident,
    params: &[Value],
) -> Result<Vec<Value>, ShardingError> {
    let mut flat = Vec::new();
    for condition in conditions {
        conjuncts(condition, &mut flat);
    }
    table.key_values(|key| flat.iter().find_map(|c| pinned_value(c, key, binding, params)))
}
