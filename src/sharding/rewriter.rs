//! Redirects raw SQL against a sharded logical table to its physical shard.
//!
//! Rewrites never touch the caller's statement: the tree is cloned and the
//! clone is renamed, then re-serialized.

use tracing::debug;

use crate::core::{ShardingError, Value};
use crate::parser::{
    parse_statement, DeleteStatement, Expr, Ident, InsertStatement, SelectItem, SelectStatement, Statement,
    TableRef, UpdateStatement,
};

use super::conditions::{bound_value, key_values};
use super::context::DispatchContext;
use super::model::Target;
use super::registry::ShardedTableRegistry;
use super::table::ShardedTable;

/// Outcome of a successful rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub statement: Statement,
    pub sql: String,
    /// Bound parameters, with generated ids substituted for zero primary keys
    pub params: Vec<Value>,
    pub target: Target,
}

/// `/* nosharding */` before the statement opts it out of rewriting.
pub fn has_nosharding_hint(sql: &str) -> bool {
    sql.trim_start()
        .strip_prefix("/*")
        .and_then(|rest| rest.split_once("*/"))
        .is_some_and(|(hint, _)| hint.trim().eq_ignore_ascii_case("nosharding"))
}

fn rename_qualifiers(expr: &mut Expr, old: &Ident, physical: &str) {
    if let Expr::Column(column) = expr {
        if let Some(qualifier) = &mut column.table {
            if qualifier.matches(&old.value) {
                *qualifier = qualifier.renamed(physical);
            }
        }
    }
}

fn rename_wildcards(items: &mut [SelectItem], old: &Ident, physical: &str) {
    for item in items {
        if let SelectItem::QualifiedWildcard(qualifier) = item {
            if qualifier.matches(&old.value) {
                *qualifier = qualifier.renamed(physical);
            }
        }
    }
}

/// Points `table_ref` at `physical`. Returns the old name when columns are
/// qualified by it (no alias).
fn rename_table_ref(table_ref: &mut TableRef, physical: &str) -> Option<Ident> {
    let old = table_ref.alias.is_none().then(|| table_ref.name.clone());
    table_ref.name = table_ref.name.renamed(physical);
    old
}

/// Rewrites statements for a fixed set of sharded tables.
pub struct StatementRewriter<'a> {
    tables: &'a [ShardedTable],
    registry: &'a ShardedTableRegistry,
}

impl<'a> StatementRewriter<'a> {
    pub const fn new(tables: &'a [ShardedTable], registry: &'a ShardedTableRegistry) -> Self {
        Self { tables, registry }
    }

    fn lookup(&self, name: &Ident) -> Option<&'a ShardedTable> {
        self.tables.iter().find(|t| name.matches(t.name()))
    }

    /// Parses and rewrites `sql`. `Ok(None)` means no sharded table is involved.
    pub fn rewrite(
        &self,
        ctx: &mut DispatchContext,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Rewrite>, ShardingError> {
        if has_nosharding_hint(sql) {
            debug!("statement opted out of sharding");
            return Ok(None);
        }
        let statement = parse_statement(sql)?;
        self.rewrite_statement(ctx, &statement, params)
    }

    /// Rewrites a parsed statement into a new tree; `statement` is left as is.
    pub fn rewrite_statement(
        &self,
        ctx: &mut DispatchContext,
        statement: &Statement,
        params: &[Value],
    ) -> Result<Option<Rewrite>, ShardingError> {
        let rewritten = match statement {
            Statement::Insert(insert) => self.rewrite_insert(ctx, insert, params)?,
            Statement::Select(select) => self.rewrite_select(ctx, select, params)?,
            Statement::Update(update) => self.rewrite_update(ctx, update, params)?,
            Statement::Delete(delete) => self.rewrite_delete(ctx, delete, params)?,
        };
        Ok(rewritten.map(|(statement, params, target)| Rewrite {
            sql: statement.to_string(),
            statement,
            params,
            target,
        }))
    }

    fn target(
        &self,
        ctx: &mut DispatchContext,
        table: &ShardedTable,
        suffix: String,
    ) -> Result<Target, ShardingError> {
        let physical_table = self.registry.ensure_table(ctx, table.name(), &suffix)?;
        Ok(Target { logical_table: table.name().to_string(), physical_table, suffix })
    }

    fn rewrite_insert(
        &self,
        ctx: &mut DispatchContext,
        insert: &InsertStatement,
        params: &[Value],
    ) -> Result<Option<(Statement, Vec<Value>, Target)>, ShardingError> {
        let Some(table) = self.lookup(&insert.table) else {
            return Ok(None);
        };
        let mut insert = insert.clone();
        let mut params = params.to_vec();

        if insert.columns.is_empty() {
            let schema = self.registry.schema(table.name()).ok_or_else(|| {
                ShardingError::MissingShardingKey(table.calculator().keys().join(", "))
            })?;
            insert.columns = schema.columns.iter().map(|c| Ident::new(c.name.clone())).collect();
        }
        let columns = insert.columns.len();
        if let Some(row) = insert.rows.iter().find(|row| row.len() != columns) {
            return Err(ShardingError::ColumnExpressionCountMismatch { columns, values: row.len() });
        }

        if table.generates_ids() {
            inject_ids(table, &mut insert, &mut params)?;
        }

        let mut suffix: Option<String> = None;
        for row in &insert.rows {
            let values = table.key_values(|key| {
                let index = insert.columns.iter().position(|c| c.matches(key))?;
                bound_value(&row[index], &params)
            })?;
            let current = table.suffix(&values)?;
            match &suffix {
                Some(first) if *first != current => {
                    return Err(ShardingError::DifferentSuffixInBatch { first: first.clone(), second: current });
                }
                Some(_) => {}
                None => suffix = Some(current),
            }
        }
        let target = self.target(ctx, table, suffix.unwrap_or_default())?;

        let old = insert.table.clone();
        insert.table = insert.table.renamed(&target.physical_table);
        let mut statement = Statement::Insert(insert);
        statement.walk_exprs_mut(&mut |e| rename_qualifiers(e, &old, &target.physical_table));
        if let Statement::Insert(insert) = &mut statement {
            rename_wildcards(&mut insert.returning, &old, &target.physical_table);
        }
        Ok(Some((statement, params, target)))
    }

    /// Sharded table and suffix of one compound member, if it references one.
    fn resolve_member(
        &self,
        member: &SelectStatement,
        params: &[Value],
    ) -> Result<Option<(&'a ShardedTable, String)>, ShardingError> {
        let sharded: Vec<(&TableRef, &'a ShardedTable)> = member
            .tables()
            .filter_map(|t| self.lookup(&t.name).map(|s| (t, s)))
            .collect();
        match sharded.as_slice() {
            [] => Ok(None),
            [(table_ref, table)] => {
                let conditions: Vec<&Expr> =
                    member.filter.iter().chain(member.joins.iter().map(|j| &j.on)).collect();
                let values = key_values(table, &conditions, table_ref.binding(), params)?;
                Ok(Some((*table, table.suffix(&values)?)))
            }
            _ => Err(ShardingError::Unsupported(
                "statement references more than one sharded table".to_string(),
            )),
        }
    }

    fn rewrite_select(
        &self,
        ctx: &mut DispatchContext,
        select: &SelectStatement,
        params: &[Value],
    ) -> Result<Option<(Statement, Vec<Value>, Target)>, ShardingError> {
        let mut resolved: Option<(&'a ShardedTable, String)> = None;
        let mut member = Some(select);
        while let Some(current) = member {
            if let Some((table, suffix)) = self.resolve_member(current, params)? {
                match &resolved {
                    Some((first, _)) if !std::ptr::eq(*first, table) => {
                        return Err(ShardingError::Unsupported(
                            "compound members target different sharded tables".to_string(),
                        ));
                    }
                    Some((_, first)) if *first != suffix => {
                        return Err(ShardingError::DifferentSuffixInBatch { first: first.clone(), second: suffix });
                    }
                    Some(_) => {}
                    None => resolved = Some((table, suffix)),
                }
            }
            member = current.compound.as_ref().map(|c| c.select.as_ref());
        }
        let Some((table, suffix)) = resolved else {
            return Ok(None);
        };
        let target = self.target(ctx, table, suffix)?;

        let mut select = select.clone();
        let mut member = Some(&mut select);
        while let Some(current) = member {
            let refs = std::iter::once(&mut current.from).chain(current.joins.iter_mut().map(|j| &mut j.table));
            let mut qualifiers = Vec::new();
            for table_ref in refs.filter(|t| t.name.matches(table.name())) {
                qualifiers.extend(rename_table_ref(table_ref, &target.physical_table));
            }
            for old in &qualifiers {
                current.walk_exprs_mut(&mut |e| rename_qualifiers(e, old, &target.physical_table));
                rename_wildcards(&mut current.columns, old, &target.physical_table);
            }
            member = current.compound.as_mut().map(|c| c.select.as_mut());
        }
        Ok(Some((Statement::Select(select), params.to_vec(), target)))
    }

    /// Shard of a single-table UPDATE or DELETE, from its own WHERE clause.
    fn resolve_single(
        &self,
        table_ref: &TableRef,
        filter: Option<&Expr>,
        params: &[Value],
    ) -> Result<Option<(&'a ShardedTable, String)>, ShardingError> {
        let Some(table) = self.lookup(&table_ref.name) else {
            return Ok(None);
        };
        let Some(filter) = filter else {
            let key = table.calculator().keys().first().cloned().unwrap_or_default();
            return Err(ShardingError::MissingShardingKey(key));
        };
        let values = key_values(table, &[filter], table_ref.binding(), params)?;
        Ok(Some((table, table.suffix(&values)?)))
    }

    fn rewrite_update(
        &self,
        ctx: &mut DispatchContext,
        update: &UpdateStatement,
        params: &[Value],
    ) -> Result<Option<(Statement, Vec<Value>, Target)>, ShardingError> {
        let Some((table, suffix)) = self.resolve_single(&update.table, update.filter.as_ref(), params)? else {
            return Ok(None);
        };
        let target = self.target(ctx, table, suffix)?;

        let mut update = update.clone();
        let old = rename_table_ref(&mut update.table, &target.physical_table);
        if let Some(old) = &old {
            rename_wildcards(&mut update.returning, old, &target.physical_table);
        }
        let mut statement = Statement::Update(update);
        if let Some(old) = &old {
            statement.walk_exprs_mut(&mut |e| rename_qualifiers(e, old, &target.physical_table));
        }
        Ok(Some((statement, params.to_vec(), target)))
    }

    fn rewrite_delete(
        &self,
        ctx: &mut DispatchContext,
        delete: &DeleteStatement,
        params: &[Value],
    ) -> Result<Option<(Statement, Vec<Value>, Target)>, ShardingError> {
        let Some((table, suffix)) = self.resolve_single(&delete.table, delete.filter.as_ref(), params)? else {
            return Ok(None);
        };
        let target = self.target(ctx, table, suffix)?;

        let mut delete = delete.clone();
        let old = rename_table_ref(&mut delete.table, &target.physical_table);
        if let Some(old) = &old {
            rename_wildcards(&mut delete.returning, old, &target.physical_table);
        }
        let mut statement = Statement::Delete(delete);
        if let Some(old) = &old {
            statement.walk_exprs_mut(&mut |e| rename_qualifiers(e, old, &target.physical_table));
        }
        Ok(Some((statement, params.to_vec(), target)))
    }
}

/// Fills zero or missing primary keys. Bound parameters are replaced in
/// `params` so placeholder numbering is unchanged.
fn inject_ids(
    table: &ShardedTable,
    insert: &mut InsertStatement,
    params: &mut [Value],
) -> Result<(), ShardingError> {
    let pk = table.primary_key();
    match insert.columns.iter().position(|c| c.matches(pk)) {
        None => {
            insert.columns.push(Ident::new(pk));
            for row in &mut insert.rows {
                row.push(Expr::Literal(Value::Unsigned(table.next_id()?)));
            }
        }
        Some(index) => {
            for row in &mut insert.rows {
                match &mut row[index] {
                    Expr::Literal(value) if value.is_zero() => *value = Value::Unsigned(table.next_id()?),
                    Expr::Placeholder(p) => {
                        let slot = params.get_mut(p.index()).ok_or_else(|| {
                            ShardingError::InvalidId(format!("no parameter bound to primary key '{pk}'"))
                        })?;
                        if slot.is_zero() {
                            *slot = Value::Unsigned(table.next_id()?);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
