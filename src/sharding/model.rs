//! Sharding of operations whose rows are already materialized as values.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{ShardingError, Value};

use super::context::DispatchContext;
use super::registry::ShardedTableRegistry;
use super::table::ShardedTable;

/// One field of a model row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub name: &'a str,
    /// Column name when it differs from the field name
    pub column: Option<&'a str>,
    pub value: &'a Value,
}

/// A row the middleware can read sharding keys from and write ids into.
pub trait ShardingModel {
    fn table_name(&self) -> &str;

    fn fields(&self) -> Vec<Field<'_>>;

    /// Sets `column`, adding it if the row has no such field.
    fn set_value(&mut self, column: &str, value: Value);

    /// Field whose name matches `column` case-insensitively, else whose column tag does.
    fn value_of(&self, column: &str) -> Option<Value> {
        let fields = self.fields();
        fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(column))
            .or_else(|| {
                fields
                    .iter()
                    .find(|f| f.column.is_some_and(|c| c.eq_ignore_ascii_case(column)))
            })
            .map(|f| f.value.clone())
    }
}

/// Map-like row: ordered column/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    table: String,
    values: Vec<(String, Value)>,
}

impl Record {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), values: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_value(&column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

impl ShardingModel for Record {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn fields(&self) -> Vec<Field<'_>> {
        self.values
            .iter()
            .map(|(name, value)| Field { name, column: None, value })
            .collect()
    }

    fn set_value(&mut self, column: &str, value: Value) {
        match self.values.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(column)) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((column.to_string(), value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Query,
    Update,
    Delete,
}

/// Where one operation was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub logical_table: String,
    pub physical_table: String,
    pub suffix: String,
}

/// Routes model rows of one sharded table.
pub struct ModelDispatcher<'a> {
    table: &'a ShardedTable,
    registry: &'a ShardedTableRegistry,
}

impl<'a> ModelDispatcher<'a> {
    pub const fn new(table: &'a ShardedTable, registry: &'a ShardedTableRegistry) -> Self {
        Self { table, registry }
    }

    /// Fills zero or missing primary keys of rows about to be inserted.
    pub fn assign_ids<M: ShardingModel>(&self, rows: &mut [M]) -> Result<(), ShardingError> {
        if !self.table.generates_ids() {
            return Ok(());
        }
        let pk = self.table.primary_key();
        for row in rows {
            if row.value_of(pk).is_none_or(|v| v.is_zero()) {
                let id = self.table.next_id()?;
                debug!(table = %self.table.name(), id, "generated primary key");
                row.set_value(pk, Value::Unsigned(id));
            }
        }
        Ok(())
    }

    fn row_suffix<M: ShardingModel>(&self, row: &M) -> Result<String, ShardingError> {
        let values = self.table.key_values(|key| row.value_of(key))?;
        self.table.suffix(&values)
    }

    /// Resolves every row to one shard, creating its table if needed.
    ///
    /// Rows that span shards fail the whole batch before any table is created.
    pub fn dispatch<M: ShardingModel>(
        &self,
        ctx: &mut DispatchContext,
        kind: OperationKind,
        rows: &mut [M],
    ) -> Result<Target, ShardingError> {
        if rows.is_empty() {
            return Err(ShardingError::Unsupported("operation carries no rows".to_string()));
        }
        if kind == OperationKind::Create {
            self.assign_ids(rows)?;
        }

        let mut suffix: Option<String> = None;
        for row in rows.iter() {
            let current = self.row_suffix(row)?;
            match &suffix {
                Some(first) if *first != current => {
                    return Err(ShardingError::DifferentSuffixInBatch { first: first.clone(), second: current });
                }
                Some(_) => {}
                None => suffix = Some(current),
            }
        }
        let suffix = suffix.unwrap_or_default();

        let physical_table = self.registry.ensure_table(ctx, self.table.name(), &suffix)?;
        Ok(Target { logical_table: self.table.name().to_string(), physical_table, suffix })
    }

    /// Splits rows by shard suffix, generating ids first.
    pub fn group_rows_by_shard<M: ShardingModel>(
        &self,
        mut rows: Vec<M>,
    ) -> Result<BTreeMap<String, Vec<M>>, ShardingError> {
        self.assign_ids(&mut rows)?;
        let mut groups: BTreeMap<String, Vec<M>> = BTreeMap::new();
        for row in rows {
            let suffix = self.row_suffix(&row)?;
            groups.entry(suffix).or_default().push(row);
        }
        Ok(groups)
    }
}
