use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::core::{BoxError, ShardingError, TableSchema};

use super::context::DispatchContext;
use super::suffix::SuffixCalculator;

/// Creates one physical shard table from the logical table's schema.
///
/// `migrate` runs while the registry holds its write lock. It must not call
/// back into the same [`ShardedTableRegistry`] (`ensure_table`, `is_created`,
/// `invalidate`, `migrate_all`): the lock is not reentrant and the call
/// deadlocks. Statements it issues through `ctx` are already marked to skip
/// sharding.
pub trait Migrator: Send + Sync {
    fn migrate(&self, ctx: &mut DispatchContext, schema: &TableSchema, physical_table: &str) -> Result<(), BoxError>;
}

/// [`Migrator`] that renders `CREATE TABLE IF NOT EXISTS` and hands it to an executor.
pub struct SqlMigrator<F> {
    execute: F,
}

impl<F> SqlMigrator<F>
where
    F: Fn(&mut DispatchContext, &str) -> Result<(), BoxError> + Send + Sync,
{
    pub const fn new(execute: F) -> Self {
        Self { execute }
    }
}

impl<F> Migrator for SqlMigrator<F>
where
    F: Fn(&mut DispatchContext, &str) -> Result<(), BoxError> + Send + Sync,
{
    fn migrate(&self, ctx: &mut DispatchContext, schema: &TableSchema, physical_table: &str) -> Result<(), BoxError> {
        let sql = schema.create_table_sql(physical_table);
        debug!(table = %physical_table, %sql, "creating shard table");
        (self.execute)(ctx, &sql)
    }
}

/// Tracks which physical shard tables exist and creates missing ones.
///
/// Creation is serialized by one lock for the whole registry; lookups of
/// already-created tables only take the read lock.
pub struct ShardedTableRegistry {
    created: RwLock<HashSet<String>>,
    schemas: HashMap<String, TableSchema>,
    migrator: Option<Arc<dyn Migrator>>,
}

impl std::fmt::Debug for ShardedTableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedTableRegistry")
            .field("created", &*self.created.read())
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("migrator", &self.migrator.is_some())
            .finish()
    }
}

impl ShardedTableRegistry {
    /// Without a migrator the registry only records names; tables are managed elsewhere.
    pub fn new(migrator: Option<Arc<dyn Migrator>>) -> Self {
        Self { created: RwLock::new(HashSet::new()), schemas: HashMap::new(), migrator }
    }

    pub fn register_schema(&mut self, schema: TableSchema) {
        self.schemas.insert(schema.table.to_lowercase(), schema);
    }

    pub fn schema(&self, logical_table: &str) -> Option<&TableSchema> {
        self.schemas.get(&logical_table.to_lowercase())
    }

    pub fn is_created(&self, physical_table: &str) -> bool {
        self.created.read().contains(physical_table)
    }

    /// Forgets a table after it was dropped, so the next use re-creates it.
    pub fn invalidate(&self, physical_table: &str) -> bool {
        self.created.write().remove(physical_table)
    }

    /// Makes sure `<logical><suffix>` exists and returns its name.
    pub fn ensure_table(
        &self,
        ctx: &mut DispatchContext,
        logical_table: &str,
        suffix: &str,
    ) -> Result<String, ShardingError> {
        let physical = format!("{logical_table}{suffix}");
        if self.created.read().contains(&physical) {
            return Ok(physical);
        }

        let mut created = self.created.write();
        if created.contains(&physical) {
            return Ok(physical);
        }

        if let Some(migrator) = &self.migrator {
            let schema = self
                .schema(logical_table)
                .ok_or_else(|| ShardingError::ShardingModelUnavailable(logical_table.to_string()))?;
            ctx.with_ignore(|ctx| migrator.migrate(ctx, schema, &physical))
                .map_err(|source| {
                    warn!(table = %physical, error = %source, "shard table migration failed");
                    ShardingError::Migration { table: physical.clone(), source }
                })?;
            info!(table = %physical, logical = %logical_table, "created shard table");
        }

        created.insert(physical.clone());
        Ok(physical)
    }

    /// Every physical table name of a logical table, in shard order.
    pub fn physical_tables(calculator: &SuffixCalculator) -> Vec<String> {
        calculator
            .suffixes()
            .into_iter()
            .map(|suffix| format!("{}{suffix}", calculator.table()))
            .collect()
    }

    /// Creates every shard of the calculator's table up front.
    pub fn migrate_all(
        &self,
        ctx: &mut DispatchContext,
        calculator: &SuffixCalculator,
    ) -> Result<Vec<String>, ShardingError> {
        calculator
            .suffixes()
            .iter()
            .map(|suffix| self.ensure_table(ctx, calculator.table(), suffix))
            .collect()
    }
}
