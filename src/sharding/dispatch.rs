//! Single entry point of the middleware.
//!
//! Each operation takes exactly one path: rows already bound to the
//! operation go through [`ModelDispatcher`], free-form SQL through
//! [`StatementRewriter`]. Statements the middleware does not understand pass
//! through untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{PrimaryKeyGeneratorKind, ShardingConfig, ShardingError, ShardingSettings, TableSchema, Value};

use super::context::{DispatchContext, DispatchState};
use super::expression::ExpressionEvaluator;
use super::id::{IdGenerator, SequenceGenerator};
use super::model::{ModelDispatcher, OperationKind, Record, ShardingModel, Target};
use super::registry::{Migrator, ShardedTableRegistry};
use super::rewriter::StatementRewriter;
use super::suffix::SuffixCalculator;
use super::table::ShardedTable;

/// What the ORM pipeline hands the middleware for one operation.
#[derive(Debug)]
pub enum Operation<'a, M = Record> {
    /// Rows bound to the operation (insert values or the model a query was built from)
    Model { kind: OperationKind, rows: &'a mut [M] },
    /// Raw SQL text with its bound parameters
    Sql { sql: &'a str, params: &'a [Value] },
}

impl<'a> Operation<'a> {
    pub const fn sql(sql: &'a str, params: &'a [Value]) -> Self {
        Self::Sql { sql, params }
    }
}

impl<'a, M> Operation<'a, M> {
    pub const fn model(kind: OperationKind, rows: &'a mut [M]) -> Self {
        Self::Model { kind, rows }
    }
}

/// Result of intercepting one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute the statement unchanged
    Bypassed,
    /// Execute against `target.physical_table`; for SQL, run `sql` with `params`
    Rewritten {
        target: Target,
        sql: Option<String>,
        params: Option<Vec<Value>>,
    },
}

impl Decision {
    pub const fn target(&self) -> Option<&Target> {
        match self {
            Self::Bypassed => None,
            Self::Rewritten { target, .. } => Some(target),
        }
    }
}

/// Hook the ORM operation pipeline calls once per operation.
pub trait Intercept {
    fn intercept<M: ShardingModel>(
        &self,
        ctx: &mut DispatchContext,
        op: Operation<'_, M>,
    ) -> Result<Decision, ShardingError>;
}

/// Sharding middleware for a fixed set of logical tables.
#[derive(Debug)]
pub struct ShardingPlugin {
    tables: Vec<ShardedTable>,
    registry: ShardedTableRegistry,
}

impl ShardingPlugin {
    pub fn builder() -> ShardingPluginBuilder {
        ShardingPluginBuilder::default()
    }

    pub fn tables(&self) -> &[ShardedTable] {
        &self.tables
    }

    pub fn table(&self, logical_table: &str) -> Option<&ShardedTable> {
        self.tables.iter().find(|t| t.matches(logical_table))
    }

    pub const fn registry(&self) -> &ShardedTableRegistry {
        &self.registry
    }

    fn require(&self, logical_table: &str) -> Result<&ShardedTable, ShardingError> {
        self.table(logical_table)
            .ok_or_else(|| ShardingError::Unsupported(format!("table '{logical_table}' is not sharded")))
    }

    /// Every physical table of `logical_table`, named the way dispatch names them.
    pub fn physical_tables(&self, logical_table: &str) -> Result<Vec<String>, ShardingError> {
        let table = self.require(logical_table)?;
        Ok(ShardedTableRegistry::physical_tables(table.calculator()))
    }

    /// Creates every shard table of `logical_table` up front.
    pub fn migrate_all(&self, ctx: &mut DispatchContext, logical_table: &str) -> Result<Vec<String>, ShardingError> {
        let table = self.require(logical_table)?;
        self.registry.migrate_all(ctx, table.calculator())
    }

    /// Partitions rows of one sharded table by suffix so each group can be
    /// written as a single-shard batch. Missing ids are generated first.
    pub fn group_rows_by_shard<M: ShardingModel>(
        &self,
        rows: Vec<M>,
    ) -> Result<BTreeMap<String, Vec<M>>, ShardingError> {
        let Some(first) = rows.first() else {
            return Ok(BTreeMap::new());
        };
        let table = self.require(first.table_name())?;
        ModelDispatcher::new(table, &self.registry).group_rows_by_shard(rows)
    }

    fn dispatch_model<M: ShardingModel>(
        &self,
        ctx: &mut DispatchContext,
        kind: OperationKind,
        rows: &mut [M],
    ) -> Result<Decision, ShardingError> {
        let Some(table) = rows.first().and_then(|row| self.table(row.table_name())) else {
            return Ok(Decision::Bypassed);
        };
        let target = ModelDispatcher::new(table, &self.registry).dispatch(ctx, kind, rows)?;
        Ok(Decision::Rewritten { target, sql: None, params: None })
    }

    fn dispatch_sql(&self, ctx: &mut DispatchContext, sql: &str, params: &[Value]) -> Result<Decision, ShardingError> {
        let rewriter = StatementRewriter::new(&self.tables, &self.registry);
        Ok(match rewriter.rewrite(ctx, sql, params)? {
            Some(rewrite) => Decision::Rewritten {
                target: rewrite.target,
                sql: Some(rewrite.sql),
                params: Some(rewrite.params),
            },
            None => Decision::Bypassed,
        })
    }
}

impl Intercept for ShardingPlugin {
    fn intercept<M: ShardingModel>(
        &self,
        ctx: &mut DispatchContext,
        op: Operation<'_, M>,
    ) -> Result<Decision, ShardingError> {
        if ctx.ignore_sharding() {
            debug!("sharding ignored for this operation");
            ctx.set_state(DispatchState::Bypassed);
            return Ok(Decision::Bypassed);
        }

        let result = match op {
            Operation::Model { kind, rows } => {
                ctx.set_state(DispatchState::ModelPath);
                self.dispatch_model(ctx, kind, rows)
            }
            Operation::Sql { sql, params } => {
                ctx.set_state(DispatchState::SqlPath);
                self.dispatch_sql(ctx, sql, params)
            }
        };

        match result {
            Ok(Decision::Bypassed) => {
                debug!(path = ?ctx.state(), "no sharded table involved");
                ctx.set_state(DispatchState::Bypassed);
                Ok(Decision::Bypassed)
            }
            Ok(decision) => {
                if let Some(target) = decision.target() {
                    debug!(
                        table = %target.physical_table,
                        suffix = %target.suffix,
                        path = ?ctx.state(),
                        "operation routed to shard"
                    );
                    ctx.set_target(target.physical_table.clone(), target.suffix.clone());
                }
                ctx.set_state(DispatchState::Rewritten);
                Ok(decision)
            }
            Err(e) if e.is_bypass() => {
                debug!(reason = %e, "statement passed through unsharded");
                ctx.set_state(DispatchState::Bypassed);
                Ok(Decision::Bypassed)
            }
            Err(e) => {
                warn!(error = %e, path = ?ctx.state(), "sharding failed");
                ctx.set_state(DispatchState::Failed);
                Err(e)
            }
        }
    }
}

/// Wires configuration and collaborators into a [`ShardingPlugin`].
#[derive(Default)]
pub struct ShardingPluginBuilder {
    configs: Vec<ShardingConfig>,
    schemas: Vec<TableSchema>,
    evaluators: HashMap<String, Arc<dyn ExpressionEvaluator>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    migrator: Option<Arc<dyn Migrator>>,
}

impl ShardingPluginBuilder {
    #[must_use]
    pub fn table(mut self, config: ShardingConfig) -> Self {
        self.configs.push(config);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: ShardingSettings) -> Self {
        self.configs.extend(settings.tables);
        self
    }

    /// Schema for on-demand creation; overrides columns from the config.
    #[must_use]
    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Evaluator for a table using the expression strategy.
    #[must_use]
    pub fn expression_evaluator(mut self, table: &str, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluators.insert(table.to_lowercase(), evaluator);
        self
    }

    /// Generator for tables configured with `primary_key_generator = "external"`.
    #[must_use]
    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    #[must_use]
    pub fn migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    pub fn build(self) -> Result<ShardingPlugin, ShardingError> {
        ShardingSettings { tables: self.configs.clone() }.validate()?;

        let sequence: Arc<dyn IdGenerator> = Arc::new(SequenceGenerator::new());
        let mut registry = ShardedTableRegistry::new(self.migrator);
        let mut tables = Vec::with_capacity(self.configs.len());

        for config in self.configs {
            let calculator = match self.evaluators.get(&config.table.to_lowercase()) {
                Some(evaluator) => SuffixCalculator::with_evaluator(&config, Arc::clone(evaluator))?,
                None => SuffixCalculator::new(&config)?,
            };
            let generator = match config.primary_key_generator {
                PrimaryKeyGeneratorKind::None => None,
                PrimaryKeyGeneratorKind::Sequence => Some(Arc::clone(&sequence)),
                PrimaryKeyGeneratorKind::External => self.id_generator.clone(),
            };
            if let Some(schema) = config.schema()? {
                registry.register_schema(schema);
            }
            info!(table = %config.table, keys = ?config.sharding_keys, "sharding enabled");
            tables.push(ShardedTable::new(config, calculator, generator));
        }
        for schema in self.schemas {
            registry.register_schema(schema);
        }

        Ok(ShardingPlugin { tables, registry })
    }
}
