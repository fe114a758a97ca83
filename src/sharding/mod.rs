// Module declarations
pub mod expression;
pub mod suffix;
pub mod id;
pub mod context;
pub mod table;
pub mod registry;
pub mod model;
pub mod conditions;
pub mod rewriter;
pub mod dispatch;

// Re-exports for convenience
pub use context::{DispatchContext, DispatchState, IgnoreGuard};
pub use dispatch::{Decision, Intercept, Operation, ShardingPlugin, ShardingPluginBuilder};
pub use expression::{ArithmeticExpression, ExpressionEvaluator};
pub use id::{IdGenerator, SequenceGenerator};
pub use model::{Field, ModelDispatcher, OperationKind, Record, ShardingModel, Target};
pub use registry::{Migrator, ShardedTableRegistry, SqlMigrator};
pub use rewriter::{has_nosharding_hint, Rewrite, StatementRewriter};
pub use suffix::SuffixCalculator;
pub use table::ShardedTable;
