// tableshard - horizontal table-sharding middleware
// Routes statements against logical tables to suffixed physical shards

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::wildcard_enum_match_arm)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::type_complexity)]

// Values, schemas, configuration and errors
pub mod core;

// SQL statement tree: parser and re-serialization
pub mod parser;

// Suffix calculation, table registry, model and SQL dispatch
pub mod sharding;

// Re-export commonly used types for convenience
pub use crate::core::{ShardingConfig, ShardingError, ShardingSettings, TableSchema, Value};
pub use crate::parser::{Statement, parse_statement};
pub use crate::sharding::{
    Decision, DispatchContext, Intercept, Operation, OperationKind, Record, ShardingModel, ShardingPlugin,
    SuffixCalculator,
};
