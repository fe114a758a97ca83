use thiserror::Error;

/// Boxed error returned by injected collaborators (id generators, migrators).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ShardingError {
    #[error("Sharding key '{0}' is missing or not compared with equality")]
    MissingShardingKey(String),
    #[error("Statement spans different shards ('{first}' and '{second}')")]
    DifferentSuffixInBatch { first: String, second: String },
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("No table schema registered for sharded table '{0}'")]
    ShardingModelUnavailable(String),
    #[error("No primary key generator available for table '{0}'")]
    IdGeneratorUnavailable(String),
    #[error("Column count {columns} does not match value count {values}")]
    ColumnExpressionCountMismatch { columns: usize, values: usize },
    #[error("Unsupported statement: {0}")]
    Unsupported(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid sharding key value: {0}")]
    InvalidShardingKey(String),
    #[error("Expression error: {0}")]
    Expression(String),
    #[error("Id generator failed: {source}")]
    IdGeneration {
        #[source]
        source: BoxError,
    },
    #[error("Migration of table '{table}' failed: {source}")]
    Migration {
        table: String,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ShardingError {
    /// Errors that mean "not a shape this middleware handles": the statement
    /// passes through untouched instead of failing.
    #[must_use]
    pub const fn is_bypass(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::ParseError(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Table '{table}': number_of_shards must be between 1 and 99999, got {value}")]
    InvalidShardCount { table: String, value: u32 },
    #[error("Table '{0}': at least one sharding key is required")]
    MissingShardingKeys(String),
    #[error("Table '{0}': set either number_of_shards or raw_value with partitions, not both")]
    ConflictingStrategies(String),
    #[error("Table '{0}': no sharding strategy configured")]
    NoStrategy(String),
    #[error("Table '{0}': raw_value mode requires a non-empty partitions list")]
    MissingPartitions(String),
    #[error("Table '{table}': invalid partition '{partition}'")]
    InvalidPartition { table: String, partition: String },
    #[error("Table '{0}': an expression requires number_of_shards")]
    ExpressionWithoutShards(String),
    #[error("Table '{table}': invalid expression: {reason}")]
    InvalidExpression { table: String, reason: String },
    #[error("Invalid suffix format '{format}': {reason}")]
    InvalidSuffixFormat { format: String, reason: String },
    #[error("Table '{table}': invalid column type '{data_type}'")]
    InvalidColumnType { table: String, data_type: String },
    #[error("Table '{0}' is configured more than once")]
    DuplicateTable(String),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
