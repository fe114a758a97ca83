use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::schema::{ColumnDef, TableSchema};

/// Upper bound (exclusive) on `number_of_shards`.
pub const MAX_SHARDS: u32 = 100_000;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/tableshard/tableshard.toml", "./tableshard.toml"];

fn default_primary_key() -> String { "id".to_string() }
fn default_nullable() -> bool { true }

/// Where primary keys for inserted rows come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyGeneratorKind {
    /// Callers always supply ids
    #[default]
    None,
    /// Built-in process-local sequence
    Sequence,
    /// Generator injected when the middleware is built
    External,
}

/// Column of the shard table schema, as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

/// Sharding rules for one logical table. Immutable once the middleware is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub table: String,
    pub sharding_keys: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub raw_value: bool,
    #[serde(default)]
    pub number_of_shards: Option<u32>,
    /// Every allowed raw value; one shard table per entry
    #[serde(default)]
    pub partitions: Vec<String>,
    #[serde(default)]
    pub suffix_format: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub primary_key_generator: PrimaryKeyGeneratorKind,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl ShardingConfig {
    pub fn new<S: Into<String>>(table: impl Into<String>, sharding_keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            table: table.into(),
            sharding_keys: sharding_keys.into_iter().map(Into::into).collect(),
            expression: None,
            raw_value: false,
            number_of_shards: None,
            partitions: Vec::new(),
            suffix_format: None,
            primary_key: default_primary_key(),
            primary_key_generator: PrimaryKeyGeneratorKind::None,
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_shards(mut self, number_of_shards: u32) -> Self {
        self.number_of_shards = Some(number_of_shards);
        self
    }

    #[must_use]
    pub fn with_partitions<S: Into<String>>(mut self, partitions: impl IntoIterator<Item = S>) -> Self {
        self.raw_value = true;
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn with_suffix_format(mut self, format: impl Into<String>) -> Self {
        self.suffix_format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    #[must_use]
    pub const fn with_generator(mut self, kind: PrimaryKeyGeneratorKind) -> Self {
        self.primary_key_generator = kind;
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnConfig>) -> Self {
        self.columns = columns;
        self
    }

    pub fn is_sharding_key(&self, column: &str) -> bool {
        self.sharding_keys.iter().any(|k| k.eq_ignore_ascii_case(column))
    }

    /// The primary key takes part in the shard checksum.
    pub fn is_primary_key_sharded(&self) -> bool {
        self.is_sharding_key(&self.primary_key)
    }

    pub const fn has_generator(&self) -> bool {
        !matches!(self.primary_key_generator, PrimaryKeyGeneratorKind::None)
    }

    /// Checks that exactly one strategy is active and its inputs are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = &self.table;
        if self.sharding_keys.is_empty() || self.sharding_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::MissingShardingKeys(table.clone()));
        }

        match (self.raw_value, self.number_of_shards) {
            (true, Some(_)) => return Err(ConfigError::ConflictingStrategies(table.clone())),
            (false, None) => return Err(ConfigError::NoStrategy(table.clone())),
            (false, Some(n)) => {
                if n == 0 || n >= MAX_SHARDS {
                    return Err(ConfigError::InvalidShardCount { table: table.clone(), value: n });
                }
            }
            (true, None) => {
                if self.partitions.is_empty() {
                    return Err(ConfigError::MissingPartitions(table.clone()));
                }
                let mut seen = HashSet::new();
                for partition in &self.partitions {
                    let valid = !partition.is_empty()
                        && partition.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
                    if !valid || !seen.insert(partition.as_str()) {
                        return Err(ConfigError::InvalidPartition {
                            table: table.clone(),
                            partition: partition.clone(),
                        });
                    }
                }
            }
        }

        if self.expression.is_some() && self.number_of_shards.is_none() {
            return Err(ConfigError::ExpressionWithoutShards(table.clone()));
        }

        self.suffix_format()?;
        self.schema()?;
        Ok(())
    }

    /// Suffix format for this table's strategy, defaulting by shard count.
    pub fn suffix_format(&self) -> Result<SuffixFormat, ConfigError> {
        let format = match &self.suffix_format {
            Some(custom) => SuffixFormat::parse(custom)?,
            None if self.raw_value => SuffixFormat::raw_default(),
            None => SuffixFormat::numeric_default(self.number_of_shards.unwrap_or(1)),
        };
        if format.is_numeric() == self.raw_value {
            return Err(ConfigError::InvalidSuffixFormat {
                format: format.to_string(),
                reason: if self.raw_value {
                    "raw_value mode needs a %s verb".to_string()
                } else {
                    "numeric strategies need a %d verb".to_string()
                },
            });
        }
        Ok(format)
    }

    /// Shard table schema, when columns are configured.
    pub fn schema(&self) -> Result<Option<TableSchema>, ConfigError> {
        if self.columns.is_empty() {
            return Ok(None);
        }
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let data_type = crate::parser::parse_data_type(&c.data_type).ok_or_else(|| {
                    ConfigError::InvalidColumnType {
                        table: self.table.clone(),
                        data_type: c.data_type.clone(),
                    }
                })?;
                Ok(ColumnDef {
                    name: c.name.clone(),
                    data_type,
                    nullable: c.nullable && !c.primary_key,
                    primary_key: c.primary_key,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Some(TableSchema::new(self.table.clone(), columns)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatVerb {
    Number { width: usize },
    Text,
}

/// printf-style suffix template: `_%02d`, `_%d`, `_%s`, `p%04d_x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixFormat {
    prefix: String,
    verb: FormatVerb,
    postfix: String,
}

impl SuffixFormat {
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSuffixFormat {
            format: format.to_string(),
            reason: reason.to_string(),
        };

        let start = format.find('%').ok_or_else(|| invalid("missing % verb"))?;
        let prefix = &format[..start];
        let rest = &format[start + 1..];
        let verb_end = rest
            .find(|c: char| c == 'd' || c == 's')
            .ok_or_else(|| invalid("expected %d, %0Nd or %s"))?;
        let flags = &rest[..verb_end];
        let postfix = &rest[verb_end + 1..];
        if postfix.contains('%') || prefix.contains('%') {
            return Err(invalid("only one verb is allowed"));
        }

        let verb = if rest.as_bytes()[verb_end] == b's' {
            if !flags.is_empty() {
                return Err(invalid("%s takes no width"));
            }
            FormatVerb::Text
        } else if flags.is_empty() {
            FormatVerb::Number { width: 0 }
        } else {
            let digits = flags.strip_prefix('0').ok_or_else(|| invalid("width must be zero padded"))?;
            let width = digits.parse::<usize>().map_err(|_| invalid("bad width"))?;
            if width == 0 || width > 9 {
                return Err(invalid("width must be between 1 and 9"));
            }
            FormatVerb::Number { width }
        };

        Ok(Self { prefix: prefix.to_string(), verb, postfix: postfix.to_string() })
    }

    /// `_%0Nd` with N sized to the shard count.
    #[must_use]
    pub fn numeric_default(number_of_shards: u32) -> Self {
        let width = match number_of_shards {
            0..=9 => 1,
            10..=99 => 2,
            100..=999 => 3,
            1000..=9999 => 4,
            _ => 5,
        };
        Self { prefix: "_".to_string(), verb: FormatVerb::Number { width }, postfix: String::new() }
    }

    #[must_use]
    pub fn raw_default() -> Self {
        Self { prefix: "_".to_string(), verb: FormatVerb::Text, postfix: String::new() }
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self.verb, FormatVerb::Number { .. })
    }

    pub fn format_index(&self, index: u64) -> String {
        let body = match self.verb {
            FormatVerb::Number { width } => format!("{index:0width$}"),
            FormatVerb::Text => index.to_string(),
        };
        format!("{}{body}{}", self.prefix, self.postfix)
    }

    pub fn format_text(&self, value: &str) -> String {
        format!("{}{value}{}", self.prefix, self.postfix)
    }
}

impl std::fmt::Display for SuffixFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.verb {
            FormatVerb::Number { width: 0 } => write!(f, "{}%d{}", self.prefix, self.postfix),
            FormatVerb::Number { width } => write!(f, "{}%0{width}d{}", self.prefix, self.postfix),
            FormatVerb::Text => write!(f, "{}%s{}", self.prefix, self.postfix),
        }
    }
}

/// All sharded tables served by one middleware instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingSettings {
    #[serde(default)]
    pub tables: Vec<ShardingConfig>,
}

impl ShardingSettings {
    /// Load settings with priority: ENV (`TABLESHARD__*`) > config file.
    ///
    /// Without an explicit path the first existing default location is used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            for candidate in &DEFAULT_CONFIG_PATHS {
                if Path::new(candidate).exists() {
                    builder = builder.add_source(File::with_name(candidate));
                    tracing::debug!(path = candidate, "loaded sharding configuration");
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TABLESHARD")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.table.to_lowercase()) {
                return Err(ConfigError::DuplicateTable(table.table.clone()));
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&ShardingConfig> {
        self.tables.iter().find(|t| t.table.eq_ignore_ascii_case(name))
    }
}
