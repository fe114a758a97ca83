use std::sync::Arc;

use crate::core::{PrimaryKeyGeneratorKind, ShardingConfig, ShardingError, Value};

use super::id::IdGenerator;
use super::suffix::SuffixCalculator;

/// One configured logical table: its rules, calculator and id source.
pub struct ShardedTable {
    config: ShardingConfig,
    calculator: SuffixCalculator,
    generator: Option<Arc<dyn IdGenerator>>,
}

impl std::fmt::Debug for ShardedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedTable")
            .field("config", &self.config)
            .field("calculator", &self.calculator)
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

impl ShardedTable {
    pub const fn new(
        config: ShardingConfig,
        calculator: SuffixCalculator,
        generator: Option<Arc<dyn IdGenerator>>,
    ) -> Self {
        Self { config, calculator, generator }
    }

    pub fn name(&self) -> &str {
        &self.config.table
    }

    pub fn matches(&self, table: &str) -> bool {
        self.config.table.eq_ignore_ascii_case(table)
    }

    pub const fn config(&self) -> &ShardingConfig {
        &self.config
    }

    pub const fn calculator(&self) -> &SuffixCalculator {
        &self.calculator
    }

    pub fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    /// Inserts fill missing or zero primary keys from the generator.
    pub const fn generates_ids(&self) -> bool {
        self.config.has_generator()
    }

    pub fn next_id(&self) -> Result<u64, ShardingError> {
        let generator = match (&self.generator, self.config.primary_key_generator) {
            (Some(generator), kind) if kind != PrimaryKeyGeneratorKind::None => generator,
            _ => return Err(ShardingError::IdGeneratorUnavailable(self.config.table.clone())),
        };
        let id = generator
            .next_id(&self.config.table)
            .map_err(|source| ShardingError::IdGeneration { source })?;
        if id == 0 {
            return Err(ShardingError::InvalidId(format!(
                "generator returned 0 for table '{}'",
                self.config.table
            )));
        }
        Ok(id)
    }

    /// Key values in declaration order, looked up by column name.
    pub fn key_values<F>(&self, mut lookup: F) -> Result<Vec<Value>, ShardingError>
    where
        F: FnMut(&str) -> Option<Value>,
    {
        self.config
            .sharding_keys
            .iter()
            .map(|key| {
                let value = lookup(key.as_str()).ok_or_else(|| ShardingError::MissingShardingKey(key.clone()))?;
                if key.eq_ignore_ascii_case(&self.config.primary_key) && value.is_zero() {
                    return Err(ShardingError::InvalidId(format!(
                        "primary key '{key}' of table '{}' is {value}",
                        self.config.table
                    )));
                }
                Ok(value)
            })
            .collect()
    }

    pub fn suffix(&self, values: &[Value]) -> Result<String, ShardingError> {
        self.calculator.suffix(values)
    }
}
