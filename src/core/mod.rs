// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod schema;
pub mod config;

// Re-exports for convenience
pub use error::{BoxError, ConfigError, ShardingError};
pub use value::Value;
pub use data_type::DataType;
pub use schema::{ColumnDef, TableSchema};
pub use config::{
    ColumnConfig, PrimaryKeyGeneratorKind, ShardingConfig, ShardingSettings, SuffixFormat, MAX_SHARDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(3.14).to_string(), "3.14");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_value_sql_literal() {
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::Integer(-7).to_sql_literal(), "-7");
        assert_eq!(Value::Real(2.0).to_sql_literal(), "2.0");
        assert_eq!(Value::Text("O'Brien".to_string()).to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::Boolean(false).to_sql_literal(), "FALSE");
    }

    #[test]
    fn test_value_is_zero() {
        assert!(Value::Null.is_zero());
        assert!(Value::Integer(0).is_zero());
        assert!(Value::Unsigned(0).is_zero());
        assert!(Value::Text("0".to_string()).is_zero());
        assert!(!Value::Integer(3).is_zero());
        assert!(!Value::Text("abc".to_string()).is_zero());
    }

    #[test]
    fn test_value_as_int() {
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Text("hello".to_string()).as_int(), None);
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Varchar { max_length: 32 }.to_string(), "VARCHAR(32)");
        assert_eq!(DataType::Numeric { precision: 10, scale: 2 }.to_string(), "NUMERIC(10, 2)");
        assert_eq!(DataType::Custom("mood".to_string()).to_string(), "mood");
    }
}
