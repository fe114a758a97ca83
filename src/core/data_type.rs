use serde::{Deserialize, Serialize};

/// Column type of a shard table, as rendered into `CREATE TABLE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    // Numeric types
    SmallInt,
    Integer,
    BigInt,
    Real,
    Numeric { precision: u8, scale: u8 }, // NUMERIC(p, s)
    Serial,       // Auto-incrementing INTEGER
    BigSerial,    // Auto-incrementing BIGINT
    // String types
    Text,
    Varchar { max_length: usize },  // VARCHAR(n)
    Char { length: usize },         // CHAR(n)
    // Boolean
    Boolean,
    // Date/Time types
    Date,
    Timestamp,
    TimestampTz,
    // Special types
    Uuid,
    Json,
    Jsonb,
    Bytea,
    /// Any type name the parser does not know (enums, domains)
    Custom(String),
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SmallInt => write!(f, "SMALLINT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::BigInt => write!(f, "BIGINT"),
            Self::Real => write!(f, "REAL"),
            Self::Numeric { precision, scale } => write!(f, "NUMERIC({precision}, {scale})"),
            Self::Serial => write!(f, "SERIAL"),
            Self::BigSerial => write!(f, "BIGSERIAL"),
            Self::Text => write!(f, "TEXT"),
            Self::Varchar { max_length } => write!(f, "VARCHAR({max_length})"),
            Self::Char { length } => write!(f, "CHAR({length})"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::TimestampTz => write!(f, "TIMESTAMPTZ"),
            Self::Uuid => write!(f, "UUID"),
            Self::Json => write!(f, "JSON"),
            Self::Jsonb => write!(f, "JSONB"),
            Self::Bytea => write!(f, "BYTEA"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}
