use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::core::{ConfigError, ShardingConfig, ShardingError, SuffixFormat, Value};

use super::expression::{ArithmeticExpression, ExpressionEvaluator};

enum Strategy {
    /// Values joined with `_` and used verbatim; only listed partitions are accepted
    RawValue { partitions: Vec<String> },
    Expression { evaluator: Arc<dyn ExpressionEvaluator>, shards: u32 },
    Checksum { shards: u32 },
}

/// Maps sharding-key values to a shard suffix for one logical table.
pub struct SuffixCalculator {
    table: String,
    keys: Vec<String>,
    strategy: Strategy,
    format: SuffixFormat,
}

impl std::fmt::Debug for SuffixCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let strategy = match &self.strategy {
            Strategy::RawValue { .. } => "raw_value",
            Strategy::Expression { .. } => "expression",
            Strategy::Checksum { .. } => "checksum",
        };
        f.debug_struct("SuffixCalculator")
            .field("table", &self.table)
            .field("keys", &self.keys)
            .field("strategy", &strategy)
            .field("format", &self.format.to_string())
            .finish()
    }
}

impl SuffixCalculator {
    /// Builds the calculator, compiling `expression` with the built-in evaluator.
    pub fn new(config: &ShardingConfig) -> Result<Self, ConfigError> {
        let evaluator = match &config.expression {
            Some(source) => {
                let expr = ArithmeticExpression::parse(source).map_err(|e| ConfigError::InvalidExpression {
                    table: config.table.clone(),
                    reason: e.to_string(),
                })?;
                if let Some(unknown) = expr.variables().into_iter().find(|v| !config.is_sharding_key(v)) {
                    return Err(ConfigError::InvalidExpression {
                        table: config.table.clone(),
                        reason: format!("'{unknown}' is not a sharding key"),
                    });
                }
                Some(Arc::new(expr) as Arc<dyn ExpressionEvaluator>)
            }
            None => None,
        };
        Self::build(config, evaluator)
    }

    /// Builds an expression-strategy calculator around an injected evaluator.
    pub fn with_evaluator(config: &ShardingConfig, evaluator: Arc<dyn ExpressionEvaluator>) -> Result<Self, ConfigError> {
        if config.number_of_shards.is_none() {
            return Err(ConfigError::ExpressionWithoutShards(config.table.clone()));
        }
        Self::build(config, Some(evaluator))
    }

    fn build(config: &ShardingConfig, evaluator: Option<Arc<dyn ExpressionEvaluator>>) -> Result<Self, ConfigError> {
        config.validate()?;
        let strategy = match (config.number_of_shards, evaluator) {
            (Some(shards), Some(evaluator)) => Strategy::Expression { evaluator, shards },
            (Some(shards), None) => Strategy::Checksum { shards },
            (None, _) => Strategy::RawValue { partitions: config.partitions.clone() },
        };
        Ok(Self {
            table: config.table.clone(),
            keys: config.sharding_keys.clone(),
            strategy,
            format: config.suffix_format()?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Suffix for one row's key values, given in key-declaration order.
    pub fn suffix(&self, values: &[Value]) -> Result<String, ShardingError> {
        if values.len() != self.keys.len() {
            let missing = self.keys.get(values.len()).unwrap_or(&self.table);
            return Err(ShardingError::MissingShardingKey(missing.clone()));
        }

        match &self.strategy {
            Strategy::RawValue { partitions } => {
                let joined = values
                    .iter()
                    .map(raw_text)
                    .collect::<Result<Vec<_>, _>>()?
                    .join("_");
                if !partitions.iter().any(|p| *p == joined) {
                    return Err(ShardingError::InvalidShardingKey(format!(
                        "'{joined}' is not a partition of table '{}'",
                        self.table
                    )));
                }
                Ok(self.format.format_text(&joined))
            }
            Strategy::Expression { evaluator, shards } => {
                let params: HashMap<String, Value> =
                    self.keys.iter().cloned().zip(values.iter().cloned()).collect();
                let result = evaluator.evaluate(&params)?;
                let index = bucket(&result, *shards)?;
                Ok(self.format.format_index(index))
            }
            Strategy::Checksum { shards } => {
                let mut bytes = Vec::new();
                for (key, value) in self.keys.iter().zip(values) {
                    if value.is_null() {
                        return Err(ShardingError::MissingShardingKey(key.clone()));
                    }
                    normalize(value, &mut bytes);
                }
                let index = crc32fast::hash(&bytes) % *shards;
                Ok(self.format.format_index(u64::from(index)))
            }
        }
    }

    /// Every suffix this calculator can produce, in shard order.
    pub fn suffixes(&self) -> Vec<String> {
        match &self.strategy {
            Strategy::RawValue { partitions } => partitions.iter().map(|p| self.format.format_text(p)).collect(),
            Strategy::Expression { shards, .. } | Strategy::Checksum { shards } => {
                (0..u64::from(*shards)).map(|i| self.format.format_index(i)).collect()
            }
        }
    }
}

/// `floor(result) mod shards`, always non-negative.
fn bucket(result: &Value, shards: u32) -> Result<u64, ShardingError> {
    let shards = i64::from(shards);
    let index = match result {
        Value::Integer(i) => i.rem_euclid(shards),
        Value::Unsigned(u) => (*u % shards.unsigned_abs()) as i64,
        other => {
            let f = other
                .as_f64()
                .filter(|f| f.is_finite())
                .ok_or_else(|| ShardingError::Expression(format!("non-numeric result {other}")))?;
            (f.floor().rem_euclid(shards as f64)) as i64
        }
    };
    Ok(index.unsigned_abs())
}

fn raw_text(value: &Value) -> Result<String, ShardingError> {
    match value {
        Value::Null => Err(ShardingError::InvalidShardingKey("NULL".to_string())),
        Value::Text(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

/// Smallest of i8/i16/i32/i64 that holds the value, big-endian.
fn push_int(i: i64, out: &mut Vec<u8>) {
    if let Ok(v) = i8::try_from(i) {
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i16::try_from(i) {
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i32::try_from(i) {
        out.extend_from_slice(&v.to_be_bytes());
    } else {
        out.extend_from_slice(&i.to_be_bytes());
    }
}

fn push_unsigned(u: u64, out: &mut Vec<u8>) {
    match i64::try_from(u) {
        Ok(i) => push_int(i, out),
        Err(_) => out.extend_from_slice(&u.to_be_bytes()),
    }
}

fn push_float(f: f64, out: &mut Vec<u8>) {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        push_int(f as i64, out);
    } else if f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64 {
        push_unsigned(f as u64, out);
    } else {
        out.extend_from_slice(&f.to_bits().to_be_bytes());
    }
}

fn push_date(d: NaiveDate, out: &mut Vec<u8>) {
    out.extend_from_slice(d.format("%Y-%m-%d").to_string().as_bytes());
}

fn push_timestamp(t: NaiveDateTime, out: &mut Vec<u8>) {
    out.extend_from_slice(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string().as_bytes());
}

/// Instants hash as UTC RFC 3339, whatever offset they were written with.
fn push_timestamptz(t: DateTime<Utc>, out: &mut Vec<u8>) {
    out.extend_from_slice(t.to_rfc3339_opts(SecondsFormat::AutoSi, true).as_bytes());
}

/// Appends the type-stable byte form of a key value: the same logical value
/// yields the same bytes whether it arrives as a number, a string or a UUID.
pub(crate) fn normalize(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => {}
        Value::Integer(i) => push_int(*i, out),
        Value::Unsigned(u) => push_unsigned(*u, out),
        Value::Real(f) => push_float(*f, out),
        Value::Numeric(d) => {
            if d.fract().is_zero() {
                if let Some(i) = d.to_i64() {
                    return push_int(i, out);
                }
                if let Some(u) = d.to_u64() {
                    return push_unsigned(u, out);
                }
            }
            // Parsed from its decimal text so `5.5`, `Real(5.5)` and `'5.5'` agree
            match d.normalize().to_string().parse::<f64>() {
                Ok(f) if f.is_finite() => push_float(f, out),
                _ => out.extend_from_slice(d.normalize().to_string().as_bytes()),
            }
        }
        Value::Boolean(b) => push_int(i64::from(*b), out),
        Value::Uuid(u) => out.extend_from_slice(u.as_bytes()),
        Value::Bytea(bytes) => out.extend_from_slice(bytes),
        Value::Text(s) => normalize_text(s, out),
        Value::Date(d) => push_date(*d, out),
        Value::Timestamp(t) => push_timestamp(*t, out),
        Value::TimestampTz(t) => push_timestamptz(*t, out),
    }
}

fn normalize_text(s: &str, out: &mut Vec<u8>) {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        push_int(i, out);
    } else if let Ok(u) = trimmed.parse::<u64>() {
        push_unsigned(u, out);
    } else if let Some(f) = trimmed.parse::<f64>().ok().filter(|f| f.is_finite()) {
        push_float(f, out);
    } else if let Ok(u) = Uuid::parse_str(trimmed) {
        out.extend_from_slice(u.as_bytes());
    } else if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        push_timestamptz(t.with_timezone(&Utc), out);
    } else if let Some(t) = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
    {
        push_timestamp(t, out);
    } else if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        push_date(d, out);
    } else {
        out.extend_from_slice(s.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_value;
    use rust_decimal::Decimal;

    fn checksum(shards: u32) -> SuffixCalculator {
        SuffixCalculator::new(&ShardingConfig::new("orders", ["user_id"]).with_shards(shards)).unwrap()
    }

    fn bytes_of(value: Value) -> Vec<u8> {
        let mut out = Vec::new();
        normalize(&value, &mut out);
        out
    }

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(bytes_of(Value::Integer(42)), vec![42]);
        assert_eq!(bytes_of(Value::Integer(-1)), vec![0xff]);
        assert_eq!(bytes_of(Value::Integer(300)), vec![0x01, 0x2c]);
        assert_eq!(bytes_of(Value::Integer(70_000)), 70_000i32.to_be_bytes().to_vec());
        assert_eq!(bytes_of(Value::Integer(1 << 40)), (1i64 << 40).to_be_bytes().to_vec());
        assert_eq!(bytes_of(Value::Unsigned(u64::MAX)), u64::MAX.to_be_bytes().to_vec());
    }

    #[test]
    fn test_cross_type_stability() {
        let expected = bytes_of(Value::Integer(5));
        assert_eq!(bytes_of(Value::Text("5".to_string())), expected);
        assert_eq!(bytes_of(Value::Unsigned(5)), expected);
        assert_eq!(bytes_of(Value::Real(5.0)), expected);
        assert_eq!(bytes_of(Value::Numeric(Decimal::new(500, 2))), expected);

        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(bytes_of(Value::Text(id.to_string().to_uppercase())), id.as_bytes().to_vec());
        assert_eq!(bytes_of(Value::Uuid(id)), id.as_bytes().to_vec());

        assert_eq!(bytes_of(Value::Text("eu-west".to_string())), b"eu-west".to_vec());
    }

    #[test]
    fn test_fractional_keys_are_type_stable() {
        let expected = bytes_of(Value::Real(5.5));
        assert_eq!(bytes_of(Value::Numeric(Decimal::new(55, 1))), expected);
        assert_eq!(bytes_of(Value::Numeric(Decimal::new(5500, 3))), expected);
        assert_eq!(bytes_of(Value::Text("5.5".to_string())), expected);
        assert_eq!(bytes_of(parse_value("5.5").unwrap()), expected);
        assert_eq!(bytes_of(Value::Text("0.1".to_string())), bytes_of(parse_value("0.1").unwrap()));

        let calc = checksum(64);
        let suffix = calc.suffix(&[Value::Real(5.5)]).unwrap();
        assert_eq!(calc.suffix(&[parse_value("5.5").unwrap()]).unwrap(), suffix);
        assert_eq!(calc.suffix(&[Value::Text("5.5".into())]).unwrap(), suffix);
    }

    #[test]
    fn test_date_time_keys_are_type_stable() {
        let instant = "'2024-01-31T10:00:00+00:00'";
        let literal = parse_value(instant).unwrap();
        assert!(matches!(literal, Value::TimestampTz(_)));
        let expected = bytes_of(literal);
        assert_eq!(bytes_of(Value::Text("2024-01-31T10:00:00+00:00".to_string())), expected);
        assert_eq!(bytes_of(Value::Text("2024-01-31T10:00:00Z".to_string())), expected);
        assert_eq!(bytes_of(Value::Text("2024-01-31T12:00:00+02:00".to_string())), expected);

        let date = parse_value("'2024-01-31'").unwrap();
        assert!(matches!(date, Value::Date(_)));
        assert_eq!(bytes_of(date), bytes_of(Value::Text("2024-01-31".to_string())));

        let stamp = parse_value("'2024-01-31 10:00:00'").unwrap();
        assert!(matches!(stamp, Value::Timestamp(_)));
        assert_eq!(bytes_of(stamp.clone()), bytes_of(Value::Text("2024-01-31 10:00:00".to_string())));
        assert_eq!(bytes_of(stamp), bytes_of(Value::Text("2024-01-31T10:00:00".to_string())));
    }

    #[test]
    fn test_raw_value_suffix_with_dash() {
        let cfg = ShardingConfig::new("orders", ["region"]).with_partitions(["us-east", "eu"]);
        let calc = SuffixCalculator::new(&cfg).unwrap();
        assert_eq!(calc.suffix(&[Value::Text("us-east".into())]).unwrap(), "_us-east");
        assert_eq!(calc.suffixes(), vec!["_us-east", "_eu"]);
    }

    #[test]
    fn test_checksum_suffix() {
        let calc = checksum(8);
        let expected = crc32fast::hash(&[42]) % 8;
        assert_eq!(calc.suffix(&[Value::Integer(42)]).unwrap(), format!("_{expected}"));
        assert_eq!(calc.suffix(&[Value::Text("42".into())]).unwrap(), format!("_{expected}"));
    }

    #[test]
    fn test_composite_keys_concatenate_in_order() {
        let calc = SuffixCalculator::new(
            &ShardingConfig::new("orders", ["tenant_id", "user_id"]).with_shards(64),
        )
        .unwrap();
        let expected = crc32fast::hash(&[3, 0x01, 0x2c]) % 64;
        assert_eq!(
            calc.suffix(&[Value::Integer(3), Value::Integer(300)]).unwrap(),
            format!("_{expected:02}")
        );
        assert!(matches!(
            calc.suffix(&[Value::Integer(3)]),
            Err(ShardingError::MissingShardingKey(k)) if k == "user_id"
        ));
        assert!(matches!(
            calc.suffix(&[Value::Integer(3), Value::Null]),
            Err(ShardingError::MissingShardingKey(k)) if k == "user_id"
        ));
    }

    #[test]
    fn test_uniform_coverage() {
        let calc = checksum(16);
        let seen: std::collections::HashSet<String> =
            (0..5_000i64).map(|i| calc.suffix(&[Value::Integer(i)]).unwrap()).collect();
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_raw_value_strategy() {
        let cfg = ShardingConfig::new("orders", ["region"]).with_partitions(["eu", "us"]);
        let calc = SuffixCalculator::new(&cfg).unwrap();
        assert_eq!(calc.suffix(&[Value::Text("eu".into())]).unwrap(), "_eu");
        assert!(matches!(calc.suffix(&[Value::Text("apac".into())]), Err(ShardingError::InvalidShardingKey(_))));
        assert!(matches!(calc.suffix(&[Value::Null]), Err(ShardingError::InvalidShardingKey(_))));
        assert_eq!(calc.suffixes(), vec!["_eu", "_us"]);
    }

    #[test]
    fn test_raw_value_composite() {
        let cfg = ShardingConfig::new("events", ["region", "year"]).with_partitions(["eu_2024", "us_2024"]);
        let calc = SuffixCalculator::new(&cfg).unwrap();
        assert_eq!(calc.suffix(&[Value::Text("eu".into()), Value::Integer(2024)]).unwrap(), "_eu_2024");
    }

    #[test]
    fn test_expression_strategy() {
        let cfg = ShardingConfig::new("orders", ["tenant_id", "user_id"])
            .with_shards(16)
            .with_expression("tenant_id * 4 + user_id");
        let calc = SuffixCalculator::new(&cfg).unwrap();
        assert_eq!(calc.suffix(&[Value::Integer(2), Value::Integer(3)]).unwrap(), "_11");
        assert_eq!(calc.suffix(&[Value::Integer(-1), Value::Integer(0)]).unwrap(), "_12");
        assert_eq!(calc.suffixes().len(), 16);
    }

    #[test]
    fn test_expression_must_use_sharding_keys() {
        let cfg = ShardingConfig::new("orders", ["user_id"]).with_shards(4).with_expression("tenant_id + 1");
        assert!(matches!(SuffixCalculator::new(&cfg), Err(ConfigError::InvalidExpression { .. })));
    }

    #[test]
    fn test_injected_evaluator() {
        struct Halve;
        impl ExpressionEvaluator for Halve {
            fn evaluate(&self, params: &HashMap<String, Value>) -> Result<Value, ShardingError> {
                let v = params.get("user_id").and_then(Value::as_f64).unwrap_or_default();
                Ok(Value::Real(v / 2.0))
            }
        }
        let cfg = ShardingConfig::new("orders", ["user_id"]).with_shards(10);
        let calc = SuffixCalculator::with_evaluator(&cfg, Arc::new(Halve)).unwrap();
        assert_eq!(calc.suffix(&[Value::Integer(9)]).unwrap(), "_04");
        assert_eq!(calc.suffix(&[Value::Integer(-3)]).unwrap(), "_08");
    }

    #[test]
    fn test_suffix_enumeration_uses_same_format() {
        let calc = SuffixCalculator::new(
            &ShardingConfig::new("orders", ["user_id"]).with_shards(4).with_suffix_format("_%02d"),
        )
        .unwrap();
        assert_eq!(calc.suffixes(), vec!["_00", "_01", "_02", "_03"]);
        let s = calc.suffix(&[Value::Integer(77)]).unwrap();
        assert!(calc.suffixes().contains(&s));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_suffix_is_deterministic(key in any::<i64>(), shards in 1u32..1_000) {
                let calc = checksum(shards);
                let first = calc.suffix(&[Value::Integer(key)]).unwrap();
                prop_assert_eq!(&first, &calc.suffix(&[Value::Integer(key)]).unwrap());
                prop_assert_eq!(&first, &calc.suffix(&[Value::Text(key.to_string())]).unwrap());
                prop_assert!(calc.suffixes().contains(&first));
            }

            #[test]
            fn test_unsigned_matches_signed(key in 0u64..=(i64::MAX as u64)) {
                let calc = checksum(32);
                prop_assert_eq!(
                    calc.suffix(&[Value::Unsigned(key)]).unwrap(),
                    calc.suffix(&[Value::Integer(key as i64)]).unwrap()
                );
            }
        }
    }
}
