use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tableshard::core::{
    BoxError, ColumnDef, DataType, PrimaryKeyGeneratorKind, ShardingConfig, ShardingError, TableSchema, Value,
};
use tableshard::parser::{parse_statement, SelectItem, Statement};
use tableshard::sharding::{
    Decision, DispatchContext, IdGenerator, Intercept, Migrator, Operation, OperationKind, Record, ShardingPlugin,
    SqlMigrator, SuffixCalculator,
};

fn orders_config() -> ShardingConfig {
    ShardingConfig::new("orders", ["user_id"]).with_shards(8)
}

fn orders_schema() -> TableSchema {
    TableSchema::new(
        "orders",
        vec![
            ColumnDef { name: "id".into(), data_type: DataType::BigInt, nullable: false, primary_key: true },
            ColumnDef { name: "user_id".into(), data_type: DataType::BigInt, nullable: false, primary_key: false },
            ColumnDef { name: "note".into(), data_type: DataType::Text, nullable: true, primary_key: false },
        ],
    )
}

/// Migrator that counts how often each table is created.
#[derive(Default)]
struct CountingMigrator {
    calls: AtomicUsize,
    created: parking_lot::Mutex<Vec<String>>,
}

impl Migrator for CountingMigrator {
    fn migrate(&self, ctx: &mut DispatchContext, _schema: &TableSchema, physical: &str) -> Result<(), BoxError> {
        assert!(ctx.ignore_sharding(), "migration must run with sharding ignored");
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(std::time::Duration::from_millis(5));
        self.created.lock().push(physical.to_string());
        Ok(())
    }
}

fn rewritten_sql(decision: Decision) -> String {
    match decision {
        Decision::Rewritten { sql: Some(sql), .. } => sql,
        other => panic!("expected a SQL rewrite, got {other:?}"),
    }
}

#[test]
fn test_scenario_a_select_routed_by_checksum() {
    let plugin = ShardingPlugin::builder().table(orders_config()).build().unwrap();
    let calculator = SuffixCalculator::new(&orders_config()).unwrap();
    let suffix = calculator.suffix(&[Value::Integer(42)]).unwrap();
    assert_eq!(suffix, format!("_{}", crc32fast::hash(&[42]) % 8));

    let mut ctx = DispatchContext::new();
    let sql = rewritten_sql(
        plugin
            .intercept(&mut ctx, Operation::sql("SELECT * FROM orders WHERE user_id = 42", &[]))
            .unwrap(),
    );
    assert_eq!(sql, format!("SELECT * FROM orders{suffix} WHERE user_id = 42"));
    assert_eq!(ctx.suffix(), Some(suffix.as_str()));
}

#[test]
fn test_rewrite_is_deterministic_and_leaves_no_logical_reference() {
    let plugin = ShardingPlugin::builder().table(orders_config()).build().unwrap();
    let sql = "SELECT orders.id, orders.note FROM orders WHERE orders.user_id = 42 ORDER BY orders.id DESC";

    let first = rewritten_sql(plugin.intercept(&mut DispatchContext::new(), Operation::sql(sql, &[])).unwrap());
    let second = rewritten_sql(plugin.intercept(&mut DispatchContext::new(), Operation::sql(sql, &[])).unwrap());
    assert_eq!(first, second);

    let suffix = plugin.table("orders").unwrap().suffix(&[Value::Integer(42)]).unwrap();
    let physical = format!("orders{suffix}");
    let Statement::Select(mut select) = parse_statement(&first).unwrap() else {
        panic!("expected SELECT");
    };
    assert_eq!(select.from.name.value, physical);
    let mut qualifiers = Vec::new();
    select.walk_exprs_mut(&mut |e| {
        if let tableshard::parser::Expr::Column(c) = e {
            qualifiers.extend(c.table.as_ref().map(|t| t.value.clone()));
        }
    });
    for item in &select.columns {
        if let SelectItem::QualifiedWildcard(q) = item {
            qualifiers.push(q.value.clone());
        }
    }
    assert!(!qualifiers.is_empty());
    assert!(qualifiers.iter().all(|q| *q == physical));
}

#[test]
fn test_scenario_b_generated_primary_key_decides_the_shard() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let generator = move |_: &str| -> Result<u64, BoxError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(9_001)
    };
    let plugin = ShardingPlugin::builder()
        .table(
            ShardingConfig::new("orders", ["user_id"])
                .with_shards(8)
                .with_primary_key("user_id")
                .with_generator(PrimaryKeyGeneratorKind::External),
        )
        .id_generator(Arc::new(generator) as Arc<dyn IdGenerator>)
        .build()
        .unwrap();

    let mut rows = [Record::new("orders").with("user_id", 0).with("note", "first")];
    let decision = plugin
        .intercept(&mut DispatchContext::new(), Operation::model(OperationKind::Create, &mut rows))
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(rows[0].get("user_id"), Some(&Value::Unsigned(9_001)));
    let target = decision.target().unwrap();
    let expected = plugin.table("orders").unwrap().suffix(&[Value::Integer(9_001)]).unwrap();
    assert_eq!(target.suffix, expected);
}

#[test]
fn test_scenario_c_join_without_sharded_table_bypasses() {
    let plugin = ShardingPlugin::builder().table(orders_config()).build().unwrap();
    let sql = "SELECT u.name, p.title FROM users u JOIN posts p ON p.user_id = u.id WHERE u.id = 42";
    let mut ctx = DispatchContext::new();
    assert_eq!(plugin.intercept(&mut ctx, Operation::sql(sql, &[])).unwrap(), Decision::Bypassed);
    assert_eq!(ctx.state(), tableshard::sharding::DispatchState::Bypassed);
    assert_eq!(ctx.physical_table(), None);
}

#[test]
fn test_scenario_d_raw_value_enumeration() {
    let migrator = Arc::new(CountingMigrator::default());
    let plugin = ShardingPlugin::builder()
        .table(ShardingConfig::new("orders", ["region"]).with_partitions(["eu", "us"]))
        .schema(orders_schema())
        .migrator(migrator.clone())
        .build()
        .unwrap();

    let created = plugin.migrate_all(&mut DispatchContext::new(), "orders").unwrap();
    assert_eq!(created, vec!["orders_eu", "orders_us"]);
    assert_eq!(*migrator.created.lock(), vec!["orders_eu", "orders_us"]);
    assert!(created.iter().all(|t| !t.chars().any(|c| c.is_ascii_digit())));

    let sql = rewritten_sql(
        plugin
            .intercept(&mut DispatchContext::new(), Operation::sql("DELETE FROM orders WHERE region = 'us'", &[]))
            .unwrap(),
    );
    assert_eq!(sql, "DELETE FROM orders_us WHERE region = 'us'");
    assert_eq!(migrator.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_batch_spanning_shards_is_rejected_without_creating_tables() {
    let migrator = Arc::new(CountingMigrator::default());
    let plugin = ShardingPlugin::builder()
        .table(orders_config())
        .schema(orders_schema())
        .migrator(migrator.clone())
        .build()
        .unwrap();
    let table = plugin.table("orders").unwrap();
    let first = table.suffix(&[Value::Integer(1)]).unwrap();
    let other = (2..1000).find(|k| table.suffix(&[Value::Integer(*k)]).unwrap() != first).unwrap();

    let sql = format!("INSERT INTO orders (id, user_id, note) VALUES (1, 1, 'a'), (2, {other}, 'b')");
    let err = plugin.intercept(&mut DispatchContext::new(), Operation::sql(&sql, &[])).unwrap_err();
    assert!(matches!(err, ShardingError::DifferentSuffixInBatch { .. }));

    let mut rows = [Record::new("orders").with("user_id", 1), Record::new("orders").with("user_id", other)];
    let err = plugin
        .intercept(&mut DispatchContext::new(), Operation::model(OperationKind::Create, &mut rows))
        .unwrap_err();
    assert!(matches!(err, ShardingError::DifferentSuffixInBatch { .. }));

    assert_eq!(migrator.calls.load(Ordering::SeqCst), 0);
    assert!(!plugin.registry().is_created(&format!("orders{first}")));
}

#[test]
fn test_concurrent_ensure_table_migrates_once() {
    let migrator = Arc::new(CountingMigrator::default());
    let plugin = Arc::new(
        ShardingPlugin::builder()
            .table(orders_config())
            .schema(orders_schema())
            .migrator(migrator.clone())
            .build()
            .unwrap(),
    );
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let plugin = Arc::clone(&plugin);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ctx = DispatchContext::new();
                plugin.registry().ensure_table(&mut ctx, "orders", "_3").unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "orders_3");
    }
    assert_eq!(migrator.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sql_migrator_creates_tables_on_first_write() {
    let executed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&executed);
    let plugin = Arc::new(
        ShardingPlugin::builder()
            .table(orders_config().with_generator(PrimaryKeyGeneratorKind::Sequence))
            .schema(orders_schema())
            .migrator(Arc::new(SqlMigrator::new(move |ctx: &mut DispatchContext, sql: &str| -> Result<(), BoxError> {
                assert!(ctx.ignore_sharding());
                sink.lock().push(sql.to_string());
                Ok(())
            })))
            .build()
            .unwrap(),
    );

    let params = [Value::Integer(77), Value::Text("hello".into())];
    for _ in 0..3 {
        let decision = plugin
            .intercept(
                &mut DispatchContext::new(),
                Operation::sql("INSERT INTO orders (user_id, note) VALUES ($1, $2)", &params),
            )
            .unwrap();
        let Decision::Rewritten { sql: Some(sql), params: Some(bound), .. } = decision else {
            panic!("expected a rewrite");
        };
        assert!(sql.contains(" (user_id, note, id) VALUES ($1, $2, "));
        assert_eq!(bound, params.to_vec());
    }

    let suffix = plugin.table("orders").unwrap().suffix(&[Value::Integer(77)]).unwrap();
    assert_eq!(
        executed.lock().as_slice(),
        [format!(
            "CREATE TABLE IF NOT EXISTS orders{suffix} (id BIGINT, user_id BIGINT NOT NULL, note TEXT, PRIMARY KEY (id))"
        )]
    );
}

#[test]
fn test_group_rows_by_shard_partitions_a_mixed_batch() {
    let plugin = ShardingPlugin::builder()
        .table(orders_config().with_generator(PrimaryKeyGeneratorKind::Sequence))
        .build()
        .unwrap();
    let rows: Vec<Record> = (1..=64).map(|u| Record::new("orders").with("user_id", u)).collect();

    let groups = plugin.group_rows_by_shard(rows).unwrap();
    assert!(groups.len() > 1);
    for (suffix, rows) in groups {
        let mut batch = rows;
        let decision = plugin
            .intercept(&mut DispatchContext::new(), Operation::model(OperationKind::Create, &mut batch))
            .unwrap();
        assert_eq!(decision.target().unwrap().suffix, suffix);
    }
}

#[test]
fn test_model_write_and_sql_read_agree_on_fractional_key() {
    let plugin = ShardingPlugin::builder()
        .table(ShardingConfig::new("readings", ["sensor"]).with_shards(64))
        .build()
        .unwrap();

    for key in [Value::Real(5.5), Value::Text("5.5".into())] {
        let mut rows = [Record::new("readings").with("sensor", key.clone()).with("celsius", 21)];
        let written = plugin
            .intercept(&mut DispatchContext::new(), Operation::model(OperationKind::Create, &mut rows))
            .unwrap();

        let mut ctx = DispatchContext::new();
        let read = plugin
            .intercept(&mut ctx, Operation::sql("SELECT * FROM readings WHERE sensor = 5.5", &[]))
            .unwrap();
        assert_eq!(written.target(), read.target(), "{key:?}");

        let bound = plugin
            .intercept(
                &mut DispatchContext::new(),
                Operation::sql("SELECT * FROM readings WHERE sensor = $1", std::slice::from_ref(&key)),
            )
            .unwrap();
        assert_eq!(read.target(), bound.target(), "{key:?}");
    }
}

#[test]
fn test_dashed_partition_round_trips_through_sql_and_ddl() {
    let executed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&executed);
    let plugin = ShardingPlugin::builder()
        .table(ShardingConfig::new("orders", ["region"]).with_partitions(["us-east", "eu"]))
        .schema(orders_schema())
        .migrator(Arc::new(SqlMigrator::new(move |_: &mut DispatchContext, sql: &str| -> Result<(), BoxError> {
            sink.lock().push(sql.to_string());
            Ok(())
        })))
        .build()
        .unwrap();

    let sql = rewritten_sql(
        plugin
            .intercept(
                &mut DispatchContext::new(),
                Operation::sql("SELECT orders.note FROM orders WHERE region = 'us-east'", &[]),
            )
            .unwrap(),
    );
    assert_eq!(sql, "SELECT \"orders_us-east\".note FROM \"orders_us-east\" WHERE region = 'us-east'");
    let Statement::Select(reparsed) = parse_statement(&sql).unwrap() else {
        panic!("expected SELECT");
    };
    assert_eq!(reparsed.from.name.value, "orders_us-east");

    assert_eq!(
        executed.lock().as_slice(),
        ["CREATE TABLE IF NOT EXISTS \"orders_us-east\" (id BIGINT, user_id BIGINT NOT NULL, note TEXT, PRIMARY KEY (id))"
            .to_string()]
    );
}
