use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table as ComfyTable, presets::UTF8_FULL};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tableshard::core::{ShardingSettings, Value};
use tableshard::parser::parse_value;
use tableshard::sharding::{Decision, DispatchContext, Intercept, Operation, ShardingPlugin};

/// tableshard administration tool
#[derive(Parser, Debug)]
#[command(name = "shard_tool")]
#[command(about = "Inspect sharding configuration and preview statement rewrites", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./tableshard.toml or /etc/tableshard/tableshard.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the physical shard tables of each logical table
    Tables {
        #[arg(short, long)]
        table: Option<String>,
    },
    /// Show the suffix assigned to sharding-key values
    Suffix {
        #[arg(short, long)]
        table: String,
        /// Key values in sharding-key order
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print the rewritten form of a statement
    Rewrite {
        #[arg(short, long)]
        sql: String,
        /// Bound parameter, as a SQL literal ($1, $2, ... in order)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Print CREATE TABLE statements for every shard
    Ddl {
        #[arg(short, long)]
        table: Option<String>,
    },
}

/// Literal as written on the command line; bare words are text.
fn cli_value(raw: &str) -> Value {
    parse_value(raw).unwrap_or_else(|| Value::Text(raw.to_string()))
}

fn selected<'a>(settings: &'a ShardingSettings, table: Option<&str>) -> Vec<&'a str> {
    settings
        .tables
        .iter()
        .map(|t| t.table.as_str())
        .filter(|name| table.is_none_or(|wanted| name.eq_ignore_ascii_case(wanted)))
        .collect()
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = ShardingSettings::load(args.config.as_deref())?;
    let plugin = ShardingPlugin::builder().settings(settings.clone()).build()?;

    match args.command {
        Command::Tables { table } => {
            let mut output = ComfyTable::new();
            output.load_preset(UTF8_FULL);
            output.set_header(vec![Cell::new("logical"), Cell::new("keys"), Cell::new("physical tables")]);
            for name in selected(&settings, table.as_deref()) {
                let keys = plugin.table(name).map(|t| t.calculator().keys().join(", ")).unwrap_or_default();
                let physical = plugin.physical_tables(name)?;
                output.add_row(vec![Cell::new(name), Cell::new(keys), Cell::new(physical.join("\n"))]);
            }
            println!("{output}");
        }
        Command::Suffix { table, keys } => {
            let sharded = plugin.table(&table).ok_or_else(|| format!("table '{table}' is not sharded"))?;
            let values: Vec<Value> = keys.iter().map(|k| cli_value(k)).collect();
            let suffix = sharded.suffix(&values)?;
            println!("{}{suffix}", sharded.name());
        }
        Command::Rewrite { sql, params } => {
            let params: Vec<Value> = params.iter().map(|p| cli_value(p)).collect();
            let mut ctx = DispatchContext::new();
            match plugin.intercept(&mut ctx, Operation::sql(&sql, &params))? {
                Decision::Bypassed => println!("-- bypassed (no sharded table)\n{sql}"),
                Decision::Rewritten { target, sql, params } => {
                    println!("-- shard: {}", target.physical_table);
                    println!("{}", sql.unwrap_or_default());
                    for (i, value) in params.unwrap_or_default().iter().enumerate() {
                        println!("-- ${} = {}", i + 1, value.to_sql_literal());
                    }
                }
            }
        }
        Command::Ddl { table } => {
            for name in selected(&settings, table.as_deref()) {
                let Some(schema) = plugin.registry().schema(name) else {
                    eprintln!("-- {name}: no columns configured");
                    continue;
                };
                for physical in plugin.physical_tables(name)? {
                    println!("{};", schema.create_table_sql(&physical));
                }
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
