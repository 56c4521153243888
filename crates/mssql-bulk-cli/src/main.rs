//! mssql-bulk CLI - bulk load JSON records into SQL Server tables.

use clap::{Parser, Subcommand};
use mssql_bulk::records::{self, Record};
use mssql_bulk::{
    BulkConnection, BulkError, BulkInsertResult, BulkInserter, BulkOptions, Config, Connector,
    EntityMapping, MssqlConnection, MssqlConnector, Session, TableName, TablePlan,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-bulk")]
#[command(about = "Schema-reconciling bulk loader for SQL Server tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk insert records from a JSON array or JSON Lines file
    Load {
        /// Mapped table, optionally schema-qualified (schema.table)
        #[arg(long)]
        table: String,

        /// Input file
        #[arg(long)]
        input: PathBuf,

        /// Override rows per bulk load request
        #[arg(long)]
        batch_size: Option<u32>,

        /// Override transfer timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write identity values from the input
        #[arg(long)]
        keep_identity: bool,

        /// Wrap the load in an explicit transaction
        #[arg(long)]
        transaction: bool,

        /// Dry run: decode records and show the column plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a table's physical columns and how each one is filled
    Columns {
        /// Table, optionally schema-qualified (schema.table)
        #[arg(long)]
        table: String,
    },

    /// Test database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BulkError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(BulkError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Load {
            table,
            input,
            batch_size,
            timeout,
            keep_identity,
            transaction,
            dry_run,
        } => {
            let table_mapping = config.table(&table).ok_or_else(|| {
                BulkError::Config(format!("table {} is not mapped in the configuration", table))
            })?;

            let inputs = records::read_input(&input)?;
            let rows = records::decode_records(table_mapping, &inputs)?;
            info!("Decoded {} records from {:?}", rows.len(), input);

            let mut options = BulkOptions::from(&config.bulk);
            if batch_size.is_some() {
                options.batch_size = batch_size;
            }
            if timeout.is_some() {
                options.timeout_secs = timeout;
            }
            options.keep_identity |= keep_identity;

            let mapping = records::entity_mapping(table_mapping);
            let inserter = BulkInserter::new(MssqlConnector::new(config.connection.clone()), options);

            if dry_run {
                let plan = inserter.plan(&mapping).await?;
                if cli.output_json {
                    let report = serde_json::json!({ "records": rows.len(), "plan": plan });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Dry run completed!");
                    println!("  Records: {}", rows.len());
                    print_plan(&plan);
                }
                return Ok(());
            }

            let result = if transaction {
                load_in_transaction(&inserter, &mapping, &rows).await?
            } else {
                let mut session: Session<MssqlConnection> = Session::new();
                inserter
                    .bulk_insert(&mut session, &mapping, Some(rows.as_slice()))
                    .await?
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Load completed!");
                println!("  Table: {}", result.table);
                println!("  Rows: {}", result.rows_written);
                println!("  Strategy: {}", result.strategy);
                if !result.defaulted_columns.is_empty() {
                    println!("  Defaulted columns: {}", result.defaulted_columns.join(", "));
                }
            }
        }

        Commands::Columns { table } => {
            let mapping = match config.table(&table) {
                Some(table_mapping) => records::entity_mapping(table_mapping),
                None => EntityMapping::<Record>::new(parse_table_name(&table)),
            };
            let inserter = BulkInserter::new(
                MssqlConnector::new(config.connection.clone()),
                BulkOptions::from(&config.bulk),
            );
            let plan = inserter.plan(&mapping).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }

        Commands::HealthCheck => {
            let connector = MssqlConnector::new(config.connection.clone());
            let outcome = match connector.connect().await {
                Ok(mut conn) => {
                    let latency = conn.ping().await;
                    if let Err(e) = conn.close().await {
                        tracing::warn!("Failed to close health check connection: {}", e);
                    }
                    latency
                }
                Err(e) => Err(e),
            };

            let (latency_ms, error) = match &outcome {
                Ok(latency) => (latency.as_millis() as u64, None),
                Err(e) => (0, Some(e.to_string())),
            };

            if cli.output_json {
                let report = serde_json::json!({
                    "healthy": outcome.is_ok(),
                    "latency_ms": latency_ms,
                    "error": error,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  SQL Server: {} ({}ms)",
                    if outcome.is_ok() { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Some(ref err) = error {
                    println!("    Error: {}", err);
                }
            }

            outcome?;
        }
    }

    Ok(())
}

async fn load_in_transaction(
    inserter: &BulkInserter<MssqlConnector>,
    mapping: &EntityMapping<Record>,
    rows: &[Record],
) -> Result<BulkInsertResult, BulkError> {
    let mut session: Session<MssqlConnection> = Session::new();
    session.begin(inserter.connector()).await?;

    let outcome = inserter.bulk_insert(&mut session, mapping, Some(rows)).await;
    match outcome {
        Ok(result) => {
            session.commit().await?;
            session.close().await?;
            Ok(result)
        }
        Err(e) => {
            // close() rolls back the open transaction, or drops a connection
            // a timed-out write left mid-request
            if let Err(close_err) = session.close().await {
                tracing::warn!("Failed to roll back transaction: {}", close_err);
            }
            Err(e)
        }
    }
}

fn parse_table_name(name: &str) -> TableName {
    match name.split_once('.') {
        Some((schema, table)) => TableName::with_schema(schema, table),
        None => TableName::new(name),
    }
}

fn print_plan(plan: &TablePlan) {
    println!("Table {} ({} load)", plan.table, plan.strategy);
    for column in &plan.columns {
        let mut flags = Vec::new();
        if column.is_identity {
            flags.push("identity");
        }
        if column.is_computed {
            flags.push("computed");
        }
        println!(
            "  {:>3} {:<30} {:<20} {:<8} {:<9} {}{}",
            column.ordinal,
            column.name,
            column.type_name,
            if column.nullable { "NULL" } else { "NOT NULL" },
            column.representation.name(),
            if column.bound { "mapped" } else { "default" },
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
