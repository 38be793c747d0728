mod script;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cqlkit::{load_config, BatchOptions, ConsistencyLevel, Keyspace, Statement};

#[derive(Parser, Debug)]
#[command(name = "cql-runner")]
#[command(about = "Run a CQL script against a keyspace, statement by statement or as one batch")]
struct Args {
    #[arg(short, long, default_value = "config/cql-runner.yaml")]
    config: String,

    /// CQL script; statements are separated by ';'
    #[arg(short, long)]
    file: String,

    /// Send every statement in a single batch scope
    #[arg(long)]
    batch: bool,

    #[arg(long, requires = "batch")]
    unlogged: bool,

    /// Flush the batch every N statements
    #[arg(long, requires = "batch")]
    auto_apply: Option<usize>,

    /// any, one, two, three, quorum, all, local_quorum, each_quorum, local_one
    #[arg(long)]
    consistency: Option<ConsistencyLevel>,

    /// Override the configured driver (scylla, cassandra, memory)
    #[arg(long)]
    driver: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cql_runner=info,cqlkit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(driver) = &args.driver {
        config.driver = driver.clone();
    }

    let source = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading script {}", args.file))?;
    let statements = script::split_statements(&source)?;
    info!("Loaded {} statements from {}", statements.len(), args.file);

    let keyspace = Keyspace::connect(config).await?;
    if !keyspace.exists().await? {
        warn!("Keyspace {} does not exist on the cluster", keyspace.name());
    }

    if args.batch {
        run_batch(&keyspace, &args, statements).await?;
    } else {
        run_each(&keyspace, &args, statements).await?;
    }

    Ok(())
}

async fn run_batch(keyspace: &Keyspace, args: &Args, statements: Vec<String>) -> Result<()> {
    let options = BatchOptions {
        auto_apply: args.auto_apply,
        unlogged: args.unlogged,
        consistency: args.consistency,
    };

    let count = statements.len();
    let mut batch = keyspace.begin_batch(options)?;
    for cql in statements {
        batch.add(Statement::new(cql)).await?;
    }
    batch.apply().await?;

    info!("Applied {} statements as a batch", count);
    Ok(())
}

async fn run_each(keyspace: &Keyspace, args: &Args, statements: Vec<String>) -> Result<()> {
    for cql in statements {
        let mut statement = Statement::new(cql.as_str());
        if let Some(consistency) = args.consistency {
            statement = statement.with_consistency(consistency);
        }

        let rows = keyspace
            .execute_statement(statement)
            .await
            .with_context(|| format!("executing: {}", cql))?;
        for row in rows {
            println!("{}", serde_json::to_string(&row.to_json())?);
        }
    }
    Ok(())
}
