//! db-router - route SQL statements from the command line.
//!
//! Each positional statement goes to the master or slave adapter its leading
//! keyword selects; result rows are printed to stdout as JSON lines.

use clap::Parser;
use db_router::Config;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine-readable
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    if config.servers.is_empty() && config.masters.is_empty() && config.slaves.is_empty() {
        eprintln!("Error: At least one server must be configured.");
        eprintln!();
        eprintln!("Usage: db-router --server <url> [SQL]...");
        eprintln!("       db-router --master <url> --slave <url> [SQL]...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  db-router --server sqlite:data.db \"SELECT * FROM users\"");
        eprintln!("  db-router --master mysql://app:pw@db1/shop --slave mysql://app:pw@db2/shop \\");
        eprintln!("            \"UPDATE stock SET qty = qty - 1 WHERE id = 7\" \"SELECT qty FROM stock\"");
        std::process::exit(1);
    }

    let router = config.build_router()?;
    info!(
        driver = router.driver_name(),
        statements = config.statements.len(),
        "Starting db-router v{}",
        env!("CARGO_PKG_VERSION")
    );

    for sql in &config.statements {
        let adapter = router.get_adapter(sql).await?;
        let rows = adapter.query(sql).await?;
        if rows.is_empty() {
            println!("{}", json!({ "statement": sql, "rows": 0 }));
        }
        for row in rows {
            println!("{}", serde_json::Value::Object(row));
        }
    }

    Ok(())
}
