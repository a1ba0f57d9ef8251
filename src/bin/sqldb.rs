//! sqldb: operational helper for routed databases
//!
//! # Usage
//!
//! ```bash
//! # Connect to master and follower and probe both
//! sqldb ping --config sqldb.toml
//!
//! # Strip credentials from a DSN
//! sqldb redact "postgres://app:secret@db/app"
//!
//! # Rewrite ? placeholders for a driver
//! sqldb rebind --driver postgres "SELECT * FROM users WHERE id = ?"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use sqldb::config::Settings;
use sqldb::prelude::*;
use sqldb::{BindType, bind, log, normalize_driver, redact_dsn};

#[derive(Parser)]
#[command(name = "sqldb")]
#[command(version)]
#[command(about = "Master/follower database helper", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqldb ping --config sqldb.toml
    sqldb redact 'host=db user=app password=secret'
    sqldb rebind --driver nrpostgres 'UPDATE users SET name = ? WHERE id = ?'
    sqldb rebind --driver oci8 --named 'SELECT * FROM users WHERE id = :id'")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to master and follower and probe both
    Ping {
        /// Config file (TOML or JSON)
        #[arg(short, long, env = "SQLDB_CONFIG")]
        config: Option<PathBuf>,

        /// Probe timeout in seconds
        #[arg(short, long, default_value_t = 3)]
        timeout: u64,
    },
    /// Print a DSN with its credentials removed
    Redact {
        /// The DSN to redact
        dsn: String,
    },
    /// Rewrite placeholders for a driver
    Rebind {
        /// Driver identifier (postgres, mysql, sqlite, oci8, sqlserver, ...)
        #[arg(short, long)]
        driver: String,

        /// Compile :name parameters instead of ? placeholders
        #[arg(long)]
        named: bool,

        /// The query to rewrite
        query: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Ping { config, timeout } => ping(config.clone(), *timeout, cli.verbose).await,
        Commands::Redact { dsn } => {
            println!("{}", redact_dsn(dsn));
            Ok(())
        }
        Commands::Rebind { driver, named, query } => rebind(driver, *named, query, cli.verbose),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn ping(config: Option<PathBuf>, timeout: u64, verbose: bool) -> Result<()> {
    let path = config
        .or_else(Settings::default_path)
        .ok_or_else(|| anyhow!("no config file given and no config directory on this platform"))?;
    let settings =
        Settings::from_file(&path).with_context(|| format!("loading {}", path.display()))?;

    log::init(&settings.log)?;

    if verbose {
        println!("{} {:?}", "Config:".dimmed(), settings.database);
    }

    let ctx = Context::background();
    let db = Db::connect(&ctx, &settings.database).await?;

    println!(
        "{} {} ({})",
        "master:".cyan().bold(),
        redact_dsn(&settings.database.master),
        db.driver_name()
    );
    match settings.database.follower_dsn() {
        Some(dsn) => println!("{} {}", "follower:".cyan().bold(), redact_dsn(dsn)),
        None => println!("{} {}", "follower:".cyan().bold(), "same as master".dimmed()),
    }

    let probe = Context::background().with_timeout(Duration::from_secs(timeout));
    let result = db.ping_context(&probe).await;
    db.close().await;

    match result {
        Ok(()) => {
            println!("{}", "✓ master and follower are healthy".green().bold());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn rebind(driver: &str, named: bool, query: &str, verbose: bool) -> Result<()> {
    let normalized = normalize_driver(driver);
    let bind_type = BindType::for_driver(normalized);

    if verbose {
        println!("{} {} → {:?}", "Driver:".dimmed(), normalized, bind_type);
    }
    if bind_type == BindType::Unknown {
        eprintln!(
            "{}",
            format!("⚠ Unknown driver '{}', placeholders left unchanged", driver).yellow()
        );
    }

    if named {
        let (sql, names) = bind::compile_named(query, bind_type)?;
        println!("{}", sql);
        if !names.is_empty() {
            println!();
            println!("{}", "Parameters:".cyan());
            for (i, name) in names.iter().enumerate() {
                println!("  {} = :{}", i + 1, name.yellow());
            }
        }
    } else {
        println!("{}", bind::rebind(bind_type, query));
    }
    Ok(())
}
