//! Surveyor RPC Server - framed JSON-RPC service for inventory snapshots.
//!
//! This binary wires the surveyor-core library behind a TCP JSON-RPC 2.0
//! server for supervisors and CLI clients.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use surveyor_core::config::{DbConfig, ExecutorConfig};
use surveyor_core::crawler::ScriptedCrawler;
use surveyor_core::db::Engine;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "surveyor-rpc")]
#[command(about = "JSON-RPC server for inventory lifecycle management")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Path to the inventory database (defaults to ./inventory.sqlite)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Crawl worker threads
    #[arg(long, default_value_t = ExecutorConfig::WORKER_THREADS)]
    workers: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Surveyor RPC Server");

    let db_path = args
        .db
        .unwrap_or_else(|| PathBuf::from(DbConfig::DB_FILE_NAME));
    info!("Inventory database: {}", db_path.display());

    let engine = Engine::open(&db_path)?;
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let handle = surveyor_rpc::serve(
        addr,
        engine,
        args.workers,
        Arc::new(ScriptedCrawler::completing(100)),
    )
    .await?;

    // Print port for supervisors to read (intentional stdout for IPC)
    println!("RPC_PORT={}", handle.port);

    info!("RPC server running on {}", handle.addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
