//! tprunner - web front-end for a pre-compiled program.
//!
//! Usage:
//!   tprunner serve [--port 8000] [--jar TP2.jar]   # Start HTTP server
//!   tprunner --run [--debug] < input.txt           # Run once on stdin

use anyhow::Context;
use clap::Parser;
use std::io::Read;
use std::process::exit;
use tprunner::config::{Args, Commands, ServeArgs};
use tprunner::executor::{ExecutionResult, Executor};
use tprunner::http_server;
use tprunner::log_store::LogStore;
use tprunner::rate_limit::RateLimiter;
use tprunner::sanitize::sanitize;
use tprunner::state::AppState;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let executor = Executor::new(args.program.program_config());

    match args.command {
        Some(Commands::Serve(serve)) => {
            if let Err(e) = serve_http(serve, executor).await {
                eprintln!("Error: {:#}", e);
                exit(1);
            }
        }
        None if args.run => {
            let mut input = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut input) {
                eprintln!("Error: reading stdin: {}", e);
                exit(1);
            }
            match executor.execute(&sanitize(&input), args.debug).await {
                ExecutionResult::Success { output, elapsed_ms } => {
                    print!("{}", output);
                    info!(elapsed_ms, "Run finished");
                }
                ExecutionResult::ProcessError { message }
                | ExecutionResult::ValidationError { message } => {
                    eprintln!("Error: {}", message);
                    exit(1);
                }
            }
        }
        None => {
            eprintln!("Error: Use 'serve' subcommand or --run flag");
            exit(1);
        }
    }
}

async fn serve_http(serve: ServeArgs, executor: Executor) -> anyhow::Result<()> {
    let logs = LogStore::connect(&serve.database_url, serve.database_max_connections)
        .await
        .with_context(|| format!("opening database {}", serve.database_url))?;
    logs.migrate().await.context("applying migrations")?;
    info!(database = %serve.database_url, "Request log ready");

    let state = AppState::new(executor, RateLimiter::in_memory(), logs.clone())
        .with_log_failure(serve.log_failure_policy());

    http_server::run_server(serve.addr(), state)
        .await
        .context("HTTP server failed")?;

    logs.close().await;
    info!("Shutdown complete");
    Ok(())
}
