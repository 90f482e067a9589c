//! Command-line and environment configuration.
//!
//! Every flag can also be set from the environment (a `.env` file is loaded
//! at startup), which is how deployments pick the jar and database.

use crate::executor::{ProgramConfig, StderrPolicy};
use crate::log_store::LogFailurePolicy;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tprunner")]
#[command(about = "Web front-end for running a program on submitted text")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run the program once on stdin and print the result
    #[arg(long)]
    pub run: bool,

    /// Pass "true" as the debug flag in --run mode
    #[arg(long, requires = "run")]
    pub debug: bool,

    #[command(flatten)]
    pub program: ProgramArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "TPRUNNER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "TPRUNNER_PORT", default_value = "8000")]
    pub port: u16,

    /// SQLite database for the request log
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://tprunner.db")]
    pub database_url: String,

    /// Maximum pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    pub database_max_connections: u32,

    /// Run the program even when the request log cannot be written
    #[arg(long, env = "CONTINUE_ON_LOG_FAILURE")]
    pub continue_on_log_failure: bool,
}

impl ServeArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn log_failure_policy(&self) -> LogFailurePolicy {
        if self.continue_on_log_failure {
            LogFailurePolicy::Continue
        } else {
            LogFailurePolicy::Abort
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProgramArgs {
    /// Executable used to launch the jar
    #[arg(long, global = true, env = "RUNNER_PROGRAM", default_value = "java")]
    pub program: String,

    /// Jar passed as `-jar <JAR>`
    #[arg(long, global = true, env = "RUNNER_JAR", default_value = "TP2.jar")]
    pub jar: String,

    /// Seconds before a run is killed
    #[arg(long, global = true, env = "RUNNER_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,

    /// Only treat a run as failed on a non-zero exit status
    #[arg(long, global = true, env = "RUNNER_STDERR_NONZERO_EXIT_ONLY")]
    pub stderr_nonzero_exit_only: bool,
}

impl ProgramArgs {
    pub fn program_config(&self) -> ProgramConfig {
        ProgramConfig {
            program: self.program.clone(),
            args: vec!["-jar".to_string(), self.jar.clone()],
            timeout: Duration::from_secs(self.timeout_secs),
            stderr_policy: if self.stderr_nonzero_exit_only {
                StderrPolicy::NonZeroExit
            } else {
                StderrPolicy::AnyOutput
            },
        }
    }
}
