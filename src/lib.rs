//! tprunner - web form in front of an external program.
//!
//! A submission is sanitized, rate limited per client IP, logged, piped to
//! the program on stdin, and its output rendered back as HTML.

pub mod client_ip;
pub mod config;
pub mod error;
pub mod executor;
pub mod http_server;
pub mod log_store;
pub mod rate_limit;
pub mod render;
pub mod sanitize;
pub mod state;
