//! Command line and environment configuration.
//!
//! Every flag falls back to an environment variable; `main` loads a `.env` file
//! first when one is present.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Mongo,
    /// Non-durable, for local runs.
    Memory,
}

/// OpenSplit ledger server
#[derive(Parser, Debug, Clone)]
#[command(name = "opensplit-ledger")]
#[command(about = "Tracks and settles debts between users who share expenses")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Persistence backend
    #[arg(long, env = "STORE_BACKEND", value_enum, default_value_t = StoreBackend::Mongo)]
    pub store: StoreBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "OpenSplit")]
    pub mongodb_db: String,

    /// Deadline for the store work of a single ledger operation, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Grace period for in-flight requests on shutdown, in seconds
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.store == StoreBackend::Mongo && self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let args = Args::try_parse_from(["opensplit-ledger"]).unwrap();
        assert!(args.validate().is_ok());
        assert_eq!(args.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "opensplit-ledger",
            "--store",
            "memory",
            "--store-timeout-ms",
            "250",
            "--listen",
            "127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(args.store, StoreBackend::Memory);
        assert_eq!(args.store_timeout(), Duration::from_millis(250));
        assert_eq!(args.listen.port(), 9000);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = Args::try_parse_from(["opensplit-ledger", "--store-timeout-ms", "0"]).unwrap();
        assert!(args.validate().is_err());
    }
}
