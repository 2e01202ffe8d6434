//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// DevOps Router - probe and drive a DevOps tool deployment through abstract operations
#[derive(Parser, Debug)]
#[command(name = "devops-router")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DEVOPS_ROUTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Override the target base URL
    #[arg(long, env = "DEVOPS_ROUTER_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Access token (bearer auth)
    #[arg(long, env = "DEVOPS_ROUTER_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// API key
    #[arg(long, env = "DEVOPS_ROUTER_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Username (basic auth)
    #[arg(long, env = "DEVOPS_ROUTER_USERNAME", global = true)]
    pub username: Option<String>,

    /// Password (basic auth)
    #[arg(long, env = "DEVOPS_ROUTER_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "DEVOPS_ROUTER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DEVOPS_ROUTER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe the target and print a health report
    Health,

    /// Print the capability report
    Capabilities {
        /// Ignore any cached report
        #[arg(long)]
        refresh: bool,
    },

    /// List operations
    Ops {
        /// Only operations the current identity may invoke
        #[arg(long)]
        permitted: bool,
    },

    /// Execute an operation
    Exec {
        /// Operation name (e.g. `repos/list`, `repos-list`, `list`)
        #[arg(required = true)]
        operation: String,

        /// JSON object of parameters
        #[arg(short, long, default_value = "{}")]
        params: String,
    },

    /// AQL utilities
    #[command(subcommand)]
    Aql(AqlCommand),

    /// Compute or verify the SHA-256 of a file
    Checksum {
        /// File to hash
        #[arg(required = true)]
        file: PathBuf,

        /// Expected hex digest
        #[arg(long)]
        expect: Option<String>,
    },
}

/// AQL subcommands
#[derive(Subcommand, Debug)]
pub enum AqlCommand {
    /// Check query text without sending it
    Validate {
        /// Query text, e.g. `items.find({"repo": "libs-release"})`
        #[arg(required = true)]
        query: String,
    },
}
