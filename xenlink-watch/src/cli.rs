//! Command-line argument parsing.

use clap::Parser;

/// xenlink-watch - follow object changes on a XenAPI pool
#[derive(Parser, Debug, Default)]
#[command(name = "xenlink-watch")]
#[command(about = "xenlink-watch - follow object changes on a XenAPI pool")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Pool master URL (e.g., https://xen01.lab.local)
    #[arg(long)]
    pub url: Option<String>,

    /// User to log in as
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password for the user
    #[arg(long, env = "XENLINK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Classes to watch, comma separated (e.g., VM,host or *)
    #[arg(long, value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Long-poll timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Accept self-signed certificates
    #[arg(long)]
    pub insecure: bool,

    /// Enable development mode (in-memory server with demo activity)
    #[arg(long)]
    pub dev: bool,
}
