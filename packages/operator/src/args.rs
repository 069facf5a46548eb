use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utils::{
    config::CliEnvExt,
    serde::{deserialize_vec_parsed, deserialize_vec_string},
};

/// This struct is used for both args and environment variables
/// every env var can be overridden by a cli arg, and both override the config file
/// env vars follow the pattern of OPERATOR_{UPPERCASE_ARG_NAME}
#[derive(Debug, Parser, Serialize, Deserialize, Default)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct CliArgs {
    /// The directory holding operator.toml
    /// if not provided here or in an env var, a series of default directories will be tried
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// The path to an optional dotenv file to try and load
    /// if not set, will be the current working directory's .env
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<PathBuf>,

    /// Log level in the format of comma-separated tracing directives.
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_string")]
    pub log_level: Vec<String>,

    /// The node endpoint, e.g. ws://127.0.0.1:8545
    /// a bare host:port is treated as a websocket endpoint
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_endpoint: Option<String>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,

    /// Gas price in wei for task responses
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,

    /// Gas price in wei for the one-off registration transaction
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_gas_price: Option<u64>,

    /// Address of the Hello World service manager contract
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_manager_address: Option<String>,

    /// Address of the EigenLayer delegation manager contract
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_manager_address: Option<String>,

    /// Private key (hex) or mnemonic of the operator (usually leave this as None and set it in env)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Derivation index, only valid with a mnemonic
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_index: Option<u32>,

    /// Only respond to these task indices, comma-separated. Empty means all tasks
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_parsed")]
    pub task_index_filter: Vec<u32>,

    /// Don't register on startup, for restarts of an already registered operator
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_registration: Option<bool>,

    /// Attempts per task, default 1
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_max_attempts: Option<u32>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_retry_backoff_ms: Option<u64>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_timeout_secs: Option<u64>,

    /// Stop the operator when a task can't be answered (default true)
    /// set to false to skip the task and keep going
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_on_response_error: Option<bool>,

    /// OTLP collector for traces, e.g. http://localhost:4317
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jaeger: Option<String>,

    /// OTLP collector for metrics, e.g. http://localhost:9090
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<String>,

    /// Seconds between tasks created by spam-tasks
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spam_interval_secs: Option<u64>,
}

impl CliEnvExt for CliArgs {
    const ENV_VAR_PREFIX: &'static str = "OPERATOR";
    const TOML_IDENTIFIER: &'static str = "operator";

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn dotenv_path(&self) -> Option<PathBuf> {
        self.dotenv.clone()
    }
}
