//! Typed configuration, assembled from compiled-in defaults, environment
//! variables and command-line flags, in that increasing order of priority.
//!
//! Modeled on `astria-sequencer-relayer`'s config layer: a plain
//! [`Config`] struct implementing [`serde::Serialize`]/[`serde::Deserialize`]
//! is merged through a [`figment::Figment`] against a [`cli::Args`] struct of
//! all-optional overrides.

mod cli;

use std::path::PathBuf;

use clap::Parser as _;
use figment::{
    providers::{
        Env,
        Serialized,
    },
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

const DEFAULT_DB_PATH: &str = "outputs.sqlite3";
const DEFAULT_PORT: u16 = 5901;
const DEFAULT_PENDING_BLOCKS: u64 = 0;
const DEFAULT_LOG_DIRECTIVE: &str = "info";
const ENV_PREFIX: &str = "RCT_MERKLE_FOREST_";

/// Reads the full configuration from CLI args, environment and defaults.
///
/// Short-circuits process execution if `--help`/`--version` is passed or the
/// command line could not be parsed.
///
/// # Errors
/// Returns an error if the assembled configuration fails to deserialize or
/// validate.
pub fn get() -> Result<Config, figment::Error> {
    let cli_args = cli::Args::parse();
    Config::with_cli(cli_args)
}

/// The single config for running the service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Path to the SQLite database holding `out_table`.
    pub db_path: String,
    /// Directory the binary row cache is written under and read from.
    pub data_dir: String,
    /// Port the HTTP API listens on.
    pub port: u16,
    /// How many trailing blocks, read-order, to hold back from the startup
    /// build and serve instead via `POST /update`.
    pub pending_blocks: u64,
    /// `tracing-subscriber` filter directive.
    pub log: String,
}

impl Config {
    /// Constructs [`Config`] with explicit CLI arguments.
    ///
    /// Kept private so that [`get`] is the only production entry point;
    /// tests call this directly with hand-built [`cli::Args`] values.
    fn with_cli(cli_args: cli::Args) -> Result<Config, figment::Error> {
        let rust_log = Env::prefixed("RUST_").split("_").only(&["log"]);
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(rust_log)
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(cli_args))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.into(),
            data_dir: default_data_dir(),
            port: DEFAULT_PORT,
            pending_blocks: DEFAULT_PENDING_BLOCKS,
            log: DEFAULT_LOG_DIRECTIVE.into(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rct-merkle-forest")
        .to_string_lossy()
        .into_owned()
}
