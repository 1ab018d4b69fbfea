use clap::Parser;
use serde::Serialize;

/// Serves an authenticated index over a RingCT-style UTXO set.
#[derive(Debug, Parser, Serialize)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Path to the SQLite database holding `out_table`.
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub(crate) db_path: Option<String>,

    /// Directory the binary row cache is written under and read from.
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub(crate) data_dir: Option<String>,

    /// Port the HTTP API listens on.
    #[arg(short, long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub(crate) port: Option<u16>,

    /// How many trailing blocks to hold back for `POST /update` instead of
    /// building them into the forest at startup.
    #[arg(long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub(crate) pending_blocks: Option<u64>,

    /// Log filter directive, e.g. `info` or `rct_merkle_forest=debug`.
    #[arg(short, long)]
    #[serde(skip_serializing_if = "::std::option::Option::is_none")]
    pub(crate) log: Option<String>,
}
