use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "casket",
    about = "casket -- content-addressable blob stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file (defaults to ./casket.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store to operate on (defaults to the configured default store)
    #[arg(short, long, global = true)]
    pub store: Option<String>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload a file under an explicit key
    Put(PutArgs),
    /// Upload a file under its content-derived key
    Add(AddArgs),
    /// Fetch a URI and store its body by content
    Fetch(FetchArgs),
    /// Download a blob
    Get(GetArgs),
    /// Show a blob's metadata
    Stat(StatArgs),
    /// Delete blobs
    Rm(RmArgs),
    /// List keys
    Ls(LsArgs),
    /// Count and size every blob
    Stats(StatsArgs),
    /// Copy every blob into another store
    Copy(CopyArgs),
}

/// Properties shared by every upload command.
#[derive(Args, Clone, Debug, Default)]
pub struct PropertyArgs {
    /// Property as NAME=VALUE (repeatable)
    #[arg(short = 'p', long = "prop", value_parser = parse_property)]
    pub props: Vec<(String, String)>,
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    pub file: PathBuf,
    #[command(flatten)]
    pub properties: PropertyArgs,
}

#[derive(Args)]
pub struct AddArgs {
    pub files: Vec<PathBuf>,
    #[command(flatten)]
    pub properties: PropertyArgs,
}

#[derive(Args)]
pub struct FetchArgs {
    pub uri: String,
    #[command(flatten)]
    pub properties: PropertyArgs,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatArgs {
    pub key: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub keys: Vec<String>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct StatsArgs {
    /// Use sizes from the listing instead of describing every key
    #[arg(long)]
    pub listing: bool,
}

#[derive(Args)]
pub struct CopyArgs {
    /// Destination store name
    pub to: String,
    /// Prefix prepended to every destination key
    #[arg(long)]
    pub prefix: Option<String>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}
