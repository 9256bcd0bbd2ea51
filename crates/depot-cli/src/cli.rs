use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use depot_client::{Framing, ObjectHash, RepoName};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "Depot: a minimal content-addressed version store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Shorthand for `--log-level debug`
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the depot server
    Serve(ServeArgs),
    /// Upload a directory as a new commit
    Push(PushArgs),
    /// Download a repository archive and unpack it
    Pull(PullArgs),
    /// List repositories on a server
    List(ListArgs),
    /// Print the object hash of files or directories
    HashObject(HashObjectArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub framing: Option<Framing>,
    /// Store objects under the client's hash without recomputing it
    #[arg(long)]
    pub trust_hashes: bool,
    /// Send the acknowledgement after pull and list payloads too
    #[arg(long)]
    pub trailing_ack: bool,
    /// Answer failures with an error document instead of the acknowledgement
    #[arg(long)]
    pub report_errors: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RemoteArgs {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9000")]
    pub server: String,
    #[arg(long, default_value = "length-prefixed")]
    pub framing: Framing,
    /// Timeout for each request, in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

#[derive(Args)]
pub struct PushArgs {
    pub repository: RepoName,
    /// Directory to push
    #[arg(default_value = ".")]
    pub path: PathBuf,
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    /// Hash of the previous commit
    #[arg(long)]
    pub parent: Option<ObjectHash>,
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args)]
pub struct PullArgs {
    pub repository: RepoName,
    /// Directory to unpack into; the archive creates `<dest>/<repository>/`
    #[arg(short, long, default_value = ".")]
    pub dest: PathBuf,
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args)]
pub struct HashObjectArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}
