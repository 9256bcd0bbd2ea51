use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use depot_client::{
    snapshot_directory, unpack_archive, Blob, CommitProposal, DepotClient, ObjectHash,
};
use depot_server::{DepotServer, ServerConfig};
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Push(args) => cmd_push(args, &format).await,
        Command::Pull(args) => cmd_pull(args, &format).await,
        Command::List(args) => cmd_list(args, &format).await,
        Command::HashObject(args) => cmd_hash_object(args, &format),
    }
}

fn client(remote: &RemoteArgs) -> DepotClient {
    DepotClient::new(remote.server.clone())
        .with_framing(remote.framing)
        .with_timeout(Duration::from_secs(remote.timeout))
}

/// Config file (or defaults) with command-line overrides applied.
pub fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = &args.root {
        config.repos_root = root.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(framing) = args.framing {
        config.framing = framing;
    }
    if args.trust_hashes {
        config.verify_hashes = false;
    }
    if args.trailing_ack {
        config.compat.trailing_ack = true;
    }
    if args.report_errors {
        config.compat.report_errors = true;
    }
    config.validate()?;
    debug!(?config, "server configuration resolved");
    Ok(config)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(&args)?;
    let server = DepotServer::bind(config).await?;
    println!(
        "{} depot server on {} (root: {})",
        "✓".green().bold(),
        server.local_addr()?.to_string().bold(),
        server.config().repos_root.display()
    );
    server.serve().await?;
    Ok(())
}

async fn cmd_push(args: PushArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut proposal =
        CommitProposal::new(args.message.unwrap_or_else(|| "No message".into()));
    if let Some(author) = args.author {
        proposal = proposal.with_author(author);
    }
    if let Some(parent) = args.parent {
        proposal = proposal.with_parent(parent);
    }

    let summary = client(&args.remote)
        .push_directory(&args.repository, &args.path, &proposal)
        .await
        .with_context(|| format!("pushing {} to {}", args.path.display(), args.remote.server))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "repository": args.repository.as_str(),
                "commit": summary.commit.to_hex(),
                "rootTree": summary.root_tree.to_hex(),
                "blobs": summary.blobs,
                "trees": summary.trees,
            })
        ),
        OutputFormat::Text => {
            println!(
                "{} Pushed {} to {}",
                "✓".green().bold(),
                args.path.display(),
                args.repository.as_str().bold()
            );
            println!("  Commit: {}", summary.commit.to_hex().yellow());
            println!("  Tree: {}", summary.root_tree.to_hex().cyan());
            println!("  Objects: {} blobs, {} trees", summary.blobs, summary.trees);
        }
    }
    Ok(())
}

async fn cmd_pull(args: PullArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let archive = client(&args.remote)
        .pull_repository(&args.repository)
        .await
        .with_context(|| format!("pulling {}", args.repository))?;
    let unpacked = unpack_archive(&archive, &args.dest)
        .with_context(|| format!("unpacking into {}", args.dest.display()))?;
    let target = args.dest.join(args.repository.as_str());

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "repository": args.repository.as_str(),
                "path": target.display().to_string(),
                "entries": unpacked.len(),
                "bytes": archive.len(),
            })
        ),
        OutputFormat::Text => println!(
            "{} Pulled {} into {} ({} entries)",
            "✓".green().bold(),
            args.repository.as_str().bold(),
            target.display(),
            unpacked.len()
        ),
    }
    Ok(())
}

async fn cmd_list(args: ListArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let names = client(&args.remote)
        .list_repositories()
        .await
        .with_context(|| format!("listing repositories on {}", args.remote.server))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&names)?),
        OutputFormat::Text if names.is_empty() => println!("No repositories."),
        OutputFormat::Text => {
            for name in &names {
                println!("  {}", name.bold());
            }
        }
    }
    Ok(())
}

/// Blob hash for a file, root tree hash for a directory.
pub fn hash_path(path: &Path) -> anyhow::Result<(ObjectHash, &'static str)> {
    if path.is_dir() {
        let snapshot = snapshot_directory(path)?;
        Ok((snapshot.root_hash(), "tree"))
    } else {
        let content =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok((Blob::new(content).hash(), "blob"))
    }
}

fn cmd_hash_object(args: HashObjectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut hashes = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let (hash, kind) = hash_path(path)?;
        hashes.push((path.display().to_string(), hash, kind));
    }

    match format {
        OutputFormat::Json => {
            let docs: Vec<_> = hashes
                .iter()
                .map(|(path, hash, kind)| {
                    serde_json::json!({"path": path, "hash": hash.to_hex(), "kind": kind})
                })
                .collect();
            println!("{}", serde_json::to_string(&docs)?);
        }
        OutputFormat::Text => {
            for (path, hash, kind) in &hashes {
                println!("{}  {} {}", hash.to_hex().yellow(), kind.dimmed(), path);
            }
        }
    }
    Ok(())
}
