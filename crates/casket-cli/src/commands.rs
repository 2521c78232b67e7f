use std::sync::Arc;

use anyhow::{bail, Context as _};
use casket_address::{FileSource, ReqwestFetcher, UriIngester};
use casket_store::{
    compute_statistics, copy_all, BlobStore, CancellationToken, FanOut, StoreError,
};
use casket_types::{BlobKey, BlobMetadata, Properties, StatisticsSummary};
use colored::Colorize;
use tokio::io::AsyncWriteExt;

use crate::cli::*;
use crate::config::{CasketConfig, StoreRegistry};

/// Everything a command needs besides its own arguments.
pub struct Session {
    registry: StoreRegistry,
    store: Option<String>,
    format: OutputFormat,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(config: CasketConfig, store: Option<String>, format: OutputFormat) -> Self {
        Self {
            registry: StoreRegistry::new(config),
            store,
            format,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelled on Ctrl-C.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn fan_out(&self) -> FanOut {
        FanOut::new()
            .with_concurrency(self.registry.config().concurrency)
            .with_cancellation(self.cancel.clone())
    }

    fn json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CasketConfig::load(cli.config.as_deref())?;
    let session = Session::new(config, cli.store, cli.format);

    let cancel = session.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; cancelling");
            cancel.cancel();
        }
    });

    dispatch(&session, cli.command).await
}

pub async fn dispatch(session: &Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Put(args) => cmd_put(session, args).await,
        Command::Add(args) => cmd_add(session, args).await,
        Command::Fetch(args) => cmd_fetch(session, args).await,
        Command::Get(args) => cmd_get(session, args).await,
        Command::Stat(args) => cmd_stat(session, args).await,
        Command::Rm(args) => cmd_rm(session, args).await,
        Command::Ls(args) => cmd_ls(session, args).await,
        Command::Stats(args) => cmd_stats(session, args).await,
        Command::Copy(args) => cmd_copy(session, args).await,
    }
}

fn properties_from(args: PropertyArgs) -> Properties {
    let mut properties: Properties = args.props.into_iter().collect();
    if let Some(content_type) = args.content_type {
        properties.set_content_type(content_type);
    }
    properties
}

async fn cmd_put(session: &Session, args: PutArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let key = BlobKey::new(args.key)?;
    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    store
        .upload(&key, &mut file, &properties_from(args.properties))
        .await?;
    println!("{} {}", "✓ stored".green(), key.as_str().yellow());
    Ok(())
}

async fn cmd_add(session: &Session, args: AddArgs) -> anyhow::Result<()> {
    if args.files.is_empty() {
        bail!("nothing to add");
    }
    let store = session.registry.open(session.store.as_deref()).await?;
    let addresser = session.registry.addresser(store);
    let properties = properties_from(args.properties);
    for path in &args.files {
        let key = addresser
            .upload_content(&FileSource::new(path), &properties)
            .await
            .with_context(|| format!("adding {}", path.display()))?;
        println!("{}  {}", key.as_str().yellow(), path.display());
    }
    Ok(())
}

async fn cmd_fetch(session: &Session, args: FetchArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let addresser = Arc::new(session.registry.addresser(store));
    let ingester = UriIngester::new(addresser, Arc::new(ReqwestFetcher::new()));
    let key = ingester
        .upload_uri(&args.uri, &properties_from(args.properties))
        .await?;
    println!("{}  {}", key.as_str().yellow(), args.uri.blue());
    Ok(())
}

async fn cmd_get(session: &Session, args: GetArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let key = BlobKey::new(args.key)?;
    let found = match &args.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            let found = store.download(&key, &mut file).await?;
            if found.is_none() {
                drop(file);
                let _ = tokio::fs::remove_file(path).await;
            }
            found
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let found = store.download(&key, &mut stdout).await?;
            stdout.flush().await?;
            found
        }
    };
    if found.is_none() {
        bail!("no blob at {}", key);
    }
    Ok(())
}

async fn cmd_stat(session: &Session, args: StatArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let key = BlobKey::new(args.key)?;
    let Some(meta) = store.describe(&key).await? else {
        bail!("no blob at {}", key);
    };
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        print_metadata(&key, &meta);
    }
    Ok(())
}

fn print_metadata(key: &BlobKey, meta: &BlobMetadata) {
    println!("{}", key.as_str().yellow().bold());
    println!("  Size: {} bytes", meta.content_length().to_string().bold());
    println!("  Type: {}", meta.content_type().unwrap_or("(none)").cyan());
    for (name, value) in meta.properties() {
        println!("  {}: {}", name.dimmed(), value);
    }
}

async fn cmd_rm(session: &Session, args: RmArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    for raw in args.keys {
        let key = BlobKey::new(raw)?;
        store.delete(&key).await?;
        println!("{} {}", "removed".red(), key.as_str());
    }
    Ok(())
}

async fn cmd_ls(session: &Session, args: LsArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let keys = store.enumerate_keys();
    let limit = args.limit.unwrap_or(usize::MAX);
    let mut listed = Vec::new();
    while listed.len() < limit {
        match keys.next().await {
            Some(key) => listed.push(key?),
            None => break,
        }
    }
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    } else if listed.is_empty() {
        println!("No blobs.");
    } else {
        for key in &listed {
            println!("{}", key.as_str());
        }
    }
    Ok(())
}

async fn cmd_stats(session: &Session, args: StatsArgs) -> anyhow::Result<()> {
    let store = session.registry.open(session.store.as_deref()).await?;
    let summary = if args.listing {
        store.listing_statistics(session.cancellation()).await
    } else {
        compute_statistics(&store, &session.fan_out()).await
    };
    let summary = interrupted_or(summary)?;
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &StatisticsSummary) {
    println!("  Blobs: {}", summary.count.to_string().bold());
    println!("  Total: {} bytes", summary.total_size.to_string().bold());
    if summary.is_empty() {
        return;
    }
    println!("  Smallest: {} bytes", summary.min_size);
    println!("  Largest: {} bytes", summary.max_size);
    if let Some(average) = summary.average() {
        println!("  Average: {} bytes", average);
    }
}

async fn cmd_copy(session: &Session, args: CopyArgs) -> anyhow::Result<()> {
    let source = session.registry.open(session.store.as_deref()).await?;
    let dest = session.registry.open(Some(&args.to)).await?;
    if Arc::ptr_eq(&source, &dest) && args.prefix.is_none() {
        bail!("source and destination are the same store");
    }
    let prefix = args.prefix.unwrap_or_default();
    let report = interrupted_or(
        copy_all(
            &source,
            &dest,
            move |key: &BlobKey| {
                BlobKey::new(format!("{prefix}{key}")).unwrap_or_else(|_| key.clone())
            },
            &session.fan_out(),
        )
        .await,
    )?;
    println!(
        "{} Copied {} blobs to {} ({} vanished during copy)",
        "✓".green().bold(),
        report.copied.to_string().bold(),
        args.to.yellow(),
        report.skipped
    );
    Ok(())
}

fn interrupted_or<T>(result: Result<T, StoreError>) -> anyhow::Result<T> {
    match result {
        Err(StoreError::Cancelled) => bail!("interrupted"),
        other => Ok(other?),
    }
}
