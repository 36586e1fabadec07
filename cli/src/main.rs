//! tokenlog CLI: backfill ERC-20 `Transfer` events into SQLite.
//!
//! Usage:
//! ```bash
//! # Backfill USDC transfers from block 19,000,000 to the chain head
//! tokenlog sync --rpc https://cloudflare-eth.com \
//!     --token 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48 \
//!     --from 19000000 --decimals 6 --db ./usdc.db
//!
//! # Inspect what was stored
//! tokenlog count --db ./usdc.db
//! tokenlog show 0x5c50...e1f --db ./usdc.db
//! ```

use std::env;
use std::process;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tokenlog_core::config::{SyncConfig, DEFAULT_COLLECTION};
use tokenlog_core::store::EventStore;
use tokenlog_core::types::BlockTag;
use tokenlog_evm::{HttpLogSource, SyncBuilder};
use tokenlog_storage::SqliteEventStore;

const DEFAULT_DB: &str = "./tokenlog.db";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    init_tracing(has_flag(&args, "--json-logs"));

    debug!(command = %args[1], "dispatching");
    let result = match args[1].as_str() {
        "sync" => cmd_sync(&args[2..]).await,
        "count" => cmd_count(&args[2..]).await,
        "show" => cmd_show(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("tokenlog {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print_usage() {
    println!("tokenlog {}", env!("CARGO_PKG_VERSION"));
    println!("Backfill ERC-20 Transfer events into SQLite\n");
    println!("USAGE:");
    println!("    tokenlog <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    sync        Fetch transfers for a block range and store them");
    println!("    count       Number of stored transactions");
    println!("    show <TX>   Print the transfers stored for one transaction");
    println!("    info        Show defaults and supported backends");
    println!("    version     Print version");
    println!("    help        Print this help\n");
    println!("SYNC FLAGS:");
    println!("    --config <FILE>       JSON config; flags below override it");
    println!("    --rpc <URL>           RPC endpoint URL  [required]");
    println!("    --token <ADDRESS>     Token contract    [required]");
    println!("    --from <BLOCK>        First block (default 0)");
    println!("    --to <BLOCK|latest>   Last block, inclusive (default latest)");
    println!("    --chunk <N>           Blocks per getLogs request (default 2000)");
    println!("    --decimals <N>        Token decimals (default 18)");
    println!("    --concurrency <N>     Max requests in flight (default 8)");
    println!("    --chain <NAME>        Chain label for logs (default ethereum)\n");
    println!("STORAGE FLAGS:");
    println!("    --db <PATH>           SQLite file (default {DEFAULT_DB})");
    println!("    --collection <NAME>   Table name (default {DEFAULT_COLLECTION})\n");
    println!("GLOBAL FLAGS:");
    println!("    --json-logs           Emit JSON logs (level via RUST_LOG)");
}

async fn cmd_sync(args: &[String]) -> Result<()> {
    let base = match parse_flag(args, "--config") {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            SyncConfig::from_json(&text)?
        }
        None => SyncConfig::default(),
    };
    let config = apply_flags(base, args)?;
    if config.rpc_url.is_empty() {
        bail!("--rpc is required");
    }

    log_sync_start(&config);
    let source = HttpLogSource::default_for(config.rpc_url.clone())?;
    let store = open_store(args, &config.collection).await?;
    let sync = SyncBuilder::from_config(config).build(source, store)?;

    let summary = sync.run().await?;
    let written = summary.persisted.written;
    info!(range = %summary.range, written, "sync finished");

    println!("Range:    {}", summary.range);
    println!("Chunks:   {}", summary.chunks);
    println!("Events:   {}", summary.events);
    println!("Groups:   {}", summary.groups);
    println!("Written:  {written}");
    println!("Skipped:  {}", summary.persisted.skipped);
    if summary.persisted.failed > 0 {
        println!("Failed:   {} (see log)", summary.persisted.failed);
    }
    Ok(())
}

fn log_sync_start(config: &SyncConfig) {
    info!(
        rpc = %config.rpc_url,
        token = %config.token_address,
        from = config.from_block,
        to = %config.to_block,
        collection = %config.collection,
        "starting sync"
    );
}

async fn cmd_count(args: &[String]) -> Result<()> {
    let collection = parse_flag(args, "--collection").unwrap_or_else(|| DEFAULT_COLLECTION.into());
    let store = open_store(args, &collection).await?;
    store.ensure_collection().await?;
    println!("{}", store.count().await?);
    Ok(())
}

async fn cmd_show(args: &[String]) -> Result<()> {
    let tx_hash = match args.first() {
        Some(a) if !a.starts_with("--") => a.clone(),
        _ => bail!("usage: tokenlog show <TX_HASH> [--db PATH] [--collection NAME]"),
    };
    let collection = parse_flag(args, "--collection").unwrap_or_else(|| DEFAULT_COLLECTION.into());
    let store = open_store(args, &collection).await?;
    store.ensure_collection().await?;

    match store.get_entry(&tx_hash).await? {
        Some(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry.records)?);
            Ok(())
        }
        None => bail!("no transfers stored for {tx_hash}"),
    }
}

fn cmd_info() {
    let defaults = SyncConfig::default();
    println!("tokenlog v{}", env!("CARGO_PKG_VERSION"));
    println!("  Event:                 {}", defaults.event_signature);
    println!("  Default chunk size:    {} blocks/call", defaults.chunk_size);
    println!("  Default concurrency:   {} requests", defaults.max_concurrency);
    println!("  Default decimals:      {}", defaults.decimals);
    println!("  Default collection:    {}", defaults.collection);
    println!("  Storage backends:      SQLite (feature: sqlite)");
}

async fn open_store(args: &[String], collection: &str) -> Result<SqliteEventStore> {
    let db = parse_flag(args, "--db").unwrap_or_else(|| DEFAULT_DB.into());
    let store = SqliteEventStore::open(&db)
        .await
        .with_context(|| format!("opening {db}"))?
        .with_collection(collection)?;
    Ok(store)
}

/// Overlay command-line flags on `config`.
fn apply_flags(config: SyncConfig, args: &[String]) -> Result<SyncConfig> {
    let mut builder = SyncBuilder::from_config(config);

    if let Some(url) = parse_flag(args, "--rpc") {
        builder = builder.rpc_url(url);
    }
    if let Some(token) = parse_flag(args, "--token") {
        builder = builder.token(token);
    }
    if let Some(chain) = parse_flag(args, "--chain") {
        builder = builder.chain(chain);
    }
    if let Some(from) = parse_flag(args, "--from") {
        builder = builder.from_block(from.parse().with_context(|| format!("--from {from}"))?);
    }
    if let Some(to) = parse_flag(args, "--to") {
        let tag: BlockTag = to.parse().with_context(|| format!("--to {to}"))?;
        builder = builder.to_block(tag);
    }
    if let Some(chunk) = parse_flag(args, "--chunk") {
        builder = builder.chunk_size(chunk.parse().with_context(|| format!("--chunk {chunk}"))?);
    }
    if let Some(d) = parse_flag(args, "--decimals") {
        builder = builder.decimals(d.parse().with_context(|| format!("--decimals {d}"))?);
    }
    if let Some(n) = parse_flag(args, "--concurrency") {
        builder = builder.max_concurrency(n.parse().with_context(|| format!("--concurrency {n}"))?);
    }
    if let Some(name) = parse_flag(args, "--collection") {
        builder = builder.collection(name);
    }

    Ok(builder.build_config())
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
