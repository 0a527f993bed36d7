//! Drover: migration and backfill toolkit for a JSON document store.
//!
//! Subcommands:
//! - `migrate`: apply every pending migration (or `--list` them)
//! - `apply` / `revert`: address a single migration by name
//! - `status`: applied/pending split
//! - `backfill`: repair a missing derived field across a collection
//! - `sync-indexes`: reconcile the store's indexes with the declared set

use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_backfill::{BackfillOptions, BackfillSpec, slugify};
use drover_migrate::{ApplyReport, Registry, Runner};
use drover_store::HttpStore;
use drover_webhook::WebhookClient;

mod indexes;
mod migrations;

#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Migration and backfill toolkit for a JSON document store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration, in sequence order
    Migrate {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,

        /// List registered migrations and their status instead of applying
        #[arg(long)]
        list: bool,

        /// Webhook endpoint to notify with the apply report
        #[arg(long, env = "DROVER_NOTIFY_URL")]
        notify_url: Option<String>,
    },

    /// Apply a single migration by name, ignored ones included
    Apply {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,

        /// Migration name
        #[arg(value_name = "MIGRATION")]
        name: String,
    },

    /// Revert a single applied migration by name
    Revert {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,

        /// Migration name
        #[arg(value_name = "MIGRATION")]
        name: String,
    },

    /// Show applied and pending migrations
    Status {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,
    },

    /// Backfill a missing derived field across a collection
    Backfill {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,

        /// Collection to scan
        #[arg(long, default_value = "lists")]
        collection: String,

        /// Field the missing value is derived from
        #[arg(long, default_value = "title")]
        source_field: String,

        /// Field to repair
        #[arg(long, default_value = "slug")]
        target_field: String,

        /// Bound on simultaneously in-flight repairs
        #[arg(long, default_value = "10")]
        concurrency: usize,
    },

    /// Reconcile the store's indexes with the declared set
    SyncIndexes {
        /// Document store base URL
        #[arg(long, env = "DROVER_STORE_URL")]
        store_url: String,

        /// Bearer token for the store API
        #[arg(long, env = "DROVER_STORE_TOKEN")]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "drover=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            store_url,
            token,
            list,
            notify_url,
        } => run_migrate(&store_url, token, list, notify_url).await,

        Commands::Apply {
            store_url,
            token,
            name,
        } => run_apply(&store_url, token, &name).await,

        Commands::Revert {
            store_url,
            token,
            name,
        } => run_revert(&store_url, token, &name).await,

        Commands::Status { store_url, token } => run_status(&store_url, token).await,

        Commands::Backfill {
            store_url,
            token,
            collection,
            source_field,
            target_field,
            concurrency,
        } => {
            run_backfill(
                &store_url,
                token,
                collection,
                source_field,
                target_field,
                concurrency,
            )
            .await
        }

        Commands::SyncIndexes { store_url, token } => run_sync_indexes(&store_url, token).await,
    }
}

fn connect(store_url: &str, token: Option<String>) -> HttpStore {
    let store = HttpStore::new(store_url);
    match token {
        Some(token) => store.with_token(token),
        None => store,
    }
}

fn load_registry() -> Result<Registry> {
    Registry::new(migrations::available_migrations()).map_err(|e| miette::miette!("{}", e))
}

async fn run_migrate(
    store_url: &str,
    token: Option<String>,
    list: bool,
    notify_url: Option<String>,
) -> Result<()> {
    let store = connect(store_url, token);
    let registry = load_registry()?;
    let runner = Runner::new(&registry, &store);

    if list {
        let status = runner.status().await.map_err(|e| miette::miette!("{}", e))?;
        println!("Registered migrations:\n");
        for migration in registry.list() {
            let state = if migration.ignored() {
                "[IGNORED]"
            } else if status.applied.iter().any(|name| name == migration.name()) {
                "[APPLIED]"
            } else {
                "[PENDING]"
            };
            println!("  {} {}", state, migration.name());
            println!("      {}\n", migration.description());
        }
        return Ok(());
    }

    let report = runner
        .apply_pending()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    for name in &report.applied {
        println!("Applied: {}", name);
    }
    if report.applied.is_empty() && report.failed.is_none() {
        println!("No pending migrations to run.");
    }

    if let Some(url) = notify_url {
        notify(&url, &report).await;
    }

    if let Some(failed) = report.failed {
        return Err(miette::miette!("{}", failed.error));
    }
    Ok(())
}

/// Best effort: a lost notification never fails the migration pass itself.
async fn notify(url: &str, report: &ApplyReport) {
    let payload = serde_json::json!({
        "applied": report.applied,
        "failed": report.failed.as_ref().map(|failed| failed.name.clone()),
    });
    if let Err(e) = WebhookClient::new(url).deliver(&payload).await {
        tracing::warn!(error = %e, "failed to deliver migration report webhook");
    }
}

async fn run_apply(store_url: &str, token: Option<String>, name: &str) -> Result<()> {
    let store = connect(store_url, token);
    let registry = load_registry()?;
    let runner = Runner::new(&registry, &store);

    runner
        .apply(name)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("Applied: {}", name);
    Ok(())
}

async fn run_revert(store_url: &str, token: Option<String>, name: &str) -> Result<()> {
    let store = connect(store_url, token);
    let registry = load_registry()?;
    let runner = Runner::new(&registry, &store);

    runner
        .revert(name)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!("Reverted: {}", name);
    Ok(())
}

async fn run_status(store_url: &str, token: Option<String>) -> Result<()> {
    let store = connect(store_url, token);
    let registry = load_registry()?;
    let runner = Runner::new(&registry, &store);

    let status = runner.status().await.map_err(|e| miette::miette!("{}", e))?;

    println!("Applied migrations:");
    if status.applied.is_empty() {
        println!("  (none)");
    }
    for name in &status.applied {
        println!("  {}", name);
    }

    println!("\nPending migrations:");
    if status.pending.is_empty() {
        println!("  (none)");
    }
    for name in &status.pending {
        println!("  {}", name);
    }
    Ok(())
}

async fn run_backfill(
    store_url: &str,
    token: Option<String>,
    collection: String,
    source_field: String,
    target_field: String,
    concurrency: usize,
) -> Result<()> {
    let store = connect(store_url, token);
    let spec = BackfillSpec::new(collection, source_field, target_field);

    // Ctrl-C stops new dispatches; in-flight repairs drain before the
    // partial summary is printed.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let options = BackfillOptions {
        concurrency,
        cancel: Some(cancel_rx),
        ..Default::default()
    };

    let derive = |value: &serde_json::Value| {
        value
            .as_str()
            .map(|text| serde_json::Value::String(slugify(text)))
    };

    let mut bar = ProgressBar::new_spinner();
    let summary = drover_backfill::run(&store, &spec, &derive, options, &mut bar)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    bar.finish_and_clear();

    println!("Backfill finished:");
    println!("  scanned:  {}", summary.total_scanned);
    println!("  repaired: {}", summary.succeeded);
    println!("  skipped:  {}", summary.skipped_already_present);
    println!("  failed:   {}", summary.failed);
    if summary.cancelled {
        println!("  (cancelled before the scan finished)");
    }

    if summary.failed > 0 {
        return Err(miette::miette!(
            "{} document(s) could not be repaired",
            summary.failed
        ));
    }
    Ok(())
}

async fn run_sync_indexes(store_url: &str, token: Option<String>) -> Result<()> {
    let store = connect(store_url, token);
    let reports = indexes::declared()
        .sync_all(&store)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    for (collection, report) in &reports {
        if report.is_noop() {
            println!("{}: up to date", collection);
            continue;
        }
        for name in &report.dropped {
            println!("{}: dropped index {}", collection, name);
        }
        for name in &report.created {
            println!("{}: created index {}", collection, name);
        }
    }
    Ok(())
}
