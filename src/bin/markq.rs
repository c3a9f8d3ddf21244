//! markq CLI — operator interface to the completion-ledger pipeline.

use clap::{Parser, Subcommand};
use markq::config::Config;
use markq::config::tables::TableRegistry;
use markq::engine::{AttachmentStore, CycleOutcome, DrainConfig, Drainer, Dispatcher};
use markq::store::Store;
use markq::telemetry::init_logging;
use std::io::Read as _;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "markq", about = "Write pipeline for a shared completion ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the drain daemon
    Serve,
    /// Run exactly one drain cycle and report what it did
    Drain,
    /// Create the configured sheets that declare a header row
    Init,
    /// Dispatch one request body (JSON), from the argument or stdin
    Submit {
        /// Request body; reads stdin when omitted
        body: Option<String>,
    },
    /// Queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Show the most recent history entries
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Number of entries waiting
    Len,
    /// Show the first entries without removing them
    Peek {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

struct App {
    config: Config,
    store: Arc<Store>,
    registry: Arc<TableRegistry>,
}

impl App {
    fn load() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        let registry = Arc::new(TableRegistry::load(&config.tables_path)?);
        let store = Arc::new(Store::open(&config.db_path)?);
        Ok(Self {
            config,
            store,
            registry,
        })
    }

    fn attachments(&self) -> AttachmentStore {
        AttachmentStore::new(
            self.config.attachment_dir.clone(),
            self.config.attachment_base_url.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Drain => cmd_drain().await,
        Command::Init => cmd_init(),
        Command::Submit { body } => cmd_submit(body),
        Command::Queue { action } => cmd_queue(action),
        Command::History { limit } => cmd_history(limit),
    }
}

async fn cmd_serve() -> anyhow::Result<()> {
    let app = App::load()?;
    init_logging(&app.config.log_level)?;

    let drainer = Arc::new(Drainer::new(
        app.store.clone(),
        app.registry.clone(),
        app.attachments(),
        DrainConfig::from(&app.config),
        Arc::new(tokio::sync::Mutex::new(())),
    ));

    let handle = drainer.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    drainer.run().await?;
    Ok(())
}

async fn cmd_drain() -> anyhow::Result<()> {
    let app = App::load()?;
    init_logging(&app.config.log_level)?;

    let drainer = Drainer::new(
        app.store.clone(),
        app.registry.clone(),
        app.attachments(),
        DrainConfig::from(&app.config),
        Arc::new(tokio::sync::Mutex::new(())),
    );

    match drainer.drain_once().await? {
        CycleOutcome::LockDenied => println!("Lock denied, no work performed."),
        CycleOutcome::Drained {
            attempted,
            applied,
            skipped,
        } => println!("Drained: {attempted} attempted, {applied} applied, {skipped} skipped."),
    }
    Ok(())
}

fn cmd_init() -> anyhow::Result<()> {
    let app = App::load()?;

    for binding in app.registry.bindings() {
        if binding.columns.is_empty() {
            println!("Skipped {} (no columns declared)", binding.name);
            continue;
        }
        app.store.create_sheet(&binding.sheet, &binding.columns)?;
        println!("Created {} → sheet '{}'", binding.name, binding.sheet);
    }
    Ok(())
}

fn cmd_submit(body: Option<String>) -> anyhow::Result<()> {
    let app = App::load()?;

    let body = match body {
        Some(body) => body,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let dispatcher = Dispatcher::new(app.store.clone(), app.registry.clone(), app.attachments());
    let response = dispatcher.handle_body(&body);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn cmd_queue(action: QueueAction) -> anyhow::Result<()> {
    let app = App::load()?;

    match action {
        QueueAction::Len => {
            println!("{}", app.store.queue_len()?);
        }
        QueueAction::Peek { limit } => {
            let entries = app.store.queue_read_prefix(limit)?;
            if entries.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            for entry in entries {
                println!("{:>6}  {}", entry.pos, entry.body);
            }
        }
    }
    Ok(())
}

fn cmd_history(limit: usize) -> anyhow::Result<()> {
    let app = App::load()?;

    let entries = app.store.history_tail(limit)?;
    if entries.is_empty() {
        println!("No history entries.");
        return Ok(());
    }

    println!(
        "{:<20}  {:<10}  {:<12}  {:<12}  DESCRIPTION",
        "TIMESTAMP", "SYSTEM", "TASK", "CHANGED_BY"
    );
    println!("{}", "-".repeat(90));
    for entry in &entries {
        println!(
            "{:<20}  {:<10}  {:<12}  {:<12}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.system_type,
            entry.task_ref,
            entry.changed_by,
            entry.description
        );
    }
    println!("\n{} entry(ies)", entries.len());
    Ok(())
}
