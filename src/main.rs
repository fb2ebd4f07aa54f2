use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasksync::provider::{HttpProvider, RemoteProvider};
use tasksync::sync::{spawn_scheduler, SyncEngine};
use tasksync::{api, mcp, Config};
use tasksync_core::reconcile::Reconciler;
use tasksync_core::{Database, TaxonomyHandle};

#[derive(Parser)]
#[command(name = "tsync")]
#[command(about = "Keep a classified local mirror of your remote task manager")]
struct Cli {
    /// Path to config.toml (defaults to $TASKSYNC_CONFIG, then the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the sync scheduler
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Run one sync pass and print the result
    Sync,
    /// Show what changed on a task since the last sync
    Changes {
        task_id: String,
    },
    /// List tasks whose project disagrees with their recommended category
    Conflicts,
    /// Start MCP server via stdio
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP speaks over stdout; keep logs on stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tasksync=debug,tasksync_core=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let engine = Arc::new(build_engine(&config)?);

    match cli.command.unwrap_or(Commands::Serve { port: 3000 }) {
        Commands::Serve { port } => {
            tracing::info!("Starting tasksync server on port {}", port);

            if let Some(every) = config.sync.interval() {
                spawn_scheduler(engine.clone(), every);
            }

            let app = api::create_router(engine, Config::resolve_path(cli.config.as_deref()));

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("tasksync server listening on http://127.0.0.1:{}", port);

            axum::serve(listener, app).await?;
        }
        Commands::Sync => {
            let result = engine.sync_now().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(error) = result.error {
                anyhow::bail!(error);
            }
        }
        Commands::Changes { task_id } => match engine.analyze_task(&task_id)? {
            Some(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
            None => anyhow::bail!("task {} not found", task_id),
        },
        Commands::Conflicts => {
            let conflicts = engine.find_conflicts()?;
            println!("{}", serde_json::to_string_pretty(&conflicts)?);
        }
        Commands::Mcp => {
            mcp::run_stdio_server(engine).await?;
        }
    }

    Ok(())
}

fn build_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let db = match &config.storage.database_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;

    let provider: Option<Arc<dyn RemoteProvider>> = match config.api_token() {
        Some(token) => Some(Arc::new(HttpProvider::new(
            &config.provider.base_url,
            token,
            config.provider.timeout(),
        )?)),
        None => {
            tracing::warn!("No API token configured; running standalone");
            None
        }
    };

    let taxonomy = TaxonomyHandle::new(config.build_taxonomy()?);

    Ok(SyncEngine::new(db, provider, taxonomy)
        .with_reconciler(Reconciler::new(config.reconcile))
        .with_request_timeout(config.provider.timeout()))
}
