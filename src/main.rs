use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docflow::ai::HttpContentSource;
use docflow::api::{self, AppState};
use docflow::config::Config;
use docflow::db::Database;
use docflow::error::AiError;
use docflow::session::SessionConfig;

#[derive(Parser)]
#[command(name = "docflow")]
#[command(about = "Document lifecycle and workflow engine for quotations, contracts, invoices and receipts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (overrides DOCFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "docflow=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    let mut state = AppState::new(db, SessionConfig::from(&config));
    match HttpContentSource::from_config(&config) {
        Ok(source) => {
            tracing::info!("AI generation enabled");
            state = state.with_ai_source(Arc::new(source));
        }
        Err(AiError::NotConfigured) => {
            tracing::info!("DOCFLOW_AI_URL not set, AI generation disabled");
        }
        Err(e) => return Err(e.into()),
    }
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
    tracing::info!("docflow listening on http://127.0.0.1:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Migrate) => {
            open_database(&config)?;
            tracing::info!("Migrations applied");
        }
        None => serve(config).await?,
    }

    Ok(())
}
