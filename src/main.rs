use std::{fs::File, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchwrap::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, PgTitleCache, TitleCache},
    models::MediaKind,
    routes::{create_router, AppState},
    services::{
        providers::{MetadataProvider, TmdbProvider},
        seed::seed_catalog,
        ImportManager,
    },
};

#[derive(Parser, Debug)]
#[command(name = "watchwrap")]
#[command(about = "Viewing-history analytics service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Pre-fill the title cache from a `show_id,title` catalog CSV
    Seed {
        #[arg(value_enum)]
        kind: SeedKind,
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SeedKind {
    Series,
    Movie,
}

impl From<SeedKind> for MediaKind {
    fn from(kind: SeedKind) -> Self {
        match kind {
            SeedKind::Series => MediaKind::Series,
            SeedKind::Movie => MediaKind::Movie,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchwrap=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let title_cache: Arc<dyn TitleCache> = Arc::new(PgTitleCache::new(pool));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client);
    let provider: Arc<dyn MetadataProvider> = Arc::new(TmdbProvider::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
    ));

    let settings = config.resolver_settings()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let state = AppState {
                imports: ImportManager::new(
                    title_cache,
                    provider,
                    settings,
                    config.default_runtime_minutes,
                ),
            };
            let app = create_router(state);

            let addr = format!("{}:{}", config.host, config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;
            tracing::info!(addr = %addr, "Server listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
        }
        Command::Seed { kind, file } => {
            let reader = File::open(&file)
                .with_context(|| format!("Failed to open catalog {}", file.display()))?;
            let report = seed_catalog(
                reader,
                kind.into(),
                provider.as_ref(),
                title_cache.as_ref(),
                settings.throttle,
            )
            .await?;
            tracing::info!(seeded = report.seeded, skipped = report.skipped, "Catalog seeded");
        }
    }

    cache_writer.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
