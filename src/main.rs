use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jsonapi_handler::cache::{Cache, MokaCache, NullCache};
use jsonapi_handler::config;
use jsonapi_handler::database::{MemoryStore, PgStore, Store};
use jsonapi_handler::naming::{InflectorNames, NameMapper};
use jsonapi_handler::resource::{ResourceRegistry, RuleValidator};
use jsonapi_handler::{server, HandlerSettings, JsonApi, Services};

#[derive(Parser)]
#[command(name = "jsonapi-handler")]
#[command(about = "Serve JSON:API resources described in a YAML file")]
#[command(version)]
struct Cli {
    /// Port to listen on (overrides JSONAPI_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Resource definitions file (overrides JSONAPI_RESOURCES)
    #[arg(long)]
    resources: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and JSONAPI_* apply to cargo run
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config::config();
    tracing::info!("Starting jsonapi-handler in {:?} mode", config.environment);

    let names: Arc<dyn NameMapper> = Arc::new(InflectorNames);

    let registry = match cli.resources.or_else(|| config.resources.definitions_path.as_ref().map(PathBuf::from)) {
        Some(path) => ResourceRegistry::from_file(names.clone(), &path)
            .with_context(|| format!("loading resource definitions from {}", path.display()))?,
        None => ResourceRegistry::new(names.clone()),
    };
    if registry.is_empty() {
        tracing::warn!("No resources registered; every request will 404");
    }

    let store: Arc<dyn Store> = match &config.database.url {
        Some(url) => {
            let store = PgStore::connect(url, config.database.max_connections)
                .await
                .context("connecting to Postgres")?;
            store.health_check().await.context("Postgres health check")?;
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new().with_timestamps())
        }
    };

    let cache: Arc<dyn Cache> = if config.cache.enabled {
        Arc::new(MokaCache::new(config.cache.max_entries))
    } else {
        Arc::new(NullCache)
    };

    let api = JsonApi::new(Services {
        store,
        cache,
        validator: Arc::new(RuleValidator),
        names,
        registry: Arc::new(registry),
        settings: HandlerSettings::from_config(config),
    });

    let port = cli.port.unwrap_or(config.server.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, server::app(api, config)).await?;
    Ok(())
}
