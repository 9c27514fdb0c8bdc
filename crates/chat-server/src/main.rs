use std::net::SocketAddr;
use std::sync::Arc;

use chat_server::http::{self, AppState};
use shared::config::{ApiConfig, LogFormat, StoreConfig};
use shared::llm::{OpenRouterGateway, OpenRouterGatewayConfig};
use shared::repos::{
    MemoryTranscriptStore, PostgresTranscriptStore, RedisTranscriptStore, TranscriptStore,
};
use shared::session::SessionRegistry;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "chat_server=debug,shared=info,tower_http=info";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let log_format = LogFormat::from_env();
    init_tracing(log_format.as_ref().copied().unwrap_or(LogFormat::Text));

    let config = match log_format.and_then(|_| ApiConfig::from_env()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let store = match connect_store(&config.store).await {
        Ok(store) => store,
        Err(message) => {
            error!("{message}");
            std::process::exit(1);
        }
    };

    let gateway_config = match OpenRouterGatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read generative backend config: {err}");
            std::process::exit(1);
        }
    };
    let gateway = match OpenRouterGateway::new(gateway_config) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build generative backend client: {err}");
            std::process::exit(1);
        }
    };
    let model_name = gateway.primary_model().to_string();

    let app = http::build_router(AppState {
        sessions: SessionRegistry::new(store, Arc::new(gateway), Arc::new(config.session)),
        model_name,
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid API_BIND_ADDR '{}': {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        store_backend = config.store.backend().as_str(),
        "chat server listening on {}",
        listener.local_addr().unwrap_or(addr)
    );

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server stopped with error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(log_format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn TranscriptStore>, String> {
    match config {
        StoreConfig::Postgres(postgres) => {
            let store =
                PostgresTranscriptStore::connect(&postgres.database_url, postgres.max_connections)
                    .await
                    .map_err(|err| format!("failed to connect to postgres: {err}"))?;
            store
                .run_migrations(&postgres.migrations_dir)
                .await
                .map_err(|err| format!("failed to run migrations: {err}"))?;
            Ok(Arc::new(store))
        }
        StoreConfig::Redis(redis) => {
            let store = RedisTranscriptStore::connect(&redis.redis_url, &redis.key_prefix)
                .await
                .map_err(|err| format!("failed to connect to redis: {err}"))?;
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => {
            warn!("using in-memory session store; transcripts are lost on restart");
            Ok(Arc::new(MemoryTranscriptStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
