//! Tidechat server binary.
//!
//! Loads configuration, wires the Postgres store and the DeepSeek provider
//! into the chat routes, and serves them over axum.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tidechat::adapters::ai::{DeepSeekConfig, DeepSeekProvider};
use tidechat::adapters::http::{chat_router, AppState};
use tidechat::adapters::postgres::PostgresConversationStore;
use tidechat::config::AppConfig;
use tidechat::domain::conversation::{ContextAssembler, ContextPolicy};
use tidechat::ports::AiProvider;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    // One provider client for the whole process, shared by reference into
    // every session.
    let api_key = config.ai.api_key.clone().unwrap_or_default();
    let provider = DeepSeekProvider::new(
        DeepSeekConfig::new(api_key)
            .with_base_url(&config.ai.base_url)
            .with_model(&config.ai.model)
            .with_temperature(config.ai.temperature)
            .with_timeout(config.ai.timeout())
            .with_max_retries(config.ai.max_retries),
    )?;
    tracing::info!(
        provider = %provider.provider_info().name,
        model = %provider.provider_info().model,
        "AI provider ready"
    );

    let assembler = ContextAssembler::new(
        ContextPolicy::new(&config.chat.system_prompt)
            .with_window_size(config.chat.window_size)
            .with_max_context_chars(config.chat.max_context_chars),
    );

    let state = AppState {
        store: Arc::new(PostgresConversationStore::new(pool)),
        provider: Arc::new(provider),
        assembler,
        session_timeout: config.chat.session_timeout(),
    };

    let cors = if config.server.cors_origins_list().is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins_list()
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
    };

    let app = chat_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .with_state(state);

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
