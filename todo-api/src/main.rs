//! # Todo API Server
//!
//! Personal task tracking backend: accounts (password and WeChat login),
//! tasks and task categories behind a JSON API.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p todo-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines and `RUST_LOG` to override the
//! default filter.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use todo_api::{
    app::{build_router, AppState},
    config::Config,
};
use todo_shared::{
    db::{migrations, pool},
    mail::{LogMailer, Mailer, SmtpMailer},
    redis::RedisClient,
    wechat::WechatClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "todo_api=debug,todo_shared=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Todo API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;

    if config.database.create_if_missing {
        migrations::ensure_database_exists(&config.database.url)
            .await
            .context("Failed to create database")?;
    }

    let db = pool::create_pool(config.pool_config())
        .await
        .context("Failed to connect to database")?;
    migrations::run_migrations(&db)
        .await
        .context("Failed to run migrations")?;

    let status = migrations::get_migration_status(&db)
        .await
        .context("Failed to read migration status")?;
    tracing::info!(
        applied = status.applied_migrations,
        latest_version = ?status.latest_version,
        up_to_date = status.is_up_to_date,
        "Database schema ready"
    );

    // Redis is only needed once requests arrive
    let redis = RedisClient::lazy(config.redis.clone()).context("Invalid Redis configuration")?;
    if let Err(e) = redis.ping().await {
        tracing::warn!(error = %e, "Redis not reachable at startup");
    }

    let mailer: Arc<dyn Mailer> = match &config.mail.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Using SMTP mailer");
            Arc::new(SmtpMailer::new(smtp).context("Invalid SMTP configuration")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, password reset mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    let wechat = WechatClient::new(config.wechat.clone()).context("Failed to build WeChat client")?;

    let bind_address = config.bind_address();
    let state = AppState::new(db.clone(), redis, config, mailer, Arc::new(wechat));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
