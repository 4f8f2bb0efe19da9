//! Manju API server binary.
//!
//! Loads `.env`, reads configuration from the environment, runs migrations
//! and serves the auth and vault API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use manju_api::AppState;
use manju_api::config::ApiConfig;
use manju_core::store::{MemoryStore, PgStore};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "manju_api_server", about = "Manju auth and API key vault server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL. Overrides `DATABASE_URL`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Keep everything in process memory instead of PostgreSQL. Data is lost
    /// on exit; for local development only.
    #[arg(long, env = "IN_MEMORY", default_value_t = false)]
    in_memory: bool,

    /// Seconds between expired-session sweeps (0 disables the sweep).
    #[arg(long, env = "SESSION_SWEEP_SECS", default_value_t = 300)]
    session_sweep_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,manju_api=debug,manju_core=debug"))?,
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(database_url) = args.database_url {
        config.pg_connection_url = database_url;
    }

    info!(
        bind_addr = %config.bind_addr,
        client_id = %config.masked_client_id(),
        redirect_url = %config.oauth.redirect_url,
        frontend_url = %config.frontend_url,
        cookie_secure = config.cookie_secure,
        session_ttl_days = config.session_ttl.num_days(),
        in_memory = args.in_memory,
        "starting manju_api_server"
    );
    if !config.cookie_secure {
        warn!("COOKIE_SECURE is off; session cookies will be sent over plain HTTP");
    }

    let state = if args.in_memory {
        warn!("in-memory store: identities, sessions and keys are lost on exit");
        AppState::new(config.clone(), Arc::new(MemoryStore::new()))
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.pg_connection_url)
            .await?;

        info!("running database migrations");
        manju_api::migrate(&pool).await?;

        AppState::new(config.clone(), Arc::new(PgStore::new(pool)))
    };
    let state = state.with_google()?;

    let shutdown = CancellationToken::new();
    let reaper = (args.session_sweep_secs > 0).then(|| {
        state
            .sessions
            .spawn_reaper(Duration::from_secs(args.session_sweep_secs), shutdown.clone())
    });

    let app = manju_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            shutdown.cancel();
        }
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await;

    shutdown.cancel();
    if let Some(reaper) = reaper {
        if let Err(e) = reaper.await {
            error!(error = %e, "session reaper task failed");
        }
    }

    result?;
    Ok(())
}
