//! Solari auth gateway server binary.
//!
//! `solari_api_server` (or `solari_api_server serve`) runs the HTTP gateway;
//! `solari_api_server hash-password <pw>` prints a bcrypt hash for the
//! directory file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use solari_api::config::ApiConfig;
use solari_api::services::gateway::AuthGateway;
use solari_api::{AppState, router};
use solari_core::audit::memory::InMemoryAuditStore;
use solari_core::audit::postgres::PgAuditStore;
use solari_core::audit::{AuditLog, AuditStore};
use solari_core::auth::credentials::hash_password;
use solari_core::auth::jwt::TokenSigner;
use solari_core::directory::Directory;
use solari_core::session::memory::InMemorySessionStore;
use solari_core::session::postgres::PgSessionStore;
use solari_core::session::{SessionPolicy, SessionStore};
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "solari_api_server", about = "Solari auth gateway server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Print a bcrypt hash for a directory entry.
    HashPassword { password: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StoreBackend {
    Postgres,
    /// Not durable; for local development only.
    Memory,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Port to listen on; overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Session and audit storage backend.
    #[arg(long, value_enum, env = "SOLARI_STORE", default_value_t = StoreBackend::Postgres)]
    store: StoreBackend,

    /// User/client directory file.
    #[arg(long, env = "SOLARI_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Seconds between expiry sweeps (0 disables the sweeper).
    #[arg(long, default_value_t = 300)]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,solari_api=debug,solari_core=debug")
            }),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::HashPassword { password }) => {
            println!("{}", hash_password(&password)?);
            Ok(())
        }
        Some(Command::Serve) | None => serve(cli.serve).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ApiConfig::from_env()?;
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("127.0.0.1");
        config.bind_addr = format!("{host}:{port}");
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }
    if let Some(path) = args.directory {
        config.directory_path = path;
    }

    info!(
        bind_addr = %config.bind_addr,
        store = ?args.store,
        issuer = %config.issuer,
        "starting solari_api_server"
    );

    let directory = Arc::new(Directory::load(&config.directory_path)?);
    let (users, clients) = directory.counts().await;
    info!(users, clients, "directory ready");

    let policy = SessionPolicy::from_refresh_ttl_secs(config.refresh_token_ttl_secs);
    let (sessions, audit_store): (Arc<dyn SessionStore>, Arc<dyn AuditStore>) = match args.store
    {
        StoreBackend::Postgres => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(config.store_timeout)
                .connect(&config.pg_connection_url)
                .await?;

            info!("running database migrations");
            solari_api::migrate(&pool).await?;

            let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(
                pool.clone(),
                policy,
                config.store_timeout,
            ));
            let audit: Arc<dyn AuditStore> =
                Arc::new(PgAuditStore::new(pool, config.store_timeout));
            (sessions, audit)
        }
        StoreBackend::Memory => {
            warn!("in-memory store selected: sessions and audit events are lost on restart");
            let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(policy));
            let audit: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::default());
            (sessions, audit)
        }
    };

    let signer = TokenSigner::new(
        &config.issuer,
        config.signing.clone(),
        config.access_token_ttl_secs,
    )?;
    info!(alg = signer.algorithm_name(), "token signer ready");

    let gateway = Arc::new(AuthGateway::new(
        directory,
        sessions,
        signer,
        AuditLog::new(audit_store),
    ));

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        gateway.clone(),
        Duration::from_secs(args.sweep_interval_secs),
        shutdown.clone(),
    );

    let app = router(AppState {
        gateway,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "auth gateway listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    result?;
    info!("shut down cleanly");
    Ok(())
}

/// Periodically delete expired sessions and refresh tokens.
fn spawn_sweeper(
    gateway: Arc<AuthGateway>,
    every: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("expiry sweeper disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = gateway.cleanup_expired().await {
                        warn!(code = e.code(), "expiry sweep failed: {e}");
                    }
                }
            }
        }
    }))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("failed to listen for ctrl-c: {e}");
                shutdown.cancelled().await;
            }
            info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
