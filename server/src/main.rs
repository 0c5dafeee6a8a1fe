mod auth;
mod db_core;
mod email;
mod error;
mod model;
mod prompt;
mod request_tracing;
mod routes;
mod server_config;
mod state;
#[cfg(test)]
mod testing;
mod util;

use std::{
    env,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use auth::oauth_state::OAuthStateStore;
use axum::{extract::FromRef, Router};
use email::oauth::GmailOAuth;
use mimalloc::MiMalloc;
use prompt::{chat::ChatClient, priority::PriorityClassifier};
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use server_config::cfg;
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

const OAUTH_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub http_client: HttpClient,
    pub conn: DatabaseConnection,
    pub oauth_states: OAuthStateStore,
    pub gmail_oauth: GmailOAuth,
    pub classifier: PriorityClassifier,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let db_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .context("Database connection failed")?;

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;
    let model = ChatClient::new(http_client.clone(), cfg.model.clone());

    let state = ServerState {
        gmail_oauth: GmailOAuth::new(http_client.clone(), cfg.gmail.clone()),
        classifier: PriorityClassifier::new(Arc::new(model)),
        oauth_states: OAuthStateStore::new(cfg.oauth.state_ttl_secs),
        http_client,
        conn,
    };

    tracing::info!("{}", *cfg);

    let mut scheduler = JobScheduler::new().await?;

    if cfg.sync.interval_secs > 0 {
        let state_clone = state.clone();
        let running = Arc::new(AtomicBool::new(false));
        scheduler
            .add(Job::new_repeated_async(
                Duration::from_secs(cfg.sync.interval_secs),
                move |uuid, l| sync_accounts_job(uuid, l, state_clone.clone(), running.clone()),
            )?)
            .await?;
    } else {
        tracing::info!("Periodic sync disabled");
    }

    {
        let state_clone = state.clone();
        scheduler
            .add(Job::new_repeated(
                OAUTH_SWEEP_INTERVAL,
                move |_uuid, _lock| {
                    state::tasks::sweep_oauth_states(&state_clone);
                },
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    scheduler.start().await?;
    tracing::info!("Scheduler started");

    run_server(AppRouter::create(state), scheduler).await
}

async fn run_server(router: Router, scheduler: JobScheduler) -> anyhow::Result<()> {
    let port = env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse::<u16>()
        .context("PORT must be a valid port number")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Trackmail server running on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(scheduler))
    .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(mut scheduler: JobScheduler) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {:?}", e);
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

    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Scheduler shutdown failed: {:?}", e);
    }
    tracing::info!("Cleanups done, shutting down");
}

/// Runs one periodic sync pass. A pass still in flight when the next tick
/// fires makes that tick a no-op.
fn sync_accounts_job(
    uuid: Uuid,
    mut l: JobScheduler,
    state: ServerState,
    running: Arc<AtomicBool>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
    Box::pin(async move {
        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Sync job {} skipped, previous run still active", uuid);
            return;
        }

        match state::tasks::sync_all_accounts(state).await {
            Ok(synced) => {
                tracing::info!("Sync job {} finished, {} accounts synced", uuid, synced);
            }
            Err(e) => {
                tracing::error!("Sync job failed: {:?}", e);
            }
        }
        running.store(false, Ordering::SeqCst);

        let next_tick = l.next_tick_for_job(uuid).await;
        if let Ok(Some(ts)) = next_tick {
            tracing::info!("Next time for sync job is {:?}", ts)
        }
    })
}
