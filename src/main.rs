use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use carrent::auth::Authenticator;
use carrent::config::Config;
use carrent::engine::Engine;
use carrent::http::{self, AppState};
use carrent::mailer::{self, LogNotifier, MailRoute, Notifier};
use carrent::notify::NotifyHub;
use carrent::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    carrent::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.wal_path(), notify.clone())?);
    let auth = Arc::new(Authenticator::new(config.token_ttl));

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let mailer_task = tokio::spawn(mailer::run_mailer(
        engine.clone(),
        notify.subscribe(),
        notifier,
        MailRoute {
            from: config.mail_from.clone(),
            to: config.admin_email.clone(),
        },
    ));
    let compactor_task = tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));
    let session_task = tokio::spawn(reaper::run_session_reaper(auth.clone()));

    let app = http::router(AppState {
        engine: engine.clone(),
        auth,
    });

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("carrent listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  admin notifications: {}", config.admin_email);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );
    if engine.admin_count() == 0 {
        info!("  no admin registered yet: POST /api/auth/register is open");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping background tasks");
    compactor_task.abort();
    session_task.abort();
    mailer_task.abort();

    // Leave a short log behind for the next start.
    if let Err(e) = engine.compact_wal().await {
        tracing::error!("final compaction failed: {e}");
    }
    info!("carrent stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
