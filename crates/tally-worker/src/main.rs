use tally_core::TallyError;
use tally_core::app::{Shutdown, TallyConfig, startup};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
async fn terminate() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> std::io::Result<()> {
    std::future::pending().await
}

/// SIGINT / SIGTERM で停止を要求する
fn spawn_signal_listener(shutdown: Shutdown) {
    tokio::spawn(async move {
        let received = tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            r = terminate() => r,
        };
        match received {
            Ok(()) => {
                info!("shutdown signal received");
                shutdown.trigger();
            }
            Err(e) => {
                // handle を持ったまま待つ（drop すると停止扱いになる）
                warn!(error = %e, "failed to listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        }
    });
}

async fn run() -> Result<(), TallyError> {
    let config = TallyConfig::from_env()?;

    let (shutdown, mut listener) = Shutdown::new();
    let worker_listener = shutdown.listener();
    spawn_signal_listener(shutdown);

    let mut worker = startup::start(&config, &mut listener).await?;
    let stats = worker.run(worker_listener).await;

    info!(
        dequeued = stats.dequeued(),
        committed = stats.committed,
        dropped = stats.dropped(),
        connection_errors = stats.connection_errors,
        "worker exiting"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), TallyError> {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "worker failed");
        return Err(e);
    }
    Ok(())
}
