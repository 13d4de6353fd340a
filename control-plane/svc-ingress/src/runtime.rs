use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::ControllerConfig, controller::run_controller};

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    cfg: ControllerConfig,
    stop: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, cfg, stop).await })
}

/// Cancel `stop` on Ctrl+C or SIGTERM.
pub fn spawn_signal_listener(stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutdown signal received");
                stop.cancel();
            }
            _ = stop.cancelled() => {}
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
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
}

/// Run the controller until a shutdown signal arrives or it fails.
pub async fn run_all(client: Client, cfg: ControllerConfig) -> anyhow::Result<()> {
    let stop = CancellationToken::new();
    let signals = spawn_signal_listener(stop.clone());
    let controller = spawn_controller(client, cfg, stop.clone());

    let res = controller.await;
    stop.cancel();
    let _ = signals.await;
    res??;
    info!("controller stopped");
    Ok(())
}
