use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tronstream::{AppConfig, RealtimeSession, StatusServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting tronstream against {}",
        config.realtime.url.host_str().unwrap_or("<no host>")
    );

    let session = RealtimeSession::start(config.realtime.clone());
    let client = session.client();

    if let Some(intent) = config.subscribe.clone() {
        let id = client.subscribe(intent)?;
        info!("Registered startup subscription {}", id);
    }

    let mut state_rx = client.watch_state();
    let state_log = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            info!(
                "Connection {:?} (attempts {}, latency {:?}ms)",
                state.status, state.reconnect_attempts, state.average_latency_ms
            );
        }
    });

    let status_server = config.status.clone().map(|status| {
        let server = StatusServer::new(client.clone(), status);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Status API stopped: {}", e);
            }
        })
    });

    shutdown_signal().await;

    session.shutdown().await;
    state_log.abort();
    if let Some(handle) = status_server {
        handle.abort();
    }

    info!("tronstream stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
