use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ride_dispatch::api;
use ride_dispatch::collaborators::directions::EstimatedDirections;
use ride_dispatch::collaborators::notifier::LogNotifier;
use ride_dispatch::collaborators::users::InMemoryUserDirectory;
use ride_dispatch::config::Config;
use ride_dispatch::engine::shutdown;
use ride_dispatch::error::AppError;
use ride_dispatch::state::{AppState, Collaborators};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let collaborators = Collaborators {
        directions: Arc::new(EstimatedDirections::new(config.average_speed_kmh)),
        users: Arc::new(InMemoryUserDirectory::new()),
        notifier: Arc::new(LogNotifier),
    };
    let (app_state, background) = AppState::new(&config, collaborators)?;
    let shared_state = Arc::new(app_state);

    let (trigger, stop) = shutdown::channel();
    let workers = background.spawn(stop);

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    trigger.trigger();
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "background task failed");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);

    if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
