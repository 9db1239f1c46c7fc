// Report service entry point
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xlreport::server::{router, AppState};
use xlreport::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("xlreport=info,tower_http=info")),
        )
        .init();

    let settings = Settings::load()?;
    let addr = settings.bind_address();

    let state = Arc::new(AppState::new(settings));
    state.store.ensure_dir().await?;
    info!(
        storage = %state.store.root().display(),
        render_threads = state.settings.render_threads,
        "Starting report service..."
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
