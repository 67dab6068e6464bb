// Tenant Rollup Server

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tenant_rollup::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenant_rollup=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;
    let hub = app_state.hub.clone();
    let sweeper = hub.spawn_sweeper();

    // Build main application router
    let app = create_router(app_state).layer(CorsLayer::permissive());

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Tenant rollup server starting on http://{}", addr);
    info!("  GET    /api/v1/tenants/{{tenant}}/business               - Business rollup");
    info!("  GET    /api/v1/tenants/{{tenant}}/talent                 - Talent KPI report");
    info!("  POST   /api/v1/tenants/{{tenant}}/records/{{kind}}        - Create record");
    info!("  PUT    /api/v1/tenants/{{tenant}}/records/{{kind}}/{{id}}   - Replace record");
    info!("  DELETE /api/v1/tenants/{{tenant}}/records/{{kind}}/{{id}}   - Delete record");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    hub.close_all().await;
    info!("Server stopped");
    Ok(())
}
