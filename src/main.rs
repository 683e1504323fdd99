/// did:webvh endorsement service
///
/// Runs beside an agent as either the author or the endorser of did:webvh
/// log entries.
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webvh_endorser::{config::ServerConfig, server, AppContext, WebvhResult};

#[tokio::main]
async fn main() -> WebvhResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webvh_endorser=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Connect to the endorser before accepting traffic
    let outcome = ctx.manager.auto_endorsement_setup().await?;
    tracing::info!(?outcome, "Endorsement setup complete");

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
