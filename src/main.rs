use anyhow::Result;
use edge_tunnel::config::Settings;
use edge_tunnel::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))?;
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        environment = %settings.application.environment,
        "Starting edge tunnel application"
    );

    let app = Application::with_settings(settings)?;
    app.run().await?;

    Ok(())
}
