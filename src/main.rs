use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use practicum::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    settings.validate()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "practicum starting: RUST_LOG='{}', http_port={}, access_ttl={}s, refresh_ttl={}s, audio_threshold={}, seed_file={:?}",
        rust_log,
        settings.http_port,
        settings.access_ttl_secs,
        settings.refresh_ttl_secs,
        settings.audio_threshold,
        settings.seed_file
    );

    practicum::server::run(settings).await
}
