use anyhow::Result;
use site_rewriter::{config::Config, i18n::LanguageDetector, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("site_rewriter=info".parse()?),
        )
        .init();

    info!("Starting site rewriter");

    let config = Config::from_env()?;
    let detector = LanguageDetector::from_config(&config)?;

    info!(
        "Model {} at {}, up to {} variants",
        config.rewrite_model, config.rewrite_api_url, config.max_variants
    );

    server::serve(config, detector).await
}
