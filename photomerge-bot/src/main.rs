//! Photomerge bot - main entry point.

use anyhow::Result;
use photomerge_bot::start_bot;
use photomerge_common::config::Config;
use photomerge_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; a missing bot token stops startup here
    let config = Config::load_and_validate()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Photomerge bot v{}", env!("CARGO_PKG_VERSION"));

    start_bot(&config).await
}
