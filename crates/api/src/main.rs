//! Semestra service entry point

use semestra_app::{logging, AppContext};
use semestra_domain::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment first so RUST_LOG and SEMESTRA_* are visible
    let _ = dotenvy::dotenv();
    logging::init_tracing();

    let config = semestra_infra::config::load()?;
    let context = AppContext::new(config)?;
    context.start().await?;

    info!("semestra is running; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }

    context.shutdown().await?;
    Ok(())
}
