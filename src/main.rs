//! filetail entry point: parses CLI and starts the async application runtime.
//! The main function is intentionally thin and delegates to the runtime in `app`.

mod app;
mod cli;
mod logging;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = cli::parse()?;
    logging::init_logging(&config.log_level)?;
    app::run(config).await
}
