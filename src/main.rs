//! DAISY provider daemon
//!
//! Configured entirely from the environment (and an optional `.env` or TOML
//! file named by `DAISY_CONFIG`). Exits 0 on Ctrl-C/SIGTERM and non-zero
//! when the configuration is unusable.

use daisy::{daemon, telemetry};
use daisy_core::ProviderConfig;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let _guard = telemetry::init_tracing();

    let config = match ProviderConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };
    info!(?config, "configuration loaded");

    let cancel = CancellationToken::new();
    daemon::spawn_shutdown_listener(cancel.clone());

    match daemon::run(config, cancel).await {
        Ok(cursor) => {
            info!(%cursor, "provider stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("provider failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
