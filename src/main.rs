//! STOMP/HTTP Gateway command line tool
//!
//! This binary is the command-line interface for the gateway.

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use stomp_http_gateway::common::{init_logger, Result};
use stomp_http_gateway::config::{auto_load, check_warnings, CliArgs};
use stomp_http_gateway::{GatewayService, APP_NAME, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = auto_load(args)?;

    // Loading runs before the logger exists, so repeat what it reported.
    init_logger(config.log_level());
    info!("Starting {} v{}", APP_NAME, VERSION);
    for warning in check_warnings(&config) {
        warn!("{}", warning);
    }
    config.log();

    let service = GatewayService::bind(Arc::new(config)).await?;
    info!("Gateway ready on {}, press Ctrl+C to stop", service.local_addr());

    let (handle, task) = service.start();

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    handle.shutdown().await?;

    match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Gateway task failed: {}", e);
            Ok(())
        }
    }
}
