use super::connect;
use crate::config::{LayeredArgs, ServeArgs, ServeConfig};
use crate::error::VolshiftError;
use crate::orchestrator::Orchestrator;
use crate::server::ApiServer;
use tracing::{debug, info, warn};

pub async fn serve(args: LayeredArgs<ServeArgs>) -> Result<(), VolshiftError> {
    let config: ServeConfig = args.load()?;
    config.logger.init()?;
    info!("Starting volshift v{} API server", env!("CARGO_PKG_VERSION"));
    debug!("effective config: {:#?}", config);

    let runtime = connect(&config.engine).await?;
    let orchestrator = Orchestrator::new(runtime, config.engine.orchestrator());

    // Warm-up runs beside the listener; requests never wait for it.
    let warmup = orchestrator.clone();
    tokio::spawn(async move {
        let report = warmup.prefetch().await;
        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "continuing without some helper images");
        }
    });

    ApiServer::new(config.socket, orchestrator).run().await?;
    info!("API server exited successfully");
    Ok(())
}
