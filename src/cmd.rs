use crate::config::{EngineConfig, LayeredArgs, ServeArgs};
use crate::runtime::docker::DockerRuntime;
use crate::runtime::{ContainerRuntime, RuntimeError};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::debug;

mod run;
mod serve;

pub use run::{RunArgs, RunOperation, run};
pub use serve::serve;

#[derive(Parser, Debug)]
#[command(name = "volshift")]
#[command(version, about = "Clone, back up and share Docker volumes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the volume API on a unix socket
    Serve(LayeredArgs<ServeArgs>),

    /// Run a single operation against the local engine and exit
    Run(Box<RunArgs>),
}

/// Connect to the engine described by `engine` and agree on an API version.
pub async fn connect(engine: &EngineConfig) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    let runtime = match &engine.docker_host {
        Some(socket) => DockerRuntime::connect_socket(socket, engine.platform.clone())?,
        None => DockerRuntime::connect_local(engine.platform.clone())?,
    };
    let runtime = runtime.negotiate().await?;
    debug!(platform = %engine.platform, "connected to container engine");
    Ok(Arc::new(runtime))
}
