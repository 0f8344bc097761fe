use super::connect;
use crate::config::{LayeredArgs, RunConfig, RunSettings};
use crate::error::VolshiftError;
use crate::operation::OperationRequest;
use crate::orchestrator::Orchestrator;
use crate::types::OperationKind;
use clap::{Args, Subcommand};
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(subcommand)]
    pub operation: RunOperation,

    #[command(flatten)]
    pub settings: LayeredArgs<RunSettings>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RunOperation {
    /// Copy the contents of one volume into another
    Clone {
        volume: String,
        /// Destination volume, created if it does not exist
        #[arg(long = "to")]
        destination: String,
    },
    /// Replace a volume's contents with a gzipped tar archive
    Import {
        volume: String,
        /// Absolute path of the archive on the engine host
        #[arg(long)]
        path: String,
    },
    /// Write a volume's contents to a gzipped tar archive
    Export {
        volume: String,
        /// Absolute path of the archive to create on the engine host
        #[arg(long)]
        path: String,
    },
    /// Snapshot a volume into a local image
    Save {
        volume: String,
        #[arg(long)]
        image: String,
    },
    /// Restore a volume from a snapshot image
    Load {
        volume: String,
        #[arg(long)]
        image: String,
    },
    /// Pull a snapshot image from a registry and restore it
    Pull {
        volume: String,
        #[arg(long)]
        image: String,
        /// Base64 encoded registry credentials
        #[arg(long, env = "VOLSHIFT_REGISTRY_AUTH", hide_env_values = true)]
        auth: Option<String>,
    },
    /// Snapshot a volume and push it to a registry
    Push {
        volume: String,
        #[arg(long)]
        image: String,
        /// Base64 encoded registry credentials
        #[arg(long, env = "VOLSHIFT_REGISTRY_AUTH", hide_env_values = true)]
        auth: Option<String>,
    },
}

impl RunOperation {
    pub fn into_request(self) -> (OperationKind, OperationRequest) {
        match self {
            RunOperation::Clone {
                volume,
                destination,
            } => (
                OperationKind::Clone,
                OperationRequest {
                    dest_volume: Some(destination),
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Import { volume, path } => (
                OperationKind::Import,
                OperationRequest {
                    path: Some(path),
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Export { volume, path } => (
                OperationKind::Export,
                OperationRequest {
                    path: Some(path),
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Save { volume, image } => (
                OperationKind::Save,
                OperationRequest {
                    image: Some(image),
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Load { volume, image } => (
                OperationKind::Load,
                OperationRequest {
                    image: Some(image),
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Pull {
                volume,
                image,
                auth,
            } => (
                OperationKind::Pull,
                OperationRequest {
                    image: Some(image),
                    auth,
                    ..OperationRequest::for_volume(volume)
                },
            ),
            RunOperation::Push {
                volume,
                image,
                auth,
            } => (
                OperationKind::Push,
                OperationRequest {
                    image: Some(image),
                    auth,
                    ..OperationRequest::for_volume(volume)
                },
            ),
        }
    }
}

pub async fn run(args: RunArgs) -> Result<(), VolshiftError> {
    let config: RunConfig = args.settings.load()?;
    config.logger.init()?;

    let (kind, request) = args.operation.into_request();
    let op = request.validate(kind)?;

    let runtime = connect(&config.engine).await?;
    let orchestrator = Orchestrator::new(runtime, config.engine.orchestrator());
    let outcome = orchestrator.execute(op).await?;

    info!(
        volume = %outcome.volume,
        kind = %outcome.kind,
        restarted = outcome.restarted.len(),
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{Cli, Command};
    use clap::Parser;

    #[test]
    fn test_parse_clone() {
        let cli = Cli::try_parse_from(["volshift", "run", "clone", "src", "--to", "dst"]).unwrap();
        let Command::Run(args) = cli.cmd else {
            panic!("expected run");
        };
        let (kind, request) = args.operation.into_request();
        assert_eq!(kind, OperationKind::Clone);
        assert_eq!(request.volume.as_deref(), Some("src"));
        assert_eq!(request.dest_volume.as_deref(), Some("dst"));
    }

    #[test]
    fn test_parse_export_requires_path() {
        assert!(Cli::try_parse_from(["volshift", "run", "export", "data"]).is_err());
    }
}
