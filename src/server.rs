//! HTTP/1 API served on a unix domain socket.
use crate::orchestrator::Orchestrator;
use crate::signal::recv_shutdown;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tracing::{error, info};

pub mod api;
pub mod error;
pub mod service;

pub use error::ApiError;
pub use service::VolumeApiService;

pub struct ApiServer {
    socket: PathBuf,
    orchestrator: Orchestrator,
}

impl ApiServer {
    pub fn new(socket: PathBuf, orchestrator: Orchestrator) -> Self {
        Self {
            socket,
            orchestrator,
        }
    }

    /// Accept connections until SIGTERM or SIGINT.
    ///
    /// On shutdown the listener is closed first, then the call waits for
    /// every operation already handed to the orchestrator to finish.
    pub async fn run(self) -> std::io::Result<()> {
        ensure_socket_path(&self.socket).await?;
        let listener = UnixListener::bind(&self.socket)?;

        let service = VolumeApiService::new(self.orchestrator.clone());

        info!(socket = ?self.socket, "API listening");

        let exit = recv_shutdown();
        tokio::pin!(exit);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let io = TokioIo::new(stream);
                            let svc = service.clone();

                            tokio::task::spawn(async move {
                                if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                                    error!("Error serving connection: {:?}", err);
                                }
                            });
                        }
                        Err(e) => error!("Socket accept error: {}", e),
                    }
                }

                signal = &mut exit => {
                    signal?;
                    break;
                }
            }
        }

        drop(listener);
        let pending = self.orchestrator.in_flight();
        if pending > 0 {
            info!(pending, "waiting for in-flight operations to finish");
        }
        self.orchestrator.drain().await;

        Ok(())
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket);
    }
}

async fn ensure_socket_path(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        info!("Removing existing socket file: {:?}", path);
        tokio::fs::remove_file(path).await?;
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
