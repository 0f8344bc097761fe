//! # volshift
//!
//! `volshift` moves data in and out of Docker volumes: clone one volume into
//! another, export to and import from tar archives, snapshot a volume into an
//! image, and share those snapshots through a registry.
//!
//! Every operation runs a short-lived helper container that mounts the volume.
//! While it runs, containers that were using the volume are stopped and are
//! started again afterwards, and the volume is marked busy so that two
//! operations never write to it at once.
//!
//! ## Feature Flags
//!
//! * `docker`: Enables the Docker Engine implementation of [`runtime::ContainerRuntime`].
//! * `server`: Enables the HTTP API served on a unix socket.
#[cfg(all(feature = "docker", feature = "server"))]
pub mod cmd;
pub mod config;
pub mod error;
pub mod guard;
pub mod logging;
pub mod notify;
pub mod operation;
pub mod orchestrator;
pub mod prefetch;
pub mod progress;
pub mod runtime;
#[cfg(feature = "server")]
pub mod server;
pub mod signal;
pub mod transfer;
pub mod types;
pub mod worker;
