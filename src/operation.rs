//! Operation requests, their validation, and the plan each one executes.
//!
//! Requests arrive loosely typed from the HTTP API or the command line as an
//! [`OperationRequest`]. [`OperationRequest::validate`] turns one into an
//! [`Operation`], and [`Operation::plan`] decides which [`Action`] carries it
//! out. The orchestrator only ever sees validated operations.
use crate::runtime::RegistryAuth;
use crate::types::{HostPath, ImageRef, OperationKind, VolumeName};
use crate::worker::WorkerSpec;
use serde::Deserialize;
use std::collections::HashMap;

pub mod error;

pub use error::OperationError;

pub const EXTENSION_LABEL: &str = "com.docker.desktop.extension";
pub const EXTENSION_NAME_LABEL: &str = "com.docker.desktop.extension.name";
pub const EXTENSION_NAME: &str = "Volumes Backup & Share";
pub const LABEL_PREFIX: &str = "io.volshift";

const ARCHIVE_DIR: &str = "/archive";
const ARCHIVE_FILE: &str = "/archive.tar.gz";

/// Labels attached to every container started on behalf of an operation.
///
/// `extra` keys are namespaced under [`LABEL_PREFIX`].
pub fn labels<'a>(
    kind: OperationKind,
    volume: &VolumeName,
    extra: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> HashMap<String, String> {
    let mut labels = HashMap::from([
        (EXTENSION_LABEL.to_string(), "true".to_string()),
        (EXTENSION_NAME_LABEL.to_string(), EXTENSION_NAME.to_string()),
        (format!("{LABEL_PREFIX}.action"), kind.to_string()),
        (format!("{LABEL_PREFIX}.volume"), volume.to_string()),
    ]);
    for (key, value) in extra {
        labels.insert(format!("{LABEL_PREFIX}.{key}"), value.to_string());
    }
    labels
}

/// Unvalidated operation parameters as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub volume: Option<String>,
    pub dest_volume: Option<String>,
    pub path: Option<String>,
    /// Image reference for save, load, pull and push
    #[serde(alias = "reference")]
    pub image: Option<String>,
    #[serde(rename = "base64EncodedAuth")]
    pub auth: Option<String>,
}

impl OperationRequest {
    pub fn for_volume(volume: impl Into<String>) -> Self {
        Self {
            volume: Some(volume.into()),
            ..Default::default()
        }
    }

    pub fn validate(self, kind: OperationKind) -> Result<Operation, OperationError> {
        let volume = volume_field("volume", self.volume)?;
        let op = match kind {
            OperationKind::Clone => {
                let destination = volume_field("destVolume", self.dest_volume)?;
                if destination == volume {
                    return Err(OperationError::validation(
                        "destVolume",
                        "destination must differ from the source volume",
                    ));
                }
                Operation::Clone {
                    volume,
                    destination,
                }
            }
            OperationKind::Import => Operation::Import {
                volume,
                archive: path_field(self.path)?,
            },
            OperationKind::Export => {
                let archive = path_field(self.path)?;
                if archive.file_name().is_none() || archive.parent().is_none() {
                    return Err(OperationError::validation(
                        "path",
                        format!("'{}' does not name a file", archive),
                    ));
                }
                Operation::Export { volume, archive }
            }
            OperationKind::Save => Operation::Save {
                volume,
                image: writable_image_field(self.image)?,
            },
            OperationKind::Load => Operation::Load {
                volume,
                image: image_field(self.image)?,
            },
            OperationKind::Pull => {
                let image = image_field(self.image)?;
                let auth = auth_field(self.auth, &image)?;
                Operation::Pull {
                    volume,
                    image,
                    auth,
                }
            }
            OperationKind::Push => {
                let image = writable_image_field(self.image)?;
                let auth = auth_field(self.auth, &image)?;
                Operation::Push {
                    volume,
                    image,
                    auth,
                }
            }
        };
        Ok(op)
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, OperationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(OperationError::validation(field, "missing value")),
    }
}

fn volume_field(field: &'static str, value: Option<String>) -> Result<VolumeName, OperationError> {
    VolumeName::new(required(field, value)?).map_err(|e| OperationError::validation(field, e))
}

fn path_field(value: Option<String>) -> Result<HostPath, OperationError> {
    HostPath::new(required("path", value)?).map_err(|e| OperationError::validation("path", e))
}

fn image_field(value: Option<String>) -> Result<ImageRef, OperationError> {
    ImageRef::new(required("image", value)?).map_err(|e| OperationError::validation("image", e))
}

/// An image the operation commits to. A digest names existing content and
/// cannot be a commit target.
fn writable_image_field(value: Option<String>) -> Result<ImageRef, OperationError> {
    let image = image_field(value)?;
    if image.digest().is_some() {
        return Err(OperationError::validation(
            "image",
            format!("'{image}' is pinned by digest, use a tag"),
        ));
    }
    Ok(image)
}

/// Registry credentials are decoded up front so a malformed header is
/// rejected before any container is touched. Blank credentials mean anonymous.
fn auth_field(
    value: Option<String>,
    image: &ImageRef,
) -> Result<Option<RegistryAuth>, OperationError> {
    let Some(auth) = value.map(RegistryAuth::new) else {
        return Ok(None);
    };
    match auth.decode() {
        Ok(Some(_)) => Ok(Some(auth)),
        Ok(None) => Ok(None),
        Err(e) => Err(OperationError::from_registry(image, e)),
    }
}

/// A validated operation.
#[derive(Debug, Clone)]
pub enum Operation {
    Clone {
        volume: VolumeName,
        destination: VolumeName,
    },
    Import {
        volume: VolumeName,
        archive: HostPath,
    },
    Export {
        volume: VolumeName,
        archive: HostPath,
    },
    Save {
        volume: VolumeName,
        image: ImageRef,
    },
    Load {
        volume: VolumeName,
        image: ImageRef,
    },
    Pull {
        volume: VolumeName,
        image: ImageRef,
        auth: Option<RegistryAuth>,
    },
    Push {
        volume: VolumeName,
        image: ImageRef,
        auth: Option<RegistryAuth>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Clone { .. } => OperationKind::Clone,
            Operation::Import { .. } => OperationKind::Import,
            Operation::Export { .. } => OperationKind::Export,
            Operation::Save { .. } => OperationKind::Save,
            Operation::Load { .. } => OperationKind::Load,
            Operation::Pull { .. } => OperationKind::Pull,
            Operation::Push { .. } => OperationKind::Push,
        }
    }

    /// The volume the operation was requested for.
    pub fn volume(&self) -> &VolumeName {
        match self {
            Operation::Clone { volume, .. }
            | Operation::Import { volume, .. }
            | Operation::Export { volume, .. }
            | Operation::Save { volume, .. }
            | Operation::Load { volume, .. }
            | Operation::Pull { volume, .. }
            | Operation::Push { volume, .. } => volume,
        }
    }

    /// Every volume the operation touches, source first.
    ///
    /// These are the volumes recorded in the progress tracker and whose
    /// running consumers are suspended for the duration of the operation.
    pub fn volumes(&self) -> Vec<VolumeName> {
        match self {
            Operation::Clone {
                volume,
                destination,
            } => vec![volume.clone(), destination.clone()],
            other => vec![other.volume().clone()],
        }
    }

    /// Decide how the operation is carried out.
    pub fn plan(&self, helper_image: &ImageRef) -> Action {
        let kind = self.kind();
        match self {
            Operation::Clone {
                volume,
                destination,
            } => Action::Worker(
                WorkerSpec::shell(helper_image.clone(), "cd /from ; cp -av . /to")
                    .bind(volume, "/from")
                    .bind(destination, "/to")
                    .user("root")
                    .labels(labels(
                        kind,
                        volume,
                        [("destination-volume", destination.as_str())],
                    )),
            ),
            Operation::Export { volume, archive } => {
                // Both are guaranteed by validation.
                let dir = archive
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "/".to_string());
                let file = archive.file_name().unwrap_or_default();
                let path = archive.to_string();
                Action::Worker(
                    WorkerSpec::new(
                        helper_image.clone(),
                        vec![
                            "tar".to_string(),
                            "-czvf".to_string(),
                            format!("{ARCHIVE_DIR}/{file}"),
                            "-C".to_string(),
                            "/volume".to_string(),
                            ".".to_string(),
                        ],
                    )
                    .bind_ro(volume, "/volume")
                    .bind(dir, ARCHIVE_DIR)
                    .labels(labels(kind, volume, [("path", path.as_str())])),
                )
            }
            Operation::Import { volume, archive } => {
                let path = archive.to_string();
                Action::Worker(
                    WorkerSpec::shell(
                        helper_image.clone(),
                        format!(
                            "{} && tar -xvzf {ARCHIVE_FILE} -C /volume",
                            crate::transfer::WIPE_VOLUME
                        ),
                    )
                    .bind(volume, "/volume")
                    .bind_ro(&path, ARCHIVE_FILE)
                    .labels(labels(kind, volume, [("path", path.as_str())])),
                )
            }
            Operation::Save { image, .. } => Action::Transfer(TransferAction::Save {
                image: image.clone(),
            }),
            Operation::Load { image, .. } => Action::Transfer(TransferAction::Load {
                image: image.clone(),
            }),
            Operation::Pull { image, auth, .. } => Action::Transfer(TransferAction::Pull {
                image: image.clone(),
                auth: auth.clone(),
            }),
            Operation::Push { image, auth, .. } => Action::Transfer(TransferAction::Push {
                image: image.clone(),
                auth: auth.clone(),
            }),
        }
    }
}

/// The step that moves data once dependents are suspended.
#[derive(Debug, Clone)]
pub enum Action {
    /// Run one helper container to completion
    Worker(WorkerSpec),
    /// Move data between the volume and an image or registry
    Transfer(TransferAction),
}

#[derive(Debug, Clone)]
pub enum TransferAction {
    Save {
        image: ImageRef,
    },
    Load {
        image: ImageRef,
    },
    Pull {
        image: ImageRef,
        auth: Option<RegistryAuth>,
    },
    Push {
        image: ImageRef,
        auth: Option<RegistryAuth>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busybox() -> ImageRef {
        ImageRef::new("docker.io/library/busybox:latest").unwrap()
    }

    fn request(volume: &str) -> OperationRequest {
        OperationRequest::for_volume(volume)
    }

    #[test]
    fn test_missing_volume_rejected() {
        let err = OperationRequest::default()
            .validate(OperationKind::Export)
            .unwrap_err();
        assert!(matches!(err, OperationError::Validation { field: "volume", .. }));
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_clone_requires_distinct_destination() {
        let err = request("a").validate(OperationKind::Clone).unwrap_err();
        assert!(matches!(err, OperationError::Validation { field: "destVolume", .. }));

        let req = OperationRequest {
            dest_volume: Some("a".into()),
            ..request("a")
        };
        assert!(req.validate(OperationKind::Clone).is_err());
    }

    #[test]
    fn test_clone_plan() {
        let req = OperationRequest {
            dest_volume: Some("b".into()),
            ..request("a")
        };
        let op = req.validate(OperationKind::Clone).unwrap();
        assert_eq!(
            op.volumes(),
            vec![VolumeName::new("a").unwrap(), VolumeName::new("b").unwrap()]
        );

        let Action::Worker(spec) = op.plan(&busybox()) else {
            panic!("clone must run a worker");
        };
        assert_eq!(spec.binds, vec!["a:/from", "b:/to"]);
        assert_eq!(spec.command, vec!["/bin/sh", "-c", "cd /from ; cp -av . /to"]);
        assert_eq!(spec.user.as_deref(), Some("root"));
        assert_eq!(spec.labels["io.volshift.action"], "clone");
        assert_eq!(spec.labels["io.volshift.volume"], "a");
        assert_eq!(spec.labels["io.volshift.destination-volume"], "b");
        assert_eq!(spec.labels[EXTENSION_LABEL], "true");
    }

    #[test]
    fn test_export_plan() {
        let req = OperationRequest {
            path: Some("/backups/data.tar.gz".into()),
            ..request("data")
        };
        let op = req.validate(OperationKind::Export).unwrap();
        let Action::Worker(spec) = op.plan(&busybox()) else {
            panic!("export must run a worker");
        };
        assert_eq!(spec.binds, vec!["data:/volume:ro", "/backups:/archive"]);
        assert_eq!(
            spec.command,
            vec!["tar", "-czvf", "/archive/data.tar.gz", "-C", "/volume", "."]
        );
        assert_eq!(spec.labels["io.volshift.path"], "/backups/data.tar.gz");
    }

    #[test]
    fn test_export_rejects_relative_path() {
        let req = OperationRequest {
            path: Some("backups/data.tar.gz".into()),
            ..request("data")
        };
        let err = req.validate(OperationKind::Export).unwrap_err();
        assert!(matches!(err, OperationError::Validation { field: "path", .. }));
    }

    #[test]
    fn test_import_plan_wipes_then_extracts() {
        let req = OperationRequest {
            path: Some("/tmp/in.tar.gz".into()),
            ..request("data")
        };
        let op = req.validate(OperationKind::Import).unwrap();
        let Action::Worker(spec) = op.plan(&busybox()) else {
            panic!("import must run a worker");
        };
        assert_eq!(spec.binds, vec!["data:/volume", "/tmp/in.tar.gz:/archive.tar.gz:ro"]);
        let script = &spec.command[2];
        assert!(script.starts_with("rm -rf /volume/..?* /volume/.[!.]* /volume/*"));
        assert!(script.ends_with("tar -xvzf /archive.tar.gz -C /volume"));
    }

    #[test]
    fn test_pull_accepts_reference_alias() {
        let req: OperationRequest = serde_json::from_str(
            r#"{"volume":"data","reference":"ghcr.io/acme/data:1","base64EncodedAuth":"Cg=="}"#,
        )
        .unwrap();
        let op = req.validate(OperationKind::Pull).unwrap();
        match op.plan(&busybox()) {
            Action::Transfer(TransferAction::Pull { image, auth }) => {
                assert_eq!(image.as_str(), "ghcr.io/acme/data:1");
                // An encoded newline means anonymous.
                assert!(auth.is_none());
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn test_save_requires_image() {
        let err = request("data").validate(OperationKind::Save).unwrap_err();
        assert!(matches!(err, OperationError::Validation { field: "image", .. }));
    }

    #[test]
    fn test_digest_is_not_a_commit_target() {
        let digest = format!("ghcr.io/acme/data@sha256:{}", "a".repeat(64));
        for kind in [OperationKind::Save, OperationKind::Push] {
            let req = OperationRequest {
                image: Some(digest.clone()),
                ..request("data")
            };
            let err = req.validate(kind).unwrap_err();
            assert!(matches!(err, OperationError::Validation { field: "image", .. }));
        }

        let req = OperationRequest {
            image: Some(digest),
            ..request("data")
        };
        assert!(req.validate(OperationKind::Load).is_ok());
    }

    #[test]
    fn test_malformed_credentials_rejected_before_execution() {
        let req = OperationRequest {
            image: Some("ghcr.io/acme/data:1".into()),
            auth: Some("%%%".into()),
            ..request("data")
        };
        let err = req.validate(OperationKind::Push).unwrap_err();
        assert!(matches!(err, OperationError::RegistryAuth { .. }));
        assert_eq!(err.status(), 401);
    }
}
