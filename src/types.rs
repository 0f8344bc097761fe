use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidValue(pub String);

/// Name of a volume owned by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeName(String);

impl VolumeName {
    pub fn new<S: Into<String>>(name: S) -> Result<Self, InvalidValue> {
        let s = name.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    fn validate(s: &str) -> Result<(), InvalidValue> {
        if s.is_empty() {
            return Err(InvalidValue("volume name cannot be empty".into()));
        }
        if s.contains('/') {
            return Err(InvalidValue(format!(
                "volume name cannot contain slashes: '{}'",
                s
            )));
        }
        // A colon would split the bind specification handed to the runtime.
        if s.contains(':') {
            return Err(InvalidValue(format!(
                "volume name cannot contain colons: '{}'",
                s
            )));
        }
        if s.contains('\0') {
            return Err(InvalidValue("volume name cannot contain null bytes".into()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VolumeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for VolumeName {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for VolumeName {
    type Error = InvalidValue;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<VolumeName> for String {
    fn from(v: VolumeName) -> Self {
        v.0
    }
}

impl FromStr for VolumeName {
    type Err = InvalidValue;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Runtime identifier of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new<S: Into<String>>(id: S) -> Result<Self, InvalidValue> {
        let s = id.into();
        if s.is_empty() {
            return Err(InvalidValue("container id cannot be empty".into()));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 12 character prefix the runtime's tooling displays.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = InvalidValue;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContainerId> for String {
    fn from(v: ContainerId) -> Self {
        v.0
    }
}

impl FromStr for ContainerId {
    type Err = InvalidValue;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// An image reference such as `docker.io/library/busybox:latest` or
/// `ghcr.io/acme/data@sha256:...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new<S: Into<String>>(reference: S) -> Result<Self, InvalidValue> {
        let s = reference.into();
        let s = s.trim().to_string();
        if s.is_empty() {
            return Err(InvalidValue("image reference cannot be empty".into()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(InvalidValue(format!(
                "image reference cannot contain whitespace: '{}'",
                s
            )));
        }
        let me = Self(s);
        if me.repository().is_empty() || me.repository().ends_with('/') {
            return Err(InvalidValue(format!(
                "image reference has no repository: '{}'",
                me.0
            )));
        }
        if me.tag().is_some_and(str::is_empty) {
            return Err(InvalidValue(format!(
                "image reference has an empty tag: '{}'",
                me.0
            )));
        }
        Ok(me)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, Option<&str>, Option<&str>) {
        let (name, digest) = match self.0.split_once('@') {
            Some((n, d)) => (n, Some(d)),
            None => (self.0.as_str(), None),
        };
        // A colon before the last slash belongs to a registry port, not a tag.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        match name[last_slash..].rfind(':') {
            Some(i) => {
                let at = last_slash + i;
                (&name[..at], Some(&name[at + 1..]), digest)
            }
            None => (name, None, digest),
        }
    }

    /// Repository part of the reference, without tag or digest.
    pub fn repository(&self) -> &str {
        self.split().0
    }

    /// Explicit tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.split().1
    }

    pub fn digest(&self) -> Option<&str> {
        self.split().2
    }

    /// Tag to use when committing or pushing. Falls back to `latest`.
    pub fn tag_or_latest(&self) -> &str {
        self.tag().unwrap_or("latest")
    }
}

impl AsRef<str> for ImageRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = InvalidValue;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ImageRef> for String {
    fn from(v: ImageRef) -> Self {
        v.0
    }
}

impl FromStr for ImageRef {
    type Err = InvalidValue;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Absolute path on the host running the container runtime.
///
/// The path is handed to the runtime verbatim as the source of a bind mount,
/// so it must be absolute and must not contain a colon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPath(PathBuf);

impl HostPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, InvalidValue> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(InvalidValue("path cannot be empty".into()));
        }
        if !path.is_absolute() {
            return Err(InvalidValue(format!(
                "path must be absolute: '{}'",
                path.display()
            )));
        }
        if path.to_string_lossy().contains(':') {
            return Err(InvalidValue(format!(
                "path cannot contain colons: '{}'",
                path.display()
            )));
        }
        Ok(Self(path.to_path_buf()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn parent(&self) -> Option<&Path> {
        self.0.parent()
    }

    pub fn file_name(&self) -> Option<String> {
        self.0.file_name().map(|n| n.to_string_lossy().into_owned())
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl FromStr for HostPath {
    type Err = InvalidValue;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The kind of data-moving operation running against a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Clone,
    Import,
    Export,
    Save,
    Load,
    Pull,
    Push,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Import => "import",
            Self::Export => "export",
            Self::Save => "save",
            Self::Load => "load",
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
