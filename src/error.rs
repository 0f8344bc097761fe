use crate::config::ConfigError;
use crate::operation::OperationError;
use crate::runtime::RuntimeError;
use sysexits::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolshiftError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl std::process::Termination for VolshiftError {
    fn report(self) -> std::process::ExitCode {
        let code = self.exit_code();
        tracing::error!(exit_code = code, "{}", self);
        std::process::ExitCode::from(code)
    }
}

impl VolshiftError {
    pub fn exit_code(&self) -> u8 {
        match self {
            VolshiftError::Config(e) => match e {
                ConfigError::Io(_) => ExitCode::NoInput.into(),
                ConfigError::Parse(_) => ExitCode::Config.into(),
                ConfigError::Validation(_) => ExitCode::Config.into(),
            },
            VolshiftError::Runtime(e) => Self::runtime_exit_code(e),
            VolshiftError::Operation(e) => match e {
                OperationError::Validation { .. } => ExitCode::Usage.into(),
                OperationError::Busy(_) => ExitCode::TempFail.into(),
                OperationError::RegistryAuth { .. } => ExitCode::NoPerm.into(),
                OperationError::TimedOut { .. } => ExitCode::TempFail.into(),
                OperationError::ImageUnavailable { .. } | OperationError::Transfer { .. } => {
                    ExitCode::Unavailable.into()
                }
                OperationError::DependencyEnumeration { source, .. }
                | OperationError::DependencyStop { source, .. } => {
                    Self::runtime_exit_code(source)
                }
                OperationError::DependencyStart { .. } => ExitCode::Unavailable.into(),
                OperationError::WorkerExitNonZero { .. } => ExitCode::DataErr.into(),
                OperationError::WorkerCreate { .. }
                | OperationError::WorkerStart { .. }
                | OperationError::WorkerWait { .. }
                | OperationError::WorkerLogs { .. }
                | OperationError::WorkerCommit { .. }
                | OperationError::WorkerRemove { .. } => ExitCode::Software.into(),
            },
            VolshiftError::Io(_) => ExitCode::IoErr.into(),
            VolshiftError::Anyhow(_) => ExitCode::Software.into(),
        }
    }

    fn runtime_exit_code(e: &RuntimeError) -> u8 {
        match e {
            RuntimeError::NotFound(_) => ExitCode::NoInput.into(),
            RuntimeError::Unauthorized(_) => ExitCode::NoPerm.into(),
            RuntimeError::Connection(_) => ExitCode::Unavailable.into(),
            RuntimeError::Credentials(_) => ExitCode::DataErr.into(),
            RuntimeError::Api { .. } | RuntimeError::Stream(_) => ExitCode::Software.into(),
        }
    }
}
