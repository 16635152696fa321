//! Manager-level errors.
//!
//! Policy rejections ([`ShellServiceDisabled`](ManagerError::ShellServiceDisabled),
//! [`ProcessesDisabled`](ManagerError::ProcessesDisabled)) are permanent
//! for the lifetime of the process. Diff application accumulates
//! failures instead of failing fast, so one bad entry never blocks the
//! rest of a configuration; the accumulated set comes back as
//! [`Aggregate`](ManagerError::Aggregate).

use crate::dial::DialError;
use crate::process::ProcessError;
use rover_resource::ResourceError;
use rover_types::ErrorCode;
use thiserror::Error;

fn insecure_creds_guidance(from_command: &bool) -> &'static str {
    if *from_command {
        "must use the --allow-insecure-creds flag to connect to a non-TLS secured robot"
    } else {
        "must set allow_insecure_creds in the manager options to connect to a non-TLS secured robot"
    }
}

fn aggregate_message(errors: &[ManagerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error surfaced by the resource manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The shell service is forbidden in an untrusted environment.
    #[error("shell service disabled in an untrusted environment")]
    ShellServiceDisabled,

    /// Child processes are forbidden in an untrusted environment.
    #[error("processes disabled in an untrusted environment")]
    ProcessesDisabled,

    /// Credentials over an insecure transport need an explicit opt-in;
    /// the guidance names the CLI flag or the library option depending
    /// on how the manager was started.
    #[error("{}", insecure_creds_guidance(.from_command))]
    InsecureWithCredentials { from_command: bool },

    /// A graph or resource failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A remote could not be dialed.
    #[error("couldn't connect to robot remote \"{remote}\": {source}")]
    Dial {
        remote: String,
        #[source]
        source: DialError,
    },

    /// The process sub-manager failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Several failures accumulated over one operation.
    #[error("{}", aggregate_message(.0))]
    Aggregate(Vec<ManagerError>),
}

impl ManagerError {
    /// Folds accumulated errors into a single result: empty means `Ok`,
    /// one error stays itself, several become [`Aggregate`](Self::Aggregate).
    pub fn from_accumulated(mut errors: Vec<ManagerError>) -> Result<(), ManagerError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ManagerError::Aggregate(errors)),
        }
    }

    /// Returns `true` when this error (or any aggregated member)
    /// matches the predicate.
    pub fn any(&self, pred: &dyn Fn(&ManagerError) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        if let Self::Aggregate(errors) = self {
            return errors.iter().any(|err| err.any(pred));
        }
        false
    }
}

impl ErrorCode for ManagerError {
    fn code(&self) -> &'static str {
        match self {
            Self::ShellServiceDisabled => "MANAGER_SHELL_SERVICE_DISABLED",
            Self::ProcessesDisabled => "MANAGER_PROCESSES_DISABLED",
            Self::InsecureWithCredentials { .. } => "MANAGER_INSECURE_WITH_CREDENTIALS",
            Self::Resource(err) => err.code(),
            Self::Dial { source, .. } => source.code(),
            Self::Process(err) => err.code(),
            Self::Aggregate(_) => "MANAGER_MULTIPLE_ERRORS",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Permanent for the life of the process.
            Self::ShellServiceDisabled
            | Self::ProcessesDisabled
            | Self::InsecureWithCredentials { .. } => false,
            Self::Resource(err) => err.is_recoverable(),
            Self::Dial { source, .. } => source.is_recoverable(),
            Self::Process(err) => err.is_recoverable(),
            Self::Aggregate(errors) => errors.iter().all(ErrorCode::is_recoverable),
        }
    }
}
