//! Error types for podjob
//!
//! Errors are structured with fields so the diagnostic written to stderr
//! names the job, path or setting involved. Every variant maps to a process
//! exit code through [`Error::exit_code`]; that code is the only thing the
//! calling automation sees besides stdout.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Exit code for a successful pull/inspect, or a workload that exited 0
pub const EXIT_SUCCESS: i32 = 0;

/// Fallback exit code when no result could be retrieved from the cluster
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for an env file that could not be parsed (EX_DATAERR)
pub const EXIT_DATA_ERROR: i32 = 65;

/// Exit code when the orchestrator client cannot be constructed (EX_UNAVAILABLE)
pub const EXIT_UNAVAILABLE: i32 = 69;

/// Exit code for unreadable input files (EX_IOERR)
pub const EXIT_IO_ERROR: i32 = 74;

/// Exit code for malformed environment-derived configuration (EX_CONFIG)
pub const EXIT_CONFIG_ERROR: i32 = 78;

/// Exit code when the optional watch timeout elapses, same as `timeout(1)`
pub const EXIT_WATCH_TIMEOUT: i32 = 124;

/// Exit code for an invocation shape this shim does not understand
pub const EXIT_UNRECOGNIZED: i32 = 126;

/// Why a terminal job could not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InconsistencyKind {
    /// The job is terminal but no pod carries its `job-name` label
    PodMissing,
    /// The pod exists but its container has no terminated state yet
    TerminatedStatusMissing,
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PodMissing => f.write_str("no pod found for terminal job"),
            Self::TerminatedStatusMissing => {
                f.write_str("pod container has no terminated status")
            }
        }
    }
}

/// Main error type for podjob operations
#[derive(Debug, Error)]
pub enum Error {
    /// The argv did not match any known invocation shape
    #[error("unrecognized invocation: {args:?}")]
    UnrecognizedInvocation {
        /// The full argument list, without the program name
        args: Vec<String>,
    },

    /// Environment-derived settings or volume syntax are malformed
    #[error("configuration error [{setting}]: {message}")]
    Configuration {
        /// The setting or token that is malformed (e.g. "VOLUME_MAPPINGS")
        setting: String,
        /// Description of what's wrong
        message: String,
    },

    /// A required input file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file that could not be read
        path: PathBuf,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// The env file is readable but not valid `KEY=value` syntax
    #[error("failed to parse env file {}: {message}", path.display())]
    EnvFile {
        /// The env file passed with `--env-file`
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The kube client could not be constructed
    #[error("failed to create kubernetes client: {message}")]
    Client {
        /// Description of what failed
        message: String,
    },

    /// The orchestrator rejected the job
    #[error("job {job} was rejected: {reason}")]
    Submission {
        /// Generated job name
        job: String,
        /// Rejection reason reported by the API server
        reason: String,
    },

    /// A status read failed while waiting for the job
    ///
    /// The watcher retries these; they only surface from the client seam.
    #[error("failed to observe job {job}: {message}")]
    Observation {
        /// Job being observed
        job: String,
        /// Description of the failed read
        message: String,
    },

    /// The job is terminal but its result cannot be read
    #[error("job {job} is terminal but inconsistent: {kind}")]
    InconsistentTerminalState {
        /// Job whose result is missing
        job: String,
        /// Which part of the result is missing
        kind: InconsistencyKind,
    },

    /// The configured watch timeout elapsed before the job finished
    #[error("timed out after {seconds}s waiting for job {job}")]
    WatchTimeout {
        /// Job being watched
        job: String,
        /// Configured timeout in seconds
        seconds: u64,
    },

    /// The workload container's log could not be read
    #[error("failed to read logs of pod {pod}: {message}")]
    Logs {
        /// Pod whose log was requested
        pod: String,
        /// Description of the failed read
        message: String,
    },

    /// Kubernetes API error outside submission and observation
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

impl Error {
    /// Create a configuration error for the given setting
    pub fn configuration(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            setting: setting.into(),
            message: message.into(),
        }
    }

    /// Create an io error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a client construction error
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// Create a submission error for a rejected job
    pub fn submission(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Submission {
            job: job.into(),
            reason: reason.into(),
        }
    }

    /// Create an observation error for a failed status read
    pub fn observation(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Observation {
            job: job.into(),
            message: message.into(),
        }
    }

    /// Create an inconsistent terminal state error
    pub fn inconsistent(job: impl Into<String>, kind: InconsistencyKind) -> Self {
        Self::InconsistentTerminalState {
            job: job.into(),
            kind,
        }
    }

    /// Whether the watcher should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Observation { .. })
    }

    /// Process exit code reported to the caller for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnrecognizedInvocation { .. } => EXIT_UNRECOGNIZED,
            Self::Configuration { .. } => EXIT_CONFIG_ERROR,
            Self::Io { .. } => EXIT_IO_ERROR,
            Self::EnvFile { .. } => EXIT_DATA_ERROR,
            Self::Client { .. } => EXIT_UNAVAILABLE,
            Self::WatchTimeout { .. } => EXIT_WATCH_TIMEOUT,
            Self::Submission { .. }
            | Self::Observation { .. }
            | Self::InconsistentTerminalState { .. }
            | Self::Logs { .. }
            | Self::Kube { .. } => EXIT_FAILURE,
        }
    }
}
