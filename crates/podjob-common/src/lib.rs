//! Common pieces for podjob: errors and exit codes, retry, kube client, telemetry

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::{Error, InconsistencyKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key set on every Job and pod created by podjob
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL_KEY`]
pub const MANAGED_BY_LABEL_VALUE: &str = "podjob";

/// Label the Job controller puts on the pods it creates
pub const JOB_NAME_LABEL_KEY: &str = "job-name";
