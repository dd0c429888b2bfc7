//! Container runs as Kubernetes Jobs
//!
//! Turns one `podman run` into a single-pod Job and reports its result:
//! - `compiler`: `WorkloadSpec` → `batch/v1` Job
//! - `volumes`: PVC mounts from configuration and the `-v` argument
//! - `watcher`: poll or watch until the job is terminal
//! - `retriever`: container log and exit code of the finished pod
//! - `runner`: submit → wait → retrieve

pub mod client;
pub mod compiler;
pub mod retriever;
pub mod runner;
pub mod status;
pub mod volumes;
pub mod watcher;

pub use client::{JobClient, KubeJobClient};
pub use compiler::{WorkloadSpec, WorkloadSpecBuilder};
pub use retriever::ExecutionResult;
pub use runner::{run_to_completion, JobContext};
pub use status::WorkloadStatus;
pub use watcher::{WatchConfig, WatchStrategy};
