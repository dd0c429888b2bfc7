//! podman-compatible shim
//!
//! Accepts the few podman invocations the MergeStat sync worker makes and
//! answers them without a container engine: `pull` and `image inspect` are
//! answered locally, `run` executes the image as a Kubernetes Job and mirrors
//! its log and exit code.

pub mod config;
pub mod dispatch;
pub mod env_file;
pub mod invocation;

pub use dispatch::{dispatch, InClusterBackend, RunBackend};
pub use invocation::{classify, Command, RunArgs};
