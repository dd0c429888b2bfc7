//! Environment-derived configuration for `run`
//!
//! Every setting comes from an environment variable with a default; the
//! shim takes no flags of its own because the caller's argv belongs to
//! podman. Settings are read once, at the start of the run pipeline.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use podjob_common::{Error, Result};
use podjob_job::compiler::ResourceSpec;
use podjob_job::volumes::{parse_claim_mappings, SourceVolume, VolumeConfig, VolumeMount};
use podjob_job::watcher::{WatchConfig, WatchStrategy};

/// Setting name reported for combined volume mappings
const VOLUME_MAPPINGS_SETTING: &str = "VOLUME_MAPPINGS";

/// How the run waits for the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchMode {
    /// Read the job status on an interval
    Poll,
    /// Follow a watch on the job
    Watch,
}

/// Settings for the run pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "podman")]
pub struct RunConfig {
    /// Container cpu limit
    #[arg(long, env = "CPU_LIMIT", default_value = "250m")]
    pub cpu_limit: String,

    /// Container memory limit
    #[arg(long, env = "MEMORY_LIMIT", default_value = "256Mi")]
    pub memory_limit: String,

    /// Container cpu request
    #[arg(long, env = "CPU_REQUEST", default_value = "250m")]
    pub cpu_request: String,

    /// Container memory request
    #[arg(long, env = "MEMORY_REQUEST", default_value = "256Mi")]
    pub memory_request: String,

    /// Prefix of the caller's clone directories
    #[arg(long, env = "GIT_CLONE_PATH", default_value = "/git")]
    pub git_clone_path: PathBuf,

    /// Claim backing the cloned repository
    #[arg(long, env = "MERGESTAT_CLAIM_NAME", default_value = "mergestat-git-pvc")]
    pub mergestat_claim_name: String,

    /// Container path of the cloned repository
    #[arg(long, env = "MERGESTAT_MOUNT_PATH", default_value = "/mergestat/repo")]
    pub mergestat_mount_path: String,

    /// Claim backing the trivy cache
    #[arg(long, env = "TRIVY_CLAIM_NAME", default_value = "mergestat-trivy-pvc")]
    pub trivy_claim_name: String,

    /// Container path of the trivy cache
    #[arg(long, env = "TRIVY_MOUNT_PATH", default_value = "/trivy")]
    pub trivy_mount_path: String,

    /// Claim backing the maven cache
    #[arg(long, env = "MAVEN_CLAIM_NAME", default_value = "maven-git-pvc")]
    pub maven_claim_name: String,

    /// Container path of the maven cache
    #[arg(long, env = "MAVEN_MOUNT_PATH", default_value = "/maven")]
    pub maven_mount_path: String,

    /// Comma-separated `claim:mount_path` pairs replacing the cache mounts
    #[arg(long, env = "VOLUME_MAPPINGS")]
    pub volume_mappings: Option<String>,

    /// Seconds a finished job is kept before garbage collection
    #[arg(long, env = "TTL_SECONDS_AFTER_FINISHED", default_value_t = 1800)]
    pub ttl_seconds_after_finished: i32,

    /// Prefix of generated job names
    #[arg(long, env = "JOB_NAME_PREFIX", default_value = "mergestat")]
    pub job_name_prefix: String,

    /// Pod `runAsUser`; defaults to the effective uid of this process
    #[arg(long, env = "RUN_AS_USER")]
    pub run_as_user: Option<i64>,

    /// Observation strategy
    #[arg(long, env = "WATCH_MODE", value_enum, default_value_t = WatchMode::Poll)]
    pub watch_mode: WatchMode,

    /// Seconds between status reads in poll mode
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value_t = 1)]
    pub poll_interval_seconds: u64,

    /// Give up waiting after this many seconds
    #[arg(long, env = "WATCH_TIMEOUT_SECONDS")]
    pub watch_timeout_seconds: Option<u64>,

    /// Namespace to run in instead of the service account's
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
}

impl RunConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::try_parse_from(["podman"]).map_err(config_error)
    }

    /// Container resources
    pub fn resources(&self) -> ResourceSpec {
        ResourceSpec {
            cpu_limit: self.cpu_limit.clone(),
            memory_limit: self.memory_limit.clone(),
            cpu_request: self.cpu_request.clone(),
            memory_request: self.memory_request.clone(),
        }
    }

    /// Base mounts and the binding of the `-v` source directory
    pub fn volume_config(&self) -> Result<VolumeConfig> {
        let base = match self.volume_mappings.as_deref() {
            Some(raw) => parse_claim_mappings(VOLUME_MAPPINGS_SETTING, raw)?,
            None => vec![
                VolumeMount::new(&self.trivy_claim_name, &self.trivy_mount_path, None)?,
                VolumeMount::new(&self.maven_claim_name, &self.maven_mount_path, None)?,
            ],
        };

        Ok(VolumeConfig {
            base,
            source: SourceVolume {
                claim_name: self.mergestat_claim_name.clone(),
                mount_path: self.mergestat_mount_path.clone(),
                clone_path_prefix: self.git_clone_path.clone(),
            },
        })
    }

    /// Watcher strategy and timeout
    pub fn watch_config(&self) -> Result<WatchConfig> {
        let strategy = match self.watch_mode {
            WatchMode::Poll => {
                if self.poll_interval_seconds == 0 {
                    return Err(Error::configuration(
                        "POLL_INTERVAL_SECONDS",
                        "must be at least 1",
                    ));
                }
                WatchStrategy::Poll {
                    interval: Duration::from_secs(self.poll_interval_seconds),
                }
            }
            WatchMode::Watch => WatchStrategy::Stream,
        };

        Ok(WatchConfig {
            strategy,
            timeout: self.watch_timeout_seconds.map(Duration::from_secs),
        })
    }

    /// Uid the workload runs as
    pub fn run_as_user(&self) -> i64 {
        self.run_as_user.unwrap_or_else(effective_uid)
    }
}

fn effective_uid() -> i64 {
    // SAFETY: geteuid has no preconditions and cannot fail
    i64::from(unsafe { libc::geteuid() })
}

fn config_error(err: clap::Error) -> Error {
    let message = err.to_string();
    let message = message.lines().next().unwrap_or_default().trim_start_matches("error: ");
    Error::configuration("environment", message)
}
