//! Wait for a submitted job to reach a terminal state
//!
//! Two strategies with the same contract:
//! - `Poll`: read the job status, sleep the interval, repeat
//! - `Stream`: follow a watch on the single job
//!
//! Both stop at the first terminal status and retry transient read errors
//! instead of treating them as terminal. There is no overall timeout unless
//! one is configured; the caller normally enforces its own.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use podjob_common::retry::{retry_with_backoff, RetryConfig};
use podjob_common::{Error, Result};

use crate::client::JobClient;
use crate::status::WorkloadStatus;

/// Default interval between status reads when polling
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause before resubscribing when a watch ends without a terminal event
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// How the watcher observes the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    /// Read the status every `interval`
    Poll {
        /// Minimum time between two reads
        interval: Duration,
    },
    /// Follow a watch filtered to the job's name
    Stream,
}

impl Default for WatchStrategy {
    fn default() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Watcher settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    /// Observation strategy
    pub strategy: WatchStrategy,
    /// Give up after this long with [`Error::WatchTimeout`]
    pub timeout: Option<Duration>,
}

/// Block until the job is `Succeeded` or `Failed`
pub async fn wait_for_terminal(
    client: &dyn JobClient,
    namespace: &str,
    name: &str,
    config: &WatchConfig,
) -> Result<WorkloadStatus> {
    let wait = async {
        match config.strategy {
            WatchStrategy::Poll { interval } => {
                poll_until_terminal(client, namespace, name, interval).await
            }
            WatchStrategy::Stream => stream_until_terminal(client, namespace, name).await,
        }
    };

    let status = match config.timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| Error::WatchTimeout {
                job: name.to_string(),
                seconds: limit.as_secs(),
            })??,
        None => wait.await?,
    };

    info!(job = %name, %status, "job finished");
    Ok(status)
}

async fn poll_until_terminal(
    client: &dyn JobClient,
    namespace: &str,
    name: &str,
    interval: Duration,
) -> Result<WorkloadStatus> {
    let mut last = None;

    loop {
        match client.get_job_status(namespace, name).await {
            Ok(status) => {
                if last != Some(status) {
                    debug!(job = %name, %status, "job status changed");
                    last = Some(status);
                }
                if status.is_terminal() {
                    return Ok(status);
                }
            }
            Err(e) if e.is_transient() => {
                warn!(job = %name, error = %e, "failed to read job status, retrying");
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(interval).await;
    }
}

async fn stream_until_terminal(
    client: &dyn JobClient,
    namespace: &str,
    name: &str,
) -> Result<WorkloadStatus> {
    let subscribe = RetryConfig::infinite();

    loop {
        let mut events = retry_with_backoff(&subscribe, "watch_job", Error::is_transient, || {
            client.watch_job(namespace, name)
        })
        .await?;

        while let Some(event) = events.next().await {
            match event {
                Ok(status) => {
                    debug!(job = %name, %status, "job event");
                    if status.is_terminal() {
                        return Ok(status);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(job = %name, error = %e, "job watch error, continuing");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(job = %name, "job watch ended before a terminal status, resubscribing");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
