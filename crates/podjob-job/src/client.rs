//! Orchestrator client seam
//!
//! Everything the run pipeline needs from the API server goes through
//! [`JobClient`], so the pipeline can be driven by a mock in tests and by
//! [`KubeJobClient`] in production.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{AsyncReadExt, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use podjob_common::{Error, Result};

use crate::status::{job_status, WorkloadStatus};

/// Stream of status changes for one job
pub type StatusStream = BoxStream<'static, Result<WorkloadStatus>>;

/// Trait abstracting the Kubernetes operations of a run
///
/// Implementations map failures of `create_job` to [`Error::Submission`].
/// Status reads that may succeed on a later attempt (connection errors, 429,
/// 5xx) fail with [`Error::Observation`], which the watcher retries; API
/// rejections such as 401, 403 or 404 fail with [`Error::Kube`] and end the
/// wait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Create the job
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<()>;

    /// Read the current status of a job
    async fn get_job_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus>;

    /// Subscribe to status changes of a single job
    async fn watch_job(&self, namespace: &str, name: &str) -> Result<StatusStream>;

    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Read the complete, non-following log of a container
    async fn get_pod_logs(&self, namespace: &str, pod: &str, container: &str)
        -> Result<Vec<u8>>;

    /// Get a pod by name
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;
}

/// Whether an API status code is worth another read
///
/// 429 and 5xx are load or availability problems. Any other 4xx is a
/// rejection that repeats on every attempt.
pub fn is_retryable_status(code: u16) -> bool {
    code == 429 || code >= 500
}

/// Map a failed job read to a transient or permanent error
fn read_error(job: &str, err: kube::Error) -> Error {
    match &err {
        kube::Error::Api(ae) if !is_retryable_status(ae.code) => Error::from(err),
        _ => Error::observation(job, err.to_string()),
    }
}

fn watch_error(job: &str, err: watcher::Error) -> Error {
    match err {
        watcher::Error::InitialListFailed(e)
        | watcher::Error::WatchStartFailed(e)
        | watcher::Error::WatchFailed(e) => read_error(job, e),
        other => Error::observation(job, other.to_string()),
    }
}

/// [`JobClient`] backed by the kube-rs client
pub struct KubeJobClient {
    client: Client,
}

impl KubeJobClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl JobClient for KubeJobClient {
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<()> {
        let name = job.metadata.name.as_deref().unwrap_or_default();
        self.jobs(namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| Error::submission(name, e.to_string()))?;
        Ok(())
    }

    async fn get_job_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus> {
        let job = self
            .jobs(namespace)
            .get(name)
            .await
            .map_err(|e| read_error(name, e))?;
        Ok(job_status(&job))
    }

    async fn watch_job(&self, namespace: &str, name: &str) -> Result<StatusStream> {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
        let job_name = name.to_string();

        debug!(job = %name, namespace = %namespace, "subscribing to job events");

        let stream = watcher(self.jobs(namespace), config)
            .default_backoff()
            .applied_objects()
            .map(move |event| {
                event
                    .map(|job| job_status(&job))
                    .map_err(|e| watch_error(&job_name, e))
            })
            .boxed();
        Ok(stream)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(pods.items)
    }

    async fn get_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<u8>> {
        let params = LogParams {
            container: Some(container.to_string()),
            follow: false,
            ..Default::default()
        };
        let reader = self
            .pods(namespace)
            .log_stream(pod, &params)
            .await
            .map_err(|e| Error::Logs {
                pod: pod.to_string(),
                message: e.to_string(),
            })?;

        let mut reader = Box::pin(reader);
        let mut log = Vec::new();
        reader
            .read_to_end(&mut log)
            .await
            .map_err(|e| Error::Logs {
                pod: pod.to_string(),
                message: e.to_string(),
            })?;
        Ok(log)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        Ok(self.pods(namespace).get(name).await?)
    }
}
