//! Read the result of a terminal job
//!
//! The result is the workload container's log followed by its exit code.
//! The log is written to the output sink before the exit code is read, so a
//! pod with a readable log but no terminated status still shows its output.

use std::io::Write;

use tracing::{debug, info};

use podjob_common::{Error, InconsistencyKind, Result, JOB_NAME_LABEL_KEY};

use crate::client::JobClient;
use crate::compiler::CONTAINER_NAME;
use crate::status::terminated_exit_code;

/// Output of a finished workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Complete container log, byte for byte
    pub log: Vec<u8>,
    /// Exit code of the workload container
    pub exit_code: i32,
}

/// Locate the job's pod, copy its log to `out` and read its exit code
pub async fn retrieve_result<W: Write + ?Sized>(
    client: &dyn JobClient,
    namespace: &str,
    job_name: &str,
    out: &mut W,
) -> Result<ExecutionResult> {
    let selector = format!("{}={}", JOB_NAME_LABEL_KEY, job_name);
    let pods = client.list_pods(namespace, &selector).await?;

    let pod_name = pods
        .first()
        .and_then(|pod| pod.metadata.name.clone())
        .ok_or_else(|| Error::inconsistent(job_name, InconsistencyKind::PodMissing))?;
    if pods.len() > 1 {
        debug!(
            job = %job_name,
            count = pods.len(),
            pod = %pod_name,
            "multiple pods found, using the first"
        );
    }

    let log = client
        .get_pod_logs(namespace, &pod_name, CONTAINER_NAME)
        .await?;
    out.write_all(&log)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io("stdout", e))?;

    let pod = client.get_pod(namespace, &pod_name).await?;
    let exit_code = terminated_exit_code(&pod, CONTAINER_NAME).ok_or_else(|| {
        Error::inconsistent(job_name, InconsistencyKind::TerminatedStatusMissing)
    })?;

    info!(job = %job_name, pod = %pod_name, exit_code, "retrieved job result");
    Ok(ExecutionResult { log, exit_code })
}
