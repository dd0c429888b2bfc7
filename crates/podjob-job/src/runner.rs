//! Run a workload to completion
//!
//! submit → wait for a terminal status → retrieve the result.
//! Submission is attempted once; a rejected job is reported, never retried.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use podjob_common::Result;

use crate::client::JobClient;
use crate::compiler::WorkloadSpec;
use crate::retriever::{retrieve_result, ExecutionResult};
use crate::watcher::{wait_for_terminal, WatchConfig};

/// Shared context for a run
pub struct JobContext {
    /// Cluster operations for the run
    pub client: Arc<dyn JobClient>,
    /// Namespace the job is created and observed in
    pub namespace: String,
}

impl JobContext {
    /// Create a new JobContext for the given namespace
    pub fn new(client: Arc<dyn JobClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

/// Create the job described by `spec`
pub async fn submit(client: &dyn JobClient, spec: &WorkloadSpec) -> Result<()> {
    let job = spec.to_job();
    debug!(job = ?job, "rendered job");
    client.create_job(spec.namespace(), &job).await?;
    info!(
        job = %spec.name(),
        namespace = %spec.namespace(),
        image = %spec.image(),
        "submitted job"
    );
    Ok(())
}

/// Submit `spec`, wait for it to finish and copy its log to `out`
///
/// The returned exit code is the workload's own; a `Failed` job is not an
/// error here.
pub async fn run_to_completion<W: Write + ?Sized>(
    ctx: &JobContext,
    spec: &WorkloadSpec,
    watch: &WatchConfig,
    out: &mut W,
) -> Result<ExecutionResult> {
    let client = ctx.client.as_ref();

    submit(client, spec).await?;
    wait_for_terminal(client, &ctx.namespace, spec.name(), watch).await?;
    retrieve_result(client, &ctx.namespace, spec.name(), out).await
}
