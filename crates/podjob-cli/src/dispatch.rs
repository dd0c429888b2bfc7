//! Route a classified invocation and turn its outcome into an exit code

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Serializer;
use tracing::{debug, error, info};

use podjob_common::error::EXIT_SUCCESS;
use podjob_common::kube_utils::{create_client, current_namespace, NAMESPACE_FILE};
use podjob_common::{Error, Result};
use podjob_job::compiler::generate_job_name;
use podjob_job::volumes::resolve_volumes;
use podjob_job::{run_to_completion, JobContext, KubeJobClient, WorkloadSpecBuilder};

use crate::config::RunConfig;
use crate::env_file::load_env_file;
use crate::invocation::{classify, Command, RunArgs};

/// Label the caller looks for before deciding to clone a repository
const CLONE_LABEL: &str = "com.mergestat.sync.clone";

/// Source of the cluster connection for `run`
///
/// Only `run` reaches the cluster, so the connection is made lazily through
/// this seam instead of up front.
#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Build the client and resolve the namespace for this run
    async fn connect(&self, config: &RunConfig) -> Result<JobContext>;
}

/// Backend for a shim running inside a pod
pub struct InClusterBackend;

#[async_trait]
impl RunBackend for InClusterBackend {
    async fn connect(&self, config: &RunConfig) -> Result<JobContext> {
        let namespace =
            current_namespace(config.pod_namespace.as_deref(), Path::new(NAMESPACE_FILE))?;
        let client = create_client().await?;
        Ok(JobContext::new(
            Arc::new(KubeJobClient::new(client)),
            namespace,
        ))
    }
}

/// Write the synthetic image descriptor the caller expects from `image inspect`
///
/// Four-space indentation and a trailing newline.
pub fn write_inspect<W: Write + ?Sized>(out: &mut W) -> Result<()> {
    let descriptor = serde_json::json!([{ "Labels": { CLONE_LABEL: "true" } }]);

    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    descriptor
        .serialize(&mut ser)
        .map_err(|e| Error::io("stdout", e.into()))?;
    buf.push(b'\n');

    out.write_all(&buf)
        .and_then(|()| out.flush())
        .map_err(|e| Error::io("stdout", e))
}

/// Run one invocation and return the process exit code
pub async fn dispatch<W: Write + ?Sized>(
    args: &[String],
    backend: &dyn RunBackend,
    out: &mut W,
) -> i32 {
    let outcome = match classify(args) {
        Command::Pull { image } => {
            debug!(image = %image, "pull is a no-op");
            Ok(EXIT_SUCCESS)
        }
        Command::Inspect { image } => {
            debug!(image = %image, "reporting synthetic image labels");
            write_inspect(out).map(|()| EXIT_SUCCESS)
        }
        Command::Run(run) => run_workload(&run, backend, out).await,
        Command::Unrecognized => Err(Error::UnrecognizedInvocation {
            args: args.to_vec(),
        }),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "podman shim failed");
            e.exit_code()
        }
    }
}

async fn run_workload<W: Write + ?Sized>(
    run: &RunArgs,
    backend: &dyn RunBackend,
    out: &mut W,
) -> Result<i32> {
    let config = RunConfig::from_env()?;
    let volumes = resolve_volumes(&config.volume_config()?, run.volume.as_deref())?;
    let watch = config.watch_config()?;
    let env = load_env_file(Path::new(&run.env_file))?;

    let ctx = backend.connect(&config).await?;

    let spec = WorkloadSpecBuilder::new(
        generate_job_name(&config.job_name_prefix, Utc::now()),
        ctx.namespace.clone(),
        &run.image,
    )
    .with_env(env)
    .with_resources(config.resources())
    .with_volumes(volumes)
    .with_run_as_user(config.run_as_user())
    .with_ttl_seconds_after_finished(Some(config.ttl_seconds_after_finished))
    .build();

    let result = run_to_completion(&ctx, &spec, &watch, out).await?;
    info!(job = %spec.name(), exit_code = result.exit_code, "run finished");
    Ok(result.exit_code)
}
