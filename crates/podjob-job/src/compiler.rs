//! WorkloadSpec construction and rendering into a `batch/v1` Job
//!
//! A `WorkloadSpec` is the shim's view of one `run` invocation: image,
//! environment, resources, mounts and identity. It is built once, rendered
//! into a Kubernetes Job once and submitted once.
//!
//! Retries belong to the caller, so the Job never retries on its own:
//! `backoffLimit` is always 0 and the pod's restart policy is always `Never`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec,
    PodTemplateSpec, ResourceRequirements, Volume, VolumeMount as K8sVolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use podjob_common::{MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE};

use crate::volumes::VolumeMount;

/// Name of the single container in every job pod
pub const CONTAINER_NAME: &str = "workload";

/// Scheme the caller puts in front of image references
pub const IMAGE_SCHEME_PREFIX: &str = "docker://";

/// Pod restart policy for every job
pub const RESTART_POLICY: &str = "Never";

/// Job-level retries; always none
pub const BACKOFF_LIMIT: i32 = 0;

/// Timestamp layout of generated job names, nanosecond resolution
const JOB_NAME_TIME_FORMAT: &str = "%m-%d-%Y-%H-%M-%S-%f";

/// CPU and memory quantities for the workload container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    /// CPU limit (e.g. "250m")
    pub cpu_limit: String,
    /// Memory limit (e.g. "256Mi")
    pub memory_limit: String,
    /// CPU request
    pub cpu_request: String,
    /// Memory request
    pub memory_request: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu_limit: "250m".to_string(),
            memory_limit: "256Mi".to_string(),
            cpu_request: "250m".to_string(),
            memory_request: "256Mi".to_string(),
        }
    }
}

/// Generate a job name from a prefix and a timestamp
///
/// Two invocations a nanosecond apart get different names.
pub fn generate_job_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, now.format(JOB_NAME_TIME_FORMAT))
}

/// Strip the `docker://` scheme from an image reference, if present
pub fn strip_image_scheme(image_ref: &str) -> &str {
    image_ref
        .strip_prefix(IMAGE_SCHEME_PREFIX)
        .unwrap_or(image_ref)
}

/// Immutable description of one batch workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    name: String,
    namespace: String,
    image: String,
    command: Option<Vec<String>>,
    env: BTreeMap<String, String>,
    resources: ResourceSpec,
    volumes: Vec<VolumeMount>,
    run_as_user: Option<i64>,
    ttl_seconds_after_finished: Option<i32>,
}

impl WorkloadSpec {
    /// Generated job name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace the job is created in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Image reference without scheme
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Entrypoint override; `None` runs the image's own entrypoint
    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    /// Container environment
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Container resources
    pub fn resources(&self) -> &ResourceSpec {
        &self.resources
    }

    /// PVC mounts in order
    pub fn volumes(&self) -> &[VolumeMount] {
        &self.volumes
    }

    /// Pod `runAsUser`
    pub fn run_as_user(&self) -> Option<i64> {
        self.run_as_user
    }

    /// Seconds the finished job is kept before garbage collection
    pub fn ttl_seconds_after_finished(&self) -> Option<i32> {
        self.ttl_seconds_after_finished
    }

    /// Job-level retry budget, always [`BACKOFF_LIMIT`]
    pub fn backoff_limit(&self) -> i32 {
        BACKOFF_LIMIT
    }

    /// Pod restart policy, always [`RESTART_POLICY`]
    pub fn restart_policy(&self) -> &'static str {
        RESTART_POLICY
    }

    /// Render the spec as a Kubernetes Job
    pub fn to_job(&self) -> Job {
        let labels = BTreeMap::from([(
            MANAGED_BY_LABEL_KEY.to_string(),
            MANAGED_BY_LABEL_VALUE.to_string(),
        )]);

        let env: Vec<EnvVar> = self
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect();

        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(self.image.clone()),
            command: self.command.clone(),
            env: if env.is_empty() { None } else { Some(env) },
            resources: Some(self.resource_requirements()),
            volume_mounts: if self.volumes.is_empty() {
                None
            } else {
                Some(self.container_mounts())
            },
            ..Default::default()
        };

        let volumes = self.pod_volumes();

        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(BACKOFF_LIMIT),
                ttl_seconds_after_finished: self.ttl_seconds_after_finished,
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![container],
                        volumes: if volumes.is_empty() {
                            None
                        } else {
                            Some(volumes)
                        },
                        restart_policy: Some(RESTART_POLICY.to_string()),
                        security_context: self.run_as_user.map(|uid| PodSecurityContext {
                            run_as_user: Some(uid),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        let r = &self.resources;
        ResourceRequirements {
            limits: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(r.cpu_limit.clone())),
                ("memory".to_string(), Quantity(r.memory_limit.clone())),
            ])),
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(r.cpu_request.clone())),
                ("memory".to_string(), Quantity(r.memory_request.clone())),
            ])),
            ..Default::default()
        }
    }

    fn container_mounts(&self) -> Vec<K8sVolumeMount> {
        self.volumes
            .iter()
            .map(|m| K8sVolumeMount {
                name: m.claim_name().to_string(),
                mount_path: m.mount_path().to_string(),
                sub_path: m.sub_path().map(str::to_string),
                ..Default::default()
            })
            .collect()
    }

    /// One volume per distinct claim; mounts of the same claim share it
    fn pod_volumes(&self) -> Vec<Volume> {
        let mut seen = BTreeSet::new();
        self.volumes
            .iter()
            .filter(|m| seen.insert(m.claim_name()))
            .map(|m| Volume {
                name: m.claim_name().to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: m.claim_name().to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect()
    }
}

/// Builder for [`WorkloadSpec`]
///
/// Performs no semantic validation: quantity syntax and name format are
/// checked by the API server at submission.
#[derive(Debug, Clone)]
pub struct WorkloadSpecBuilder {
    spec: WorkloadSpec,
}

impl WorkloadSpecBuilder {
    /// Start a spec for `image_ref`, stripping the `docker://` scheme
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image_ref: &str,
    ) -> Self {
        Self {
            spec: WorkloadSpec {
                name: name.into(),
                namespace: namespace.into(),
                image: strip_image_scheme(image_ref).to_string(),
                command: None,
                env: BTreeMap::new(),
                resources: ResourceSpec::default(),
                volumes: Vec::new(),
                run_as_user: None,
                ttl_seconds_after_finished: None,
            },
        }
    }

    /// Override the image entrypoint
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.spec.command = Some(command);
        self
    }

    /// Set the container environment
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.spec.env = env;
        self
    }

    /// Set container resources
    pub fn with_resources(mut self, resources: ResourceSpec) -> Self {
        self.spec.resources = resources;
        self
    }

    /// Set PVC mounts
    pub fn with_volumes(mut self, volumes: Vec<VolumeMount>) -> Self {
        self.spec.volumes = volumes;
        self
    }

    /// Set the pod `runAsUser`
    pub fn with_run_as_user(mut self, uid: i64) -> Self {
        self.spec.run_as_user = Some(uid);
        self
    }

    /// Set `ttlSecondsAfterFinished`
    pub fn with_ttl_seconds_after_finished(mut self, ttl: Option<i32>) -> Self {
        self.spec.ttl_seconds_after_finished = ttl;
        self
    }

    /// Finish the spec
    pub fn build(self) -> WorkloadSpec {
        self.spec
    }
}
