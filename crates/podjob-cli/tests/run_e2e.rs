//! End-to-end dispatch tests against a mocked cluster

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateTerminated, ContainerStatus, Pod, PodStatus,
};
use kube::api::ObjectMeta;
use mockall::mock;

use podjob_cli::config::RunConfig;
use podjob_cli::{classify, dispatch, RunBackend};
use podjob_common::Result;
use podjob_job::client::StatusStream;
use podjob_job::{JobClient, JobContext, WorkloadStatus};

mock! {
    pub Cluster {}

    #[async_trait]
    impl JobClient for Cluster {
        async fn create_job(&self, namespace: &str, job: &Job) -> Result<()>;
        async fn get_job_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus>;
        async fn watch_job(&self, namespace: &str, name: &str) -> Result<StatusStream>;
        async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;
        async fn get_pod_logs(
            &self,
            namespace: &str,
            pod: &str,
            container: &str,
        ) -> Result<Vec<u8>>;
        async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;
    }
}

struct MockBackend {
    client: Arc<MockCluster>,
}

#[async_trait]
impl RunBackend for MockBackend {
    async fn connect(&self, _config: &RunConfig) -> Result<JobContext> {
        Ok(JobContext::new(self.client.clone(), "ci"))
    }
}

fn backend(cluster: MockCluster) -> MockBackend {
    MockBackend {
        client: Arc::new(cluster),
    }
}

fn env_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "FOO=bar").unwrap();
    file
}

fn run_args(env_file: &str, volume: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = [
        "run",
        "--quiet",
        "--rm",
        "--restart",
        "on-failure",
        "--pull",
        "never",
        "--env-file",
        env_file,
        "--network",
        "host",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Some(volume) = volume {
        args.push("-v".to_string());
        args.push(volume.to_string());
    }
    args.push("docker://example.com/app:tag".to_string());
    args
}

fn finished_pod(exit_code: i32) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("mergestat-pod".to_string()),
            ..Default::default()
        },
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "workload".to_string(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Cluster where the job reaches `status` and its pod exits with `exit_code`
///
/// Job creation is left to the caller so each test can inspect the Job.
fn finished_cluster(status: WorkloadStatus, exit_code: i32, log: &'static [u8]) -> MockCluster {
    let mut cluster = MockCluster::new();
    cluster
        .expect_get_job_status()
        .returning(move |_, _| Ok(status));
    cluster
        .expect_list_pods()
        .withf(|ns, selector| ns == "ci" && selector.starts_with("job-name=mergestat-"))
        .returning(|_, _| Ok(vec![finished_pod(0)]));
    cluster
        .expect_get_pod_logs()
        .withf(|_, pod, container| pod == "mergestat-pod" && container == "workload")
        .returning(move |_, _, _| Ok(log.to_vec()));
    cluster
        .expect_get_pod()
        .returning(move |_, _| Ok(finished_pod(exit_code)));
    cluster
}

fn container_env(job: &Job) -> Vec<(String, String)> {
    job.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
        .and_then(|c| c.env.as_ref())
        .map(|env| {
            env.iter()
                .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn succeeded_job_mirrors_log_and_exit_code() {
    let file = env_file();
    let mut cluster = finished_cluster(WorkloadStatus::Succeeded, 0, b"hello\n");
    cluster
        .expect_create_job()
        .withf(|ns, job| {
            let container = job
                .spec
                .as_ref()
                .and_then(|s| s.template.spec.as_ref())
                .and_then(|s| s.containers.first());
            ns == "ci"
                && container.and_then(|c| c.image.as_deref()) == Some("example.com/app:tag")
                && container_env(job) == vec![("FOO".to_string(), "bar".to_string())]
                && job.spec.as_ref().and_then(|s| s.backoff_limit) == Some(0)
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let args = run_args(file.path().to_str().unwrap(), None);
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 0);
    assert_eq!(out, b"hello\n");
}

#[tokio::test(start_paused = true)]
async fn failed_job_forwards_workload_exit_code() {
    let file = env_file();
    let mut cluster = finished_cluster(WorkloadStatus::Failed, 3, b"boom\n");
    cluster
        .expect_create_job()
        .times(1)
        .returning(|_, _| Ok(()));

    let args = run_args(file.path().to_str().unwrap(), None);
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 3);
    assert_eq!(out, b"boom\n");
}

#[tokio::test(start_paused = true)]
async fn source_volume_is_mounted_by_sub_path() {
    let file = env_file();
    let mut cluster = finished_cluster(WorkloadStatus::Succeeded, 0, b"");
    cluster
        .expect_create_job()
        .withf(|_, job| {
            let mounts = job
                .spec
                .as_ref()
                .and_then(|s| s.template.spec.as_ref())
                .and_then(|s| s.containers.first())
                .and_then(|c| c.volume_mounts.clone())
                .unwrap_or_default();
            mounts.iter().any(|m| {
                m.mount_path == "/mergestat/repo" && m.sub_path.as_deref() == Some("repo-abc")
            })
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let args = run_args(
        file.path().to_str().unwrap(),
        Some("/git/repo-abc:/mergestat/repo"),
    );
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_invocation_differs_only_in_job_name() {
    let file = env_file();
    let args = run_args(
        file.path().to_str().unwrap(),
        Some("/git/repo-abc:/mergestat/repo"),
    );
    let submitted: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..2 {
        let mut cluster = finished_cluster(WorkloadStatus::Succeeded, 0, b"");
        let sink = submitted.clone();
        cluster
            .expect_create_job()
            .times(1)
            .returning(move |_, job| {
                sink.lock().unwrap().push(job.clone());
                Ok(())
            });

        let mut out = Vec::new();
        assert_eq!(dispatch(&args, &backend(cluster), &mut out).await, 0);
        std::thread::sleep(Duration::from_millis(2));
    }

    let mut jobs = submitted.lock().unwrap().clone();
    assert_eq!(jobs.len(), 2);
    let second = jobs.pop().unwrap();
    let first = jobs.pop().unwrap();
    assert_ne!(first.metadata.name, second.metadata.name);

    let unnamed = |mut job: Job| {
        job.metadata.name = None;
        job
    };
    assert_eq!(unnamed(first), unnamed(second));
}

#[tokio::test(start_paused = true)]
async fn terminal_job_without_pods_exits_with_fallback() {
    let file = env_file();
    let mut cluster = MockCluster::new();
    cluster.expect_create_job().returning(|_, _| Ok(()));
    cluster
        .expect_get_job_status()
        .returning(|_, _| Ok(WorkloadStatus::Succeeded));
    cluster.expect_list_pods().returning(|_, _| Ok(vec![]));
    cluster.expect_get_pod_logs().never();
    cluster.expect_get_pod().never();

    let args = run_args(file.path().to_str().unwrap(), None);
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn unreadable_env_file_submits_nothing() {
    let mut cluster = MockCluster::new();
    cluster.expect_create_job().never();

    let args = run_args("/nonexistent/mergestat-env", None);
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 74);
}

#[tokio::test]
async fn outside_volume_is_configuration_error() {
    let file = env_file();
    let mut cluster = MockCluster::new();
    cluster.expect_create_job().never();

    let args = run_args(file.path().to_str().unwrap(), Some("/tmp/repo:/mergestat/repo"));
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 78);
}

#[tokio::test]
async fn pull_is_a_silent_success() {
    let mut cluster = MockCluster::new();
    cluster.expect_create_job().never();

    let args = vec!["pull".to_string(), "docker://ghcr.io/mergestat/x:latest".to_string()];
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn inspect_prints_clone_label() {
    let expected = "[\n    {\n        \"Labels\": {\n            \"com.mergestat.sync.clone\": \"true\"\n        }\n    }\n]\n";

    for image in ["docker://example.com/app:tag", "anything"] {
        let mut cluster = MockCluster::new();
        cluster.expect_create_job().never();

        let args: Vec<String> = ["image", "inspect", image]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut out = Vec::new();
        let code = dispatch(&args, &backend(cluster), &mut out).await;

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}

#[tokio::test]
async fn unrecognized_invocation_exits_126_without_submitting() {
    let mut cluster = MockCluster::new();
    cluster.expect_create_job().never();

    let args: Vec<String> = ["ps", "-a"].iter().map(|s| s.to_string()).collect();
    let mut out = Vec::new();
    let code = dispatch(&args, &backend(cluster), &mut out).await;

    assert_eq!(code, 126);
    assert!(out.is_empty());
}

#[test]
fn classification_is_stable() {
    let args = run_args("/tmp/env", Some("/git/a:/b"));
    assert_eq!(classify(&args), classify(&args));
}
