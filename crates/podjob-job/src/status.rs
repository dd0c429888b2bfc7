//! Job and pod status interpretation

use std::fmt;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;

/// Observed lifecycle state of a submitted job
///
/// `Succeeded` and `Failed` are terminal: once the Job controller reports one
/// of them the job never changes state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    /// Created, no pod running yet
    Pending,
    /// A pod is active
    Running,
    /// The pod exited 0
    Succeeded,
    /// The pod exited non-zero or could not run
    Failed,
}

impl WorkloadStatus {
    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

fn has_true_condition(job: &Job, type_: &str) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == type_ && c.status == "True")
        })
        .unwrap_or(false)
}

/// Derive the workload status from a Job
///
/// Conditions win; the pod counters cover the window before the Job
/// controller writes a `Complete`/`Failed` condition. With `backoffLimit: 0`
/// a single failed pod means the job failed.
pub fn job_status(job: &Job) -> WorkloadStatus {
    let counts = job.status.as_ref();
    let succeeded = counts.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = counts.and_then(|s| s.failed).unwrap_or(0);
    let active = counts.and_then(|s| s.active).unwrap_or(0);

    if has_true_condition(job, "Complete") || succeeded > 0 {
        WorkloadStatus::Succeeded
    } else if has_true_condition(job, "Failed") || failed > 0 {
        WorkloadStatus::Failed
    } else if active > 0 {
        WorkloadStatus::Running
    } else {
        WorkloadStatus::Pending
    }
}

/// Exit code of `container` in `pod`, if it has terminated
pub fn terminated_exit_code(pod: &Pod, container: &str) -> Option<i32> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find(|cs| cs.name == container)?
        .state
        .as_ref()?
        .terminated
        .as_ref()
        .map(|t| t.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus,
        PodStatus,
    };

    fn job_with(status: JobStatus) -> Job {
        Job {
            status: Some(status),
            ..Default::default()
        }
    }

    fn condition(type_: &str, status: &str) -> JobCondition {
        JobCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn no_status_is_pending() {
        assert_eq!(job_status(&Job::default()), WorkloadStatus::Pending);
    }

    #[test]
    fn active_pod_is_running() {
        let job = job_with(JobStatus {
            active: Some(1),
            ..Default::default()
        });
        assert_eq!(job_status(&job), WorkloadStatus::Running);
    }

    #[test]
    fn complete_condition_is_succeeded() {
        let job = job_with(JobStatus {
            conditions: Some(vec![condition("Complete", "True")]),
            ..Default::default()
        });
        assert_eq!(job_status(&job), WorkloadStatus::Succeeded);
    }

    #[test]
    fn failed_condition_is_failed() {
        let job = job_with(JobStatus {
            conditions: Some(vec![condition("Failed", "True")]),
            ..Default::default()
        });
        assert_eq!(job_status(&job), WorkloadStatus::Failed);
    }

    #[test]
    fn false_condition_is_ignored() {
        let job = job_with(JobStatus {
            active: Some(1),
            conditions: Some(vec![condition("Failed", "False")]),
            ..Default::default()
        });
        assert_eq!(job_status(&job), WorkloadStatus::Running);
    }

    #[test]
    fn counters_cover_missing_conditions() {
        let failed = job_with(JobStatus {
            failed: Some(1),
            ..Default::default()
        });
        let succeeded = job_with(JobStatus {
            succeeded: Some(1),
            ..Default::default()
        });
        assert_eq!(job_status(&failed), WorkloadStatus::Failed);
        assert_eq!(job_status(&succeeded), WorkloadStatus::Succeeded);
    }

    #[test]
    fn terminal_states() {
        assert!(WorkloadStatus::Succeeded.is_terminal());
        assert!(WorkloadStatus::Failed.is_terminal());
        assert!(!WorkloadStatus::Pending.is_terminal());
        assert!(!WorkloadStatus::Running.is_terminal());
    }

    fn pod_with_state(container: &str, state: ContainerState) -> Pod {
        Pod {
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: container.to_string(),
                    state: Some(state),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reads_terminated_exit_code() {
        let pod = pod_with_state(
            "workload",
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 3,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(terminated_exit_code(&pod, "workload"), Some(3));
        assert_eq!(terminated_exit_code(&pod, "sidecar"), None);
    }

    #[test]
    fn running_container_has_no_exit_code() {
        let pod = pod_with_state(
            "workload",
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            },
        );
        assert_eq!(terminated_exit_code(&pod, "workload"), None);
        assert_eq!(terminated_exit_code(&Pod::default(), "workload"), None);
    }
}
