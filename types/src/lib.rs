use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

mod fio;
mod iperf;
mod openfoam;
mod pingpong;
mod pytorch;
mod rdma;
mod set;

pub use fio::*;
pub use iperf::*;
pub use openfoam::*;
pub use pingpong::*;
pub use pytorch::*;
pub use rdma::*;
pub use set::*;

/// The API group that all of the benchmark CRDs belong to.
pub const API_GROUP: &str = "perftest.stackhpc.com";

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum ImagePullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePullPolicy::Always => "Always",
            ImagePullPolicy::IfNotPresent => "IfNotPresent",
            ImagePullPolicy::Never => "Never",
        }
    }
}

/// Phases that a benchmark moves through during its lifetime.
///
/// Until the underlying job completes, the phase mirrors the phase reported
/// by the job. Once the job completes, the benchmark passes through
/// Summarising before reaching Completed.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum BenchmarkPhase {
    /// The state of the benchmark is not known yet.
    #[default]
    Unknown,
    /// The benchmark is being prepared.
    Preparing,
    /// The benchmark is waiting to be scheduled.
    Pending,
    /// The benchmark has been aborted and is waiting for cleanup.
    Aborting,
    /// The benchmark has been aborted.
    Aborted,
    /// The minimum requested number of pods for the benchmark are running.
    Running,
    /// The benchmark is waiting for pods to be recreated.
    Restarting,
    /// The benchmark has completed and is waiting for cleanup.
    Completing,
    /// The workload is done and the benchmark is producing a result.
    Summarising,
    /// The benchmark has completed successfully.
    Completed,
    /// The benchmark finished unexpectedly and is waiting for cleanup.
    Terminating,
    /// The benchmark finished unexpectedly, e.g. in response to an event.
    Terminated,
    /// The benchmark failed without completing.
    Failed,
}

impl BenchmarkPhase {
    /// Whether the phase is one that the benchmark can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BenchmarkPhase::Aborted
                | BenchmarkPhase::Completed
                | BenchmarkPhase::Terminated
                | BenchmarkPhase::Failed
        )
    }
}

impl FromStr for BenchmarkPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(BenchmarkPhase::Unknown),
            "Preparing" => Ok(BenchmarkPhase::Preparing),
            "Pending" => Ok(BenchmarkPhase::Pending),
            "Aborting" => Ok(BenchmarkPhase::Aborting),
            "Aborted" => Ok(BenchmarkPhase::Aborted),
            "Running" => Ok(BenchmarkPhase::Running),
            "Restarting" => Ok(BenchmarkPhase::Restarting),
            "Completing" => Ok(BenchmarkPhase::Completing),
            "Summarising" => Ok(BenchmarkPhase::Summarising),
            "Completed" => Ok(BenchmarkPhase::Completed),
            "Terminating" => Ok(BenchmarkPhase::Terminating),
            "Terminated" => Ok(BenchmarkPhase::Terminated),
            "Failed" => Ok(BenchmarkPhase::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BenchmarkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BenchmarkPhase::Unknown => "Unknown",
            BenchmarkPhase::Preparing => "Preparing",
            BenchmarkPhase::Pending => "Pending",
            BenchmarkPhase::Aborting => "Aborting",
            BenchmarkPhase::Aborted => "Aborted",
            BenchmarkPhase::Running => "Running",
            BenchmarkPhase::Restarting => "Restarting",
            BenchmarkPhase::Completing => "Completing",
            BenchmarkPhase::Summarising => "Summarising",
            BenchmarkPhase::Completed => "Completed",
            BenchmarkPhase::Terminating => "Terminating",
            BenchmarkPhase::Terminated => "Terminated",
            BenchmarkPhase::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// Reference to a namespaced resource that is managed by a benchmark.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// Basic information about a scheduled pod.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    /// The IP of the pod.
    pub pod_ip: String,
    /// The name of the node that the pod was scheduled on.
    pub node_name: String,
    /// The IP of the node that the pod was scheduled on.
    pub node_ip: String,
}

impl PodInfo {
    /// Extracts pod info from a pod, or None if the pod has not been
    /// scheduled and assigned an IP yet.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let status = pod.status.as_ref()?;
        Some(PodInfo {
            pod_ip: status.pod_ip.clone()?,
            node_name: pod.spec.as_ref()?.node_name.clone()?,
            node_ip: status.host_ip.clone()?,
        })
    }
}

/// The part of the status that is common to every benchmark kind.
///
/// Kind statuses embed this with `#[serde(flatten)]` so that the fields
/// appear at the top level of `.status`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkState {
    #[serde(default)]
    pub phase: BenchmarkPhase,
    /// The name of the priority class bound to the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    /// References to the resources managed on behalf of this benchmark.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_resources: Vec<ResourceRef>,
    /// The time at which the benchmark started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Time>,
    /// The time at which the benchmark reached a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        for phase in [
            BenchmarkPhase::Aborted,
            BenchmarkPhase::Completed,
            BenchmarkPhase::Terminated,
            BenchmarkPhase::Failed,
        ] {
            assert!(phase.is_terminal());
        }
        for phase in [
            BenchmarkPhase::Unknown,
            BenchmarkPhase::Preparing,
            BenchmarkPhase::Pending,
            BenchmarkPhase::Running,
            BenchmarkPhase::Restarting,
            BenchmarkPhase::Completing,
            BenchmarkPhase::Summarising,
            BenchmarkPhase::Aborting,
            BenchmarkPhase::Terminating,
        ] {
            assert!(!phase.is_terminal());
        }
    }

    #[test]
    fn phase_round_trips_through_display() {
        let phase: BenchmarkPhase = "Restarting".parse().unwrap();
        assert_eq!(phase, BenchmarkPhase::Restarting);
        assert_eq!(phase.to_string(), "Restarting");
        assert!("NotAPhase".parse::<BenchmarkPhase>().is_err());
    }

    #[test]
    fn state_serialises_camel_case_and_skips_empty() {
        let state = BenchmarkState {
            phase: BenchmarkPhase::Preparing,
            priority_class_name: Some("kube-perftest-abc12".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["phase"], "Preparing");
        assert_eq!(value["priorityClassName"], "kube-perftest-abc12");
        assert!(value.get("managedResources").is_none());
        assert!(value.get("finishedAt").is_none());
    }
}
