use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BenchmarkState, ImagePullPolicy, PodInfo};

fn default_ssh_port() -> u32 {
    2222
}

/// Custom resource for running an Intel MPI Benchmarks ping-pong test.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "MPIPingPong",
    plural = "mpipingpongs",
    derive = "PartialEq",
    status = "MPIPingPongStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.hostNetwork\", \"name\": \"Host Network\", \"type\": \"boolean\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.peakBandwidth\", \"name\": \"Peak Bandwidth\", \"type\": \"string\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct MPIPingPongSpec {
    /// The image to use for the benchmark. Defaults to the operator's mpi-benchmarks image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The port to use for SSH.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u32,
    /// Indicates whether to use host networking or not.
    #[serde(default)]
    pub host_network: bool,
}

/// An MPI ping-pong result for a single message size.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MPIPingPongResult {
    /// The message length in bytes.
    pub bytes: u64,
    /// The number of repetitions that were performed.
    pub repetitions: u64,
    /// The average time until a reply is received.
    pub time: f64,
    /// The average bandwidth that was achieved.
    pub bandwidth: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MPIPingPongStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// The units that the bandwidth is reported in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_units: Option<String>,
    /// The units that the time is reported in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_units: Option<String>,
    /// Results for each message size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<MPIPingPongResult>,
    /// The peak bandwidth achieved for any message size. Used as a headline result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_bandwidth: Option<String>,
    /// The raw pod log of the MPI master pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_log: Option<String>,
    /// Pod information for the MPI master pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_pod: Option<PodInfo>,
    /// Pod information for the worker pods, indexed by pod name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub worker_pods: BTreeMap<String, PodInfo>,
}
