use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BenchmarkState, ImagePullPolicy, PodInfo};

/// Modes for the RDMA bandwidth benchmark.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum RDMABandwidthMode {
    #[default]
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
}

impl RDMABandwidthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RDMABandwidthMode::Read => "read",
            RDMABandwidthMode::Write => "write",
        }
    }
}

/// Custom resource for running an RDMA bandwidth benchmark using the
/// perftest `ib_read_bw`/`ib_write_bw` tools.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "RDMABandwidth",
    plural = "rdmabandwidths",
    derive = "PartialEq",
    status = "RDMABandwidthStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.mode\", \"name\": \"Mode\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.peakBandwidth\", \"name\": \"Peak Bandwidth\", \"type\": \"string\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct RDMABandwidthSpec {
    /// The image to use for the benchmark. Defaults to the operator's perftest image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The mode for the test.
    #[serde(default)]
    pub mode: RDMABandwidthMode,
    /// The name of the RDMA shared device to use.
    pub rdma_shared_device_name: String,
}

/// An RDMA bandwidth result for a single message size.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RDMABandwidthResult {
    /// The message size in bytes.
    pub bytes: u64,
    /// The number of iterations.
    pub iterations: u64,
    /// The peak bandwidth in Gbit/sec.
    pub peak_bandwidth: f64,
    /// The average bandwidth in Gbit/sec.
    pub average_bandwidth: f64,
    /// The message rate in Mpps.
    pub message_rate: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RDMABandwidthStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// Results for each message size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<RDMABandwidthResult>,
    /// The peak bandwidth achieved during the benchmark. Used as a headline result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_bandwidth: Option<String>,
    /// The raw pod log of the client pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_log: Option<String>,
    /// Pod information for the server pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_pod: Option<PodInfo>,
    /// Pod information for the client pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_pod: Option<PodInfo>,
}

/// Custom resource for running an RDMA latency benchmark using the
/// perftest `ib_read_lat`/`ib_write_lat` tools.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "RDMALatency",
    plural = "rdmalatencies",
    derive = "PartialEq",
    status = "RDMALatencyStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lowestLatency\", \"name\": \"Lowest Latency\", \"type\": \"string\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct RDMALatencySpec {
    /// The image to use for the benchmark. Defaults to the operator's perftest image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The name of the RDMA shared device to use.
    pub rdma_shared_device_name: String,
}

/// An RDMA latency result for a single message size.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RDMALatencyResult {
    /// The message size in bytes.
    pub bytes: u64,
    /// The number of iterations.
    pub iterations: u64,
    /// The minimum latency in usec.
    pub minimum: f64,
    /// The maximum latency in usec.
    pub maximum: f64,
    /// The typical latency in usec.
    pub typical: f64,
    /// The average latency in usec.
    pub average: f64,
    /// The latency standard deviation in usec.
    pub stddev: f64,
    /// The 99th percentile latency in usec.
    pub percentile_99: f64,
    /// The 99.9th percentile latency in usec.
    pub percentile_99_9: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RDMALatencyStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// Results for each message size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<RDMALatencyResult>,
    /// The lowest average latency observed for any message size. Used as a headline result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lowest_latency: Option<String>,
    /// The raw pod log of the client pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_log: Option<String>,
    /// Pod information for the server pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_pod: Option<PodInfo>,
    /// Pod information for the client pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_pod: Option<PodInfo>,
}
