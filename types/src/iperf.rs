use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BenchmarkState, ImagePullPolicy};

fn default_buffer_size() -> u32 {
    128 * 1024
}

/// Custom resource for running an iperf benchmark.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "IPerf",
    plural = "iperfs",
    derive = "PartialEq",
    status = "IPerfStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.hostNetwork\", \"name\": \"Host Network\", \"type\": \"boolean\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.serverService\", \"name\": \"Server Service\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.duration\", \"name\": \"Duration\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.streams\", \"name\": \"Streams\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.bufferSize\", \"name\": \"Buffer Size\", \"type\": \"integer\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.summaryResult\", \"name\": \"Result\", \"type\": \"string\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct IPerfSpec {
    /// The image to use for the benchmark. Defaults to the operator's iperf image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// Indicates whether to use host networking or not.
    #[serde(default)]
    pub host_network: bool,
    /// Indicates whether to access the server via a service or not.
    #[serde(default)]
    pub server_service: bool,
    /// The duration of the benchmark in seconds.
    pub duration: u32,
    /// The number of streams to use.
    pub streams: u32,
    /// The length of the read/write buffer in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
}

/// The result of an individual iperf stream or summary.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IPerfSingleResult {
    /// The amount of data transferred in KBytes.
    pub transfer: u64,
    /// The average bandwidth for the transfer in Kbits/sec.
    pub bandwidth: u64,
}

/// The result of an iperf benchmark.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IPerfResult {
    /// Results from the individual streams, indexed by stream ID.
    pub streams: BTreeMap<String, IPerfSingleResult>,
    /// Combined result from all the streams.
    pub sum: IPerfSingleResult,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IPerfStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// The summary result for the benchmark, used for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_result: Option<String>,
    /// The complete result for the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<IPerfResult>,
    /// The raw pod log of the client pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_log: Option<String>,
}
