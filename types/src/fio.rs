use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BenchmarkState, ImagePullPolicy, PodInfo};

/// Supported fio rw modes.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum FioRW {
    #[default]
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "randread")]
    RandRead,
    #[serde(rename = "randwrite")]
    RandWrite,
    #[serde(rename = "readwrite")]
    ReadWrite,
    #[serde(rename = "randrw")]
    RandRW,
}

impl FioRW {
    pub fn as_str(&self) -> &'static str {
        match self {
            FioRW::Read => "read",
            FioRW::Write => "write",
            FioRW::RandRead => "randread",
            FioRW::RandWrite => "randwrite",
            FioRW::ReadWrite => "readwrite",
            FioRW::RandRW => "randrw",
        }
    }
}

/// Supported fio ioengines.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum FioIOEngine {
    #[default]
    #[serde(rename = "libaio")]
    Libaio,
}

fn default_fio_port() -> u32 {
    8765
}

fn default_clients() -> u32 {
    1
}

fn default_bs() -> String {
    "4M".to_string()
}

fn default_iodepth() -> u32 {
    1
}

fn default_nrfiles() -> u32 {
    1
}

fn default_rwmixread() -> u32 {
    50
}

fn default_percentage_random() -> u32 {
    100
}

fn default_direct() -> bool {
    true
}

fn default_runtime() -> String {
    "30s".to_string()
}

fn default_num_jobs() -> u32 {
    1
}

fn default_size() -> String {
    "10G".to_string()
}

/// Custom resource for running a fio benchmark.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "Fio",
    plural = "fios",
    derive = "PartialEq",
    status = "FioStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.numJobs\", \"name\": \"Num Jobs\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.clients\", \"name\": \"Clients\", \"type\": \"integer\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".spec.rw\", \"name\": \"RW\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.bs\", \"name\": \"BS\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.rwmixread\", \"name\": \"Pct Read\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.percentageRandom\", \"name\": \"Pct Random\", \"type\": \"string\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.startedAt\", \"name\": \"Started\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.result.readBw\", \"name\": \"Read Bandwidth\", \"type\": \"number\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.result.readIops\", \"name\": \"Read IOPS\", \"type\": \"number\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.result.writeBw\", \"name\": \"Write Bandwidth\", \"type\": \"number\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.result.writeIops\", \"name\": \"Write IOPS\", \"type\": \"number\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct FioSpec {
    /// The image to use for the benchmark. Defaults to the operator's fio image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The port that the fio server listens on.
    #[serde(default = "default_fio_port")]
    pub fio_port: u32,
    /// The name of an existing PVC to mount on the clients.
    ///
    /// Exactly one of volumeClaimName and volumeClaimTemplate must be given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_name: Option<String>,
    /// A template describing the PVC to create and mount on the clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<serde_json::Value>,
    /// The number of fio client pods.
    #[serde(default = "default_clients")]
    pub clients: u32,
    /// The value of the fio rw config option.
    #[serde(default)]
    pub rw: FioRW,
    /// The value of the fio bs config option.
    #[serde(default = "default_bs")]
    pub bs: String,
    /// The value of the fio iodepth config option.
    #[serde(default = "default_iodepth")]
    pub iodepth: u32,
    /// The value of the fio ioengine config option.
    #[serde(default)]
    pub ioengine: FioIOEngine,
    /// The value of the fio nrfiles config option.
    #[serde(default = "default_nrfiles")]
    pub nrfiles: u32,
    /// The value of the fio rwmixread config option.
    #[serde(default = "default_rwmixread")]
    pub rwmixread: u32,
    /// The value of the fio percentage_random config option.
    #[serde(default = "default_percentage_random")]
    pub percentage_random: u32,
    /// The value of the fio direct config option.
    #[serde(default = "default_direct")]
    pub direct: bool,
    /// The value of the fio runtime config option.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// The value of the fio numjobs config option.
    #[serde(default = "default_num_jobs")]
    pub num_jobs: u32,
    /// The value of the fio size config option.
    #[serde(default = "default_size")]
    pub size: String,
    /// The value of the fio thread config option.
    #[serde(default)]
    pub thread: bool,
}

/// The aggregate result of a fio benchmark.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FioResult {
    /// The aggregate read bandwidth in KiB/s.
    pub read_bw: f64,
    /// The aggregate read IOPS.
    pub read_iops: f64,
    /// The aggregate mean read latency in nanoseconds.
    pub read_lat_ns_mean: f64,
    /// The aggregate read latency standard deviation in nanoseconds.
    pub read_lat_ns_stddev: f64,
    /// The aggregate write bandwidth in KiB/s.
    pub write_bw: f64,
    /// The aggregate write IOPS.
    pub write_iops: f64,
    /// The aggregate mean write latency in nanoseconds.
    pub write_lat_ns_mean: f64,
    /// The aggregate write latency standard deviation in nanoseconds.
    pub write_lat_ns_stddev: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FioStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// The result of the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FioResult>,
    /// Pod information for the fio server pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_pod: Option<PodInfo>,
    /// Pod information for the client pods, indexed by pod name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub worker_pods: BTreeMap<String, PodInfo>,
    /// The raw pod logs of the client pods, indexed by pod name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_logs: BTreeMap<String, String>,
}
