use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BenchmarkState, ImagePullPolicy, PodInfo};

/// Supported computation devices.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum PyTorchDevice {
    #[default]
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "cuda")]
    Cuda,
}

/// Models available for benchmarking.
///
/// The list must match the models baked into the pytorch-benchmark image.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum PyTorchModel {
    #[default]
    #[serde(rename = "alexnet")]
    Alexnet,
    #[serde(rename = "resnet50")]
    Resnet50,
    #[serde(rename = "llama")]
    Llama,
}

/// Model processes available to benchmark.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum PyTorchBenchmarkType {
    #[serde(rename = "train")]
    Train,
    #[default]
    #[serde(rename = "eval")]
    Eval,
}

fn default_input_batch_size() -> u32 {
    64
}

/// Custom resource for running a PyTorch benchmark.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "PyTorch",
    plural = "pytorches",
    derive = "PartialEq",
    status = "PyTorchStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.model\", \"name\": \"Model\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.benchmarkType\", \"name\": \"Benchmark Type\", \"type\": \"string\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".spec.device\", \"name\": \"Device\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.gpuCount\", \"name\": \"GPUs\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.inputBatchSize\", \"name\": \"Batch Size\", \"type\": \"integer\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.cpuTimeResult\", \"name\": \"CPU Wall Time (s)\", \"type\": \"number\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.gpuTimeResult\", \"name\": \"GPU Time (s)\", \"type\": \"number\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct PyTorchSpec {
    /// The image to use for the benchmark. Defaults to the operator's pytorch-benchmark image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The device to run the ML workload on.
    #[serde(default)]
    pub device: PyTorchDevice,
    /// The ML model to benchmark.
    #[serde(default)]
    pub model: PyTorchModel,
    /// Whether to benchmark the training or inference (eval) process.
    #[serde(default)]
    pub benchmark_type: PyTorchBenchmarkType,
    /// The batch size for the generated model input data.
    #[serde(default = "default_input_batch_size")]
    pub input_batch_size: u32,
    /// Number of GPUs to request for the benchmark run.
    ///
    /// Defaults to 0 for device = cpu and 1 for device = cuda.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
}

/// The output of the GNU `time -v` wrapper around the benchmark script.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GnuTimeResult {
    /// The elapsed wall clock time in seconds.
    pub wall_time: f64,
    /// The user mode CPU time in seconds.
    pub user_time: f64,
    /// The kernel mode CPU time in seconds.
    pub sys_time: f64,
    /// The maximum resident set size in kbytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rss_kb: Option<u64>,
}

/// An individual PyTorch benchmark result.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PyTorchResult {
    /// The CPU wall time (in seconds) per batch as reported by the benchmark script.
    pub cpu_wall_time: f64,
    /// The peak CPU memory usage (in GB) reported by the benchmark script.
    pub peak_cpu_memory: f64,
    /// The GPU time (in seconds) per batch reported by the benchmark script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_wall_time: Option<f64>,
    /// The peak GPU memory usage (in GB) reported by the benchmark script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_gpu_memory: Option<f64>,
    /// The output of the `time` command wrapping the benchmark execution.
    pub gnu_time: GnuTimeResult,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PyTorchStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// The number of GPUs used in this benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    /// The result of the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PyTorchResult>,
    /// The CPU wall time per batch in seconds. Used as a headline result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_result: Option<f64>,
    /// The GPU time per batch in seconds. Used as a headline result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_time_result: Option<f64>,
    /// Pod information for the pod running the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_pod: Option<PodInfo>,
    /// The raw pod log of the benchmark pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_log: Option<String>,
}
