use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{BenchmarkState, ImagePullPolicy, PodInfo};

/// Supported MPI transports.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum MPITransport {
    #[default]
    TCP,
    RDMA,
}

/// Problem sizes for the 3-D lid driven cavity flow benchmark.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum OpenFOAMProblemSize {
    #[default]
    S,
    M,
    XL,
    XXL,
}

/// Iterative methods for the 3-D lid driven cavity flow benchmark.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum OpenFOAMIterativeMethod {
    #[serde(rename = "fixedITER")]
    FixedIter,
    #[default]
    #[serde(rename = "fixedNORM")]
    FixedNorm,
    #[serde(rename = "FOAM-DIC-PCG.fixedNORM")]
    FoamDicPcgFixedNorm,
    #[serde(rename = "FOAM-GAMG-PCG.fixedNORM")]
    FoamGamgPcgFixedNorm,
    #[serde(rename = "PETSc-AMG-CG.fixedNORM")]
    PetscAmgCgFixedNorm,
    #[serde(rename = "PETSc-AMG-CG.fixedNORM.caching")]
    PetscAmgCgFixedNormCaching,
    #[serde(rename = "PETSc-ICC-CG.fixedNORM")]
    PetscIccCgFixedNorm,
}

fn default_ssh_port() -> u32 {
    2222
}

fn default_num_procs() -> u32 {
    1
}

fn default_num_nodes() -> u32 {
    1
}

/// Custom resource for running an OpenFOAM benchmark.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "OpenFOAM",
    plural = "openfoams",
    derive = "PartialEq",
    status = "OpenFOAMStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.transport\", \"name\": \"Transport\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.problemSize\", \"name\": \"Problem Size\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.numProcs\", \"name\": \"Num Procs\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.numNodes\", \"name\": \"Num Nodes\", \"type\": \"integer\" }"
)]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"Status\", \"type\": \"string\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.masterPod.podIp\", \"name\": \"Master IP\", \"type\": \"string\", \"priority\": 1 }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.startedAt\", \"name\": \"Started\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.result.wallclockTime\", \"name\": \"Wall Time\", \"type\": \"number\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct OpenFOAMSpec {
    /// The image to use for the benchmark. Defaults to the operator's openfoam image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The pull policy for the image.
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    /// The port to use for SSH.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u32,
    /// The transport to use for the benchmark.
    #[serde(default)]
    pub transport: MPITransport,
    /// The problem size for the 3-D lid driven cavity flow benchmark.
    #[serde(default)]
    pub problem_size: OpenFOAMProblemSize,
    /// The iterative method for the 3-D lid driven cavity flow benchmark.
    #[serde(default)]
    pub iterative_method: OpenFOAMIterativeMethod,
    /// The number of MPI worker processes.
    #[serde(default = "default_num_procs")]
    pub num_procs: u32,
    /// The number of MPI nodes.
    #[serde(default = "default_num_nodes")]
    pub num_nodes: u32,
}

/// The timing result of an OpenFOAM benchmark.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenFOAMResult {
    /// The real time taken to complete the benchmark in seconds.
    pub wallclock_time: f64,
    /// The user time taken to complete the benchmark in seconds.
    pub user_time: f64,
    /// The sys time taken to complete the benchmark in seconds.
    pub sys_time: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenFOAMStatus {
    #[serde(flatten)]
    pub state: BenchmarkState,
    /// The result of the benchmark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OpenFOAMResult>,
    /// Pod information for the MPI master pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_pod: Option<PodInfo>,
    /// Pod information for the worker pods, indexed by pod name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub worker_pods: BTreeMap<String, PodInfo>,
}
