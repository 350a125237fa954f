use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The shape of the template for a benchmark set.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetTemplate {
    /// The API version of the benchmarks to create.
    pub api_version: String,
    /// The kind of the benchmarks to create.
    pub kind: String,
    /// The fixed part of the spec for the benchmarks.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub spec: serde_json::Map<String, serde_json::Value>,
}

/// The permutations over which a benchmark set fans out.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetPermutations {
    /// Spec overrides combined as a cross-product, keys in the order given.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub product: serde_json::Map<String, serde_json::Value>,
    /// Explicitly enumerated spec overrides, appended after the product.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explicit: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn default_repetitions() -> u32 {
    1
}

/// Custom resource for a parameterised set of benchmarks.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "perftest.stackhpc.com",
    version = "v1alpha1",
    kind = "BenchmarkSet",
    plural = "benchmarksets",
    derive = "PartialEq",
    status = "BenchmarkSetStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(category = "perftest")]
#[kube(printcolumn = "{\"jsonPath\": \".status.count\", \"name\": \"Count\", \"type\": \"integer\" }")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.succeeded\", \"name\": \"Succeeded\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.failed\", \"name\": \"Failed\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.finishedAt\", \"name\": \"Finished\", \"type\": \"date\" }"
)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetSpec {
    /// The template to use for the benchmarks in the set.
    pub template: BenchmarkSetTemplate,
    /// The permutations to apply to the template.
    #[serde(default)]
    pub permutations: BenchmarkSetPermutations,
    /// The number of times to repeat each permutation.
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSetStatus {
    /// The number of distinct permutations in the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permutation_count: Option<u32>,
    /// The total number of benchmarks in the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Map of completed benchmark names to whether the benchmark succeeded.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub completed: BTreeMap<String, bool>,
    /// The number of benchmarks that have completed successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<u32>,
    /// The number of benchmarks that have failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    /// The time at which the last benchmark in the set finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Time>,
}
