use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, CustomResourceExt, Resource, ResourceExt};
use minijinja::context;
use perftest_types::{BenchmarkPhase, BenchmarkState, ImagePullPolicy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;

use crate::settings::Settings;
use crate::template::Loader;
use crate::util::Error;

mod fio;
mod iperf;
mod openfoam;
mod pingpong;
mod pytorch;
mod rdma;

/// Access to the lifecycle state embedded in every benchmark status.
pub trait HasState {
    fn state(&self) -> &BenchmarkState;
    fn state_mut(&mut self) -> &mut BenchmarkState;
}

/// Capability for fetching the log of the pod that triggered an event.
#[async_trait]
pub trait PodLogs: Send + Sync {
    async fn fetch(&self) -> Result<String, Error>;
}

/// Fetches pod logs through the cluster API.
pub struct ClusterLogs {
    pub client: Client,
    pub namespace: String,
    pub name: String,
}

#[async_trait]
impl PodLogs for ClusterLogs {
    async fn fetch(&self) -> Result<String, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.logs(&self.name, &Default::default()).await?)
    }
}

#[cfg(test)]
pub struct StaticLogs(pub String);

#[cfg(test)]
#[async_trait]
impl PodLogs for StaticLogs {
    async fn fetch(&self) -> Result<String, Error> {
        Ok(self.0.clone())
    }
}

/// The behaviour a benchmark kind contributes to the operator: its status
/// shape, the resources to create, how cluster events project onto the
/// benchmark, and how to derive a summary once the workload is done.
#[async_trait]
pub trait Benchmark:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + CustomResourceExt
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + Sized
    + 'static
{
    type Status: HasState + Clone + Default + Debug + Serialize + DeserializeOwned + Send + Sync;

    /// The name of the benchmark tool image, without prefix or tag.
    const TOOL_IMAGE: &'static str;

    fn status(&self) -> Option<&Self::Status>;
    fn status_mut(&mut self) -> &mut Self::Status;

    fn phase(&self) -> BenchmarkPhase {
        self.status()
            .map(|status| status.state().phase)
            .unwrap_or_default()
    }

    /// The image override from the spec, if any.
    fn image(&self) -> Option<&str>;

    fn image_pull_policy(&self) -> ImagePullPolicy;

    /// The name of the template that renders this benchmark's resources.
    fn template_name(&self) -> String {
        format!("{}.yaml.j2", Self::kind(&()).to_ascii_lowercase())
    }

    /// Renders the cluster objects to create for this benchmark.
    /// Deterministic; called once per Preparing transition.
    fn resources(&self, settings: &Settings, templates: &Loader) -> Result<Vec<DynamicObject>, Error> {
        default_resources(self, settings, templates)
    }

    /// Projects a change to the underlying Volcano job onto the benchmark
    /// phase. The benchmark mirrors the job phase until the job completes,
    /// at which point the benchmark moves to Summarising so that a result
    /// can be captured before teardown.
    fn job_modified(&mut self, job: &DynamicObject) {
        let phase = job_phase(job);
        let next = if phase == "Completed" {
            BenchmarkPhase::Summarising
        } else {
            phase.parse().unwrap_or(BenchmarkPhase::Unknown)
        };
        self.status_mut().state_mut().phase = next;
    }

    /// Updates kind-specific status fields from a change to one of the
    /// benchmark's pods. `logs` can be used to fetch the pod's log.
    async fn pod_modified(
        &mut self,
        settings: &Settings,
        pod: &Pod,
        logs: &dyn PodLogs,
    ) -> Result<(), Error>;

    /// Derives the parsed result and headline summary from captured logs.
    ///
    /// Idempotent; invoked repeatedly while results are incomplete.
    fn summarise(&mut self) -> Result<(), Error>;
}

/// Renders the kind's template with the standard context.
pub fn default_resources<B: Benchmark>(
    benchmark: &B,
    settings: &Settings,
    templates: &Loader,
) -> Result<Vec<DynamicObject>, Error> {
    let name = benchmark.name_any();
    let namespace = benchmark.namespace().unwrap_or_default();
    let image = benchmark
        .image()
        .map(str::to_string)
        .unwrap_or_else(|| settings.image(B::TOOL_IMAGE));
    let benchmark_value = serde_json::to_value(benchmark)?;
    let ctx = context! {
        benchmark => benchmark_value,
        name => name,
        namespace => namespace,
        image => image,
        image_pull_policy => benchmark.image_pull_policy().as_str(),
        settings => settings_context(settings),
    };
    templates.render_all(&benchmark.template_name(), ctx)
}

fn settings_context(settings: &Settings) -> serde_json::Value {
    json!({
        "scheduler_name": settings.scheduler_name,
        "queue_name": settings.queue_name,
        "kind_label": settings.kind_label,
        "namespace_label": settings.namespace_label,
        "name_label": settings.name_label,
        "component_label": settings.component_label,
        "hosts_from_label": settings.hosts_from_label,
        "default_hosts": settings.default_hosts,
        "resource_prefix": settings.resource_prefix,
    })
}

/// The phase reported by a Volcano job, or "Unknown".
pub fn job_phase(job: &DynamicObject) -> &str {
    job.data
        .pointer("/status/state/phase")
        .and_then(|phase| phase.as_str())
        .unwrap_or("Unknown")
}

/// The phase reported by a pod, or "Unknown".
pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}

/// The benchmark component that a pod plays, from its labels.
pub fn pod_component<'a>(settings: &Settings, pod: &'a Pod) -> Option<&'a str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(&settings.component_label))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perftest_types::{IPerf, IPerfSpec};

    fn volcano_job(phase: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "batch.volcano.sh/v1alpha1",
            "kind": "Job",
            "metadata": {"name": "bench", "namespace": "default"},
            "status": {"state": {"phase": phase}},
        }))
        .unwrap()
    }

    fn iperf() -> IPerf {
        IPerf::new(
            "bench",
            IPerfSpec {
                duration: 3,
                streams: 1,
                ..Default::default()
            },
        )
    }

    #[test]
    fn job_phase_mirrors_onto_benchmark() {
        let mut benchmark = iperf();
        benchmark.job_modified(&volcano_job("Running"));
        assert_eq!(benchmark.phase(), BenchmarkPhase::Running);
        benchmark.job_modified(&volcano_job("Restarting"));
        assert_eq!(benchmark.phase(), BenchmarkPhase::Restarting);
    }

    #[test]
    fn completed_job_moves_the_benchmark_to_summarising() {
        let mut benchmark = iperf();
        benchmark.job_modified(&volcano_job("Completed"));
        assert_eq!(benchmark.phase(), BenchmarkPhase::Summarising);
    }

    #[test]
    fn unrecognised_job_phase_becomes_unknown() {
        let mut benchmark = iperf();
        benchmark.job_modified(&volcano_job("SomethingNew"));
        assert_eq!(benchmark.phase(), BenchmarkPhase::Unknown);
    }
}
