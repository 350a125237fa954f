use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Api, CustomResourceExt, Resource, ResourceExt};
use perftest_types::{BenchmarkPhase, Fio, IPerf, MPIPingPong, OpenFOAM, PyTorch, RDMABandwidth, RDMALatency};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::kinds::{Benchmark, ClusterLogs, HasState};
use crate::util::{self, Error, patch};

/// Maps a benchmark kind to its descriptor.
///
/// Adding a kind to the operator is adding an entry here; no framework
/// code changes.
pub struct Registry {
    entries: Vec<Arc<dyn KindEntry>>,
    by_kind: HashMap<String, Arc<dyn KindEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        let entries: Vec<Arc<dyn KindEntry>> = vec![
            Arc::new(Entry::<Fio>(PhantomData)),
            Arc::new(Entry::<IPerf>(PhantomData)),
            Arc::new(Entry::<RDMABandwidth>(PhantomData)),
            Arc::new(Entry::<RDMALatency>(PhantomData)),
            Arc::new(Entry::<MPIPingPong>(PhantomData)),
            Arc::new(Entry::<OpenFOAM>(PhantomData)),
            Arc::new(Entry::<PyTorch>(PhantomData)),
        ];
        let by_kind = entries
            .iter()
            .map(|entry| (entry.kind(), entry.clone()))
            .collect();
        Registry { entries, by_kind }
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn KindEntry>> {
        self.by_kind.get(kind)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<dyn KindEntry>> {
        self.entries.iter()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

/// The type-erased face of a benchmark kind, used wherever the kind is
/// only known as a label value.
#[async_trait]
pub trait KindEntry: Send + Sync {
    fn kind(&self) -> String;

    fn api_resource(&self) -> ApiResource;

    fn crd(&self) -> CustomResourceDefinition;

    /// Runs the lifecycle controller for this kind until shutdown.
    fn controller(&self, ctx: Arc<Context>) -> BoxFuture<'static, ()>;

    /// Projects a Volcano job change onto the owning benchmark's status.
    async fn job_event(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        job: &DynamicObject,
    ) -> Result<(), Error>;

    /// Applies a pod change to the owning benchmark's status.
    async fn pod_event(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        pod: &Pod,
    ) -> Result<(), Error>;

    /// Moves the benchmark to Failed and records the reason as an event.
    async fn fail(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;
}

struct Entry<B: Benchmark>(PhantomData<B>);

#[async_trait]
impl<B: Benchmark> KindEntry for Entry<B> {
    fn kind(&self) -> String {
        B::kind(&()).into_owned()
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&B::group(&()), &B::version(&()), &B::kind(&())),
            &B::plural(&()),
        )
    }

    fn crd(&self) -> CustomResourceDefinition {
        B::crd()
    }

    fn controller(&self, ctx: Arc<Context>) -> BoxFuture<'static, ()> {
        Box::pin(crate::benchmarks::reconcile::run::<B>(ctx))
    }

    async fn job_event(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        job: &DynamicObject,
    ) -> Result<(), Error> {
        let api: Api<B> = Api::namespaced(ctx.client.clone(), namespace);
        loop {
            // A 404 means the benchmark has been deleted; drop the event
            let Some(mut benchmark) = api.get_opt(name).await? else {
                return Ok(());
            };
            if benchmark.phase() == BenchmarkPhase::Completed {
                return Ok(());
            }
            benchmark.job_modified(job);
            match patch::apply_status(&ctx.client, &ctx.settings, &benchmark).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    tokio::select! {
                        _ = ctx.shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(util::RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn pod_event(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        pod: &Pod,
    ) -> Result<(), Error> {
        let logs = ClusterLogs {
            client: ctx.client.clone(),
            namespace: pod.namespace().unwrap_or_else(|| namespace.to_string()),
            name: pod.name_any(),
        };
        let api: Api<B> = Api::namespaced(ctx.client.clone(), namespace);
        loop {
            let Some(mut benchmark) = api.get_opt(name).await? else {
                return Ok(());
            };
            if benchmark.phase() == BenchmarkPhase::Completed {
                return Ok(());
            }
            benchmark.pod_modified(&ctx.settings, pod, &logs).await?;
            match patch::apply_status(&ctx.client, &ctx.settings, &benchmark).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    tokio::select! {
                        _ = ctx.shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(util::RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fail(
        &self,
        ctx: &Context,
        namespace: &str,
        name: &str,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        let api: Api<B> = Api::namespaced(ctx.client.clone(), namespace);
        loop {
            let Some(mut benchmark) = api.get_opt(name).await? else {
                return Ok(());
            };
            if benchmark.phase().is_terminal() {
                return Ok(());
            }
            let reference = benchmark.object_ref(&());
            benchmark.status_mut().state_mut().phase = BenchmarkPhase::Failed;
            match patch::apply_status(&ctx.client, &ctx.settings, &benchmark).await {
                Ok(_) => {
                    ctx.publish_warning(&reference, "Correlate", reason, message)
                        .await;
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    tokio::select! {
                        _ = ctx.shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(util::RETRY_DELAY) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_benchmark_kinds_are_registered() {
        let registry = Registry::new();
        for kind in [
            "Fio",
            "IPerf",
            "RDMABandwidth",
            "RDMALatency",
            "MPIPingPong",
            "OpenFOAM",
            "PyTorch",
        ] {
            assert!(registry.get(kind).is_some(), "missing kind {kind}");
        }
        assert!(registry.get("BenchmarkSet").is_none());
        assert_eq!(registry.entries().count(), 7);
    }

    #[test]
    fn api_resources_carry_the_group() {
        let registry = Registry::new();
        let resource = registry.get("IPerf").unwrap().api_resource();
        assert_eq!(resource.group, "perftest.stackhpc.com");
        assert_eq!(resource.kind, "IPerf");
        assert_eq!(resource.plural, "iperfs");
    }
}
