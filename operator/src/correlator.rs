use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod};
use kube::api::DynamicObject;
use kube::core::{ApiResource, GroupVersionKind};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, ResourceExt};
use owo_colors::OwoColorize;
use perftest_types::BenchmarkPhase;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::Context;
use crate::registry::{KindEntry, Registry};
use crate::settings::Settings;
use crate::{discovery, sets};

/// Routes cluster events on owned resources back to the owning benchmark.
///
/// Four kinds are watched, each filtered to objects carrying the benchmark
/// kind label: Volcano jobs, pods, endpoints and discovery configmaps. A
/// fifth set of watches observes the benchmarks themselves so that sets
/// can aggregate their children's terminal phases.
pub async fn run(ctx: Arc<Context>, registry: Arc<Registry>) {
    println!("{}", "⚙️ Starting event correlator...".green());
    let children: Vec<_> = registry
        .entries()
        .cloned()
        .map(|entry| watch_benchmarks(ctx.clone(), entry))
        .collect();
    tokio::join!(
        watch_jobs(ctx.clone(), registry.clone()),
        watch_pods(ctx.clone(), registry.clone()),
        watch_endpoints(ctx.clone()),
        watch_configmaps(ctx.clone()),
        futures::future::join_all(children),
    );
    println!("{}", "⚙️ Event correlator stopped".green());
}

/// The `(kind, namespace, name)` of the benchmark an object belongs to,
/// from its labels. Objects without the full triple are ignored.
pub fn benchmark_identity(
    labels: &BTreeMap<String, String>,
    settings: &Settings,
) -> Option<(String, String, String)> {
    Some((
        labels.get(&settings.kind_label)?.clone(),
        labels.get(&settings.namespace_label)?.clone(),
        labels.get(&settings.name_label)?.clone(),
    ))
}

fn volcano_jobs(ctx: &Context) -> Api<DynamicObject> {
    let resource = ApiResource::from_gvk(&GroupVersionKind::gvk("batch.volcano.sh", "v1alpha1", "Job"));
    Api::all_with(ctx.client.clone(), &resource)
}

async fn watch_jobs(ctx: Arc<Context>, registry: Arc<Registry>) {
    let config = watcher::Config::default().labels(&ctx.settings.kind_label);
    let stream = watcher(volcano_jobs(&ctx), config)
        .default_backoff()
        .applied_objects();
    futures::pin_mut!(stream);
    loop {
        let job = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(job)) => job,
                Some(Err(e)) => {
                    eprintln!("{}", format!("job watch error: {e}").red());
                    continue;
                }
                None => break,
            },
        };
        let Some((kind, namespace, name)) = benchmark_identity(job.labels(), &ctx.settings) else {
            continue;
        };
        let Some(entry) = registry.get(&kind) else {
            continue;
        };
        let _guard = ctx.locks.lock(&format!("{kind}/{namespace}/{name}")).await;
        dispatch_result(
            &ctx,
            entry,
            &namespace,
            &name,
            entry.job_event(&ctx, &namespace, &name, &job).await,
        )
        .await;
    }
}

async fn watch_pods(ctx: Arc<Context>, registry: Arc<Registry>) {
    let api: Api<Pod> = Api::all(ctx.client.clone());
    let config = watcher::Config::default().labels(&ctx.settings.kind_label);
    let stream = watcher(api, config).default_backoff().applied_objects();
    futures::pin_mut!(stream);
    loop {
        let pod = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(pod)) => pod,
                Some(Err(e)) => {
                    eprintln!("{}", format!("pod watch error: {e}").red());
                    continue;
                }
                None => break,
            },
        };
        let Some((kind, namespace, name)) = benchmark_identity(pod.labels(), &ctx.settings) else {
            continue;
        };
        let Some(entry) = registry.get(&kind) else {
            continue;
        };
        let _guard = ctx.locks.lock(&format!("{kind}/{namespace}/{name}")).await;
        dispatch_result(
            &ctx,
            entry,
            &namespace,
            &name,
            entry.pod_event(&ctx, &namespace, &name, &pod).await,
        )
        .await;
    }
}

/// Applies the outcome of a dispatched event: permanent errors surface on
/// the benchmark as a failure, anything else is logged and retried by the
/// next watch event.
async fn dispatch_result(
    ctx: &Context,
    entry: &Arc<dyn KindEntry>,
    namespace: &str,
    name: &str,
    result: Result<(), crate::util::Error>,
) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_permanent() => {
            if let Err(fail_err) = entry
                .fail(ctx, namespace, name, "ParseError", &e.to_string())
                .await
            {
                eprintln!(
                    "{}",
                    format!("failed to mark {namespace}/{name} as Failed: {fail_err}").red()
                );
            }
        }
        Err(e) => {
            eprintln!(
                "{}",
                format!("error handling event for {namespace}/{name}: {e}").red()
            );
        }
    }
}

async fn watch_endpoints(ctx: Arc<Context>) {
    let api: Api<Endpoints> = Api::all(ctx.client.clone());
    let config = watcher::Config::default().labels(&ctx.settings.kind_label);
    let stream = watcher(api, config).default_backoff().applied_objects();
    futures::pin_mut!(stream);
    loop {
        let endpoints = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(endpoints)) => endpoints,
                Some(Err(e)) => {
                    eprintln!("{}", format!("endpoints watch error: {e}").red());
                    continue;
                }
                None => break,
            },
        };
        let guard = match benchmark_identity(endpoints.labels(), &ctx.settings) {
            Some((kind, namespace, name)) => {
                Some(ctx.locks.lock(&format!("{kind}/{namespace}/{name}")).await)
            }
            None => None,
        };
        if let Err(e) = discovery::endpoints_event(&ctx, &endpoints).await {
            eprintln!(
                "{}",
                format!(
                    "error synthesising hosts for endpoints {}: {e}",
                    endpoints.name_any()
                )
                .red()
            );
        }
        drop(guard);
    }
}

async fn watch_configmaps(ctx: Arc<Context>) {
    let api: Api<ConfigMap> = Api::all(ctx.client.clone());
    let config = watcher::Config::default().labels(&ctx.settings.hosts_from_label);
    let stream = watcher(api, config).default_backoff().applied_objects();
    futures::pin_mut!(stream);
    loop {
        let configmap = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(configmap)) => configmap,
                Some(Err(e)) => {
                    eprintln!("{}", format!("configmap watch error: {e}").red());
                    continue;
                }
                None => break,
            },
        };
        let guard = match benchmark_identity(configmap.labels(), &ctx.settings) {
            Some((kind, namespace, name)) => {
                Some(ctx.locks.lock(&format!("{kind}/{namespace}/{name}")).await)
            }
            None => None,
        };
        if let Err(e) = discovery::configmap_event(&ctx, &configmap).await {
            eprintln!(
                "{}",
                format!(
                    "error propagating hosts from configmap {}: {e}",
                    configmap.name_any()
                )
                .red()
            );
        }
        drop(guard);
    }
}

/// Watches one benchmark kind for terminal transitions of children that
/// are owned by a BenchmarkSet, and records them on the set.
async fn watch_benchmarks(ctx: Arc<Context>, entry: Arc<dyn KindEntry>) {
    let api: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &entry.api_resource());
    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .applied_objects();
    futures::pin_mut!(stream);
    loop {
        let benchmark = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            item = stream.next() => match item {
                Some(Ok(benchmark)) => benchmark,
                Some(Err(e)) => {
                    eprintln!("{}", format!("benchmark watch error: {e}").red());
                    continue;
                }
                None => break,
            },
        };
        let phase = benchmark
            .data
            .pointer("/status/phase")
            .and_then(|phase| phase.as_str())
            .and_then(|phase| phase.parse::<BenchmarkPhase>().ok())
            .unwrap_or_default();
        if !phase.is_terminal() {
            continue;
        }
        let Some(namespace) = benchmark.namespace() else {
            continue;
        };
        let owner = benchmark
            .owner_references()
            .iter()
            .find(|owner| {
                owner.kind == "BenchmarkSet"
                    && owner.api_version.starts_with(&ctx.settings.api_group)
            })
            .cloned();
        let Some(owner) = owner else { continue };
        let succeeded = phase == BenchmarkPhase::Completed;
        if let Err(e) = sets::child_completed(
            &ctx,
            &namespace,
            &owner.name,
            &benchmark.name_any(),
            succeeded,
        )
        .await
        {
            eprintln!(
                "{}",
                format!(
                    "error recording completion of {namespace}/{} on set {}: {e}",
                    benchmark.name_any(),
                    owner.name
                )
                .red()
            );
        }
    }
}
