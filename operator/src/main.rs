use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::Reporter;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use perftest_types::BenchmarkSet;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

mod benchmarks;
mod context;
mod correlator;
mod discovery;
mod kinds;
mod priority;
mod registry;
mod results;
mod sets;
mod settings;
mod template;
mod util;

use context::{Context, EventLocks};
use priority::PriorityAllocator;
use registry::Registry;
use settings::{Args, Settings};
use template::Loader;
use util::Error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    perftest_common::init();
    let settings = Settings::from(Args::parse());
    println!(
        "{}",
        format!("⚙️ Starting kube-perftest operator for group {}...", settings.api_group).green()
    );

    let client = Client::try_default().await?;
    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        perftest_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    #[cfg(feature = "metrics")]
    tokio::spawn(util::metrics::serve(settings.metrics_port, shutdown.clone()));

    let templates = Loader::new(&settings.templates_dir);
    let registry = Arc::new(Registry::new());
    let ctx = Arc::new(Context {
        client: client.clone(),
        reporter: Reporter::from(settings.field_manager.clone()),
        settings,
        templates,
        priorities: PriorityAllocator::default(),
        shutdown: shutdown.clone(),
        locks: EventLocks::default(),
    });

    install_crds(&ctx, &registry).await?;
    perftest_common::signal_ready();

    // Namespace where we run leader election. This lets us keep the Lease
    // RBAC namespaced rather than cluster-scoped.
    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    // Unique identity per replica (Downward API POD_NAME is ideal).
    // Fallback to hostname if not present.
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("kube-perftest-operator-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "kube-perftest-operator-lock".to_string(),
            lease_ttl: Duration::from_secs(15),
        },
    );

    // We run indefinitely; only the leader runs the controllers.
    // On leadership loss, we abort them and go back to standby.
    let mut operator_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = operator_task.take() {
                    task.await.ok();
                }
                break;
            },
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                // If we can't talk to the apiserver / update the Lease,
                // assume we are not safe to lead.
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = operator_task.take() {
                    task.abort();
                    eprintln!("aborted controllers due to leader election error");
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if operator_task.is_none() {
                println!("{}", "👑 Acquired leadership; starting controllers".green());
                let ctx = ctx.clone();
                let registry = registry.clone();
                operator_task = Some(tokio::spawn(run_operator(ctx, registry)));
            }
        } else if let Some(task) = operator_task.take() {
            eprintln!("lost leadership; stopping controllers");
            task.abort();
        }
    }
    Ok(())
}

/// Runs every controller and the correlator until shutdown.
async fn run_operator(ctx: Arc<Context>, registry: Arc<Registry>) {
    let controllers: Vec<_> = registry
        .entries()
        .map(|entry| entry.controller(ctx.clone()))
        .collect();
    tokio::join!(
        futures::future::join_all(controllers),
        sets::reconcile::run(ctx.clone(), registry.clone()),
        correlator::run(ctx, registry),
    );
}

/// Publishes the CRD for every registered kind, plus the BenchmarkSet,
/// with the configured categories and defaults frozen into the schema.
async fn install_crds(ctx: &Context, registry: &Registry) -> Result<(), Error> {
    let api: Api<CustomResourceDefinition> = Api::all(ctx.client.clone());
    let mut crds: Vec<CustomResourceDefinition> =
        registry.entries().map(|entry| entry.crd()).collect();
    crds.push(BenchmarkSet::crd());
    for mut crd in crds {
        crd.spec.names.categories = Some(ctx.settings.crd_categories.clone());
        let name = crd.name_any();
        api.patch(
            &name,
            &PatchParams::apply(&ctx.settings.field_manager).force(),
            &Patch::Apply(&crd),
        )
        .await?;
        println!("{}", format!("📦 Registered CRD {name}").green());
    }
    Ok(())
}
