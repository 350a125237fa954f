use futures::stream::StreamExt;
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller::Action, watcher},
};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio::time::Duration;

use super::actions;
use crate::context::Context;
use crate::kinds::{Benchmark, HasState};
use crate::util::{
    Error, PROBE_INTERVAL, RETRY_DELAY,
    colors::{FG1, FG2},
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

/// Runs the lifecycle controller for one benchmark kind until shutdown.
pub async fn run<B: Benchmark>(ctx: Arc<Context>) {
    let kind = B::kind(&()).into_owned();
    println!(
        "{}",
        format!("⚙️ Starting {kind} benchmark controller...").green()
    );
    let api: Api<B> = Api::all(ctx.client.clone());
    let shutdown = ctx.shutdown.clone();
    let data = Arc::new(ContextData {
        #[cfg(feature = "metrics")]
        metrics: ControllerMetrics::new(&kind.to_ascii_lowercase()),
        ctx,
    });
    Controller::new(api, watcher::Config::default())
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile::<B>, on_error::<B>, data)
        .for_each(|_res| async move {})
        .await;
    println!("{}", format!("⚙️ {kind} benchmark controller stopped").green());
}

/// Context injected with each `reconcile` and `on_error` invocation.
struct ContextData {
    ctx: Arc<Context>,

    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

/// Action to be taken upon a benchmark during reconciliation.
#[derive(Debug, PartialEq, Clone)]
enum BenchmarkAction {
    /// The benchmark is being deleted; tear down everything it owns.
    Cleanup,

    /// First observation; acknowledge the benchmark as Preparing.
    Acknowledge,

    /// Bind a priority class and apply the rendered child resources.
    Provision,

    /// The workload has started running; stamp the start time.
    Started,

    /// The workload is done; capture the result, then tear down.
    Summarise,

    /// A terminal phase was reached; tear down leftovers and stamp the
    /// finish time.
    Finished,

    /// The benchmark is in the desired state and requires no action.
    NoOp,
}

impl BenchmarkAction {
    fn to_str(&self) -> &str {
        match self {
            BenchmarkAction::Cleanup => "Cleanup",
            BenchmarkAction::Acknowledge => "Acknowledge",
            BenchmarkAction::Provision => "Provision",
            BenchmarkAction::Started => "Started",
            BenchmarkAction::Summarise => "Summarise",
            BenchmarkAction::Finished => "Finished",
            BenchmarkAction::NoOp => "NoOp",
        }
    }
}

/// Reconciliation function shared by every benchmark kind.
async fn reconcile<B: Benchmark>(
    instance: Arc<B>,
    data: Arc<ContextData>,
) -> Result<Action, Error> {
    let ctx = &data.ctx;

    let namespace = match instance.namespace() {
        None => {
            return Err(Error::UserInput(
                "Expected benchmark resource to be namespaced.".to_owned(),
            ));
        }
        Some(namespace) => namespace,
    };
    let name = instance.name_any();

    #[cfg(feature = "metrics")]
    data.metrics.inc_reconciles(&name, &namespace);

    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    // Read phase of reconciliation determines the goal of the write phase.
    let action = determine_action(&*instance);

    #[cfg(feature = "metrics")]
    data.metrics
        .observe_read(&name, &namespace, action.to_str(), start.elapsed().as_secs_f64());

    if action != BenchmarkAction::NoOp {
        println!(
            "🔧 {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            action.to_str().color(FG2),
        );
        #[cfg(feature = "metrics")]
        data.metrics.inc_action(&name, &namespace, action.to_str());
    }

    #[cfg(feature = "metrics")]
    let timer = match action {
        BenchmarkAction::NoOp => None,
        _ => Some(data.metrics.write_timer(&name, &namespace, action.to_str())),
    };

    // Write phase: perform the action decided above. Invalid specs and
    // unparseable logs are permanent, so they move the benchmark to Failed
    // rather than erroring the reconciliation.
    let result = match action {
        BenchmarkAction::Cleanup => {
            actions::cleanup(ctx, &*instance).await?;
            Action::await_change()
        }
        BenchmarkAction::Acknowledge => {
            actions::acknowledge(ctx, &*instance).await?;
            Action::await_change()
        }
        BenchmarkAction::Provision => match actions::provision(ctx, &*instance).await {
            Ok(()) => Action::await_change(),
            Err(e) if e.is_permanent() => {
                actions::fail(ctx, &*instance, "Provision", "InvalidSpec", &e.to_string()).await?;
                Action::await_change()
            }
            Err(e) => return Err(e),
        },
        BenchmarkAction::Started => {
            actions::mark_started(ctx, &*instance).await?;
            Action::await_change()
        }
        BenchmarkAction::Summarise => actions::summarise(ctx, &*instance).await?,
        BenchmarkAction::Finished => {
            actions::finished(ctx, &*instance).await?;
            Action::await_change()
        }
        BenchmarkAction::NoOp => Action::requeue(PROBE_INTERVAL),
    };

    #[cfg(feature = "metrics")]
    if let Some(timer) = timer {
        timer.observe_duration();
    }

    Ok(result)
}

/// Looks at the state of the benchmark and decides which action to
/// perform. The finite set of possible actions is represented by the
/// `BenchmarkAction` enum.
fn determine_action<B: Benchmark>(instance: &B) -> BenchmarkAction {
    if instance.meta().deletion_timestamp.is_some() {
        return BenchmarkAction::Cleanup;
    }
    let Some(status) = instance.status() else {
        return BenchmarkAction::Acknowledge;
    };
    let state = status.state();
    let phase = state.phase;
    if phase.is_terminal() {
        return if state.finished_at.is_none() || !state.managed_resources.is_empty() {
            BenchmarkAction::Finished
        } else {
            BenchmarkAction::NoOp
        };
    }
    match phase {
        perftest_types::BenchmarkPhase::Unknown => BenchmarkAction::Acknowledge,
        perftest_types::BenchmarkPhase::Preparing => BenchmarkAction::Provision,
        perftest_types::BenchmarkPhase::Running if state.started_at.is_none() => {
            BenchmarkAction::Started
        }
        perftest_types::BenchmarkPhase::Summarising => BenchmarkAction::Summarise,
        _ => BenchmarkAction::NoOp,
    }
}

/// Called whenever a reconciliation fails. Conflicts retry after the short
/// conflict delay; anything else backs off for longer.
fn on_error<B: Benchmark>(instance: Arc<B>, error: &Error, _data: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Reconciliation error for {}/{}: {:?}",
            instance.namespace().unwrap_or_default(),
            instance.name_any(),
            error
        )
        .red()
    );
    if error.is_conflict() {
        Action::requeue(RETRY_DELAY)
    } else {
        Action::requeue(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use perftest_types::{BenchmarkPhase, IPerf, IPerfSpec, ResourceRef};

    fn iperf_in(phase: BenchmarkPhase) -> IPerf {
        let mut benchmark = IPerf::new(
            "bench",
            IPerfSpec {
                duration: 3,
                streams: 1,
                ..Default::default()
            },
        );
        benchmark.status_mut().state.phase = phase;
        benchmark
    }

    #[test]
    fn new_benchmarks_are_acknowledged() {
        let benchmark = IPerf::new(
            "bench",
            IPerfSpec {
                duration: 3,
                streams: 1,
                ..Default::default()
            },
        );
        assert_eq!(determine_action(&benchmark), BenchmarkAction::Acknowledge);
    }

    #[test]
    fn preparing_benchmarks_are_provisioned() {
        assert_eq!(
            determine_action(&iperf_in(BenchmarkPhase::Preparing)),
            BenchmarkAction::Provision
        );
    }

    #[test]
    fn running_benchmarks_are_stamped_once() {
        let mut benchmark = iperf_in(BenchmarkPhase::Running);
        assert_eq!(determine_action(&benchmark), BenchmarkAction::Started);
        benchmark.status_mut().state.started_at = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        assert_eq!(determine_action(&benchmark), BenchmarkAction::NoOp);
    }

    #[test]
    fn summarising_benchmarks_summarise() {
        assert_eq!(
            determine_action(&iperf_in(BenchmarkPhase::Summarising)),
            BenchmarkAction::Summarise
        );
    }

    #[test]
    fn terminal_benchmarks_finish_until_clean() {
        let mut benchmark = iperf_in(BenchmarkPhase::Failed);
        assert_eq!(determine_action(&benchmark), BenchmarkAction::Finished);
        let state = &mut benchmark.status_mut().state;
        state.finished_at = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        state.managed_resources = vec![ResourceRef {
            api_version: "v1".into(),
            kind: "ConfigMap".into(),
            name: "leftover".into(),
        }];
        assert_eq!(determine_action(&benchmark), BenchmarkAction::Finished);
        benchmark.status_mut().state.managed_resources.clear();
        assert_eq!(determine_action(&benchmark), BenchmarkAction::NoOp);
    }

    #[test]
    fn deletion_always_wins() {
        let mut benchmark = iperf_in(BenchmarkPhase::Running);
        benchmark.metadata.deletion_timestamp = Some(Time(k8s_openapi::jiff::Timestamp::now()));
        assert_eq!(determine_action(&benchmark), BenchmarkAction::Cleanup);
    }
}
