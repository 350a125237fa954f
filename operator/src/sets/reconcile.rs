use futures::stream::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::jiff::Timestamp;
use kube::api::{DynamicObject, ObjectMeta, PostParams, TypeMeta};
use kube::{
    Api, Resource, ResourceExt,
    runtime::{Controller, controller::Action, watcher},
};
use owo_colors::OwoColorize;
use perftest_types::{BenchmarkPhase, BenchmarkSet, BenchmarkSetStatus, BenchmarkSetTemplate};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Duration;

use crate::context::Context;
use crate::registry::Registry;
use crate::util::patch::patch_status;
use crate::util::{Error, PROBE_INTERVAL, mergeconcat};

/// Runs the BenchmarkSet controller until shutdown.
///
/// The controller expands a set into its child benchmarks and keeps the
/// aggregate counters up to date; the correlator records each child's
/// terminal phase on the set's status, which re-triggers reconciliation
/// here.
pub async fn run(ctx: Arc<Context>, registry: Arc<Registry>) {
    println!("{}", "⚙️ Starting BenchmarkSet controller...".green());
    let api: Api<BenchmarkSet> = Api::all(ctx.client.clone());
    let shutdown = ctx.shutdown.clone();
    let data = Arc::new(ContextData { ctx, registry });
    Controller::new(api, watcher::Config::default())
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, on_error, data)
        .for_each(|_res| async move {})
        .await;
    println!("{}", "⚙️ BenchmarkSet controller stopped".green());
}

struct ContextData {
    ctx: Arc<Context>,
    registry: Arc<Registry>,
}

async fn reconcile(set: Arc<BenchmarkSet>, data: Arc<ContextData>) -> Result<Action, Error> {
    let ctx = &data.ctx;
    let namespace = match set.namespace() {
        None => {
            return Err(Error::UserInput(
                "Expected BenchmarkSet resource to be namespaced.".to_owned(),
            ));
        }
        Some(namespace) => namespace,
    };
    let name = set.name_any();

    // Deletion cascades to the children through their owner references
    if set.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let template = &set.spec.template;
    if !template.api_version.starts_with(&ctx.settings.api_group) {
        return Err(Error::UserInput(format!(
            "template.apiVersion must belong to the {} group",
            ctx.settings.api_group
        )));
    }
    let entry = data.registry.get(&template.kind).ok_or_else(|| {
        Error::UserInput(format!("unknown benchmark kind {}", template.kind))
    })?;

    let perms = super::permutations(&set.spec.permutations)?;
    let permutation_count = perms.len() as u32;
    let repetitions = set.spec.repetitions;
    let count = permutation_count * repetitions;

    let recorded: BTreeMap<String, bool> = set
        .status
        .as_ref()
        .map(|status| status.completed.clone())
        .unwrap_or_default();
    let api: Api<DynamicObject> =
        Api::namespaced_with(ctx.client.clone(), &namespace, &entry.api_resource());
    let mut newly_completed: BTreeMap<String, bool> = BTreeMap::new();
    for index in 0..count {
        let child = super::child_name(&name, count, index);
        match api.get_opt(&child).await? {
            Some(existing) => {
                let phase = existing
                    .data
                    .pointer("/status/phase")
                    .and_then(|phase| phase.as_str())
                    .and_then(|phase| phase.parse::<BenchmarkPhase>().ok())
                    .unwrap_or_default();
                if phase.is_terminal() && !recorded.contains_key(&child) {
                    newly_completed.insert(child, phase == BenchmarkPhase::Completed);
                }
            }
            // A finished child that has been cleaned up is not recreated
            None if recorded.contains_key(&child) => {}
            None => {
                // Each permutation is emitted `repetitions` times in a row
                let perm = &perms[(index / repetitions) as usize];
                let object = build_child(&set, template, &child, &namespace, perm)?;
                match api.create(&PostParams::default(), &object).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    let mut tallied = recorded;
    tallied.extend(newly_completed.clone());
    let succeeded = tallied.values().filter(|succeeded| **succeeded).count() as u32;
    let failed = tallied.len() as u32 - succeeded;
    let finished = succeeded + failed == count;

    patch_status(
        ctx.client.clone(),
        &ctx.settings.field_manager,
        &*set,
        move |status: &mut BenchmarkSetStatus| {
            status.permutation_count = Some(permutation_count);
            status.count = Some(count);
            for (child, succeeded) in newly_completed {
                status.completed.entry(child).or_insert(succeeded);
            }
            status.succeeded = Some(succeeded);
            status.failed = Some(failed);
            if finished && status.finished_at.is_none() {
                status.finished_at = Some(Time::from(Timestamp::now()));
            }
        },
    )
    .await?;

    if finished {
        Ok(Action::await_change())
    } else {
        Ok(Action::requeue(PROBE_INTERVAL))
    }
}

/// Builds the i-th child benchmark: the template spec deep-merged with the
/// permutation, owned by the set.
fn build_child(
    set: &BenchmarkSet,
    template: &BenchmarkSetTemplate,
    name: &str,
    namespace: &str,
    permutation: &Map<String, Value>,
) -> Result<DynamicObject, Error> {
    let owner = set.controller_owner_ref(&()).ok_or_else(|| {
        Error::UserInput("BenchmarkSet is missing the metadata required for ownership".to_string())
    })?;
    let spec = mergeconcat(
        Value::Object(template.spec.clone()),
        Value::Object(permutation.clone()),
    );
    Ok(DynamicObject {
        types: Some(TypeMeta {
            api_version: template.api_version.clone(),
            kind: template.kind.clone(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        data: json!({"spec": spec}),
    })
}

fn on_error(set: Arc<BenchmarkSet>, error: &Error, _data: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Reconciliation error for set {}/{}: {:?}",
            set.namespace().unwrap_or_default(),
            set.name_any(),
            error
        )
        .red()
    );
    if error.is_permanent() {
        // Wait for a human edit rather than retrying a spec that can
        // never expand
        Action::await_change()
    } else {
        Action::requeue(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perftest_types::BenchmarkSetSpec;

    fn set() -> BenchmarkSet {
        let mut set = BenchmarkSet::new(
            "sweep",
            serde_json::from_value::<BenchmarkSetSpec>(json!({
                "template": {
                    "apiVersion": "perftest.stackhpc.com/v1alpha1",
                    "kind": "IPerf",
                    "spec": {"duration": 5},
                },
                "permutations": {"product": {"streams": [1, 4]}},
                "repetitions": 3,
            }))
            .unwrap(),
        );
        set.metadata.namespace = Some("default".to_string());
        set.metadata.uid = Some("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_string());
        set
    }

    #[test]
    fn children_merge_the_template_with_the_permutation() {
        let set = set();
        let perms = crate::sets::permutations(&set.spec.permutations).unwrap();
        assert_eq!(perms.len(), 2);
        let count = perms.len() as u32 * set.spec.repetitions;
        assert_eq!(count, 6);

        let child = build_child(
            &set,
            &set.spec.template,
            &crate::sets::child_name("sweep", count, 3),
            "default",
            &perms[3 / 3],
        )
        .unwrap();
        assert_eq!(child.metadata.name.as_deref(), Some("sweep-4"));
        assert_eq!(child.data["spec"]["duration"], json!(5));
        assert_eq!(child.data["spec"]["streams"], json!(4));
        let owners = child.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners[0].kind, "BenchmarkSet");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn the_first_half_of_the_fan_out_uses_the_first_permutation() {
        let set = set();
        let perms = crate::sets::permutations(&set.spec.permutations).unwrap();
        for index in 0..3u32 {
            let child = build_child(
                &set,
                &set.spec.template,
                &crate::sets::child_name("sweep", 6, index),
                "default",
                &perms[(index / 3) as usize],
            )
            .unwrap();
            assert_eq!(child.data["spec"]["streams"], json!(1));
        }
    }
}
