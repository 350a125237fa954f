use k8s_openapi::api::scheduling::v1::PriorityClass;
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::{Api, Client, ResourceExt};
use tokio::sync::Mutex;

use crate::settings::Settings;
use crate::util::Error;

/// Binds each benchmark to a unique, monotonically decreasing priority.
///
/// The default Kubernetes scheduler does not gang-schedule, so MPI-style
/// benchmarks rely on preemption to get their pods scheduled
/// simultaneously: every benchmark gets a priority strictly lower than all
/// existing ones, so a new benchmark can preempt older jobs without ever
/// preempting itself.
#[derive(Default)]
pub struct PriorityAllocator {
    // Serialises the find-minimum / create read-modify-write
    lock: Mutex<()>,
}

/// The next priority value given the values of the existing classes.
pub fn next_priority(existing: impl IntoIterator<Item = i32>, initial_priority: i32) -> i32 {
    existing
        .into_iter()
        .fold(initial_priority + 1, i32::min)
        - 1
}

impl PriorityAllocator {
    /// Returns the name of the priority class for the given benchmark,
    /// creating one if it does not exist yet.
    ///
    /// Looking the class up by label first makes the allocation idempotent
    /// across operator restarts. Creation conflicts are swallowed and the
    /// listing re-executed, so no two benchmarks can end up with the same
    /// value.
    pub async fn bind(
        &self,
        client: &Client,
        settings: &Settings,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<String, Error> {
        let _guard = self.lock.lock().await;
        let api: Api<PriorityClass> = Api::all(client.clone());
        loop {
            let classes = api
                .list(&ListParams::default().labels(&settings.kind_label))
                .await?;
            let mut existing = Vec::with_capacity(classes.items.len());
            let mut found = None;
            for class in &classes.items {
                let labels = class.labels();
                if labels.get(&settings.kind_label).map(String::as_str) == Some(kind)
                    && labels.get(&settings.namespace_label).map(String::as_str) == Some(namespace)
                    && labels.get(&settings.name_label).map(String::as_str) == Some(name)
                {
                    found = Some(class.name_any());
                    break;
                }
                existing.push(class.value);
            }
            if let Some(existing_name) = found {
                return Ok(existing_name);
            }
            let class = PriorityClass {
                metadata: ObjectMeta {
                    generate_name: Some(settings.resource_prefix.clone()),
                    labels: Some(settings.benchmark_labels(kind, namespace, name)),
                    ..Default::default()
                },
                value: next_priority(existing, settings.initial_priority),
                global_default: Some(false),
                preemption_policy: Some("PreemptLowerPriority".to_string()),
                ..Default::default()
            };
            match api.create(&PostParams::default(), &class).await {
                Ok(created) => return Ok(created.name_any()),
                // Someone else created a class in the meantime; re-list so
                // the value stays unique
                Err(kube::Error::Api(ae)) if ae.code == 409 => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Deletes every priority class labelled for the given benchmark.
    pub async fn release(
        &self,
        client: &Client,
        settings: &Settings,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<(), Error> {
        let api: Api<PriorityClass> = Api::all(client.clone());
        let selector = settings.benchmark_selector(kind, namespace, name);
        api.delete_collection(
            &Default::default(),
            &ListParams::default().labels(&selector),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_binding_sits_at_the_initial_priority() {
        assert_eq!(next_priority([], -1), -1);
    }

    #[test]
    fn values_decrease_monotonically() {
        let mut existing = vec![];
        for _ in 0..3 {
            existing.push(next_priority(existing.clone(), -1));
        }
        assert_eq!(existing, vec![-1, -2, -3]);
    }

    #[test]
    fn deleting_an_older_benchmark_does_not_reuse_its_value() {
        // A at -2 deleted, B at -3 still live: the next value keeps descending
        assert_eq!(next_priority([-3], -1), -4);
    }
}
