use kube::{Api, Error as KubeError};
use perftest_types::{BenchmarkSet, BenchmarkSetPermutations, BenchmarkSetStatus};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::util::patch::{Object, patch_status};
use crate::util::{self, Error};

pub mod reconcile;

impl Object<BenchmarkSetStatus> for BenchmarkSet {
    fn mut_status(&mut self) -> &mut BenchmarkSetStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Enumerates the spec overrides for a set in stable order: the cartesian
/// product of `product` (keys in the order given), followed by each
/// `explicit` entry. A set with no permutations at all has a single empty
/// permutation, so the template runs as-is.
pub fn permutations(
    spec: &BenchmarkSetPermutations,
) -> Result<Vec<Map<String, Value>>, Error> {
    let mut perms: Vec<Map<String, Value>> = vec![Map::new()];
    for (key, values) in &spec.product {
        let values = values.as_array().ok_or_else(|| {
            Error::UserInput(format!("permutations.product.{key} must be a list"))
        })?;
        perms = perms
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |value| {
                    let mut merged = base.clone();
                    merged.insert(key.clone(), value.clone());
                    merged
                })
            })
            .collect();
    }
    perms.extend(spec.explicit.iter().cloned());
    if perms.is_empty() {
        perms.push(Map::new());
    }
    Ok(perms)
}

/// The name of the i-th benchmark in a set, zero-padded so that the
/// children sort correctly in listings.
pub fn child_name(set_name: &str, count: u32, index: u32) -> String {
    let width = if count <= 1 {
        1
    } else {
        (count as f64).log10().floor() as usize + 1
    };
    format!("{set_name}-{:0width$}", index + 1, width = width)
}

/// Records the terminal phase of a child benchmark on its owning set.
///
/// The completed map only ever grows and each child is recorded at most
/// once, so replays of the same event are no-ops.
pub async fn child_completed(
    ctx: &Context,
    namespace: &str,
    set_name: &str,
    child_name: &str,
    succeeded: bool,
) -> Result<(), Error> {
    let api: Api<BenchmarkSet> = Api::namespaced(ctx.client.clone(), namespace);
    loop {
        let Some(set) = api.get_opt(set_name).await? else {
            return Ok(());
        };
        let recorded = set
            .status
            .as_ref()
            .is_some_and(|status| status.completed.contains_key(child_name));
        if recorded {
            return Ok(());
        }
        let child = child_name.to_string();
        let result = patch_status(
            ctx.client.clone(),
            &ctx.settings.field_manager,
            &set,
            move |status: &mut BenchmarkSetStatus| {
                status.completed.insert(child, succeeded);
            },
        )
        .await;
        match result {
            Ok(_) => return Ok(()),
            Err(KubeError::Api(ae)) if ae.code == 409 => {
                tokio::select! {
                    _ = ctx.shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(util::RETRY_DELAY) => {}
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn perms_of(value: Value) -> BenchmarkSetPermutations {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_permutations_run_the_template_once() {
        let perms = permutations(&BenchmarkSetPermutations::default()).unwrap();
        assert_eq!(perms.len(), 1);
        assert!(perms[0].is_empty());
    }

    #[test]
    fn product_is_a_cross_product_in_key_order() {
        let perms = permutations(&perms_of(json!({
            "product": {"streams": [1, 4], "hostNetwork": [true, false]},
        })))
        .unwrap();
        assert_eq!(perms.len(), 4);
        // streams varies slowest because it was given first
        assert_eq!(perms[0]["streams"], json!(1));
        assert_eq!(perms[0]["hostNetwork"], json!(true));
        assert_eq!(perms[1]["streams"], json!(1));
        assert_eq!(perms[1]["hostNetwork"], json!(false));
        assert_eq!(perms[3]["streams"], json!(4));
        assert_eq!(perms[3]["hostNetwork"], json!(false));
    }

    #[test]
    fn explicit_entries_follow_the_product() {
        let perms = permutations(&perms_of(json!({
            "product": {"streams": [1, 4]},
            "explicit": [{"streams": 16, "hostNetwork": true}],
        })))
        .unwrap();
        assert_eq!(perms.len(), 3);
        assert_eq!(perms[2]["streams"], json!(16));
    }

    #[test]
    fn non_list_product_values_are_rejected() {
        assert!(permutations(&perms_of(json!({"product": {"streams": 4}}))).is_err());
    }

    #[test]
    fn child_names_are_padded_to_the_count_width() {
        assert_eq!(child_name("sweep", 6, 0), "sweep-1");
        assert_eq!(child_name("sweep", 6, 5), "sweep-6");
        assert_eq!(child_name("sweep", 10, 0), "sweep-01");
        assert_eq!(child_name("sweep", 10, 9), "sweep-10");
        assert_eq!(child_name("sweep", 100, 41), "sweep-042");
    }
}
