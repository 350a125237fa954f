use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::context::Context;
use crate::correlator::benchmark_identity;
use crate::util::Error;

/// The pod names a discovery configmap expects, from its `all-hosts` key.
pub fn expected_hosts(configmap: &ConfigMap) -> Vec<String> {
    configmap
        .data
        .as_ref()
        .and_then(|data| data.get("all-hosts"))
        .map(|hosts| {
            hosts
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The peers with IPs so far, keyed by hostname.
///
/// Addresses that are not ready yet still count: the gate is on IP
/// assignment, not on readiness, because the pods' readiness depends on
/// the hosts file this feeds.
pub fn discovered_peers(endpoints: &Endpoints) -> BTreeMap<String, String> {
    let mut peers = BTreeMap::new();
    for subset in endpoints.subsets.iter().flatten() {
        let addresses = subset
            .addresses
            .iter()
            .flatten()
            .chain(subset.not_ready_addresses.iter().flatten());
        for address in addresses {
            let hostname = address.hostname.clone().or_else(|| {
                address
                    .target_ref
                    .as_ref()
                    .filter(|target| target.kind.as_deref() == Some("Pod"))
                    .and_then(|target| target.name.clone())
            });
            if let Some(hostname) = hostname {
                peers.insert(hostname, address.ip.clone());
            }
        }
    }
    peers
}

/// The content for the configmap's `hosts` key.
///
/// Only once every expected peer has an IP is the complete file emitted;
/// until then the key is empty, which keeps the benchmark pods' init
/// containers waiting.
pub fn hosts_data(
    default_hosts: &str,
    service: &str,
    expected: &[String],
    discovered: &BTreeMap<String, String>,
) -> String {
    if expected.is_empty() || !expected.iter().all(|host| discovered.contains_key(host)) {
        return String::new();
    }
    let mut hosts = String::from(default_hosts.trim_end());
    hosts.push('\n');
    for host in expected {
        let ip = &discovered[host];
        let _ = writeln!(hosts, "{ip}  {host}.{service}  {host}");
    }
    hosts
}

/// Synthesises `/etc/hosts` content from endpoint membership into every
/// configmap that declares this service as its discovery target.
pub async fn endpoints_event(ctx: &Context, endpoints: &Endpoints) -> Result<(), Error> {
    let Some(namespace) = endpoints.namespace() else {
        return Ok(());
    };
    let service = endpoints.name_any();
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);
    let selector = format!("{}={}", ctx.settings.hosts_from_label, service);
    let configmaps = api.list(&ListParams::default().labels(&selector)).await?;
    let discovered = discovered_peers(endpoints);
    for configmap in configmaps {
        let expected = expected_hosts(&configmap);
        let hosts = hosts_data(&ctx.settings.default_hosts, &service, &expected, &discovered);
        let current = configmap
            .data
            .as_ref()
            .and_then(|data| data.get("hosts"))
            .cloned()
            .unwrap_or_default();
        if current == hosts {
            continue;
        }
        api.patch(
            &configmap.name_any(),
            &PatchParams::default(),
            &Patch::Merge(json!({"data": {"hosts": hosts}})),
        )
        .await?;
    }
    Ok(())
}

/// Once a discovery configmap's hosts file is complete, marks every pod of
/// the owning benchmark so that their init containers release.
pub async fn configmap_event(ctx: &Context, configmap: &ConfigMap) -> Result<(), Error> {
    let complete = configmap
        .data
        .as_ref()
        .and_then(|data| data.get("hosts"))
        .is_some_and(|hosts| !hosts.is_empty());
    if !complete {
        return Ok(());
    }
    let Some((kind, _, name)) = benchmark_identity(configmap.labels(), &ctx.settings) else {
        return Ok(());
    };
    let Some(namespace) = configmap.namespace() else {
        return Ok(());
    };
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let selector = ctx.settings.benchmark_selector(&kind, &namespace, &name);
    for pod in pods.list(&ListParams::default().labels(&selector)).await? {
        let marked = pod
            .annotations()
            .get(&ctx.settings.hosts_available_annotation)
            .is_some_and(|value| value == "yes");
        if marked {
            continue;
        }
        pods.patch(
            &pod.name_any(),
            &PatchParams::default(),
            &Patch::Merge(json!({"metadata": {"annotations": {
                ctx.settings.hosts_available_annotation.as_str(): "yes",
            }}})),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoints(value: serde_json::Value) -> Endpoints {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn peers_come_from_hostname_or_pod_target() {
        let endpoints = endpoints(json!({
            "metadata": {"name": "bench-workers", "namespace": "default"},
            "subsets": [{
                "addresses": [
                    {"ip": "10.0.0.5", "hostname": "bench-worker-0"},
                    {"ip": "10.0.0.6", "targetRef": {"kind": "Pod", "name": "bench-worker-1"}},
                    {"ip": "10.0.0.9", "targetRef": {"kind": "Service", "name": "not-a-pod"}},
                ],
                "notReadyAddresses": [
                    {"ip": "10.0.0.7", "hostname": "bench-worker-2"},
                ],
            }],
        }));
        let peers = discovered_peers(&endpoints);
        assert_eq!(peers.len(), 3);
        assert_eq!(peers["bench-worker-0"], "10.0.0.5");
        assert_eq!(peers["bench-worker-1"], "10.0.0.6");
        assert_eq!(peers["bench-worker-2"], "10.0.0.7");
    }

    #[test]
    fn hosts_stay_empty_until_every_peer_is_discovered() {
        let expected = vec!["bench-worker-0".to_string(), "bench-worker-1".to_string()];
        let mut discovered = BTreeMap::new();
        discovered.insert("bench-worker-0".to_string(), "10.0.0.5".to_string());
        assert_eq!(
            hosts_data("127.0.0.1  localhost", "bench-workers", &expected, &discovered),
            ""
        );

        discovered.insert("bench-worker-1".to_string(), "10.0.0.6".to_string());
        let hosts = hosts_data("127.0.0.1  localhost", "bench-workers", &expected, &discovered);
        assert_eq!(
            hosts,
            "127.0.0.1  localhost\n\
             10.0.0.5  bench-worker-0.bench-workers  bench-worker-0\n\
             10.0.0.6  bench-worker-1.bench-workers  bench-worker-1\n"
        );
    }

    #[test]
    fn no_expected_hosts_means_no_hosts_file() {
        assert_eq!(
            hosts_data("127.0.0.1  localhost", "svc", &[], &BTreeMap::new()),
            ""
        );
    }

    #[test]
    fn expected_hosts_come_from_the_all_hosts_key() {
        let configmap: ConfigMap = serde_json::from_value(json!({
            "metadata": {"name": "bench-hosts", "namespace": "default"},
            "data": {"all-hosts": "bench-worker-0\nbench-worker-1\n\n"},
        }))
        .unwrap();
        assert_eq!(
            expected_hosts(&configmap),
            vec!["bench-worker-0".to_string(), "bench-worker-1".to_string()]
        );
    }
}
