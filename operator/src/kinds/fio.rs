use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::api::DynamicObject;
use perftest_types::{BenchmarkState, Fio, FioStatus, ImagePullPolicy, PodInfo};

use super::{Benchmark, HasState, PodLogs, default_resources, pod_component, pod_phase};
use crate::results::{self, ResultsError};
use crate::settings::Settings;
use crate::template::Loader;
use crate::util::Error;

impl HasState for FioStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for Fio {
    type Status = FioStatus;

    const TOOL_IMAGE: &'static str = "fio";

    fn status(&self) -> Option<&FioStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut FioStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn image(&self) -> Option<&str> {
        self.spec.image.as_deref()
    }

    fn image_pull_policy(&self) -> ImagePullPolicy {
        self.spec.image_pull_policy
    }

    fn resources(&self, settings: &Settings, templates: &Loader) -> Result<Vec<DynamicObject>, Error> {
        match (&self.spec.volume_claim_name, &self.spec.volume_claim_template) {
            (None, None) => {
                return Err(Error::UserInput(
                    "one of volumeClaimName or volumeClaimTemplate is required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::UserInput(
                    "only one of volumeClaimName and volumeClaimTemplate may be given".to_string(),
                ));
            }
            _ => {}
        }
        let mut objects = default_resources(self, settings, templates)?;
        // An existing claim takes precedence over a managed PVC
        if self.spec.volume_claim_name.is_some() {
            objects.retain(|object| {
                object
                    .types
                    .as_ref()
                    .is_none_or(|types| types.kind != "PersistentVolumeClaim")
            });
        }
        Ok(objects)
    }

    async fn pod_modified(
        &mut self,
        settings: &Settings,
        pod: &Pod,
        logs: &dyn PodLogs,
    ) -> Result<(), Error> {
        match pod_phase(pod) {
            "Running" => {
                if let Some(info) = PodInfo::from_pod(pod) {
                    if pod_component(settings, pod) == Some("master") {
                        self.status_mut().master_pod = Some(info);
                    } else {
                        self.status_mut().worker_pods.insert(pod.name_any(), info);
                    }
                }
            }
            "Succeeded" => {
                let log = logs.fetch().await?;
                self.status_mut().client_logs.insert(pod.name_any(), log);
            }
            _ => {}
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        let clients = self.spec.clients as usize;
        let status = self.status_mut();
        if status.client_logs.len() < clients {
            return Err(ResultsError::Incomplete(format!(
                "{} of {} client pods have recorded a result",
                status.client_logs.len(),
                clients
            ))
            .into());
        }
        let parsed = status
            .client_logs
            .values()
            .map(|log| results::fio::parse(log))
            .collect::<Result<Vec<_>, _>>()?;
        status.result = Some(match parsed.as_slice() {
            [single] => single.clone(),
            many => results::fio::combine(many),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use perftest_types::{FioRW, FioSpec};
    use serde_json::json;

    const TEMPLATE: &str = "\
apiVersion: v1
kind: PersistentVolumeClaim
metadata:
  name: {{ name }}-scratch
---
apiVersion: batch.volcano.sh/v1alpha1
kind: Job
metadata:
  name: {{ name }}
";

    fn fio(spec: FioSpec) -> Fio {
        Fio::new("bench", spec)
    }

    fn templates() -> Loader {
        let mut loader = Loader::empty();
        loader.add_template("fio.yaml.j2", TEMPLATE).unwrap();
        loader
    }

    #[test]
    fn volume_claim_name_skips_pvc_creation() {
        let benchmark = fio(FioSpec {
            volume_claim_name: Some("existing".to_string()),
            rw: FioRW::RandRead,
            ..Default::default()
        });
        let objects = benchmark
            .resources(&crate::settings::test_settings(), &templates())
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "Job");
    }

    #[test]
    fn volume_claim_template_keeps_the_pvc() {
        let benchmark = fio(FioSpec {
            volume_claim_template: Some(json!({"spec": {"storageClassName": "fast"}})),
            ..Default::default()
        });
        let objects = benchmark
            .resources(&crate::settings::test_settings(), &templates())
            .unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn a_claim_source_is_required() {
        let benchmark = fio(FioSpec::default());
        let err = benchmark
            .resources(&crate::settings::test_settings(), &templates())
            .unwrap_err();
        assert!(matches!(err, Error::UserInput(_)));
    }

    #[test]
    fn summarise_waits_for_every_client() {
        let mut benchmark = fio(FioSpec {
            clients: 2,
            volume_claim_name: Some("existing".to_string()),
            ..Default::default()
        });
        let log = json!({"client_stats": [{
            "jobname": "fio",
            "read": {"bw": 1000.0, "iops": 250.0, "lat_ns": {"mean": 120.0, "stddev": 10.0}},
            "write": {"bw": 0.0, "iops": 0.0, "lat_ns": {"mean": 0.0, "stddev": 0.0}},
        }]})
        .to_string();
        benchmark
            .status_mut()
            .client_logs
            .insert("bench-client-0".to_string(), log.clone());
        assert!(benchmark.summarise().unwrap_err().is_incomplete());

        benchmark
            .status_mut()
            .client_logs
            .insert("bench-client-1".to_string(), log);
        benchmark.summarise().unwrap();
        let result = benchmark.status.as_ref().unwrap().result.as_ref().unwrap();
        // Bandwidth adds up across the two clients, latency is averaged
        assert_eq!(result.read_bw, 2000.0);
        assert_eq!(result.read_lat_ns_mean, 120.0);
    }
}
