use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use perftest_types::{BenchmarkState, ImagePullPolicy, OpenFOAM, OpenFOAMStatus, PodInfo};

use super::{Benchmark, HasState, PodLogs, pod_component, pod_phase};
use crate::results::{self, ResultsError};
use crate::settings::Settings;
use crate::util::Error;

impl HasState for OpenFOAMStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for OpenFOAM {
    type Status = OpenFOAMStatus;

    const TOOL_IMAGE: &'static str = "openfoam";

    fn status(&self) -> Option<&OpenFOAMStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut OpenFOAMStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn image(&self) -> Option<&str> {
        self.spec.image.as_deref()
    }

    fn image_pull_policy(&self) -> ImagePullPolicy {
        self.spec.image_pull_policy
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
                self.status_mut().result = Some(results::openfoam::parse(&log)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        if self.status().and_then(|status| status.result.as_ref()).is_none() {
            return Err(ResultsError::Incomplete(
                "master pod has not recorded a result yet".into(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::StaticLogs;
    use perftest_types::OpenFOAMSpec;

    fn succeeded_pod() -> Pod {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": "bench-master"},
            "status": {"phase": "Succeeded"},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn timings_are_parsed_when_the_pod_succeeds() {
        let mut benchmark = OpenFOAM::new("bench", OpenFOAMSpec::default());
        benchmark
            .pod_modified(
                &crate::settings::test_settings(),
                &succeeded_pod(),
                &StaticLogs("real 95.31\nuser 94.12\nsys 1.04\n".to_string()),
            )
            .await
            .unwrap();
        benchmark.summarise().unwrap();
        let result = benchmark.status.as_ref().unwrap().result.as_ref().unwrap();
        assert_eq!(result.wallclock_time, 95.31);
    }

    #[tokio::test]
    async fn missing_timings_are_permanent() {
        let mut benchmark = OpenFOAM::new("bench", OpenFOAMSpec::default());
        let err = benchmark
            .pod_modified(
                &crate::settings::test_settings(),
                &succeeded_pod(),
                &StaticLogs("no timings here\n".to_string()),
            )
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn summarise_without_a_result_is_incomplete() {
        let mut benchmark = OpenFOAM::new("bench", OpenFOAMSpec::default());
        assert!(benchmark.summarise().unwrap_err().is_incomplete());
    }
}
