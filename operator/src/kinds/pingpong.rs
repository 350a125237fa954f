use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use perftest_types::{BenchmarkState, ImagePullPolicy, MPIPingPong, MPIPingPongStatus, PodInfo};

use super::{Benchmark, HasState, PodLogs, pod_component, pod_phase};
use crate::results::{self, ResultsError};
use crate::settings::Settings;
use crate::util::Error;

impl HasState for MPIPingPongStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for MPIPingPong {
    type Status = MPIPingPongStatus;

    const TOOL_IMAGE: &'static str = "mpi-benchmarks";

    fn status(&self) -> Option<&MPIPingPongStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut MPIPingPongStatus {
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
        if pod_component(settings, pod) == Some("master") {
            match pod_phase(pod) {
                "Running" => {
                    if let Some(info) = PodInfo::from_pod(pod) {
                        self.status_mut().master_pod = Some(info);
                    }
                }
                "Succeeded" => {
                    let log = logs.fetch().await?;
                    self.status_mut().master_log = Some(log);
                }
                _ => {}
            }
        } else if pod_phase(pod) == "Running"
            && let Some(info) = PodInfo::from_pod(pod)
        {
            self.status_mut().worker_pods.insert(pod.name_any(), info);
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        let status = self.status_mut();
        let log = status.master_log.clone().ok_or_else(|| {
            ResultsError::Incomplete("master pod has not recorded a log yet".into())
        })?;
        let parsed = results::pingpong::parse(&log)?;
        let peak = parsed
            .results
            .iter()
            .map(|result| result.bandwidth)
            .fold(f64::MIN, f64::max);
        status.peak_bandwidth = Some(format!("{peak} {}", parsed.bandwidth_units));
        status.bandwidth_units = Some(parsed.bandwidth_units);
        status.time_units = Some(parsed.time_units);
        status.results = parsed.results;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perftest_types::MPIPingPongSpec;

    #[test]
    fn peak_bandwidth_carries_the_captured_units() {
        let mut benchmark = MPIPingPong::new("bench", MPIPingPongSpec::default());
        benchmark.status_mut().master_log = Some(
            "\
       #bytes #repetitions      t[usec]   Mbytes/sec
            1         1000         1.77         0.54
            2         1000         1.78         1.07
"
            .to_string(),
        );
        benchmark.summarise().unwrap();
        let status = benchmark.status.as_ref().unwrap();
        assert_eq!(status.peak_bandwidth.as_deref(), Some("1.07 Mbytes/sec"));
        assert_eq!(status.time_units.as_deref(), Some("usec"));
        assert_eq!(status.results.len(), 2);
    }

    #[test]
    fn summarise_without_a_log_is_incomplete() {
        let mut benchmark = MPIPingPong::new("bench", MPIPingPongSpec::default());
        assert!(benchmark.summarise().unwrap_err().is_incomplete());
    }
}
