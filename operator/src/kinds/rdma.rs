use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use perftest_types::{
    BenchmarkState, ImagePullPolicy, PodInfo, RDMABandwidth, RDMABandwidthStatus, RDMALatency,
    RDMALatencyStatus,
};

use super::{Benchmark, HasState, PodLogs, pod_component, pod_phase};
use crate::results::{self, ResultsError};
use crate::settings::Settings;
use crate::util::Error;

impl HasState for RDMABandwidthStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

impl HasState for RDMALatencyStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for RDMABandwidth {
    type Status = RDMABandwidthStatus;

    const TOOL_IMAGE: &'static str = "perftest";

    fn status(&self) -> Option<&RDMABandwidthStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut RDMABandwidthStatus {
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
                    match pod_component(settings, pod) {
                        Some("server") => self.status_mut().server_pod = Some(info),
                        Some("client") => self.status_mut().client_pod = Some(info),
                        _ => {}
                    }
                }
            }
            // Only the client ever succeeds; the server is forcibly terminated
            "Succeeded" => {
                let log = logs.fetch().await?;
                self.status_mut().client_log = Some(log);
            }
            _ => {}
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        let status = self.status_mut();
        let log = status.client_log.clone().ok_or_else(|| {
            ResultsError::Incomplete("client pod has not recorded a log yet".into())
        })?;
        let results = results::rdma::parse_bandwidth(&log)?;
        let peak = results
            .iter()
            .map(|result| result.peak_bandwidth)
            .fold(f64::MIN, f64::max);
        status.peak_bandwidth = Some(format!("{peak} Gbit/sec"));
        status.results = results;
        Ok(())
    }
}

#[async_trait]
impl Benchmark for RDMALatency {
    type Status = RDMALatencyStatus;

    const TOOL_IMAGE: &'static str = "perftest";

    fn status(&self) -> Option<&RDMALatencyStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut RDMALatencyStatus {
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
                    match pod_component(settings, pod) {
                        Some("server") => self.status_mut().server_pod = Some(info),
                        Some("client") => self.status_mut().client_pod = Some(info),
                        _ => {}
                    }
                }
            }
            "Succeeded" => {
                let log = logs.fetch().await?;
                self.status_mut().client_log = Some(log);
            }
            _ => {}
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        let status = self.status_mut();
        let log = status.client_log.clone().ok_or_else(|| {
            ResultsError::Incomplete("client pod has not recorded a log yet".into())
        })?;
        let results = results::rdma::parse_latency(&log)?;
        let lowest = results
            .iter()
            .map(|result| result.average)
            .fold(f64::MAX, f64::min);
        status.lowest_latency = Some(format!("{lowest} usec"));
        status.results = results;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perftest_types::RDMABandwidthSpec;

    #[test]
    fn bandwidth_headline_is_the_peak() {
        let mut benchmark = RDMABandwidth::new(
            "bench",
            RDMABandwidthSpec {
                rdma_shared_device_name: "rdma0".to_string(),
                ..Default::default()
            },
        );
        benchmark.status_mut().client_log = Some(
            "\
 #bytes     #iterations    BW peak[Gb/sec]    BW average[Gb/sec]   MsgRate[Mpps]
 65536      1000             96.58              96.31              0.183716
 131072     1000             97.22              97.12              0.092621
"
            .to_string(),
        );
        benchmark.summarise().unwrap();
        let status = benchmark.status.as_ref().unwrap();
        assert_eq!(status.results.len(), 2);
        assert_eq!(status.peak_bandwidth.as_deref(), Some("97.22 Gbit/sec"));
    }

    #[test]
    fn summarise_without_a_log_is_incomplete() {
        let mut benchmark = RDMABandwidth::new("bench", RDMABandwidthSpec::default());
        assert!(benchmark.summarise().unwrap_err().is_incomplete());
    }
}
