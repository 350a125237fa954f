use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use perftest_types::{BenchmarkState, ImagePullPolicy, PodInfo, PyTorch, PyTorchDevice, PyTorchStatus};

use super::{Benchmark, HasState, PodLogs, pod_phase};
use crate::results::{self, ResultsError, round_sig};
use crate::settings::Settings;
use crate::util::Error;

impl HasState for PyTorchStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for PyTorch {
    type Status = PyTorchStatus;

    const TOOL_IMAGE: &'static str = "pytorch-benchmark";

    fn status(&self) -> Option<&PyTorchStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut PyTorchStatus {
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
        _settings: &Settings,
        pod: &Pod,
        logs: &dyn PodLogs,
    ) -> Result<(), Error> {
        if self.status().and_then(|status| status.gpu_count).is_none() {
            let default_gpus = match self.spec.device {
                PyTorchDevice::Cpu => 0,
                PyTorchDevice::Cuda => 1,
            };
            self.status_mut().gpu_count = Some(self.spec.gpu_count.unwrap_or(default_gpus));
        }
        match pod_phase(pod) {
            "Running" => {
                if let Some(info) = PodInfo::from_pod(pod) {
                    self.status_mut().worker_pod = Some(info);
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
        let gpu = self.spec.device == PyTorchDevice::Cuda;
        let status = self.status_mut();
        let log = status
            .client_log
            .clone()
            .ok_or_else(|| ResultsError::Incomplete("pod has not recorded a result yet".into()))?;
        let result = results::pytorch::parse(&log, gpu)?;
        // Trim the headline figures for display
        status.cpu_time_result = Some(round_sig(result.cpu_wall_time, 3));
        status.gpu_time_result = result.gpu_wall_time.map(|time| round_sig(time, 3));
        status.result = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perftest_types::PyTorchSpec;

    const LOG: &str = "\
Running eval method from alexnet on cpu in eager mode with input batch size 64.
CPU Wall Time per batch:  312.256 milliseconds
CPU Peak Memory:  1.125 GB
	User time (seconds): 123.45
	System time (seconds): 6.78
	Elapsed (wall clock) time (h:mm:ss or m:ss): 2:10.50
";

    #[test]
    fn cpu_headline_rounds_to_three_figures() {
        let mut benchmark = PyTorch::new("bench", PyTorchSpec::default());
        benchmark.status_mut().client_log = Some(LOG.to_string());
        benchmark.summarise().unwrap();
        let status = benchmark.status.as_ref().unwrap();
        assert_eq!(status.cpu_time_result, Some(0.312));
        assert_eq!(status.gpu_time_result, None);
        assert_eq!(status.result.as_ref().unwrap().gnu_time.wall_time, 130.5);
    }

    #[tokio::test]
    async fn gpu_count_defaults_from_the_device() {
        let mut benchmark = PyTorch::new("bench", PyTorchSpec::default());
        let pod: Pod = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "bench-worker"},
            "status": {"phase": "Pending"},
        }))
        .unwrap();
        benchmark
            .pod_modified(
                &crate::settings::test_settings(),
                &pod,
                &crate::kinds::StaticLogs(String::new()),
            )
            .await
            .unwrap();
        assert_eq!(benchmark.status.as_ref().unwrap().gpu_count, Some(0));
    }

    #[test]
    fn summarise_without_a_log_is_incomplete() {
        let mut benchmark = PyTorch::new("bench", PyTorchSpec::default());
        assert!(benchmark.summarise().unwrap_err().is_incomplete());
    }
}
