use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use perftest_types::{BenchmarkState, IPerf, IPerfStatus, ImagePullPolicy};

use super::{Benchmark, HasState, PodLogs, pod_phase};
use crate::results::{self, ResultsError, format_amount};
use crate::settings::Settings;
use crate::util::Error;

impl HasState for IPerfStatus {
    fn state(&self) -> &BenchmarkState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut BenchmarkState {
        &mut self.state
    }
}

#[async_trait]
impl Benchmark for IPerf {
    type Status = IPerfStatus;

    const TOOL_IMAGE: &'static str = "iperf";

    fn status(&self) -> Option<&IPerfStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut IPerfStatus {
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
        // Only the client pod ever succeeds; the server is torn down with
        // the benchmark. Its log carries the whole result table.
        if pod_phase(pod) == "Succeeded" {
            let log = logs.fetch().await?;
            self.status_mut().client_log = Some(log);
        }
        Ok(())
    }

    fn summarise(&mut self) -> Result<(), Error> {
        let streams = self.spec.streams;
        let status = self.status_mut();
        let log = status.client_log.clone().ok_or_else(|| {
            ResultsError::Incomplete("client pod has not recorded a log yet".into())
        })?;
        let result = results::iperf::parse(&log, streams)?;
        // The headline is the combined bandwidth in a friendlier unit than
        // the Kbits/sec that iperf reports
        let (amount, prefix) = format_amount(result.sum.bandwidth as f64, "K", 1024.0);
        status.summary_result = Some(format!("{amount} {prefix}bits/sec"));
        status.result = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::StaticLogs;
    use perftest_types::IPerfSpec;

    fn iperf(streams: u32) -> IPerf {
        IPerf::new(
            "bench",
            IPerfSpec {
                duration: 3,
                streams,
                ..Default::default()
            },
        )
    }

    fn succeeded_pod() -> Pod {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": "bench-client"},
            "status": {"phase": "Succeeded"},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn captures_the_client_log_and_summarises() {
        let mut benchmark = iperf(1);
        let log = "\
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0- 3.0 sec   384 KBytes  1024 Kbits/sec
";
        benchmark
            .pod_modified(
                &crate::settings::test_settings(),
                &succeeded_pod(),
                &StaticLogs(log.to_string()),
            )
            .await
            .unwrap();
        benchmark.summarise().unwrap();
        let status = benchmark.status.as_ref().unwrap();
        let result = status.result.as_ref().unwrap();
        assert_eq!(result.sum.bandwidth, 1024);
        assert_eq!(status.summary_result.as_deref(), Some("1 Mbits/sec"));
    }

    #[test]
    fn summarise_without_a_log_is_incomplete() {
        let mut benchmark = iperf(1);
        let err = benchmark.summarise().unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn stream_mismatch_is_permanent() {
        let mut benchmark = iperf(4);
        benchmark.status_mut().client_log = Some(
            "\
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0-10.0 sec  1024 KBytes  812 Kbits/sec
[  4]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
[  5]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
"
            .to_string(),
        );
        let err = benchmark.summarise().unwrap_err();
        assert!(err.is_permanent());
    }
}
