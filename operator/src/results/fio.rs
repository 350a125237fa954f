use perftest_types::FioResult;
use serde::Deserialize;

use super::ResultsError;

#[derive(Deserialize)]
struct FioJson {
    client_stats: Vec<ClientStat>,
}

#[derive(Deserialize)]
struct ClientStat {
    #[serde(default)]
    jobname: String,
    read: Section,
    write: Section,
}

#[derive(Deserialize)]
struct Section {
    bw: f64,
    iops: f64,
    lat_ns: LatNs,
}

#[derive(Deserialize)]
struct LatNs {
    mean: f64,
    stddev: f64,
}

/// Parses the JSON output of a single fio client.
///
/// When `client_stats` has a single element that is the aggregate; fio only
/// synthesises an "All clients" entry when more than one process reported.
pub fn parse(log: &str) -> Result<FioResult, ResultsError> {
    let parsed: FioJson = serde_json::from_str(log)
        .map_err(|_| ResultsError::Format("pod log is not valid fio JSON output".into()))?;
    let aggregate = match parsed.client_stats.len() {
        0 => {
            return Err(ResultsError::Format(
                "fio output contains no client stats".into(),
            ));
        }
        1 => &parsed.client_stats[0],
        _ => parsed
            .client_stats
            .iter()
            .find(|stat| stat.jobname == "All clients")
            .ok_or_else(|| {
                ResultsError::Format("fio output has no 'All clients' aggregate".into())
            })?,
    };
    Ok(FioResult {
        read_bw: aggregate.read.bw,
        read_iops: aggregate.read.iops,
        read_lat_ns_mean: aggregate.read.lat_ns.mean,
        read_lat_ns_stddev: aggregate.read.lat_ns.stddev,
        write_bw: aggregate.write.bw,
        write_iops: aggregate.write.iops,
        write_lat_ns_mean: aggregate.write.lat_ns.mean,
        write_lat_ns_stddev: aggregate.write.lat_ns.stddev,
    })
}

/// Combines the aggregates captured from several clients into one result.
///
/// Bandwidth and IOPS add up across clients; latencies are averaged.
pub fn combine(results: &[FioResult]) -> FioResult {
    let n = results.len().max(1) as f64;
    let mut combined = FioResult::default();
    for result in results {
        combined.read_bw += result.read_bw;
        combined.read_iops += result.read_iops;
        combined.read_lat_ns_mean += result.read_lat_ns_mean;
        combined.read_lat_ns_stddev += result.read_lat_ns_stddev;
        combined.write_bw += result.write_bw;
        combined.write_iops += result.write_iops;
        combined.write_lat_ns_mean += result.write_lat_ns_mean;
        combined.write_lat_ns_stddev += result.write_lat_ns_stddev;
    }
    combined.read_lat_ns_mean /= n;
    combined.read_lat_ns_stddev /= n;
    combined.write_lat_ns_mean /= n;
    combined.write_lat_ns_stddev /= n;
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_stat(jobname: &str, bw: f64, iops: f64, mean: f64) -> serde_json::Value {
        json!({
            "jobname": jobname,
            "read": {"bw": bw, "iops": iops, "lat_ns": {"mean": mean, "stddev": 10.0}},
            "write": {"bw": 0.0, "iops": 0.0, "lat_ns": {"mean": 0.0, "stddev": 0.0}},
        })
    }

    #[test]
    fn single_element_is_the_aggregate() {
        let log = json!({"client_stats": [client_stat("fio", 1000.0, 250.0, 120.0)]}).to_string();
        let result = parse(&log).unwrap();
        assert_eq!(result.read_bw, 1000.0);
        assert_eq!(result.read_iops, 250.0);
        assert_eq!(result.read_lat_ns_mean, 120.0);
    }

    #[test]
    fn all_clients_element_is_preferred() {
        let log = json!({"client_stats": [
            client_stat("job-a", 1000.0, 250.0, 120.0),
            client_stat("job-b", 2000.0, 500.0, 80.0),
            client_stat("All clients", 3000.0, 750.0, 100.0),
        ]})
        .to_string();
        let result = parse(&log).unwrap();
        assert_eq!(result.read_bw, 3000.0);
    }

    #[test]
    fn missing_aggregate_is_a_format_error() {
        let log = json!({"client_stats": [
            client_stat("job-a", 1000.0, 250.0, 120.0),
            client_stat("job-b", 2000.0, 500.0, 80.0),
        ]})
        .to_string();
        assert!(matches!(parse(&log), Err(ResultsError::Format(_))));
    }

    #[test]
    fn invalid_json_is_a_format_error() {
        assert!(matches!(parse("not json"), Err(ResultsError::Format(_))));
    }

    #[test]
    fn combine_sums_bandwidth_and_averages_latency() {
        let a = FioResult {
            read_bw: 1000.0,
            read_iops: 250.0,
            read_lat_ns_mean: 120.0,
            read_lat_ns_stddev: 10.0,
            ..Default::default()
        };
        let b = FioResult {
            read_bw: 2000.0,
            read_iops: 500.0,
            read_lat_ns_mean: 80.0,
            read_lat_ns_stddev: 20.0,
            ..Default::default()
        };
        let combined = combine(&[a, b]);
        assert_eq!(combined.read_bw, 3000.0);
        assert_eq!(combined.read_iops, 750.0);
        assert_eq!(combined.read_lat_ns_mean, 100.0);
        assert_eq!(combined.read_lat_ns_stddev, 15.0);
    }
}
