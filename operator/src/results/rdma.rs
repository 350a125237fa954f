use lazy_static::lazy_static;
use perftest_types::{RDMABandwidthResult, RDMALatencyResult};
use regex::Regex;

use super::ResultsError;

lazy_static! {
    static ref BANDWIDTH_ROW: Regex = Regex::new(
        r"(?x)
        (?P<bytes>\d+)\s+
        (?P<iterations>\d+)\s+
        (?P<bw_peak>\d+(\.\d+)?)\s+
        (?P<bw_avg>\d+(\.\d+)?)\s+
        (?P<msg_rate>\d+(\.\d+)?)"
    )
    .unwrap();
    static ref LATENCY_ROW: Regex = Regex::new(
        r"(?x)
        (?P<bytes>\d+)\s+
        (?P<iterations>\d+)\s+
        (?P<t_min>\d+(\.\d+)?)\s+
        (?P<t_max>\d+(\.\d+)?)\s+
        (?P<t_typical>\d+(\.\d+)?)\s+
        (?P<t_avg>\d+(\.\d+)?)\s+
        (?P<t_stdev>\d+(\.\d+)?)\s+
        (?P<p99>\d+(\.\d+)?)\s+
        (?P<p99_9>\d+(\.\d+)?)"
    )
    .unwrap();
}

fn result_lines(log: &str) -> Result<impl Iterator<Item = &str>, ResultsError> {
    let mut lines = log
        .lines()
        .skip_while(|line| !line.trim().starts_with("#bytes"));
    // Drop the header line itself
    if lines.next().is_none() {
        return Err(ResultsError::Format(
            "unable to locate results header in pod log".into(),
        ));
    }
    Ok(lines)
}

/// Parses the client pod log of an `ib_read_bw`/`ib_write_bw` run.
pub fn parse_bandwidth(log: &str) -> Result<Vec<RDMABandwidthResult>, ResultsError> {
    let mut results = Vec::new();
    for line in result_lines(log)? {
        if let Some(caps) = BANDWIDTH_ROW.captures(line.trim()) {
            results.push(RDMABandwidthResult {
                bytes: caps["bytes"].parse().unwrap(),
                iterations: caps["iterations"].parse().unwrap(),
                peak_bandwidth: caps["bw_peak"].parse().unwrap(),
                average_bandwidth: caps["bw_avg"].parse().unwrap(),
                message_rate: caps["msg_rate"].parse().unwrap(),
            });
        }
    }
    if results.is_empty() {
        return Err(ResultsError::Format(
            "unable to locate results in pod log".into(),
        ));
    }
    Ok(results)
}

/// Parses the client pod log of an `ib_read_lat`/`ib_write_lat` run.
pub fn parse_latency(log: &str) -> Result<Vec<RDMALatencyResult>, ResultsError> {
    let mut results = Vec::new();
    for line in result_lines(log)? {
        if let Some(caps) = LATENCY_ROW.captures(line.trim()) {
            results.push(RDMALatencyResult {
                bytes: caps["bytes"].parse().unwrap(),
                iterations: caps["iterations"].parse().unwrap(),
                minimum: caps["t_min"].parse().unwrap(),
                maximum: caps["t_max"].parse().unwrap(),
                typical: caps["t_typical"].parse().unwrap(),
                average: caps["t_avg"].parse().unwrap(),
                stddev: caps["t_stdev"].parse().unwrap(),
                percentile_99: caps["p99"].parse().unwrap(),
                percentile_99_9: caps["p99_9"].parse().unwrap(),
            });
        }
    }
    if results.is_empty() {
        return Err(ResultsError::Format(
            "unable to locate results in pod log".into(),
        ));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANDWIDTH_LOG: &str = "\
---------------------------------------------------------------------------------------
                    RDMA_Read BW Test
 #bytes     #iterations    BW peak[Gb/sec]    BW average[Gb/sec]   MsgRate[Mpps]
 65536      1000             96.58              96.31              0.183716
 131072     1000             97.22              97.12              0.092621
---------------------------------------------------------------------------------------
";

    const LATENCY_LOG: &str = "\
---------------------------------------------------------------------------------------
                    RDMA_Read Latency Test
 #bytes #iterations    t_min[usec]    t_max[usec]  t_typical[usec]    t_avg[usec]    t_stdev[usec]   99% percentile[usec]   99.9% percentile[usec]
 2       1000          1.83           4.69         1.87               1.90           0.11            2.04                   4.69
 4       1000          1.84           5.10         1.88               1.85           0.12            2.06                   5.10
---------------------------------------------------------------------------------------
";

    #[test]
    fn bandwidth_rows_parse() {
        let results = parse_bandwidth(BANDWIDTH_LOG).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].bytes, 65536);
        assert_eq!(results[0].iterations, 1000);
        assert_eq!(results[1].peak_bandwidth, 97.22);
        let peak = results
            .iter()
            .map(|r| r.peak_bandwidth)
            .fold(f64::MIN, f64::max);
        assert_eq!(peak, 97.22);
    }

    #[test]
    fn latency_rows_parse_all_nine_fields() {
        let results = parse_latency(LATENCY_LOG).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].minimum, 1.83);
        assert_eq!(results[0].percentile_99_9, 4.69);
        let lowest = results.iter().map(|r| r.average).fold(f64::MAX, f64::min);
        assert_eq!(lowest, 1.85);
    }

    #[test]
    fn missing_header_is_a_format_error() {
        assert!(matches!(
            parse_bandwidth("garbage\n"),
            Err(ResultsError::Format(_))
        ));
    }

    #[test]
    fn header_without_rows_is_a_format_error() {
        let log = " #bytes     #iterations    BW peak[Gb/sec]\n";
        assert!(matches!(parse_bandwidth(log), Err(ResultsError::Format(_))));
    }
}
