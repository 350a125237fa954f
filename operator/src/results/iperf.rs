use lazy_static::lazy_static;
use perftest_types::{IPerfResult, IPerfSingleResult};
use regex::Regex;
use std::collections::BTreeMap;

use super::ResultsError;

lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^\[ *ID\]").unwrap();
    static ref ROW: Regex = Regex::new(r"^\[ *([a-zA-Z0-9]+)\].*?(\d+) KBytes +(\d+) Kbits/sec").unwrap();
}

/// Parses the client pod log of an iperf run.
///
/// Lines before the `[ ID]` header are discarded. Each remaining row yields
/// a per-stream result; the row with id `SUM` is the aggregate. Single
/// stream runs have no `SUM` row, so the only stream is its own aggregate.
pub fn parse(log: &str, expected_streams: u32) -> Result<IPerfResult, ResultsError> {
    let mut lines = log.lines().skip_while(|line| !HEADER.is_match(line));
    // Drop the header line itself
    if lines.next().is_none() {
        return Err(ResultsError::Format(
            "unable to locate results header in pod log".into(),
        ));
    }
    let mut streams: BTreeMap<String, IPerfSingleResult> = BTreeMap::new();
    for line in lines {
        if let Some(caps) = ROW.captures(line) {
            streams.insert(
                caps[1].to_string(),
                IPerfSingleResult {
                    transfer: caps[2].parse().unwrap(),
                    bandwidth: caps[3].parse().unwrap(),
                },
            );
        }
    }
    let sum = streams.remove("SUM");
    if streams.len() != expected_streams as usize || (expected_streams > 1 && sum.is_none()) {
        return Err(ResultsError::Format(
            "stream results do not match the expected stream count".into(),
        ));
    }
    // Single stream runs have no explicit sum, so the stream stands in for it
    let sum = match sum {
        Some(sum) => sum,
        None => streams
            .values()
            .next()
            .cloned()
            .ok_or_else(|| ResultsError::Format("no stream results in pod log".into()))?,
    };
    Ok(IPerfResult { streams, sum })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_STREAM: &str = "\
------------------------------------------------------------
Client connecting to iperf-server, TCP port 5001
TCP window size:  128 KByte
------------------------------------------------------------
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0- 3.0 sec   384 KBytes  1024 Kbits/sec
";

    const MULTI_STREAM: &str = "\
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0-10.0 sec  1024 KBytes  812 Kbits/sec
[  4]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
[SUM]  0.0-10.0 sec  2304 KBytes  1836 Kbits/sec
";

    #[test]
    fn single_stream_is_its_own_aggregate() {
        let result = parse(SINGLE_STREAM, 1).unwrap();
        assert_eq!(result.streams.len(), 1);
        assert_eq!(result.sum.transfer, 384);
        assert_eq!(result.sum.bandwidth, 1024);
    }

    #[test]
    fn sum_row_is_the_aggregate() {
        let result = parse(MULTI_STREAM, 2).unwrap();
        assert_eq!(result.streams.len(), 2);
        assert_eq!(result.streams["3"].bandwidth, 812);
        assert_eq!(result.sum.bandwidth, 1836);
    }

    #[test]
    fn stream_count_mismatch_is_a_format_error() {
        let log = "\
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0-10.0 sec  1024 KBytes  812 Kbits/sec
[  4]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
[  5]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
";
        assert!(matches!(parse(log, 4), Err(ResultsError::Format(_))));
    }

    #[test]
    fn missing_header_is_a_format_error() {
        assert!(matches!(
            parse("no results here\n", 1),
            Err(ResultsError::Format(_))
        ));
    }

    #[test]
    fn multi_stream_without_sum_is_a_format_error() {
        let log = "\
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0-10.0 sec  1024 KBytes  812 Kbits/sec
[  4]  0.0-10.0 sec  1280 KBytes  1024 Kbits/sec
";
        assert!(matches!(parse(log, 2), Err(ResultsError::Format(_))));
    }
}
