use lazy_static::lazy_static;
use perftest_types::MPIPingPongResult;
use regex::Regex;

use super::ResultsError;

lazy_static! {
    static ref UNITS: Regex =
        Regex::new(r"t\[(?P<time>[^\]]+)\]\s+(?P<bandwidth>\w?bytes/sec)").unwrap();
    static ref ROW: Regex = Regex::new(
        r"(?x)^
        (?P<bytes>\d+)\s+
        (?P<repetitions>\d+)\s+
        (?P<time>\d+\.\d+)\s+
        (?P<bandwidth>\d+\.\d+)"
    )
    .unwrap();
}

/// The results table of an IMB ping-pong run, with the units captured
/// from the table header.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPongResults {
    pub time_units: String,
    pub bandwidth_units: String,
    pub results: Vec<MPIPingPongResult>,
}

/// Parses the master pod log of an IMB ping-pong run.
///
/// The table header carries the bandwidth and time units; rows are read
/// until the first line that is not a result.
pub fn parse(log: &str) -> Result<PingPongResults, ResultsError> {
    let mut lines = log
        .lines()
        .skip_while(|line| !line.trim().starts_with("#bytes"));
    let header = lines.next().ok_or_else(|| {
        ResultsError::Format("unable to locate results header in pod log".into())
    })?;
    let caps = UNITS
        .captures(header)
        .ok_or_else(|| ResultsError::Format("unable to get bandwidth units from pod log".into()))?;
    let time_units = caps["time"].to_string();
    let bandwidth_units = caps["bandwidth"].to_string();
    let mut results = Vec::new();
    for line in lines {
        match ROW.captures(line.trim()) {
            Some(caps) => results.push(MPIPingPongResult {
                bytes: caps["bytes"].parse().unwrap(),
                repetitions: caps["repetitions"].parse().unwrap(),
                time: caps["time"].parse().unwrap(),
                bandwidth: caps["bandwidth"].parse().unwrap(),
            }),
            None => break,
        }
    }
    if results.is_empty() {
        return Err(ResultsError::Format(
            "unable to locate results in pod log".into(),
        ));
    }
    Ok(PingPongResults {
        time_units,
        bandwidth_units,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
#---------------------------------------------------
# Benchmarking PingPong
# #processes = 2
#---------------------------------------------------
       #bytes #repetitions      t[usec]   Mbytes/sec
            0         1000         1.75         0.00
            1         1000         1.77         0.54
            2         1000         1.78         1.07
# All processes entering MPI_Finalize
";

    #[test]
    fn units_come_from_the_header() {
        let parsed = parse(LOG).unwrap();
        assert_eq!(parsed.time_units, "usec");
        assert_eq!(parsed.bandwidth_units, "Mbytes/sec");
    }

    #[test]
    fn rows_stop_at_the_first_non_result() {
        let parsed = parse(LOG).unwrap();
        assert_eq!(parsed.results.len(), 3);
        assert_eq!(parsed.results[2].bytes, 2);
        assert_eq!(parsed.results[2].bandwidth, 1.07);
        let peak = parsed
            .results
            .iter()
            .map(|r| r.bandwidth)
            .fold(f64::MIN, f64::max);
        assert_eq!(peak, 1.07);
    }

    #[test]
    fn missing_header_is_a_format_error() {
        assert!(matches!(parse("no table\n"), Err(ResultsError::Format(_))));
    }

    #[test]
    fn header_without_units_is_a_format_error() {
        let log = "#bytes #repetitions      latency   bandwidth\n1 1000 1.0 1.0\n";
        assert!(matches!(parse(log), Err(ResultsError::Format(_))));
    }
}
