use lazy_static::lazy_static;
use perftest_types::OpenFOAMResult;
use regex::Regex;

use super::ResultsError;

lazy_static! {
    static ref TIME_LINE: Regex =
        Regex::new(r"^(?P<type>real|user|sys)\s+(?P<time>\d+\.\d+)").unwrap();
}

/// Extracts the `real`/`user`/`sys` timing lines from the master pod log.
/// All three lines are required.
pub fn parse(log: &str) -> Result<OpenFOAMResult, ResultsError> {
    let mut wallclock_time = None;
    let mut user_time = None;
    let mut sys_time = None;
    for line in log.lines() {
        if let Some(caps) = TIME_LINE.captures(line) {
            let time: f64 = caps["time"].parse().unwrap();
            match &caps["type"] {
                "real" => wallclock_time = Some(time),
                "user" => user_time = Some(time),
                _ => sys_time = Some(time),
            }
        }
    }
    match (wallclock_time, user_time, sys_time) {
        (Some(wallclock_time), Some(user_time), Some(sys_time)) => Ok(OpenFOAMResult {
            wallclock_time,
            user_time,
            sys_time,
        }),
        _ => Err(ResultsError::Format(
            "unable to extract timing information".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_three_times_parse() {
        let log = "\
Solving for Ux, Initial residual = 0.0001
ExecutionTime = 94.1 s  ClockTime = 95 s
real 95.31
user 94.12
sys 1.04
";
        let result = parse(log).unwrap();
        assert_eq!(result.wallclock_time, 95.31);
        assert_eq!(result.user_time, 94.12);
        assert_eq!(result.sys_time, 1.04);
    }

    #[test]
    fn missing_sys_line_is_a_format_error() {
        let log = "real 95.31\nuser 94.12\n";
        assert!(matches!(parse(log), Err(ResultsError::Format(_))));
    }
}
