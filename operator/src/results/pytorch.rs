use lazy_static::lazy_static;
use perftest_types::{GnuTimeResult, PyTorchResult};
use regex::Regex;

use super::ResultsError;

// If the output format changes in future pytorch-benchmark versions,
// check https://github.com/pytorch/benchmark/blob/main/run.py for changes
lazy_static! {
    static ref CPU_TIME: Regex =
        Regex::new(r"CPU Wall Time per batch:\s+(?P<time>\d+\.\d+)\s*(?P<units>\w+)").unwrap();
    static ref CPU_MEMORY: Regex =
        Regex::new(r"CPU Peak Memory:\s+(?P<memory>\d+\.\d+)\s*(?P<units>\w+)").unwrap();
    static ref GPU_TIME: Regex =
        Regex::new(r"GPU Time per batch:\s+(?P<time>\d+\.\d+)\s*(?P<units>\w+)").unwrap();
    static ref GPU_MEMORY: Regex =
        Regex::new(r"GPU \d+ Peak Memory:\s+(?P<memory>\d+\.\d+)\s*(?P<units>\w+)").unwrap();
    static ref WALL_CLOCK: Regex =
        Regex::new(r"Elapsed \(wall clock\) time \(h:mm:ss or m:ss\):\s+(?P<time>[\d:.]+)")
            .unwrap();
    static ref USER_TIME: Regex =
        Regex::new(r"User time \(seconds\):\s+(?P<time>\d+(\.\d+)?)").unwrap();
    static ref SYS_TIME: Regex =
        Regex::new(r"System time \(seconds\):\s+(?P<time>\d+(\.\d+)?)").unwrap();
    static ref MAX_RSS: Regex =
        Regex::new(r"Maximum resident set size \(kbytes\):\s+(?P<rss>\d+)").unwrap();
}

/// Parses a GNU `time -v` wall clock value of the form `h:mm:ss` or `m:ss`.
fn parse_clock(value: &str) -> Result<f64, ResultsError> {
    let parts: Vec<&str> = value.split(':').collect();
    let parse = |part: &str| {
        part.parse::<f64>()
            .map_err(|_| ResultsError::Format(format!("invalid wall clock value '{value}'")))
    };
    match parts.as_slice() {
        [m, s] => Ok(parse(m)? * 60.0 + parse(s)?),
        [h, m, s] => Ok(parse(h)? * 3600.0 + parse(m)? * 60.0 + parse(s)?),
        _ => Err(ResultsError::Format(format!(
            "invalid wall clock value '{value}'"
        ))),
    }
}

/// Parses the block written by the GNU `time -v` wrapper around the
/// benchmark script.
pub fn parse_gnu_time(log: &str) -> Result<GnuTimeResult, ResultsError> {
    let wall = WALL_CLOCK
        .captures(log)
        .ok_or_else(|| ResultsError::Format("unable to locate GNU time output".into()))?;
    let user = USER_TIME
        .captures(log)
        .ok_or_else(|| ResultsError::Format("unable to locate GNU time user time".into()))?;
    let sys = SYS_TIME
        .captures(log)
        .ok_or_else(|| ResultsError::Format("unable to locate GNU time system time".into()))?;
    Ok(GnuTimeResult {
        wall_time: parse_clock(&wall["time"])?,
        user_time: user["time"].parse().unwrap(),
        sys_time: sys["time"].parse().unwrap(),
        max_rss_kb: MAX_RSS.captures(log).map(|caps| caps["rss"].parse().unwrap()),
    })
}

/// Parses the benchmark pod log of a PyTorch run.
///
/// GPU figures are required when the benchmark ran on a CUDA device.
/// Reported times are converted to seconds to match the GNU time output.
pub fn parse(log: &str, gpu: bool) -> Result<PyTorchResult, ResultsError> {
    let cpu_time = CPU_TIME
        .captures(log)
        .ok_or_else(|| ResultsError::Format("unable to locate CPU wall time in pod log".into()))?;
    let cpu_memory = CPU_MEMORY
        .captures(log)
        .ok_or_else(|| ResultsError::Format("unable to locate CPU peak memory in pod log".into()))?;
    if &cpu_time["units"] != "milliseconds" || &cpu_memory["units"] != "GB" {
        return Err(ResultsError::Format(
            "results output in unexpected units (the output format may have \
             changed in upstream pytorch-benchmarks)"
                .into(),
        ));
    }
    let (gpu_wall_time, peak_gpu_memory) = if gpu {
        let gpu_time = GPU_TIME.captures(log).ok_or_else(|| {
            ResultsError::Format("unable to locate GPU time in pod log".into())
        })?;
        let gpu_memory = GPU_MEMORY.captures(log).ok_or_else(|| {
            ResultsError::Format("unable to locate GPU peak memory in pod log".into())
        })?;
        if &gpu_time["units"] != "milliseconds" || &gpu_memory["units"] != "GB" {
            return Err(ResultsError::Format(
                "results output in unexpected units (the output format may have \
                 changed in upstream pytorch-benchmarks)"
                    .into(),
            ));
        }
        (
            Some(gpu_time["time"].parse::<f64>().unwrap() / 1000.0),
            Some(gpu_memory["memory"].parse::<f64>().unwrap()),
        )
    } else {
        (None, None)
    };
    Ok(PyTorchResult {
        cpu_wall_time: cpu_time["time"].parse::<f64>().unwrap() / 1000.0,
        peak_cpu_memory: cpu_memory["memory"].parse().unwrap(),
        gpu_wall_time,
        peak_gpu_memory,
        gnu_time: parse_gnu_time(log)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPU_LOG: &str = "\
Running eval method from alexnet on cpu in eager mode with input batch size 64.
CPU Wall Time per batch:  312.250 milliseconds
CPU Peak Memory:  1.125 GB
	Command being timed: \"python run.py alexnet -d cpu -t eval\"
	User time (seconds): 123.45
	System time (seconds): 6.78
	Elapsed (wall clock) time (h:mm:ss or m:ss): 2:10.50
	Maximum resident set size (kbytes): 1177600
";

    const GPU_LOG: &str = "\
Running eval method from resnet50 on cuda in eager mode with input batch size 64.
GPU Time per batch:  45.125 milliseconds
CPU Wall Time per batch:  47.500 milliseconds
CPU Peak Memory:  2.250 GB
GPU 0 Peak Memory:  3.500 GB
	User time (seconds): 30.00
	System time (seconds): 2.00
	Elapsed (wall clock) time (h:mm:ss or m:ss): 0:45.00
";

    #[test]
    fn cpu_results_convert_to_seconds() {
        let result = parse(CPU_LOG, false).unwrap();
        assert_eq!(result.cpu_wall_time, 0.31225);
        assert_eq!(result.peak_cpu_memory, 1.125);
        assert_eq!(result.gpu_wall_time, None);
        assert_eq!(result.gnu_time.wall_time, 130.5);
        assert_eq!(result.gnu_time.user_time, 123.45);
        assert_eq!(result.gnu_time.max_rss_kb, Some(1177600));
    }

    #[test]
    fn gpu_results_are_required_on_cuda() {
        let result = parse(GPU_LOG, true).unwrap();
        assert_eq!(result.gpu_wall_time, Some(0.045125));
        assert_eq!(result.peak_gpu_memory, Some(3.5));
        assert!(matches!(parse(CPU_LOG, true), Err(ResultsError::Format(_))));
    }

    #[test]
    fn wrong_units_are_a_format_error() {
        let log = "\
CPU Wall Time per batch:  312.250 seconds
CPU Peak Memory:  1.125 GB
";
        assert!(matches!(parse(log, false), Err(ResultsError::Format(_))));
    }

    #[test]
    fn wall_clock_parses_hours_form() {
        assert_eq!(parse_clock("1:02:03.50").unwrap(), 3723.5);
        assert_eq!(parse_clock("2:10.50").unwrap(), 130.5);
        assert!(parse_clock("whenever").is_err());
    }
}
