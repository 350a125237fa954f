pub mod fio;
pub mod iperf;
pub mod openfoam;
pub mod pingpong;
pub mod pytorch;
pub mod rdma;

/// Errors produced while extracting results from pod logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultsError {
    /// The log is not of the expected format. This is fatal for the benchmark.
    #[error("pod log is not of the expected format: {0}")]
    Format(String),
    /// The results have not been fully observed yet. Worth retrying shortly.
    #[error("{0}")]
    Incomplete(String),
}

const PREFIXES: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Y"];

/// Formats an amount by increasing the prefix of the units where possible.
///
/// Returns the formatted amount and the prefix to use, e.g.
/// `(1024.0, "K", 1024.0)` becomes `("1", "M")`.
pub fn format_amount(amount: f64, original_prefix: &str, quotient: f64) -> (String, String) {
    if amount <= 0.0 {
        return (format!("{}", amount as i64), original_prefix.to_string());
    }
    let exponent = (amount.ln() / quotient.ln()).floor() as i32;
    let new_amount = amount / quotient.powi(exponent);
    // Render integers without a trailing ".0", e.g. 1G rather than 1.00G
    let formatted = if new_amount.fract() == 0.0 {
        format!("{}", new_amount as i64)
    } else {
        let rounded = format!("{:.2}", new_amount);
        rounded
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    };
    let index = PREFIXES
        .iter()
        .position(|p| *p == original_prefix)
        .unwrap_or(0) as i32
        + exponent;
    let index = index.clamp(0, PREFIXES.len() as i32 - 1) as usize;
    (formatted, PREFIXES[index].to_string())
}

/// Rounds to the given number of significant figures for headline results.
pub fn round_sig(value: f64, figures: i32) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(figures - 1 - magnitude);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_amount_promotes_prefix() {
        assert_eq!(
            format_amount(1024.0, "K", 1024.0),
            ("1".to_string(), "M".to_string())
        );
        assert_eq!(
            format_amount(1536.0, "K", 1024.0),
            ("1.5".to_string(), "M".to_string())
        );
        assert_eq!(
            format_amount(2.0 * 1024.0 * 1024.0, "K", 1024.0),
            ("2".to_string(), "G".to_string())
        );
    }

    #[test]
    fn format_amount_keeps_small_amounts() {
        assert_eq!(
            format_amount(512.0, "K", 1024.0),
            ("512".to_string(), "K".to_string())
        );
        assert_eq!(format_amount(0.0, "K", 1024.0), ("0".to_string(), "K".to_string()));
    }

    #[test]
    fn round_sig_keeps_three_figures() {
        assert_eq!(round_sig(0.123456, 3), 0.123);
        assert_eq!(round_sig(1234.5, 3), 1230.0);
        assert_eq!(round_sig(0.0, 3), 0.0);
    }
}
