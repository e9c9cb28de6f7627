//! Logging, metrics, charts, errors and a few formatting helpers

pub mod charts;
pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{LesionError, Result};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, Metrics};

/// `42.0s`, `3m 05s` or `1h 02m`
pub fn format_duration(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    match whole {
        0..=59 => format!("{:.1}s", seconds.max(0.0)),
        60..=3599 => format!("{}m {:02}s", whole / 60, whole % 60),
        _ => format!("{}h {:02}m", whole / 3600, (whole % 3600) / 60),
    }
}

/// Text bar for a fraction in `[0, 1]`, followed by the percentage
pub fn format_progress_bar(fraction: f64, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * width as f64).round() as usize;
    format!(
        "{}{} {:5.1}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(185.0), "3m 05s");
        assert_eq!(format_duration(3720.0), "1h 02m");
    }

    #[test]
    fn test_format_progress_bar() {
        assert_eq!(format_progress_bar(0.5, 10), "#####-----  50.0%");
        assert_eq!(format_progress_bar(1.7, 4), "#### 100.0%");
    }
}
