//! `output`
//!
//! Turns the unstructured text that the drawing tool prints into structured progress
//! information, and decides whether a finished run succeeded.
//!
//! Every metric has its own rule, a pure function from one line of output to an optional
//! value, so that the rules can be tested without running any processes.

use std::{collections::VecDeque, sync::LazyLock};

use regex::Regex;

use crate::TOOL_NAME;

/// How many lines of tool output are retained for diagnostics.
pub const OUTPUT_LOG_CAPACITY: usize = 200;

/// Substrings (lowercase) that mark a run as failed even when the tool exits with code 0.
/// Some versions of the tool report a missing plotter this way.
const FAILURE_MARKERS: [&str; 3] = ["error", "no devices", "no nextdraw"];

/// A signed decimal number.
const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)";

/// `Progress: 37.5%` or `Percent complete: 12 %`.
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:progress|percent complete):\s*({NUMBER})\s*%"))
        .expect("progress pattern is valid")
});

/// A line that is nothing but a percentage.
static BARE_PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*({NUMBER})\s*%\s*$")).expect("percent pattern is valid")
});

/// `Elapsed: 1:02:03`, `Time: 2:03` or `Time: 7`.
static ELAPSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:elapsed|time):\s*(\d+)(?::(\d+))?(?::(\d+))?")
        .expect("elapsed pattern is valid")
});

/// `Distance: 2 cm` or `draw: 1234.5 mm`.
static DISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:distance|draw):\s*({NUMBER})\s*([a-z]*)"))
        .expect("distance pattern is valid")
});

/// `Estimated print time: 0:12:34`, printed by a preview run.
static ESTIMATED_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Estimated print time:\s*([0-9:]+)").expect("estimate pattern is valid")
});

/// `draw: 1234.5 mm`, printed by a preview run.
static PREVIEW_DISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)draw:\s*([0-9.]+)\s*mm").expect("preview distance pattern is valid")
});

/// Everything that could be learned from a single line of tool output.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Plot progress, clamped to `0..=100`.
    pub percent: Option<f64>,
    /// Elapsed plot time reported by the tool, in seconds.
    pub elapsed_seconds: Option<u64>,
    /// Distance drawn so far, in mm.
    pub distance_mm: Option<f64>,
}

impl ProgressSample {
    /// Applies every rule to a line of output.
    ///
    /// # Arguments
    /// * `line`: One line of tool output.
    ///
    /// # Returns
    /// The sample, possibly empty.
    pub fn from_line(line: &str) -> Self {
        ProgressSample {
            percent: parse_progress(line),
            elapsed_seconds: parse_elapsed(line),
            distance_mm: parse_distance(line),
        }
    }

    /// Whether the line carried no information at all.
    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.elapsed_seconds.is_none() && self.distance_mm.is_none()
    }
}

/// Extracts the progress percentage from a line, clamped to `0..=100`.
pub fn parse_progress(line: &str) -> Option<f64> {
    let captures = PROGRESS_RE
        .captures(line)
        .or_else(|| BARE_PERCENT_RE.captures(line))?;
    let value: f64 = captures[1].parse().ok()?;
    if value.is_nan() {
        return None;
    }
    Some(value.clamp(0.0, 100.0))
}

/// Extracts an elapsed time from a line and converts it to seconds.
///
/// Accepts `H:MM:SS`, `M:SS` and `SS`.
pub fn parse_elapsed(line: &str) -> Option<u64> {
    let captures = ELAPSED_RE.captures(line)?;
    let pieces = captures
        .iter()
        .skip(1)
        .flatten()
        .map(|piece| piece.as_str().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    clock_to_seconds(&pieces)
}

/// Extracts a distance from a line and normalises it to mm.
///
/// Lines with a unit that isn't recognised are ignored rather than guessed at.
pub fn parse_distance(line: &str) -> Option<f64> {
    let captures = DISTANCE_RE.captures(line)?;
    let value: f64 = captures[1].parse().ok()?;
    let factor = mm_per_unit(&captures[2].to_ascii_lowercase())?;
    Some(value * factor)
}

/// The number of mm in one of a distance unit as printed by the tool.
fn mm_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "" | "mm" | "millimeter" | "millimeters" => Some(1.0),
        "cm" | "centimeter" | "centimeters" => Some(10.0),
        "m" | "meter" | "meters" => Some(1000.0),
        "in" | "inch" | "inches" => Some(25.4),
        _ => None,
    }
}

/// Converts `[h, m, s]`, `[m, s]` or `[s]` to seconds, `None` if that overflows.
fn clock_to_seconds(pieces: &[u64]) -> Option<u64> {
    let (hours, minutes, seconds) = match *pieces {
        [hours, minutes, seconds] => (hours, minutes, seconds),
        [minutes, seconds] => (0, minutes, seconds),
        [seconds] => (0, 0, seconds),
        _ => return None,
    };
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Reads the estimate that the tool prints for a preview run.
///
/// # Arguments
/// * `output`: The full output of a preview run.
///
/// # Returns
/// The estimated plot time in seconds and the estimated pen-down distance in mm, each if present.
pub fn parse_preview_report(output: &str) -> (Option<u64>, Option<f64>) {
    let seconds = ESTIMATED_TIME_RE.captures(output).and_then(|captures| {
        let pieces = captures[1]
            .split(':')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        clock_to_seconds(&pieces)
    });
    let distance = PREVIEW_DISTANCE_RE
        .captures(output)
        .and_then(|captures| captures[1].parse().ok());
    (seconds, distance)
}

/// The most recent lines of tool output.
#[derive(Debug, Clone)]
pub struct OutputLog {
    /// Retained lines, oldest first.
    lines: VecDeque<String>,
    /// Maximum number of lines to keep.
    capacity: usize,
}

impl Default for OutputLog {
    fn default() -> Self {
        OutputLog::with_capacity(OUTPUT_LOG_CAPACITY)
    }
}

impl OutputLog {
    /// Creates a log that keeps at most `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        OutputLog {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a line, dropping the oldest line once full.
    pub fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// Records every non-empty line of a block of text.
    pub fn extend_from_text(&mut self, text: &str) {
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            self.push(line);
        }
    }

    /// The retained lines joined with newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// How a finished run of the tool is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The run succeeded.
    Completed,
    /// The run failed, with the message to show to the user.
    Failed(String),
}

/// Classifies a finished run from its exit code and captured output.
///
/// # Arguments
/// * `code`: The exit code of the tool.
/// * `output`: The captured (and possibly truncated) output of the tool.
///
/// # Returns
/// [`ExitOutcome::Completed`] unless the tool exited non-zero or printed one of the failure markers.
pub fn classify_exit(code: i32, output: &str) -> ExitOutcome {
    let output = output.trim();
    if code == 0 {
        let lowered = output.to_lowercase();
        if FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return ExitOutcome::Failed(output.to_string());
        }
        return ExitOutcome::Completed;
    }

    if output.is_empty() {
        ExitOutcome::Failed(format!("{TOOL_NAME} exited with code {code}"))
    } else {
        ExitOutcome::Failed(output.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("Progress: 37.5%"), Some(37.5), "fractional");
        assert_eq!(parse_progress("progress: 12 %"), Some(12.0), "lowercase, spaced");
        assert_eq!(parse_progress("Percent complete: 80%"), Some(80.0), "alternate label");
        assert_eq!(parse_progress("Progress: 150%"), Some(100.0), "clamped high");
        assert_eq!(parse_progress("Progress: -5%"), Some(0.0), "clamped low");
        assert_eq!(parse_progress("-5%"), Some(0.0), "bare percentage");
        assert_eq!(parse_progress("Pen at 40% height"), None, "chatter");
        assert_eq!(parse_progress("Progress: unknown"), None, "no number");
    }

    #[test]
    fn test_parse_elapsed() {
        assert_eq!(parse_elapsed("Elapsed: 1:02:03"), Some(3723), "H:MM:SS");
        assert_eq!(parse_elapsed("Time: 2:03"), Some(123), "M:SS");
        assert_eq!(parse_elapsed("time: 7"), Some(7), "SS");
        assert_eq!(parse_elapsed("Elapsed time: 0:00:10"), Some(10), "longer label");
        assert_eq!(parse_elapsed("Layer 3 of 4"), None, "no label");
        assert_eq!(
            parse_elapsed("Elapsed: 18446744073709551615:00:00"),
            None,
            "hours overflow"
        );
        assert_eq!(
            parse_elapsed("Time: 18446744073709551615:59"),
            None,
            "minutes overflow"
        );
        assert_eq!(
            parse_elapsed("Time: 18446744073709551615"),
            Some(u64::MAX),
            "largest plain seconds"
        );
    }

    #[test]
    fn test_parse_distance() {
        assert_eq!(parse_distance("Distance: 2 cm"), Some(20.0), "cm");
        assert_eq!(parse_distance("Distance: 1 in"), Some(25.4), "in");
        assert_eq!(parse_distance("Distance: 1.5 m"), Some(1500.0), "m");
        assert_eq!(parse_distance("pen-down draw: 123.5 mm"), Some(123.5), "draw label");
        assert_eq!(parse_distance("Distance: 42"), Some(42.0), "no unit");
        assert_eq!(parse_distance("Distance: 2 inches"), Some(50.8), "long unit");
        assert_eq!(parse_distance("Distance: 3 ft"), None, "unknown unit");
    }

    #[test]
    fn test_sample_from_line() {
        let sample = ProgressSample::from_line("Progress: 50% Elapsed: 1:30 Distance: 3 cm");
        assert_eq!(
            sample,
            ProgressSample {
                percent: Some(50.0),
                elapsed_seconds: Some(90),
                distance_mm: Some(30.0),
            }
        );
        assert!(ProgressSample::from_line("Plot started").is_empty());
    }

    #[test]
    fn test_parse_preview_report() {
        let output = "Estimated print time: 0:12:34\nLength of path to draw: 2345.6 mm\n";
        assert_eq!(parse_preview_report(output), (Some(754), Some(2345.6)));
        assert_eq!(parse_preview_report("nothing useful"), (None, None));
        assert_eq!(
            parse_preview_report("Estimated print time: 99999999999999999:00:00"),
            (None, None),
            "overflowing estimate"
        );
    }

    #[test]
    fn test_output_log_keeps_most_recent_lines() {
        let mut log = OutputLog::with_capacity(3);
        for line in ["one", "two", "three", "four"] {
            log.push(line);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.text(), "two\nthree\nfour");

        let mut log = OutputLog::default();
        log.extend_from_text("  first  \n\n second\n");
        assert_eq!(log.text(), "first\nsecond");
    }

    #[test]
    fn test_classify_exit() {
        assert_eq!(classify_exit(0, "Plot complete"), ExitOutcome::Completed);
        assert_eq!(classify_exit(0, ""), ExitOutcome::Completed);
        assert_eq!(
            classify_exit(0, "No NextDraw found"),
            ExitOutcome::Failed("No NextDraw found".to_string()),
            "zero exit with a device-not-found report"
        );
        assert_eq!(
            classify_exit(0, "Error: serial port busy"),
            ExitOutcome::Failed("Error: serial port busy".to_string())
        );
        assert_eq!(
            classify_exit(3, ""),
            ExitOutcome::Failed("nextdraw exited with code 3".to_string())
        );
        assert_eq!(
            classify_exit(1, "motor stalled\n"),
            ExitOutcome::Failed("motor stalled".to_string())
        );
    }
}
