// src/progress.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

/// Seconds of processed media per indicative percent when no frame total is known.
pub const INDICATIVE_PROGRESS_DIVISOR: f64 = 6.0;

/// One progress update parsed from the analysis tool's stats line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub frame_count: u64,
    pub fps: f64,
    /// Media time reached so far (`time=`), zero when the tool reports N/A.
    pub elapsed: Duration,
    pub total_frames_estimate: Option<u64>,
}

impl ProgressEvent {
    /// Percent of the known total, clamped to 0..=100.
    pub fn percent_of_total(&self) -> Option<f64> {
        match self.total_frames_estimate {
            Some(total) if total > 0 => {
                Some((self.frame_count as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        }
    }

    /// Elapsed-time based stand-in for a percentage. Not a real fraction of the work.
    pub fn indicative_percent(&self) -> f64 {
        (self.elapsed.as_secs_f64() / INDICATIVE_PROGRESS_DIVISOR).clamp(0.0, 100.0)
    }
}

static FRAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)frame=\s*(?P<v>\d+)").expect("Invalid frame Regex"));
static FPS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)fps=\s*(?P<v>\d+(?:\.\d+)?)").expect("Invalid fps Regex"));
static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)time=\s*(?P<h>-?\d+):(?P<m>\d{2}):(?P<s>\d{2}(?:\.\d+)?)")
        .expect("Invalid time Regex")
});

/// Parses a stats line such as
/// `frame=  301 fps= 65.2 q=-0.0 size=N/A time=00:00:10.03 bitrate=N/A speed=2.17x`.
/// Lines without both `frame=` and `fps=` values yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    if !line.contains("frame=") || !line.contains("fps=") {
        return None;
    }

    let frame_count = FRAME_REGEX.captures(line)?.name("v")?.as_str().parse::<u64>().ok()?;
    let fps = FPS_REGEX.captures(line)?.name("v")?.as_str().parse::<f64>().ok()?;
    let elapsed = parse_elapsed(line).unwrap_or(Duration::ZERO);

    Some(ProgressEvent { frame_count, fps, elapsed, total_frames_estimate: None })
}

fn parse_elapsed(line: &str) -> Option<Duration> {
    let caps = TIME_REGEX.captures(line)?;
    let hours = caps.name("h")?.as_str().parse::<f64>().ok()?;
    let minutes = caps.name("m")?.as_str().parse::<f64>().ok()?;
    let seconds = caps.name("s")?.as_str().parse::<f64>().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    if total.is_finite() && total >= 0.0 {
        Some(Duration::from_secs_f64(total))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stats_line() {
        let line = "frame=  301 fps= 65.2 q=-0.0 size=N/A time=00:00:10.03 bitrate=N/A speed=2.17x";
        let event = parse_progress_line(line).expect("progress line should parse");
        assert_eq!(event.frame_count, 301);
        assert!((event.fps - 65.2).abs() < 1e-9);
        assert!((event.elapsed.as_secs_f64() - 10.03).abs() < 1e-6);
        assert_eq!(event.total_frames_estimate, None);
    }

    #[test]
    fn requires_frame_and_fps() {
        assert!(parse_progress_line("frame=  301 q=-0.0 size=N/A time=00:00:10.03").is_none());
        assert!(parse_progress_line("fps= 65.2 time=00:00:10.03").is_none());
        assert!(parse_progress_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'ref.mp4':").is_none());
    }

    #[test]
    fn partial_lines_are_ignored() {
        assert!(parse_progress_line("frame=   fps=").is_none());
        assert!(parse_progress_line("frame=abc fps=12").is_none());
    }

    #[test]
    fn time_is_optional() {
        let event = parse_progress_line("frame=12 fps=0.0 q=0.0 size=N/A time=N/A").unwrap();
        assert_eq!(event.frame_count, 12);
        assert_eq!(event.elapsed, Duration::ZERO);
    }

    #[test]
    fn percent_prefers_known_total() {
        let mut event = parse_progress_line("frame=150 fps=30 time=00:00:05.00").unwrap();
        assert_eq!(event.percent_of_total(), None);

        event.total_frames_estimate = Some(300);
        assert_eq!(event.percent_of_total(), Some(50.0));

        event.frame_count = 400;
        assert_eq!(event.percent_of_total(), Some(100.0));
    }

    #[test]
    fn indicative_percent_grows_with_elapsed_time() {
        let event = parse_progress_line("frame=900 fps=30 time=00:00:30.00").unwrap();
        assert!((event.indicative_percent() - 5.0).abs() < 1e-9);

        let event = parse_progress_line("frame=90000 fps=30 time=01:00:00.00").unwrap();
        assert_eq!(event.indicative_percent(), 100.0);
    }
}
