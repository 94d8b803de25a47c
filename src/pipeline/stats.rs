use std::time::Duration;

use serde::Serialize;

use super::progress::FileStats;

/// Above this many seconds, estimates are shown in minutes.
const MINUTES_THRESHOLD_SECS: f64 = 180.0;

/// Running timing statistics for one run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    discovered: usize,
    processed: usize,
    generated: u32,
    generation_time: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds newly discovered files to the total.
    pub fn discover(&mut self, count: usize) {
        self.discovered += count;
    }

    /// Marks one file as handled without contributing to the timing average.
    pub fn record_handled(&mut self) {
        self.processed += 1;
    }

    /// Marks one generated file as handled and returns the updated figures.
    pub fn record_generated(&mut self, elapsed: Duration) -> FileStats {
        self.processed += 1;
        self.generated += 1;
        self.generation_time += elapsed;

        let average = self.average();
        let in_queue = self.in_queue();
        FileStats {
            elapsed,
            average,
            processed: self.processed,
            in_queue,
            remaining: average * u32::try_from(in_queue).unwrap_or(u32::MAX),
        }
    }

    pub fn discovered(&self) -> usize {
        self.discovered
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn in_queue(&self) -> usize {
        self.discovered.saturating_sub(self.processed)
    }

    pub fn average(&self) -> Duration {
        if self.generated == 0 {
            Duration::ZERO
        } else {
            self.generation_time / self.generated
        }
    }
}

/// Formats a duration as seconds, or as minutes once it exceeds three
/// minutes.
///
/// ```
/// use std::time::Duration;
/// use phototag::pipeline::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(42)), "42.0 seconds");
/// assert_eq!(format_duration(Duration::from_secs(600)), "10.0 minutes");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs > MINUTES_THRESHOLD_SECS {
        format!("{:.1} minutes", secs / 60.0)
    } else {
        format!("{secs:.1} seconds")
    }
}

/// Totals for a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Distinct files queued by the crawler.
    pub discovered: usize,
    /// Files dequeued and handled, whatever their outcome.
    pub processed: usize,
    pub succeeded: usize,
    /// Files persisted with `Status::Failed`.
    pub failed: usize,
    pub skipped: usize,
    pub orphans_repaired: usize,
    /// Second attempts made after an attempt without keywords.
    pub retries: u32,
    pub generation_calls: u32,
    /// Generation calls that never reached the endpoint.
    pub unreachable_calls: u32,
    pub write_errors: usize,
    /// True when the run ended on a stop request.
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_and_remaining_track_generated_files() {
        let mut stats = RunStats::new();
        stats.discover(5);

        stats.record_generated(Duration::from_secs(2));
        let file = stats.record_generated(Duration::from_secs(4));

        assert_eq!(file.elapsed, Duration::from_secs(4));
        assert_eq!(file.average, Duration::from_secs(3));
        assert_eq!(file.processed, 2);
        assert_eq!(file.in_queue, 3);
        assert_eq!(file.remaining, Duration::from_secs(9));
    }

    #[test]
    fn handled_files_shrink_queue_without_changing_average() {
        let mut stats = RunStats::new();
        stats.discover(3);
        stats.record_generated(Duration::from_secs(2));
        stats.record_handled();

        assert_eq!(stats.in_queue(), 1);
        assert_eq!(stats.average(), Duration::from_secs(2));
    }

    #[test]
    fn empty_stats_have_zero_average() {
        let stats = RunStats::new();
        assert_eq!(stats.average(), Duration::ZERO);
        assert_eq!(stats.in_queue(), 0);
    }

    #[test]
    fn format_switches_to_minutes_above_three_minutes() {
        assert_eq!(format_duration(Duration::from_secs(180)), "180.0 seconds");
        assert_eq!(format_duration(Duration::from_secs(181)), "3.0 minutes");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5 seconds");
    }
}
