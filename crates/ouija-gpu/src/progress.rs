//! Rate-limited progress and completion reporting (C6 Progress Reporter).

use std::time::{Duration, Instant};

/// Minimum interval between non-final progress lines.
pub const REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Tracks when the last progress line was printed so callers can rate-limit.
pub struct ProgressReporter {
    started_at: Instant,
    last_reported_at: Option<Instant>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        ProgressReporter {
            started_at: Instant::now(),
            last_reported_at: None,
        }
    }

    /// `true` if at least [`REPORT_INTERVAL`] has elapsed since the last
    /// report (or none has been made yet).
    pub fn should_report(&self, now: Instant) -> bool {
        match self.last_reported_at {
            None => true,
            Some(last) => now.duration_since(last) >= REPORT_INTERVAL,
        }
    }

    pub fn mark_reported(&mut self, now: Instant) {
        self.last_reported_at = Some(now);
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.started_at)
    }

    /// Build a `$`-prefixed progress line. `processed`/`total` drive ETA;
    /// `found` and the rarity percentage are computed from `found`/`processed`.
    pub fn line(&self, now: Instant, found: u64, processed: u64, total: u64) -> String {
        let elapsed = self.elapsed(now);
        let rarity = if processed > 0 {
            100.0 * found as f64 / processed as f64
        } else {
            0.0
        };
        let throughput_per_s = if elapsed.as_secs_f64() > 0.0 {
            processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let remaining = total.saturating_sub(processed);
        let eta = if throughput_per_s > 0.0 {
            Duration::from_secs_f64(remaining as f64 / throughput_per_s)
        } else {
            Duration::ZERO
        };

        format!(
            "$Found: {found} | Processed: {} | Rarity: {rarity:.8}% | Elapsed: {} | ETA: {} | Rate: {:.1}K/s",
            format_count(processed),
            format_elapsed(elapsed),
            format_eta(eta),
            throughput_per_s / 1000.0,
        )
    }

    /// The final completion line, always printed regardless of rate limit.
    pub fn completion_line(&self, now: Instant, found: u64, processed: u64) -> String {
        format!(
            "$Search Complete! Found: {found} | Processed: {} | Elapsed: {}",
            format_count(processed),
            format_elapsed(self.elapsed(now)),
        )
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a large count with K/M suffixing, matching the C reference's
/// `format_number`.
pub fn format_count(n: u64) -> String {
    let n = n as f64;
    if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.2}K", n / 1e3)
    } else {
        format!("{n:.2}")
    }
}

/// Elapsed time as "X minutes and Y seconds" or "Z seconds".
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{minutes} minutes and {seconds} seconds")
    } else {
        format!("{total_secs} seconds")
    }
}

/// ETA formatted coarsely: days+hours / hours+minutes / minutes+seconds / seconds.
pub fn format_eta(eta: Duration) -> String {
    let total_secs = eta.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_is_true_before_the_first_report() {
        let reporter = ProgressReporter::new();
        assert!(reporter.should_report(Instant::now()));
    }

    #[test]
    fn should_report_respects_the_rate_limit() {
        let mut reporter = ProgressReporter::new();
        let now = Instant::now();
        reporter.mark_reported(now);
        assert!(!reporter.should_report(now + Duration::from_millis(100)));
        assert!(reporter.should_report(now + Duration::from_millis(251)));
    }

    #[test]
    fn format_count_applies_k_and_m_suffixes() {
        assert_eq!(format_count(500), "500.00");
        assert_eq!(format_count(1_500), "1.50K");
        assert_eq!(format_count(2_500_000), "2.50M");
    }

    #[test]
    fn format_elapsed_switches_to_minutes_past_sixty_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45 seconds");
        assert_eq!(
            format_elapsed(Duration::from_secs(125)),
            "2 minutes and 5 seconds"
        );
    }

    #[test]
    fn format_eta_picks_the_coarsest_nonzero_unit_pair() {
        assert_eq!(format_eta(Duration::from_secs(30)), "30s");
        assert_eq!(format_eta(Duration::from_secs(150)), "2m 30s");
        assert_eq!(format_eta(Duration::from_secs(7_300)), "2h 1m");
        assert_eq!(format_eta(Duration::from_secs(100_000)), "1d 3h");
    }
}
