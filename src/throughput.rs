//! Windowed throughput measurement.
//!
//! Bytes are accumulated into a window; once the window has lasted at least
//! the configured interval, `poll` emits a report and starts a fresh window
//! at the report time. Rates are in megabits per second with a
//! 1024 * 1024 bits-per-megabit convention.

use std::fmt;

const MICROS_PER_SEC: f64 = 1_000_000.0;
const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

/// Bytes moved over one measured interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputReport {
    pub bytes: u64,
    pub elapsed_us: u64,
}

impl ThroughputReport {
    /// Rate in Mbps. Zero for an empty interval.
    pub fn mbps(&self) -> f64 {
        if self.elapsed_us == 0 {
            return 0.0;
        }
        (self.bytes as f64 * 8.0) / BITS_PER_MEGABIT / (self.elapsed_us as f64 / MICROS_PER_SEC)
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {:.3} s = {:.4} Mbps",
            self.bytes,
            self.elapsed_us as f64 / MICROS_PER_SEC,
            self.mbps()
        )
    }
}

/// Accumulates bytes and reports once per interval.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval_us: u64,
    window_start_us: u64,
    bytes: u64,
}

impl ThroughputMeter {
    pub fn new(interval_us: u64, now_us: u64) -> Self {
        Self {
            interval_us,
            window_start_us: now_us,
            bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
    }

    /// Bytes recorded in the current window.
    pub fn pending_bytes(&self) -> u64 {
        self.bytes
    }

    /// Emit a report if the current window has lasted at least one interval.
    ///
    /// On report the byte counter goes back to zero and `now_us` becomes the
    /// start of the next window. Clock readings may wrap.
    pub fn poll(&mut self, now_us: u64) -> Option<ThroughputReport> {
        let elapsed_us = now_us.wrapping_sub(self.window_start_us);
        if elapsed_us < self.interval_us {
            return None;
        }

        let report = ThroughputReport {
            bytes: self.bytes,
            elapsed_us,
        };
        self.window_start_us = now_us;
        self.bytes = 0;
        Some(report)
    }
}
