//! Underrun accounting.
//!
//! A single underrun heals itself; only a burst of them within a sliding
//! window is worth telling the user about.

use std::collections::VecDeque;

/// Counts underruns over a sliding window on the audio clock.
#[derive(Debug)]
pub struct UnderrunMonitor {
    tolerance: u32,
    window: f64,
    /// Audio-clock times of underruns still inside the window
    recent: VecDeque<f64>,
    /// When the last report was raised; suppresses repeats inside one window
    last_report: Option<f64>,
    total: u64,
}

impl UnderrunMonitor {
    pub fn new(tolerance: u32, window_secs: f64) -> Self {
        Self {
            tolerance,
            window: window_secs.max(0.0),
            recent: VecDeque::new(),
            last_report: None,
            total: 0,
        }
    }

    /// Record an underrun at audio time `at`.
    ///
    /// Returns the number of underruns in the current window when it
    /// exceeds the tolerance and no report was raised within the last window.
    pub fn record(&mut self, at: f64) -> Option<u32> {
        self.total += 1;
        self.recent.push_back(at);
        while let Some(&oldest) = self.recent.front() {
            if at - oldest > self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        let count = self.recent.len() as u32;
        if count <= self.tolerance {
            return None;
        }
        if let Some(last) = self.last_report {
            if at - last <= self.window {
                return None;
            }
        }
        self.last_report = Some(at);
        Some(count)
    }

    /// Underruns recorded since creation.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.last_report = None;
    }
}
