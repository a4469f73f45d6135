//! Realtime-factor progress reporting
//!
//! Purely observational: the monitor reads the engine time after each
//! advance and never touches simulation state.

use std::time::Instant;

/// Default steps between progress lines: `1000 / dt` for runs longer than
/// 10 s of simulated time, `100 / dt` otherwise
pub fn default_interval(dt: f64, tstop: f64) -> u64 {
    let span = if tstop > 10_000.0 { 1_000.0 } else { 100.0 };
    ((span / dt) as u64).max(1)
}

/// Emits `t = ..., realtime factor: ...` every `interval` steps
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    interval: u64,
    counter: u64,
    enabled: bool,
    window_time: f64,
    window_start: Instant,
}

impl ProgressMonitor {
    /// Start a window at simulated time `t`
    pub fn new(interval: u64, t: f64, enabled: bool) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
            enabled,
            window_time: t,
            window_start: Instant::now(),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Count one step at simulated time `t`
    ///
    /// Returns the realtime factor (simulated s per wall-clock s) of the
    /// window that just closed, every `interval` steps.
    pub fn tick(&mut self, t: f64) -> Option<f64> {
        self.counter += 1;
        if self.counter % self.interval != 0 {
            return None;
        }

        let elapsed = self.window_start.elapsed().as_secs_f64();
        let rtfactor = if elapsed > 0.0 {
            (t - self.window_time) * 1e-3 / elapsed
        } else {
            f64::INFINITY
        };

        if self.enabled {
            log::info!("t = {:.0}, realtime factor: {:.3}", t, rtfactor);
        }

        self.window_time = t;
        self.window_start = Instant::now();
        Some(rtfactor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        assert_eq!(default_interval(0.1, 100.0), 1000);
        assert_eq!(default_interval(0.1, 20_000.0), 10_000);
        assert_eq!(default_interval(500.0, 100.0), 1);
    }

    #[test]
    fn test_tick_reports_every_interval() {
        let mut monitor = ProgressMonitor::new(3, 0.0, false);
        let reports: Vec<bool> = (1..=7).map(|step| monitor.tick(step as f64).is_some()).collect();
        assert_eq!(reports, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_realtime_factor_is_positive() {
        let mut monitor = ProgressMonitor::new(1, 0.0, false);
        let rtfactor = monitor.tick(10.0).unwrap();
        assert!(rtfactor > 0.0);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(ProgressMonitor::new(0, 0.0, true).interval(), 1);
    }
}
