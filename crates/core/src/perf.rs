use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const MAX_SAMPLES: usize = 120;

/// Rolling timings for frames, texture uploads and composite passes.
pub struct PerfMonitor {
    frame_times: Mutex<VecDeque<Duration>>,
    upload_times: Mutex<VecDeque<Duration>>,
    composite_times: Mutex<VecDeque<Duration>>,
    max_samples: usize,
    enabled: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct PerfStats {
    pub avg_frame_time_ms: f32,
    pub p99_frame_time_ms: f32,
    pub fps: f32,
    pub avg_upload_time_ms: f32,
    pub avg_composite_time_ms: f32,
    /// Composite timings in the rolling window, not a running total.
    pub composite_samples: usize,
}

impl PerfMonitor {
    pub fn new() -> Self {
        Self {
            frame_times: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            upload_times: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            composite_times: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            max_samples: MAX_SAMPLES,
            enabled: AtomicBool::new(cfg!(debug_assertions)), // on in debug builds by default
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn record_frame(&self, duration: Duration) {
        self.push(&self.frame_times, duration);
    }

    pub fn record_upload(&self, duration: Duration) {
        self.push(&self.upload_times, duration);
    }

    pub fn record_composite(&self, duration: Duration) {
        self.push(&self.composite_times, duration);
    }

    fn push(&self, samples: &Mutex<VecDeque<Duration>>, duration: Duration) {
        if !self.is_enabled() {
            return;
        }

        let mut samples = samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    pub fn get_stats(&self) -> PerfStats {
        let frame_times = self.frame_times.lock().unwrap_or_else(PoisonError::into_inner);
        let upload_times = self.upload_times.lock().unwrap_or_else(PoisonError::into_inner);
        let composite_times = self.composite_times.lock().unwrap_or_else(PoisonError::into_inner);

        let avg_frame_time_ms = average_ms(&frame_times);

        let p99_frame_time_ms = if !frame_times.is_empty() {
            let mut sorted: Vec<_> = frame_times.iter().copied().collect();
            sorted.sort();
            let index = ((sorted.len() as f32 * 0.99) as usize).min(sorted.len() - 1);
            sorted[index].as_secs_f32() * 1000.0
        } else {
            0.0
        };

        let fps = if avg_frame_time_ms > 0.0 {
            1000.0 / avg_frame_time_ms
        } else {
            0.0
        };

        PerfStats {
            avg_frame_time_ms,
            p99_frame_time_ms,
            fps,
            avg_upload_time_ms: average_ms(&upload_times),
            avg_composite_time_ms: average_ms(&composite_times),
            composite_samples: composite_times.len(),
        }
    }
}

impl Default for PerfMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn average_ms(samples: &VecDeque<Duration>) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: Duration = samples.iter().sum();
    sum.as_secs_f32() * 1000.0 / samples.len() as f32
}

/// Times a scope and logs it at debug level if it ran longer than 1ms.
pub struct PerfTimer {
    start: Instant,
    name: String,
}

impl PerfTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if cfg!(debug_assertions) {
            let elapsed = self.elapsed_ms();
            if elapsed > 1.0 {
                tracing::debug!("{} took {:.2}ms", self.name, elapsed);
            }
        }
    }
}

/// Times a block with a [`PerfTimer`].
#[macro_export]
macro_rules! perf_time {
    ($name:expr, $code:block) => {{
        let _timer = $crate::perf::PerfTimer::new($name);
        $code
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_average_recorded_samples() {
        let monitor = PerfMonitor::new();
        monitor.set_enabled(true);
        monitor.record_frame(Duration::from_millis(10));
        monitor.record_frame(Duration::from_millis(30));
        monitor.record_composite(Duration::from_millis(4));

        let stats = monitor.get_stats();
        assert!((stats.avg_frame_time_ms - 20.0).abs() < 0.01);
        assert!((stats.fps - 50.0).abs() < 0.1);
        assert!((stats.p99_frame_time_ms - 30.0).abs() < 0.01);
        assert_eq!(stats.composite_samples, 1);
    }

    #[test]
    fn disabled_monitor_ignores_samples() {
        let monitor = PerfMonitor::new();
        monitor.set_enabled(false);
        monitor.record_frame(Duration::from_millis(10));
        assert_eq!(monitor.get_stats().fps, 0.0);
    }

    #[test]
    fn keeps_only_the_latest_samples() {
        let monitor = PerfMonitor::new();
        monitor.set_enabled(true);
        for _ in 0..MAX_SAMPLES + 10 {
            monitor.record_upload(Duration::from_millis(1));
        }
        assert_eq!(monitor.upload_times.lock().unwrap().len(), MAX_SAMPLES);
    }
}
