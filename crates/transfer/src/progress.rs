use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::ProgressUpdate;

/// Computes per-chunk progress for one outgoing file.
pub struct ProgressMeter {
    file_index: usize,
    total_bytes: u64,
    bytes_sent: u64,
    speed: SpeedCalculator,
}

impl ProgressMeter {
    pub fn new(file_index: usize, total_bytes: u64) -> Self {
        Self {
            file_index,
            total_bytes,
            bytes_sent: 0,
            speed: SpeedCalculator::new(None, None),
        }
    }

    /// Records one step of `bytes` that took `elapsed` and returns the
    /// resulting update.
    pub fn record(&mut self, bytes: u64, elapsed: Duration) -> ProgressUpdate {
        self.bytes_sent += bytes;
        self.speed.add_sample(bytes);
        ProgressUpdate {
            file_index: self.file_index,
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
            fraction: self.fraction(),
            throughput_kbps: throughput_kbps(bytes, elapsed),
            eta: self.speed.eta(self.total_bytes.saturating_sub(self.bytes_sent)),
        }
    }

    /// Final update for a file with nothing left to send.
    pub fn complete(&self) -> ProgressUpdate {
        ProgressUpdate {
            file_index: self.file_index,
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
            fraction: 1.0,
            throughput_kbps: None,
            eta: Some(Duration::ZERO),
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_sent as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// KB/s for one step, rounded to two decimals. `None` for a zero-length step.
fn throughput_kbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    let kbps = bytes as f64 / 1024.0 / secs;
    Some((kbps * 100.0).round() / 100.0)
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.lock();
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        // Limit sample count.
        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.lock();
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // The first sample marks the window start; its bytes predate it.
        let total_bytes: u64 = s.samples[1..].iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        self.lock().samples.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SpeedInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn meter_fraction_and_bytes() {
        let mut meter = ProgressMeter::new(2, 200);
        let u = meter.record(50, Duration::from_millis(10));
        assert_eq!(u.file_index, 2);
        assert_eq!(u.bytes_sent, 50);
        assert_eq!(u.fraction, 0.25);

        let u = meter.record(150, Duration::from_millis(10));
        assert_eq!(u.bytes_sent, 200);
        assert_eq!(u.fraction, 1.0);
        assert_eq!(meter.bytes_sent(), 200);
    }

    #[test]
    fn throughput_rounded_to_two_decimals() {
        // 1000 bytes in 0.3 s = 3.2552... KB/s
        assert_eq!(throughput_kbps(1000, Duration::from_millis(300)), Some(3.26));
        assert_eq!(throughput_kbps(65536, Duration::from_secs(1)), Some(64.0));
    }

    #[test]
    fn zero_duration_step_has_no_throughput() {
        assert_eq!(throughput_kbps(1024, Duration::ZERO), None);
        let mut meter = ProgressMeter::new(0, 10);
        assert_eq!(meter.record(10, Duration::ZERO).throughput_kbps, None);
    }

    #[test]
    fn empty_file_completes_at_one() {
        let meter = ProgressMeter::new(0, 0);
        let u = meter.complete();
        assert_eq!(u.fraction, 1.0);
        assert_eq!(u.total_bytes, 0);
    }

    #[test]
    fn speed_calculator_no_samples() {
        let calc = SpeedCalculator::new(None, None);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_calculator_single_sample() {
        let calc = SpeedCalculator::new(None, None);
        calc.add_sample(100);
        // Need at least 2 samples.
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_calculator_eta() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(500);

        assert!(calc.bytes_per_second() > 0.0);
        let eta = calc.eta(10_000);
        assert!(eta.is_some());
        assert!(eta.unwrap().as_secs_f64() > 0.0);
    }

    #[test]
    fn speed_calculator_reset() {
        let calc = SpeedCalculator::new(None, None);
        calc.add_sample(100);
        calc.add_sample(200);
        calc.reset();
        assert_eq!(calc.bytes_per_second(), 0.0);
    }

    #[test]
    fn speed_calculator_max_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        assert!(calc.lock().samples.len() <= 5);
    }

    #[test]
    fn speed_calculator_concurrent_access() {
        use std::thread;

        let calc = Arc::new(SpeedCalculator::new(None, None));
        let mut handles = vec![];
        for _ in 0..10 {
            let c = Arc::clone(&calc);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    c.add_sample(1);
                    let _ = c.bytes_per_second();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let _ = calc.bytes_per_second();
    }
}
