mod types;

pub use types::{CounterSnapshot, SessionStatistics};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gaze::GazeSample;

/// Reduces a finished sample log to session statistics.
///
/// Time on screen and time lost are the session duration split in
/// proportion to sample counts. Pure: the same inputs always give the same
/// output. A negative or non-finite duration is treated as zero.
pub fn compute_statistics(samples: &[GazeSample], duration_secs: f64) -> SessionStatistics {
    let duration = if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs
    } else {
        0.0
    };

    let total = samples.len() as u64;
    let screen = samples.iter().filter(|s| s.looking_at_screen()).count() as u64;
    let lost = samples.iter().filter(|s| s.tracking_lost()).count() as u64;
    let valid = samples.iter().filter(|s| s.is_valid()).count() as u64;

    let (time_on_screen, time_lost) = if total > 0 {
        (
            duration * screen as f64 / total as f64,
            duration * lost as f64 / total as f64,
        )
    } else {
        (0.0, 0.0)
    };

    let percentage = |part: f64| {
        if duration > 0.0 {
            100.0 * part / duration
        } else {
            0.0
        }
    };

    SessionStatistics {
        total_duration: duration,
        time_on_screen,
        time_lost,
        percentage_on_screen: percentage(time_on_screen),
        percentage_lost: percentage(time_lost),
        total_samples: total,
        valid_samples: valid,
        screen_samples: screen,
        lost_samples: lost,
    }
}

/// Live counters for one recording session, bumped from the capture thread
/// and the gaze collector.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    frames_seen: AtomicU64,
    images_saved: AtomicU64,
    image_failures: AtomicU64,
    forward_failures: AtomicU64,
    samples_appended: AtomicU64,
    sample_failures: AtomicU64,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new frame count.
    pub fn record_frame(&self) -> u64 {
        self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_image_saved(&self) {
        self.images_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image_failure(&self) -> u64 {
        self.image_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_forward_failure(&self) -> u64 {
        self.forward_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_sample(&self) {
        self.samples_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_failure(&self) {
        self.sample_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            images_saved: self.images_saved.load(Ordering::Relaxed),
            image_failures: self.image_failures.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            sample_failures: self.sample_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::ScreenBounds;

    fn bounds() -> ScreenBounds {
        ScreenBounds::new(100.0, 100.0)
    }

    fn on_screen() -> GazeSample {
        GazeSample::new(0, Some((50.0, 50.0)), true, &bounds()).unwrap()
    }

    fn off_screen() -> GazeSample {
        GazeSample::new(0, Some((500.0, 50.0)), true, &bounds()).unwrap()
    }

    #[test]
    fn splits_duration_by_sample_share() {
        let samples = vec![
            on_screen(),
            on_screen(),
            off_screen(),
            GazeSample::tracking_lost_at(0),
        ];
        let stats = compute_statistics(&samples, 8.0);

        assert_eq!(stats.total_samples, 4);
        assert_eq!(stats.screen_samples, 2);
        assert_eq!(stats.lost_samples, 1);
        assert_eq!(stats.valid_samples, 3);
        assert_eq!(stats.time_on_screen, 4.0);
        assert_eq!(stats.time_lost, 2.0);
        assert_eq!(stats.percentage_on_screen, 50.0);
        assert_eq!(stats.percentage_lost, 25.0);
    }

    #[test]
    fn empty_log_yields_zero_times() {
        let stats = compute_statistics(&[], 12.0);
        assert_eq!(stats.total_duration, 12.0);
        assert_eq!(stats.time_on_screen, 0.0);
        assert_eq!(stats.percentage_lost, 0.0);
    }

    #[test]
    fn zero_duration_yields_zero_percentages() {
        let stats = compute_statistics(&[on_screen()], 0.0);
        assert_eq!(stats.percentage_on_screen, 0.0);
        assert_eq!(stats.percentage_lost, 0.0);
    }

    #[test]
    fn negative_duration_is_clamped() {
        let stats = compute_statistics(&[on_screen()], -3.0);
        assert_eq!(stats.total_duration, 0.0);
        assert_eq!(stats.time_on_screen, 0.0);
    }

    #[test]
    fn reducer_is_bit_identical_across_calls() {
        let samples: Vec<GazeSample> = (0..97)
            .map(|i| match i % 3 {
                0 => on_screen(),
                1 => off_screen(),
                _ => GazeSample::tracking_lost_at(i),
            })
            .collect();

        let a = compute_statistics(&samples, 13.37);
        let b = compute_statistics(&samples, 13.37);
        assert_eq!(a.time_on_screen.to_bits(), b.time_on_screen.to_bits());
        assert_eq!(a.percentage_lost.to_bits(), b.percentage_lost.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn counters_snapshot() {
        let counters = PipelineCounters::new();
        assert_eq!(counters.record_frame(), 1);
        assert_eq!(counters.record_frame(), 2);
        counters.record_image_saved();
        counters.record_forward_failure();
        let snap = counters.snapshot();
        assert_eq!(snap.frames_seen, 2);
        assert_eq!(snap.images_saved, 1);
        assert_eq!(snap.forward_failures, 1);
        assert_eq!(snap.sample_failures, 0);
    }
}
