//! Frame timing: delta times, frame rate limits and statistics.

use std::time::{Duration, Instant};

/// Measures the time between frames and keeps running frame rate figures.
#[derive(Debug)]
pub(crate) struct FrameClock {
    last: Instant,
    min_frame_time: Option<Duration>,
    stats: FrameStats,
}

impl FrameClock {
    pub(crate) fn new(min_frame_time: Option<Duration>) -> Self {
        Self {
            last: Instant::now(),
            min_frame_time,
            stats: FrameStats::default(),
        }
    }

    /// Start a frame at `now` and return the seconds since the previous one.
    pub(crate) fn tick(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last);
        self.last = now;
        self.stats.record(dt);
        dt.as_secs_f32()
    }

    /// How long to sleep so a frame started at `started` lasts at least the
    /// configured minimum.
    pub(crate) fn remaining(&self, started: Instant, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(started);
        self.min_frame_time
            .and_then(|min| min.checked_sub(elapsed))
            .filter(|left| !left.is_zero())
    }

    pub(crate) fn stats(&self) -> &FrameStats {
        &self.stats
    }
}

/// Frame rate extremes and average over the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FrameStats {
    samples: u64,
    fps_sum: f64,
    min_fps: f64,
    max_fps: f64,
}

impl FrameStats {
    fn record(&mut self, dt: Duration) {
        let seconds = dt.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let fps = seconds.recip();
        if self.samples == 0 {
            self.min_fps = fps;
            self.max_fps = fps;
        } else {
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
        }
        self.fps_sum += fps;
        self.samples += 1;
    }

    /// `(min, max, average)` frames per second, once any frame was timed.
    pub(crate) fn summary(&self) -> Option<(f64, f64, f64)> {
        (self.samples > 0).then(|| (self.min_fps, self.max_fps, self.fps_sum / self.samples as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tick_reports_elapsed_seconds() {
        let mut clock = FrameClock::new(None);
        let start = clock.last;

        let dt = clock.tick(start + Duration::from_millis(20));
        assert_relative_eq!(dt, 0.02, epsilon = 1e-6);

        let dt = clock.tick(start + Duration::from_millis(30));
        assert_relative_eq!(dt, 0.01, epsilon = 1e-6);
    }

    #[test]
    fn stats_track_extremes_and_average() {
        let mut stats = FrameStats::default();
        assert_eq!(stats.summary(), None);

        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(20));
        stats.record(Duration::ZERO);

        let (min, max, avg) = stats.summary().unwrap();
        assert_relative_eq!(min, 50.0, epsilon = 1e-9);
        assert_relative_eq!(max, 100.0, epsilon = 1e-9);
        assert_relative_eq!(avg, 75.0, epsilon = 1e-9);
    }

    #[test]
    fn remaining_time_only_with_a_cap() {
        let start = Instant::now();
        let later = start + Duration::from_millis(5);

        assert_eq!(FrameClock::new(None).remaining(start, later), None);

        let capped = FrameClock::new(Some(Duration::from_millis(20)));
        assert_eq!(capped.remaining(start, later), Some(Duration::from_millis(15)));
        assert_eq!(capped.remaining(start, start + Duration::from_millis(25)), None);
    }
}
