//! Track progress derivation.
//!
//! Holds only the total frame count and sample rate of the open track;
//! elapsed/remaining time and the progress fraction are derived from the
//! buffer's global consumed-frame counter, never stored.

/// Progress state for the currently open track.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressTracker {
    total_frames: u64,
    sample_rate: u32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the shape of a newly opened track.
    pub fn set_track(&mut self, total_frames: u64, sample_rate: u32) {
        self.total_frames = total_frames;
        self.sample_rate = sample_rate;
    }

    /// Forget the current track (used on switch before the next open).
    pub fn reset(&mut self) {
        self.total_frames = 0;
        self.sample_rate = 0;
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn elapsed_seconds(&self, consumed_frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        consumed_frames as f64 / self.sample_rate as f64
    }

    pub fn total_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }

    pub fn remaining_seconds(&self, consumed_frames: u64) -> f64 {
        (self.total_seconds() - self.elapsed_seconds(consumed_frames)).max(0.0)
    }

    /// Position as a fraction in `[0, 1]`; 0.0 when no track length is known.
    pub fn fraction(&self, consumed_frames: u64) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (consumed_frames as f64 / self.total_frames as f64).clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_and_total_derive_from_frames() {
        let mut p = ProgressTracker::new();
        p.set_track(88_200, 44_100);
        assert_eq!(p.elapsed_seconds(44_100), 1.0);
        assert_eq!(p.total_seconds(), 2.0);
        assert_eq!(p.remaining_seconds(44_100), 1.0);
        assert_eq!(p.fraction(44_100), 0.5);
    }

    #[test]
    fn unknown_track_reports_zero() {
        let p = ProgressTracker::new();
        assert_eq!(p.elapsed_seconds(1_000), 0.0);
        assert_eq!(p.total_seconds(), 0.0);
        assert_eq!(p.fraction(1_000), 0.0);
    }

    #[test]
    fn reset_clears_track_shape() {
        let mut p = ProgressTracker::new();
        p.set_track(88_200, 44_100);
        p.reset();
        assert_eq!(p.total_frames(), 0);
        assert_eq!(p.total_seconds(), 0.0);
    }

    #[test]
    fn fraction_saturates_at_one() {
        let mut p = ProgressTracker::new();
        p.set_track(100, 44_100);
        assert_eq!(p.fraction(200), 1.0);
    }
}
