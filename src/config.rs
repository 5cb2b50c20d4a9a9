use std::time::Duration;

/// Engine tuning parameters shared by the buffer, fill thread, and watchdog.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Duration of audio each buffer block holds, in seconds.
    ///
    /// Larger blocks tolerate slower decoders but raise memory use and make
    /// track switches feel less immediate.
    pub fill_window_seconds: f32,

    /// How long the fill thread sleeps between polls while both blocks are
    /// full. Bounded busy-wait; the consumer flips readiness from the audio
    /// callback, so there is nothing to block on.
    pub fill_poll: Duration,

    /// Watchdog poll interval for end-of-track detection and progress
    /// refresh.
    pub watchdog_interval: Duration,

    /// Window after a seek during which periodic progress updates are
    /// suppressed to avoid visual jitter.
    pub seek_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fill_window_seconds: 0.5,
            fill_poll: Duration::from_millis(25),
            watchdog_interval: Duration::from_millis(500),
            seek_debounce: Duration::from_millis(500),
        }
    }
}
