//! Transport / track controller.
//!
//! Owns the decoder + device + buffer lifecycle and serializes every
//! lifecycle-affecting operation through one exclusive lock. The realtime
//! callback is the only party that bypasses it (it touches nothing but the
//! lock-free side of the buffer). A watchdog thread detects end-of-track and
//! auto-advances.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result, bail, ensure};
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::config::EngineConfig;
use crate::engine::buffer::{BufferConsumer, SharedSource, StreamBuffer};
use crate::engine::decoder::SourceOpener;
use crate::engine::device::AudioOutput;
use crate::engine::progress::ProgressTracker;
use crate::library::TrackList;

/// Transport state; mutated only under the controller lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Notifications for the UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    TrackChanged { index: usize, path: PathBuf },
}

/// Lock-free state shared with the watchdog and UI readers.
struct ControlShared {
    running: AtomicBool,
    /// Playback gain in 0..=1, `f32` bits; consumers hold clones.
    volume: Arc<AtomicU32>,
    /// Progress fraction in 0..=1, `f32` bits, refreshed by the watchdog.
    progress: AtomicU32,
    /// Set by seek; suppresses progress refresh for the debounce window.
    seeking: AtomicBool,
    events_tx: Sender<PlayerEvent>,
    config: EngineConfig,
}

/// Everything guarded by the controller lock.
struct Inner {
    tracks: TrackList,
    opener: Box<dyn SourceOpener>,
    output: Box<dyn AudioOutput>,
    source: Option<SharedSource>,
    buffer: Option<StreamBuffer>,
    progress: ProgressTracker,
    state: PlaybackState,
    last_seek: Option<Instant>,
}

/// Desktop player transport: play/pause/stop/seek/next/prev plus track and
/// progress accessors. One instance owns one output device claim.
pub struct PlayerController {
    inner: Arc<Mutex<Inner>>,
    shared: Arc<ControlShared>,
    events_rx: Receiver<PlayerEvent>,
    watchdog: Option<JoinHandle<()>>,
}

impl PlayerController {
    /// Scan `root`, open track 0, configure the output device, and start the
    /// watchdog. Fails when the scan finds no media or the first track (or
    /// the device) cannot be initialized.
    pub fn initialize(
        root: &Path,
        output: Box<dyn AudioOutput>,
        opener: Box<dyn SourceOpener>,
        config: EngineConfig,
    ) -> Result<Self> {
        let tracks = TrackList::scan(root)?;
        ensure!(
            !tracks.is_empty(),
            "no media files found under {}",
            root.display()
        );

        let (events_tx, events_rx) = unbounded();
        let shared = Arc::new(ControlShared {
            running: AtomicBool::new(true),
            volume: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            progress: AtomicU32::new(0.0f32.to_bits()),
            seeking: AtomicBool::new(false),
            events_tx,
            config,
        });

        let mut inner = Inner {
            tracks,
            opener,
            output,
            source: None,
            buffer: None,
            progress: ProgressTracker::new(),
            state: PlaybackState::Stopped,
            last_seek: None,
        };
        open_current(&mut inner, &shared).context("initialize first track")?;

        let inner = Arc::new(Mutex::new(inner));
        let watchdog = {
            let inner = inner.clone();
            let shared = shared.clone();
            thread::Builder::new()
                .name("player-watchdog".into())
                .spawn(move || watchdog_loop(&inner, &shared))
                .context("spawn watchdog")?
        };

        Ok(Self {
            inner,
            shared,
            events_rx,
            watchdog: Some(watchdog),
        })
    }

    /// Receiver for UI notifications. Cloneable; events are fan-out by
    /// whoever holds a receiver first.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }

    /// Start (or resume) hardware playback. No-op when already playing.
    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == PlaybackState::Playing {
            return Ok(());
        }
        inner.output.start().context("start playback")?;
        inner.state = PlaybackState::Playing;
        tracing::info!(track = %inner.tracks.current_entry().display(), "playing");
        Ok(())
    }

    /// Stop the hardware pull; buffer and position stay untouched.
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != PlaybackState::Playing {
            return Ok(());
        }
        inner.output.pause().context("pause playback")?;
        inner.state = PlaybackState::Paused;
        tracing::info!("paused");
        Ok(())
    }

    /// Stop playback and rewind the current track to frame 0.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.output.pause().context("stop playback")?;

        if let Some(mut buffer) = inner.buffer.take() {
            // Join the fill thread before touching decoder or blocks. The
            // buffer always goes back, even when the rewind fails, so the
            // callback and the progress readers keep a live state to look at.
            buffer.reset();
            let rewound = match inner.source.clone() {
                Some(source) => {
                    let rewound = source
                        .lock()
                        .unwrap()
                        .seek_to_frame(0)
                        .context("rewind decoder");
                    if rewound.is_ok() {
                        buffer.start_fill(source);
                    }
                    rewound
                }
                None => Ok(()),
            };
            inner.buffer = Some(buffer);
            rewound?;
        }

        inner.state = PlaybackState::Stopped;
        self.shared
            .progress
            .store(0.0f32.to_bits(), Ordering::Relaxed);
        tracing::info!("stopped");
        Ok(())
    }

    /// Switch to the next track (wraps at the end of the list).
    pub fn next(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let target = inner.tracks.peek_next();
        switch_locked(&mut inner, &self.shared, target)
    }

    /// Switch to the previous track (wraps at the start of the list).
    pub fn prev(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let target = inner.tracks.peek_prev();
        switch_locked(&mut inner, &self.shared, target)
    }

    /// Switch to an explicit track index. Out-of-range is reported and
    /// leaves all state unchanged.
    pub fn switch(&self, index: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        switch_locked(&mut inner, &self.shared, index)
    }

    /// Jump to `fraction` of the current track. Buffered pre-seek audio is
    /// invalidated: the fill thread is joined, the decoder repositioned, and
    /// the buffer restarted before the counter is re-based.
    pub fn seek_to_position(&self, fraction: f32) -> Result<()> {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut inner = self.inner.lock().unwrap();

        let total = inner.progress.total_frames();
        if total == 0 {
            tracing::warn!("seek ignored: track length unknown");
            return Ok(());
        }
        let target = (fraction as f64 * total as f64) as u64;

        self.shared.seeking.store(true, Ordering::Relaxed);
        inner.last_seek = Some(Instant::now());

        let (Some(mut buffer), Some(source)) = (inner.buffer.take(), inner.source.clone()) else {
            return Ok(());
        };
        buffer.reset();
        let sought = source
            .lock()
            .unwrap()
            .seek_to_frame(target)
            .context("decoder seek");
        if sought.is_ok() {
            buffer.set_consumed_frames(target);
            buffer.start_fill(source);
        }
        // A failed seek leaves a drained but live buffer; stop() or another
        // seek can recover from here.
        inner.buffer = Some(buffer);
        sought?;

        self.shared
            .progress
            .store(fraction.to_bits(), Ordering::Relaxed);
        tracing::info!(frame = target, fraction, "seek");
        Ok(())
    }

    /// Re-walk the media root; playback stops and the cursor returns to
    /// track 0. The fresh scan is validated before anything is torn down,
    /// so a root gone empty is an error that leaves the old list playing.
    pub fn rescan(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let fresh = TrackList::scan(inner.tracks.root())?;
        ensure!(
            !fresh.is_empty(),
            "no media files found under {}",
            fresh.root().display()
        );

        inner.output.pause().context("stop playback for rescan")?;
        teardown_current(&mut inner);
        inner.progress.reset();
        inner.state = PlaybackState::Stopped;
        inner.tracks = fresh;
        open_current(&mut inner, &self.shared)?;
        self.shared
            .progress
            .store(0.0f32.to_bits(), Ordering::Relaxed);
        let _ = self.shared.events_tx.send(PlayerEvent::TrackChanged {
            index: 0,
            path: inner.tracks.current_path(),
        });
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.shared
            .volume
            .store(volume.to_bits(), Ordering::Relaxed);
        tracing::info!(volume, "volume changed");
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().unwrap().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn current_index(&self) -> usize {
        self.inner.lock().unwrap().tracks.index()
    }

    pub fn current_track_path(&self) -> PathBuf {
        self.inner.lock().unwrap().tracks.current_path()
    }

    /// Relative paths of all tracks, in scan order.
    pub fn track_entries(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().tracks.entries().to_vec()
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().unwrap().tracks.len()
    }

    /// Progress fraction last published by the watchdog (or by seek).
    pub fn progress_fraction(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::Relaxed))
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        let consumed = inner
            .buffer
            .as_ref()
            .map(|b| b.consumed_frames())
            .unwrap_or(0);
        inner.progress.elapsed_seconds(consumed)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.inner.lock().unwrap().progress.total_seconds()
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }

        let mut inner = self.inner.lock().unwrap();
        let _ = inner.output.pause();
        teardown_current(&mut inner);
        inner.output.close();
    }
}

/// Open the track at the cursor: decoder, buffer + fill thread, device
/// stream, progress. On device failure the decoder is closed again and no
/// partial state is left behind.
fn open_current(inner: &mut Inner, shared: &Arc<ControlShared>) -> Result<()> {
    let path = inner.tracks.current_path();
    let source = inner
        .opener
        .open(&path)
        .with_context(|| format!("open track {}", path.display()))?;
    let spec = source.spec();
    let total_frames = source.total_frames();
    let source: SharedSource = Arc::new(Mutex::new(source));

    let mut buffer = StreamBuffer::new(spec, &shared.config);
    buffer.start_fill(source.clone());

    let consumer = BufferConsumer::new(buffer.state(), shared.volume.clone());
    if let Err(e) = inner.output.configure(spec, consumer) {
        // Close the decoder for safety; leave nothing half-initialized.
        buffer.reset();
        return Err(e).context("configure output device");
    }

    inner.progress.set_track(total_frames, spec.sample_rate);
    inner.source = Some(source);
    inner.buffer = Some(buffer);
    tracing::info!(
        track = %path.display(),
        rate_hz = spec.sample_rate,
        channels = spec.channels,
        frames = total_frames,
        "track ready"
    );
    Ok(())
}

/// Join the fill thread and release decoder + buffer.
fn teardown_current(inner: &mut Inner) {
    if let Some(mut buffer) = inner.buffer.take() {
        buffer.reset();
    }
    inner.source = None;
}

/// Shared switch path for next/prev/explicit/auto-advance. Playback resumes
/// after the switch iff it was running before.
fn switch_locked(inner: &mut Inner, shared: &Arc<ControlShared>, index: usize) -> Result<()> {
    if index >= inner.tracks.len() {
        bail!(
            "switch index {index} out of range (0..{})",
            inner.tracks.len()
        );
    }

    let resume = inner.state == PlaybackState::Playing;
    if resume {
        inner.output.pause().context("halt playback for switch")?;
    }

    teardown_current(inner);
    inner.progress.reset();
    inner
        .tracks
        .set_index(index)
        .expect("index validated above");

    if let Err(e) = open_current(inner, shared) {
        inner.state = PlaybackState::Stopped;
        return Err(e).with_context(|| format!("switch to track {index}"));
    }

    if resume {
        inner.output.start().context("resume after switch")?;
        inner.state = PlaybackState::Playing;
    } else {
        inner.state = PlaybackState::Stopped;
    }

    shared.progress.store(0.0f32.to_bits(), Ordering::Relaxed);
    let _ = shared.events_tx.send(PlayerEvent::TrackChanged {
        index,
        path: inner.tracks.current_path(),
    });
    tracing::info!(index, track = %inner.tracks.current_entry().display(), "track switched");
    Ok(())
}

/// Periodic end-of-track detection and progress refresh.
fn watchdog_loop(inner: &Arc<Mutex<Inner>>, shared: &Arc<ControlShared>) {
    while shared.running.load(Ordering::Acquire) {
        thread::sleep(shared.config.watchdog_interval);

        let mut guard = inner.lock().unwrap();

        let debounced = guard
            .last_seek
            .map(|t| t.elapsed() < shared.config.seek_debounce)
            .unwrap_or(false);
        if !debounced && shared.seeking.load(Ordering::Relaxed) {
            shared.seeking.store(false, Ordering::Relaxed);
            guard.last_seek = None;
        }

        let consumed = guard
            .buffer
            .as_ref()
            .map(|b| b.consumed_frames())
            .unwrap_or(0);

        if !debounced {
            let fraction = guard.progress.fraction(consumed);
            shared
                .progress
                .store(fraction.to_bits(), Ordering::Relaxed);
        }

        if guard.state == PlaybackState::Playing {
            let elapsed = guard.progress.elapsed_seconds(consumed);
            let total = guard.progress.total_seconds();
            if total > 0.0 && elapsed >= total {
                tracing::info!("end of track, advancing");
                let target = guard.tracks.peek_next();
                if let Err(e) = switch_locked(&mut guard, shared, target) {
                    tracing::error!("auto-advance failed: {e:#}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::{PcmSource, StreamSpec};
    use std::fs::File;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Constant-value source with a known length.
    struct StubSource {
        spec: StreamSpec,
        total: u64,
        pos: u64,
    }

    impl PcmSource for StubSource {
        fn spec(&self) -> StreamSpec {
            self.spec
        }

        fn total_frames(&self) -> u64 {
            self.total
        }

        fn read_frames(&mut self, dst: &mut [f32]) -> Result<usize> {
            let requested = (dst.len() / self.spec.channels) as u64;
            let frames = requested.min(self.total - self.pos) as usize;
            dst[..frames * self.spec.channels].fill(0.25);
            self.pos += frames as u64;
            Ok(frames)
        }

        fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
            self.pos = frame.min(self.total);
            Ok(())
        }
    }

    struct StubOpener {
        spec: StreamSpec,
        total: u64,
    }

    impl SourceOpener for StubOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn PcmSource>> {
            Ok(Box::new(StubSource {
                spec: self.spec,
                total: self.total,
                pos: 0,
            }))
        }
    }

    /// Source that can only rewind: any seek past frame 0 fails, like a
    /// container without an index.
    struct RewindOnlySource {
        spec: StreamSpec,
        total: u64,
        pos: u64,
    }

    impl PcmSource for RewindOnlySource {
        fn spec(&self) -> StreamSpec {
            self.spec
        }

        fn total_frames(&self) -> u64 {
            self.total
        }

        fn read_frames(&mut self, dst: &mut [f32]) -> Result<usize> {
            let requested = (dst.len() / self.spec.channels) as u64;
            let frames = requested.min(self.total - self.pos) as usize;
            dst[..frames * self.spec.channels].fill(0.25);
            self.pos += frames as u64;
            Ok(frames)
        }

        fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
            if frame > 0 {
                bail!("stream is not seekable");
            }
            self.pos = 0;
            Ok(())
        }
    }

    struct RewindOnlyOpener {
        spec: StreamSpec,
        total: u64,
    }

    impl SourceOpener for RewindOnlyOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn PcmSource>> {
            Ok(Box::new(RewindOnlySource {
                spec: self.spec,
                total: self.total,
                pos: 0,
            }))
        }
    }

    /// Output stub that hands the realtime consumer to the test so it can
    /// pump frames by hand.
    struct TestOutput {
        consumer: Arc<Mutex<Option<BufferConsumer>>>,
        playing: Arc<AtomicBool>,
        configured: Arc<AtomicUsize>,
    }

    impl AudioOutput for TestOutput {
        fn configure(&mut self, _spec: StreamSpec, consumer: BufferConsumer) -> Result<()> {
            *self.consumer.lock().unwrap() = Some(consumer);
            self.configured.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.playing.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) {
            *self.consumer.lock().unwrap() = None;
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        consumer: Arc<Mutex<Option<BufferConsumer>>>,
        playing: Arc<AtomicBool>,
        configured: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new(track_count: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for i in 0..track_count {
                File::create(dir.path().join(format!("track{i:02}.mp3"))).unwrap();
            }
            Self {
                dir,
                consumer: Arc::new(Mutex::new(None)),
                playing: Arc::new(AtomicBool::new(false)),
                configured: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn controller(&self, spec: StreamSpec, total: u64) -> PlayerController {
            self.controller_with(Box::new(StubOpener { spec, total }))
        }

        fn controller_with(&self, opener: Box<dyn SourceOpener>) -> PlayerController {
            let output = TestOutput {
                consumer: self.consumer.clone(),
                playing: self.playing.clone(),
                configured: self.configured.clone(),
            };
            let config = EngineConfig {
                fill_window_seconds: 0.05,
                fill_poll: Duration::from_millis(2),
                watchdog_interval: Duration::from_millis(10),
                seek_debounce: Duration::from_millis(100),
            };
            PlayerController::initialize(self.dir.path(), Box::new(output), opener, config)
                .unwrap()
        }

        /// Drive one callback-sized pull through the current consumer.
        fn pump(&self, frames: usize, channels: usize) {
            let mut slot = self.consumer.lock().unwrap();
            if let Some(consumer) = slot.as_mut() {
                let mut out = vec![0.0f32; frames * channels];
                consumer.fill(&mut out);
            }
        }
    }

    const SPEC: StreamSpec = StreamSpec {
        sample_rate: 8_000,
        channels: 2,
    };

    #[test]
    fn initialize_fails_on_empty_library() {
        let harness = Harness::new(0);
        let output = TestOutput {
            consumer: harness.consumer.clone(),
            playing: harness.playing.clone(),
            configured: harness.configured.clone(),
        };
        let result = PlayerController::initialize(
            harness.dir.path(),
            Box::new(output),
            Box::new(StubOpener {
                spec: SPEC,
                total: 100,
            }),
            EngineConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn play_pause_stop_transitions() {
        let harness = Harness::new(1);
        let player = harness.controller(SPEC, 8_000);

        assert_eq!(player.state(), PlaybackState::Stopped);
        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(harness.playing.load(Ordering::SeqCst));

        player.pause().unwrap();
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!harness.playing.load(Ordering::SeqCst));

        player.play().unwrap();
        player.stop().unwrap();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.elapsed_seconds(), 0.0);
    }

    #[test]
    fn out_of_range_switch_is_rejected_without_state_change() {
        let harness = Harness::new(3);
        let player = harness.controller(SPEC, 8_000);
        let events = player.events();

        assert!(player.switch(5).is_err());
        assert_eq!(player.current_index(), 0);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn next_and_prev_wrap_around() {
        let harness = Harness::new(3);
        let player = harness.controller(SPEC, 8_000);

        player.next().unwrap();
        player.next().unwrap();
        assert_eq!(player.current_index(), 2);
        player.next().unwrap();
        assert_eq!(player.current_index(), 0);

        player.prev().unwrap();
        assert_eq!(player.current_index(), 2);
    }

    #[test]
    fn switch_fires_track_changed_event() {
        let harness = Harness::new(2);
        let player = harness.controller(SPEC, 8_000);
        let events = player.events();

        player.switch(1).unwrap();
        let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
        match event {
            PlayerEvent::TrackChanged { index, .. } => assert_eq!(index, 1),
        }
        assert!(harness.configured.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn seek_rebases_counter_and_progress() {
        let spec = StreamSpec {
            sample_rate: 44_100,
            channels: 2,
        };
        let harness = Harness::new(1);
        let player = harness.controller(spec, 88_200);

        player.seek_to_position(0.5).unwrap();

        assert_eq!(player.elapsed_seconds(), 1.0);
        assert_eq!(player.progress_fraction(), 0.5);
    }

    #[test]
    fn failed_seek_keeps_playback_recoverable() {
        let harness = Harness::new(1);
        let player = harness.controller_with(Box::new(RewindOnlyOpener {
            spec: SPEC,
            total: 8_000,
        }));

        assert!(player.seek_to_position(0.5).is_err());

        // The buffer survives the failure: stop rewinds to frame 0 and
        // playback delivers frames again.
        player.stop().unwrap();
        player.play().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while player.elapsed_seconds() == 0.0 {
            assert!(Instant::now() < deadline, "no frames after failed seek");
            harness.pump(128, SPEC.channels);
        }
    }

    #[test]
    fn rescan_of_emptied_root_fails_and_keeps_old_list() {
        let harness = Harness::new(2);
        let player = harness.controller(SPEC, 8_000);
        player.switch(1).unwrap();

        for entry in std::fs::read_dir(harness.dir.path()).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }

        assert!(player.rescan().is_err());
        assert_eq!(player.track_count(), 2);
        assert_eq!(player.current_index(), 1);
        assert!(player.current_track_path().ends_with("track01.mp3"));
    }

    #[test]
    fn elapsed_resets_after_stop_and_switch() {
        let harness = Harness::new(2);
        let player = harness.controller(SPEC, 8_000);

        player.play().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while player.elapsed_seconds() == 0.0 {
            assert!(Instant::now() < deadline, "no frames consumed");
            harness.pump(128, SPEC.channels);
        }

        player.stop().unwrap();
        assert_eq!(player.elapsed_seconds(), 0.0);

        player.play().unwrap();
        while player.elapsed_seconds() == 0.0 {
            assert!(Instant::now() < deadline, "no frames consumed");
            harness.pump(128, SPEC.channels);
        }
        player.switch(1).unwrap();
        assert_eq!(player.elapsed_seconds(), 0.0);
    }

    #[test]
    fn watchdog_auto_advances_at_end_of_track() {
        let harness = Harness::new(2);
        // 400 frames at 8 kHz: 50 ms of audio.
        let player = harness.controller(SPEC, 400);
        let events = player.events();

        player.play().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while player.current_index() == 0 {
            assert!(Instant::now() < deadline, "watchdog never advanced");
            harness.pump(128, SPEC.channels);
            thread::sleep(Duration::from_millis(2));
        }

        let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
        match event {
            PlayerEvent::TrackChanged { index, .. } => assert_eq!(index, 1),
        }
        assert_eq!(player.current_index(), 1);
        assert!(player.is_playing());
    }

    #[test]
    fn volume_is_clamped_and_readable() {
        let harness = Harness::new(1);
        let player = harness.controller(SPEC, 8_000);

        player.set_volume(0.3);
        assert_eq!(player.volume(), 0.3);
        player.set_volume(4.0);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-1.0);
        assert_eq!(player.volume(), 0.0);
    }

    #[test]
    fn rescan_resets_to_track_zero() {
        let harness = Harness::new(2);
        let player = harness.controller(SPEC, 8_000);
        player.switch(1).unwrap();

        File::create(harness.dir.path().join("track99.mp3")).unwrap();
        player.rescan().unwrap();

        assert_eq!(player.current_index(), 0);
        assert_eq!(player.track_count(), 3);
        assert_eq!(player.state(), PlaybackState::Stopped);
    }
}
