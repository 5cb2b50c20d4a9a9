//! Double-buffered streaming engine.
//!
//! Two fixed-capacity frame blocks decouple the blocking decoder from the
//! realtime audio callback. A background fill thread decodes into whichever
//! block is not ready; [`BufferConsumer::fill`] drains the active block from
//! the callback without blocking or allocating, emitting silence on underrun.
//!
//! Lifecycle rule: the fill thread must be joined before any block state is
//! mutated ([`StreamBuffer::reset`] does this), otherwise it could write to
//! a block the reader no longer expects.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::decoder::{PcmSource, StreamSpec};

/// Decode source shared between the fill thread and the controller.
///
/// The realtime consumer never touches this; only the fill thread (while
/// running) and the controller (after joining it) lock the source.
pub type SharedSource = Arc<Mutex<Box<dyn PcmSource>>>;

/// PCM payload of one block, guarded so the fill thread and the callback
/// can never observe a half-written block. The callback only ever
/// `try_lock`s it.
struct BlockPcm {
    /// Interleaved `f32` samples, `frames * channels` valid entries.
    samples: Vec<f32>,
    /// Global frame offset this block begins at.
    start_frame: u64,
    /// Frames actually decoded into the block (may be short near EOF).
    frames: u64,
}

/// One half of the double buffer.
struct FrameBlock {
    /// Safe for the realtime consumer to read. Set by the fill thread with
    /// Release ordering, cleared by the consumer once drained.
    ready: AtomicBool,
    pcm: Mutex<BlockPcm>,
}

impl FrameBlock {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            pcm: Mutex::new(BlockPcm {
                samples: Vec::new(),
                start_frame: 0,
                frames: 0,
            }),
        }
    }
}

/// State shared between the fill thread, the realtime consumer, and the
/// controller.
pub struct BufferState {
    blocks: [FrameBlock; 2],
    /// Index of the block currently drained by the callback.
    active: AtomicUsize,
    /// Global consumed-frame counter; advanced by the consumer, re-based by
    /// seek, zeroed on reset.
    consumed_frames: AtomicU64,
    /// Frames already drained from the active block. Lives here, not in the
    /// consumer, because the device callback keeps its consumer across stop
    /// and seek; reset must be able to clear this cursor too.
    cursor_in_block: AtomicU64,
    keep_filling: AtomicBool,
    spec: StreamSpec,
    /// Frames per fill window.
    target_frames: usize,
    fill_poll: Duration,
}

impl BufferState {
    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    pub fn consumed_frames(&self) -> u64 {
        self.consumed_frames.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn block_ready(&self, idx: usize) -> bool {
        self.blocks[idx].ready.load(Ordering::Acquire)
    }
}

/// The double buffer plus ownership of its fill thread.
pub struct StreamBuffer {
    state: Arc<BufferState>,
    fill_thread: Option<JoinHandle<()>>,
}

impl StreamBuffer {
    /// Create an idle buffer for a stream shape; both blocks start not-ready.
    pub fn new(spec: StreamSpec, config: &EngineConfig) -> Self {
        let target_frames =
            ((spec.sample_rate as f32 * config.fill_window_seconds).ceil() as usize).max(1);
        Self {
            state: Arc::new(BufferState {
                blocks: [FrameBlock::new(), FrameBlock::new()],
                active: AtomicUsize::new(0),
                consumed_frames: AtomicU64::new(0),
                cursor_in_block: AtomicU64::new(0),
                keep_filling: AtomicBool::new(false),
                spec,
                target_frames,
                fill_poll: config.fill_poll,
            }),
            fill_thread: None,
        }
    }

    /// Handle for constructing a [`BufferConsumer`].
    pub fn state(&self) -> Arc<BufferState> {
        self.state.clone()
    }

    pub fn consumed_frames(&self) -> u64 {
        self.state.consumed_frames()
    }

    /// Re-base the global counter (used by seek so progress and future block
    /// offsets stay consistent with the decoder position).
    pub fn set_consumed_frames(&self, frames: u64) {
        self.state.consumed_frames.store(frames, Ordering::Release);
    }

    /// Spawn the fill thread against `source`. Any previous fill thread is
    /// stopped and joined first.
    pub fn start_fill(&mut self, source: SharedSource) {
        self.stop_fill();
        self.state.keep_filling.store(true, Ordering::Release);
        let state = self.state.clone();
        self.fill_thread = Some(thread::spawn(move || fill_loop(&state, &source)));
    }

    /// Cooperatively stop the fill thread and join it. Idempotent.
    pub fn stop_fill(&mut self) {
        self.state.keep_filling.store(false, Ordering::Release);
        if let Some(handle) = self.fill_thread.take() {
            let _ = handle.join();
        }
    }

    /// Whether a fill thread is currently attached.
    pub fn is_filling(&self) -> bool {
        self.fill_thread.is_some()
    }

    /// Stop+join the fill thread, then clear both blocks and zero the global
    /// counter. Join-before-mutate is the hard precondition here; block
    /// state is only touched once the thread is gone.
    pub fn reset(&mut self) {
        self.stop_fill();
        for block in &self.state.blocks {
            block.ready.store(false, Ordering::Release);
            let mut pcm = block.pcm.lock().unwrap();
            pcm.start_frame = 0;
            pcm.frames = 0;
        }
        self.state.active.store(0, Ordering::Release);
        self.state.consumed_frames.store(0, Ordering::Release);
        self.state.cursor_in_block.store(0, Ordering::Release);
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        self.stop_fill();
    }
}

/// Background decode loop. Ends on EOF or decode error; both are normal
/// termination as far as the buffer is concerned.
fn fill_loop(state: &Arc<BufferState>, source: &SharedSource) {
    let channels = state.spec.channels;
    let mut next = state.active.load(Ordering::Acquire);

    while state.keep_filling.load(Ordering::Acquire) {
        let block = &state.blocks[next];
        if block.ready.load(Ordering::Acquire) {
            thread::sleep(state.fill_poll);
            continue;
        }

        let mut pcm = block.pcm.lock().unwrap();
        pcm.samples.resize(state.target_frames * channels, 0.0);

        let read = {
            let mut src = source.lock().unwrap();
            src.read_frames(&mut pcm.samples)
        };

        match read {
            Ok(frames) if frames > 0 => {
                pcm.start_frame = state.consumed_frames.load(Ordering::Acquire);
                pcm.frames = frames as u64;
                drop(pcm);
                block.ready.store(true, Ordering::Release);
                next = (next + 1) % 2;
            }
            Ok(_) => {
                tracing::debug!("fill thread: end of stream");
                break;
            }
            Err(e) => {
                tracing::warn!("fill thread: decode failed, stopping: {e:#}");
                break;
            }
        }
    }
}

/// Realtime-side reader over the shared buffer state.
///
/// One consumer exists per configured output stream; it lives inside the
/// device callback. The in-block cursor is shared state (see
/// [`BufferState::cursor_in_block`]) so stop and seek can rewind it.
pub struct BufferConsumer {
    state: Arc<BufferState>,
    /// Playback gain, `f32` bits in 0..=1. Written by the controller.
    gain: Arc<AtomicU32>,
}

impl BufferConsumer {
    pub fn new(state: Arc<BufferState>, gain: Arc<AtomicU32>) -> Self {
        Self { state, gain }
    }

    pub fn spec(&self) -> StreamSpec {
        self.state.spec
    }

    /// Fill `dst` (interleaved, length a multiple of the channel count) from
    /// the active block.
    ///
    /// Realtime contract: never blocks, never allocates, never touches the
    /// decoder. An unready block, or any shortfall, becomes zeroed samples.
    pub fn fill(&mut self, dst: &mut [f32]) {
        let channels = self.state.spec.channels;
        let requested = (dst.len() / channels) as u64;

        let idx = self.state.active.load(Ordering::Acquire);
        let block = &self.state.blocks[idx];

        if !block.ready.load(Ordering::Acquire) {
            dst.fill(0.0);
            return;
        }

        // The fill thread only holds this lock while the block is not
        // ready, so contention here is a transient race; silence is the
        // correct answer, not waiting.
        let Ok(pcm) = block.pcm.try_lock() else {
            dst.fill(0.0);
            return;
        };

        let cursor = self.state.cursor_in_block.load(Ordering::Relaxed);
        let available = pcm.frames.saturating_sub(cursor);
        let take = requested.min(available) as usize;
        let offset = cursor as usize * channels;
        let copied = take * channels;

        dst[..copied].copy_from_slice(&pcm.samples[offset..offset + copied]);

        let gain = f32::from_bits(self.gain.load(Ordering::Relaxed));
        if gain != 1.0 {
            for sample in &mut dst[..copied] {
                *sample *= gain;
            }
        }

        let cursor = cursor + take as u64;
        self.state
            .cursor_in_block
            .store(cursor, Ordering::Relaxed);
        self.state
            .consumed_frames
            .fetch_add(take as u64, Ordering::AcqRel);

        let drained = cursor >= pcm.frames;
        drop(pcm);

        if drained {
            block.ready.store(false, Ordering::Release);
            self.state.active.store((idx + 1) % 2, Ordering::Release);
            self.state.cursor_in_block.store(0, Ordering::Relaxed);
        }

        if copied < dst.len() {
            dst[copied..].fill(0.0);
        }
    }
}
