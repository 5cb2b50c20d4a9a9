//! Decode source: Symphonia-backed PCM frame reader.
//!
//! The engine consumes audio through [`PcmSource`], a blocking frame-read
//! interface with an accurate frame seek. [`SymphoniaSource`] is the real
//! implementation; tests drive the engine with synthetic sources.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

/// Output stream shape of a decode source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: usize,
}

impl StreamSpec {
    /// Interleaved samples per PCM frame.
    pub fn samples_per_frame(&self) -> usize {
        self.channels
    }
}

/// Blocking PCM frame reader with accurate seek.
///
/// `read_frames` fills `dst` (interleaved `f32`, length a multiple of the
/// channel count) with up to `dst.len() / channels` frames and returns the
/// number of frames actually read; `Ok(0)` signals end of stream and is not
/// an error.
pub trait PcmSource: Send {
    fn spec(&self) -> StreamSpec;

    /// Total PCM frames in the stream, 0 when the container does not say.
    fn total_frames(&self) -> u64;

    fn read_frames(&mut self, dst: &mut [f32]) -> Result<usize>;

    fn seek_to_frame(&mut self, frame: u64) -> Result<()>;
}

/// Opens a [`PcmSource`] for a path. The seam that lets tests substitute
/// synthetic sources for real files.
pub trait SourceOpener: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmSource>>;
}

/// The production opener: probes files with Symphonia.
pub struct SymphoniaOpener;

impl SourceOpener for SymphoniaOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PcmSource>> {
        Ok(Box::new(SymphoniaSource::open(path)?))
    }
}

/// File-backed decode stream. Construction is all-or-nothing: a failed probe
/// or codec setup leaves no half-open handle behind.
pub struct SymphoniaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: StreamSpec,
    total_frames: u64,
    /// Leftover interleaved samples from the last decoded packet.
    stash: Vec<f32>,
    stash_pos: usize,
}

impl SymphoniaSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .with_context(|| format!("probe {}", path.display()))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track in {}", path.display()))?;

        let codec_params = track.codec_params.clone();
        let track_id = track.id;

        let channels = codec_params
            .channels
            .ok_or_else(|| anyhow!("unknown channel count"))?
            .count();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("unknown sample rate"))?;
        let total_frames = codec_params.n_frames.unwrap_or(0);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .with_context(|| format!("codec setup for {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            rate_hz = sample_rate,
            channels,
            frames = total_frames,
            "decoder ready"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            spec: StreamSpec {
                sample_rate,
                channels,
            },
            total_frames,
            stash: Vec::new(),
            stash_pos: 0,
        })
    }
}

impl PcmSource for SymphoniaSource {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn read_frames(&mut self, dst: &mut [f32]) -> Result<usize> {
        let mut written = 0;

        while written < dst.len() {
            if self.stash_pos >= self.stash.len() {
                let packet = match self.format.next_packet() {
                    Ok(p) => p,
                    Err(_) => break, // EOF
                };
                if packet.track_id() != self.track_id {
                    continue;
                }

                // Bad packets are skipped; the stream continues.
                let decoded = match self.decoder.decode(&packet) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::debug!("packet decode error, skipping: {e}");
                        continue;
                    }
                };

                let mut sample_buf =
                    SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
                sample_buf.copy_interleaved_ref(decoded);
                self.stash.clear();
                self.stash.extend_from_slice(sample_buf.samples());
                self.stash_pos = 0;
                continue;
            }

            let n = (dst.len() - written).min(self.stash.len() - self.stash_pos);
            dst[written..written + n]
                .copy_from_slice(&self.stash[self.stash_pos..self.stash_pos + n]);
            written += n;
            self.stash_pos += n;
        }

        Ok(written / self.spec.channels)
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        let rate = self.spec.sample_rate as u64;
        let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .with_context(|| format!("seek to frame {frame}"))?;
        self.decoder.reset();
        self.stash.clear();
        self.stash_pos = 0;
        Ok(())
    }
}
