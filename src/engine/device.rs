//! Hardware playback output.
//!
//! [`AudioOutput`] is the controller-facing contract: configure a stream for
//! a track's native format, then start/pause it. [`CpalOutput`] implements it
//! on a dedicated thread that owns the `cpal::Stream` (streams are not
//! `Send`), with commands and replies over crossbeam channels.
//!
//! The realtime callback pulls frames from a [`BufferConsumer`] through a
//! preallocated scratch buffer and converts to the device sample format; it
//! never blocks and never allocates.

use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded, unbounded};

use crate::engine::buffer::BufferConsumer;
use crate::engine::decoder::StreamSpec;

/// Frames per callback refill chunk; sized generously so the scratch buffer
/// covers a whole callback in one pass on common devices.
const SCRATCH_FRAMES: usize = 4096;

/// Playback device contract consumed by the controller.
///
/// `configure` must be called per track because device and decoder formats
/// have to match at the moment playback starts; it replaces any previously
/// configured stream.
pub trait AudioOutput: Send {
    fn configure(&mut self, spec: StreamSpec, consumer: BufferConsumer) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn close(&mut self);
}

enum DeviceCommand {
    Configure {
        spec: StreamSpec,
        consumer: BufferConsumer,
        reply: Sender<Result<()>>,
    },
    Start {
        reply: Sender<Result<()>>,
    },
    Pause {
        reply: Sender<Result<()>>,
    },
    Close,
    Shutdown,
}

/// CPAL-backed output. The stream lives on its own thread for the lifetime
/// of this handle; one `CpalOutput` is one hardware device claim.
pub struct CpalOutput {
    tx: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Claim an output device: the first one whose name contains
    /// `device_hint` (case-insensitive), or the host default.
    pub fn new(device_hint: Option<String>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let thread = thread::Builder::new()
            .name("audio-device".into())
            .spawn(move || device_thread(device_hint, rx, ready_tx))
            .context("spawn device thread")?;

        let mut out = Self {
            tx,
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(name)) => {
                tracing::info!(device = %name, "output device claimed");
                Ok(out)
            }
            Ok(Err(e)) => {
                out.join_thread();
                Err(e)
            }
            Err(_) => {
                out.join_thread();
                Err(anyhow!("device thread exited during startup"))
            }
        }
    }

    fn request(&self, make: impl FnOnce(Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(make(reply_tx))
            .map_err(|_| anyhow!("device thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("device thread is gone"))?
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl AudioOutput for CpalOutput {
    fn configure(&mut self, spec: StreamSpec, consumer: BufferConsumer) -> Result<()> {
        self.request(|reply| DeviceCommand::Configure {
            spec,
            consumer,
            reply,
        })
    }

    fn start(&mut self) -> Result<()> {
        self.request(|reply| DeviceCommand::Start { reply })
    }

    fn pause(&mut self) -> Result<()> {
        self.request(|reply| DeviceCommand::Pause { reply })
    }

    fn close(&mut self) {
        let _ = self.tx.send(DeviceCommand::Close);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.tx.send(DeviceCommand::Shutdown);
        self.join_thread();
    }
}

fn device_thread(
    device_hint: Option<String>,
    rx: crossbeam_channel::Receiver<DeviceCommand>,
    ready_tx: Sender<Result<String>>,
) {
    let host = cpal::default_host();
    let device = match pick_device(&host, device_hint.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let _ = ready_tx.send(Ok(name));

    let mut stream: Option<cpal::Stream> = None;
    for cmd in rx.iter() {
        match cmd {
            DeviceCommand::Configure {
                spec,
                consumer,
                reply,
            } => {
                // Tear down the previous stream before reconfiguring.
                stream = None;
                match open_stream(&device, spec, consumer) {
                    Ok(s) => {
                        stream = Some(s);
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            DeviceCommand::Start { reply } => {
                let result = match &stream {
                    Some(s) => s.play().map_err(|e| anyhow!("start stream: {e}")),
                    None => Err(anyhow!("no stream configured")),
                };
                let _ = reply.send(result);
            }
            DeviceCommand::Pause { reply } => {
                let result = match &stream {
                    Some(s) => s.pause().map_err(|e| anyhow!("pause stream: {e}")),
                    None => Err(anyhow!("no stream configured")),
                };
                let _ = reply.send(result);
            }
            DeviceCommand::Close => {
                stream = None;
            }
            DeviceCommand::Shutdown => break,
        }
    }
}

/// Resolve the device hint the way `CpalOutput::new` claims devices: no
/// hint means the host default, otherwise the first output device whose
/// name contains the hint (case-insensitive).
fn pick_device(host: &cpal::Host, hint: Option<&str>) -> Result<cpal::Device> {
    let Some(hint) = hint else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"));
    };

    let wanted = normalize_hint(hint).ok_or_else(|| anyhow!("empty device name"))?;
    for device in host.output_devices().context("enumerate output devices")? {
        let Ok(desc) = device.description() else {
            continue;
        };
        if desc.name().to_lowercase().contains(&wanted) {
            return Ok(device);
        }
    }
    Err(anyhow!("no output device matched: {hint}"))
}

/// Lowercased hint for substring matching, `None` when blank.
fn normalize_hint(hint: &str) -> Option<String> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    Some(hint.to_lowercase())
}

/// Print the host's output devices, one per line, for `--list-devices`.
pub fn print_output_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = host.output_devices().context("enumerate output devices")?;
    for (i, device) in devices.enumerate() {
        match device.description() {
            Ok(desc) => println!("{i:>3}  {desc}"),
            Err(e) => println!("{i:>3}  (unavailable: {e})"),
        }
    }
    Ok(())
}

fn open_stream(
    device: &cpal::Device,
    spec: StreamSpec,
    consumer: BufferConsumer,
) -> Result<cpal::Stream> {
    let config = pick_stream_config(device, spec)?;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();

    if stream_config.sample_rate != spec.sample_rate {
        tracing::warn!(
            source_rate_hz = spec.sample_rate,
            device_rate_hz = stream_config.sample_rate,
            "device cannot run at the source rate; playback timing will drift"
        );
    }
    tracing::info!(
        rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        format = ?sample_format,
        "output stream configured"
    );

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, &stream_config, consumer),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &stream_config, consumer),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, &stream_config, consumer),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &stream_config, consumer),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }?;

    // Built idle; the controller decides when playback starts.
    stream.pause().context("hold new stream idle")?;
    Ok(stream)
}

/// Choose a supported config with the track's channel count, as close to its
/// native rate as the device allows, preferring float output.
fn pick_stream_config(
    device: &cpal::Device,
    spec: StreamSpec,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();

    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        if range.channels() as usize != spec.channels {
            continue;
        }
        let rate = spec
            .sample_rate
            .clamp(range.min_sample_rate(), range.max_sample_rate());
        let distance = rate.abs_diff(spec.sample_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((best_distance, best_rank, _)) => (distance, rank) < (*best_distance, *best_rank),
        };
        if replace {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, config)| config)
        .ok_or_else(|| anyhow!("no output config supports {} channel(s)", spec.channels))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Type-specialized stream builder.
///
/// The callback drains the consumer through a fixed scratch buffer in chunks,
/// so an oversized hardware period never forces an allocation.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: BufferConsumer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut written = 0;
            while written < data.len() {
                let n = (data.len() - written).min(scratch.len());
                let chunk = &mut scratch[..n];
                consumer.fill(chunk);
                for (dst, src) in data[written..written + n].iter_mut().zip(chunk.iter()) {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                }
                written += n;
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_normalization_lowercases_and_rejects_blank() {
        assert_eq!(normalize_hint("  USB DAC "), Some("usb dac".to_string()));
        assert_eq!(normalize_hint(""), None);
        assert_eq!(normalize_hint("   "), None);
    }

    #[test]
    fn sample_format_rank_prefers_float() {
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::I32));
        assert!(sample_format_rank(cpal::SampleFormat::I32) < sample_format_rank(cpal::SampleFormat::I16));
        assert!(sample_format_rank(cpal::SampleFormat::I16) < sample_format_rank(cpal::SampleFormat::U16));
    }
}
