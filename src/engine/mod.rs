//! Playback engine: decode, double-buffer, device output, transport.

pub mod buffer;
pub mod controller;
pub mod decoder;
pub mod device;
pub mod progress;

pub use controller::{PlaybackState, PlayerController, PlayerEvent};
