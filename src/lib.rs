//! Spindle: a local music player built around a double-buffered streaming
//! core. A decoder thread keeps two PCM blocks topped up while the audio
//! callback drains them lock-free; a watchdog advances through the track
//! list as each track runs out.

pub mod cli;
pub mod config;
pub mod engine;
pub mod library;
pub mod metadata;
