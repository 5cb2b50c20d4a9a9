//! Spindle — a terminal music player.
//!
//! Scans a directory for audio files, then plays them through the default
//! (or a named) output device. A decode thread keeps two PCM blocks filled
//! while the device callback drains them; a watchdog auto-advances to the
//! next track.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use spindle::cli::Args;
use spindle::engine::decoder::SymphoniaOpener;
use spindle::engine::device::{self, CpalOutput};
use spindle::engine::{PlayerController, PlayerEvent};
use spindle::metadata;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_devices {
        device::print_output_devices()?;
        return Ok(());
    }

    let root = match &args.root {
        Some(root) => root.clone(),
        None => prompt_for_root()?,
    };
    ensure!(root.is_dir(), "{} is not a directory", root.display());

    let output = CpalOutput::new(args.device.clone())?;
    let player = PlayerController::initialize(
        &root,
        Box::new(output),
        Box::new(SymphoniaOpener),
        args.engine_config(),
    )?;

    let _ = ctrlc::set_handler(|| {
        std::process::exit(130);
    });

    // Announce track switches with tag data off the control path.
    let events = player.events();
    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            match event {
                PlayerEvent::TrackChanged { index, path } => {
                    let tags = metadata::read_tags(&path);
                    println!("[{index}] {} - {}", tags.producer, tags.title);
                }
            }
        }
    });

    print_tracks(&player);
    player.play()?;
    repl(&player)
}

fn prompt_for_root() -> Result<PathBuf> {
    print!("music directory: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read music directory")?;
    Ok(PathBuf::from(line.trim()))
}

fn print_tracks(player: &PlayerController) {
    for (i, path) in player.track_entries().iter().enumerate() {
        let marker = if i == player.current_index() { ">" } else { " " };
        println!("{marker} {i:3}  {}", path.display());
    }
}

fn print_info(player: &PlayerController) {
    let path = player.current_track_path();
    let tags = metadata::read_tags(&path);
    println!("{} - {}", tags.producer, tags.title);
    println!(
        "{:.1}s / {:.1}s ({:.0}%)  state: {:?}  volume: {:.2}",
        player.elapsed_seconds(),
        player.duration_seconds(),
        player.progress_fraction() * 100.0,
        player.state(),
        player.volume(),
    );
}

fn repl(player: &PlayerController) -> Result<()> {
    let stdin = io::stdin();
    print_help();

    for line in stdin.lock().lines() {
        let line = line.context("read command")?;
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        let arg = parts.next();

        let result = match cmd {
            "play" | "p" => player.play(),
            "pause" => player.pause(),
            "stop" => player.stop(),
            "next" | "n" => player.next(),
            "prev" => player.prev(),
            "goto" => match arg.and_then(|a| a.parse::<usize>().ok()) {
                Some(index) => player.switch(index),
                None => {
                    println!("usage: goto <index>");
                    Ok(())
                }
            },
            "seek" => match arg.and_then(|a| a.parse::<f32>().ok()) {
                Some(fraction) => player.seek_to_position(fraction),
                None => {
                    println!("usage: seek <0.0..=1.0>");
                    Ok(())
                }
            },
            "vol" => match arg.and_then(|a| a.parse::<f32>().ok()) {
                Some(volume) => {
                    player.set_volume(volume);
                    Ok(())
                }
                None => {
                    println!("usage: vol <0.0..=1.0>");
                    Ok(())
                }
            },
            "list" | "ls" => {
                print_tracks(player);
                Ok(())
            }
            "rescan" => player.rescan(),
            "info" | "i" => {
                print_info(player);
                Ok(())
            }
            "help" | "h" | "?" => {
                print_help();
                Ok(())
            }
            "quit" | "q" | "exit" => break,
            other => {
                println!("unknown command: {other} (try help)");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("error: {e:#}");
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        "commands: play pause stop next prev goto <i> seek <f> vol <f> \
         list rescan info help quit"
    );
}
