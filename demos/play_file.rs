//! Play an audio file on the default output device.
//!
//! Run with: cargo run --example play_file --features cpal_device -- <file> [device index]

use std::thread::sleep;
use std::time::Duration;

use klangraum::SoundSystem;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: play_file <file> [device index]")?;

    let system = SoundSystem::global();
    for (i, name) in system.list_outputs().iter().enumerate() {
        println!("[{i}] {name}");
    }

    let engine = system
        .engine()
        .ok_or_else(|| format!("no audio engine: {:?}", system.last_error()))?;

    if let Some(index) = args.next() {
        let index: usize = index.parse()?;
        if !engine.set_device(index) {
            eprintln!("could not switch to device {index}: {:?}", engine.last_error());
        }
    }

    let sound = engine.new_sound();
    if !sound.load(&path) {
        return Err(format!("could not load {path}: {:?}", engine.last_error()).into());
    }
    sound.set_fade_in_milliseconds(0.0, 1.0, 500);
    sound.play();

    println!("Playing {path} ({} ms)... Ctrl+C to stop", sound.get_length_in_milliseconds());
    while sound.get_playing() {
        sleep(Duration::from_millis(100));
    }
    Ok(())
}
