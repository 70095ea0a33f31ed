#![allow(dead_code)]

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use dasp_signal::{self as signal, Signal};
use klangraum::{AudioBackend, Engine, EngineConfig, NullBackend, SoundSystem};
use tempfile::TempDir;

pub const RATE: u32 = 48_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// An engine without a device, driven with `read`.
pub fn offline_engine() -> Engine {
    init_tracing();
    let backend: Arc<dyn AudioBackend> = Arc::new(NullBackend::new());
    Engine::new(backend, EngineConfig::default().with_sample_rate(RATE).without_device())
        .expect("offline engine")
}

/// A system context whose factory hands out `backend`.
pub fn system_with(backend: Arc<NullBackend>, config: EngineConfig) -> SoundSystem {
    init_tracing();
    SoundSystem::with_backend(
        move || Ok(Arc::clone(&backend) as Arc<dyn AudioBackend>),
        config,
    )
}

/// Half-scale 440 Hz sine at 48 kHz as 16 bit samples.
pub fn sine_samples(frames: usize) -> Vec<i16> {
    signal::rate(RATE as f64)
        .const_hz(440.0)
        .sine()
        .take(frames)
        .map(|s| (s * 0.5 * i16::MAX as f64) as i16)
        .collect()
}

fn spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Mono 16 bit WAV file in memory.
pub fn sine_wav_bytes(frames: usize) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec()).expect("wav writer");
        for s in sine_samples(frames) {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Mono 16 bit WAV file on disk.
pub fn sine_wav_file(dir: &TempDir, name: &str, frames: usize) -> PathBuf {
    let path = dir.path().join(name);
    let mut writer = hound::WavWriter::create(&path, spec()).expect("wav writer");
    for s in sine_samples(frames) {
        writer.write_sample(s).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}
