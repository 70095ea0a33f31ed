use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use klangraum::{
    AudioBackend, BinauralNode, Engine, EngineConfig, GraphNode, NullBackend, SampleFormat, Vec3,
};

fn engine() -> Engine {
    let backend: Arc<dyn AudioBackend> = Arc::new(NullBackend::new());
    Engine::new(backend, EngineConfig::default().with_sample_rate(48_000).without_device())
        .expect("offline engine")
}

fn noise_bytes(frames: usize) -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    (0..frames)
        .flat_map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            ((state as f32 / u32::MAX as f32) * 2.0 - 1.0).to_le_bytes()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Engine.read() 8 sounds", |b| {
        let engine = engine();
        let bytes = noise_bytes(48_000);
        let sounds: Vec<_> = (0..8)
            .map(|i| {
                let sound = engine.new_sound();
                sound.load_pcm(&bytes, SampleFormat::F32, 48_000, 1);
                sound.set_position(Vec3::new(i as f32, 0.0, -2.0));
                sound.play_looped();
                sound
            })
            .collect();
        let mut out = vec![0.0; 512 * 2];

        b.iter(|| black_box(engine.read_into(&mut out)));
        drop(sounds);
    });

    c.bench_function("Engine.read() binaural", |b| {
        let engine = engine();
        let binaural = BinauralNode::new(&engine, 2).expect("binaural node");
        binaural.attach_output_bus(0, &engine.endpoint(), 0);
        binaural.set_direction(1.0, 0.0, -1.0);

        let sound = engine.new_sound();
        sound.load_pcm(&noise_bytes(48_000), SampleFormat::F32, 48_000, 1);
        sound.attach_output_bus(0, &binaural, 0);
        sound.play_looped();
        let mut out = vec![0.0; 512 * 2];

        b.iter(|| black_box(engine.read_into(&mut out)));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
