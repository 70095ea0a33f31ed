mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use klangraum::{
    AudioBackend, BinauralNode, Cone, Destination, Engine, EngineConfig, ErrorCode, GraphNode,
    Mixer, NodeHandle, NodeState, NullBackend, SampleFormat, SoundSource, SplitterNode, Vec3,
};

use common::{offline_engine, peak, sine_wav_bytes, RATE};

fn dc_bytes(value: f32, frames: usize) -> Vec<u8> {
    (0..frames).flat_map(|_| value.to_le_bytes()).collect()
}

#[test]
fn endpoint_keeps_its_identity() {
    let engine = offline_engine();
    let a = engine.endpoint();
    let b = engine.endpoint();
    assert!(a.ptr_eq(&b));
    assert_eq!(a, b);
    assert_eq!(a.get_input_bus_count(), 1);
    assert_eq!(a.get_output_channels(0), 2);
    assert!(!NodeHandle::empty().ptr_eq(&NodeHandle::empty()));
    assert_eq!(NodeHandle::empty(), NodeHandle::default());
}

#[test]
fn nodes_live_as_long_as_their_handles() {
    let engine = offline_engine();
    assert_eq!(engine.node_count(), 1);

    let mixer = engine.new_mixer();
    let copy = mixer.clone();
    assert_eq!(engine.node_count(), 2);
    assert_eq!(mixer.node_handle().ref_count(), 3);

    drop(mixer);
    assert_eq!(engine.node_count(), 2);
    copy.set_volume(0.5);
    assert_eq!(copy.get_volume(), 0.5);

    drop(copy);
    assert_eq!(engine.node_count(), 1);

    let sound = engine.new_sound();
    assert_eq!(engine.node_count(), 1);
    assert!(sound.load_pcm(&dc_bytes(0.1, 64), SampleFormat::F32, RATE, 1));
    assert_eq!(engine.node_count(), 2);
    let shared = sound.clone();
    drop(sound);
    assert_eq!(engine.node_count(), 2);
    assert!(shared.close());
    assert_eq!(engine.node_count(), 1);
}

#[test]
fn handles_outliving_the_engine_are_inert() {
    let engine = offline_engine();
    let mixer = engine.new_mixer();
    let sound = engine.new_sound();
    drop(engine);

    mixer.set_volume(0.3);
    assert!(mixer.get_volume().is_nan());
    assert!(!mixer.play());
    assert!(!sound.load_pcm(&dc_bytes(0.1, 64), SampleFormat::F32, RATE, 1));
    assert_eq!(sound.get_length(), 0);
}

#[test]
fn uninitialized_mixer_defaults() {
    let mixer = Mixer::default();
    assert!(!mixer.is_initialized());
    assert!(mixer.get_volume().is_nan());
    assert!(mixer.get_pitch().is_nan());
    assert!(mixer.get_rolloff().is_nan());
    assert!(mixer.get_current_fade_volume().is_nan());
    assert!(!mixer.get_spatialization_enabled());
    assert_eq!(mixer.get_position(), Vec3::ZERO);
    assert_eq!(mixer.get_cone(), Cone::default());
    assert_eq!(mixer.get_listener(), None);
    assert_eq!(mixer.get_time(), 0);
    assert!(!mixer.play());
    assert!(!mixer.get_playing());
    assert_eq!(mixer.get_state(), NodeState::Stopped);
    assert_eq!(mixer.get_output_bus_count(), 0);
}

#[test]
fn fresh_mixer_parameters() {
    let engine = offline_engine();
    let mixer = engine.new_mixer();
    assert_eq!(mixer.get_volume(), 1.0);
    assert_eq!(mixer.get_pitch(), 1.0);
    assert!(mixer.get_spatialization_enabled());
    assert!(mixer.get_playing());
    assert_eq!(mixer.get_listener(), Some(0));

    mixer.set_position(Vec3::new(3.0, 0.0, 0.0));
    assert_relative_eq!(mixer.get_direction_to_listener().x, -1.0);
}

#[test]
fn splitter_fans_out() {
    let engine = offline_engine();
    let sound = engine.new_sound();
    assert!(sound.load_pcm(&dc_bytes(0.5, 4_096), SampleFormat::F32, RATE, 1));

    let splitter = SplitterNode::new(&engine, 2).unwrap();
    assert_eq!(splitter.get_output_bus_count(), 2);
    assert_eq!(splitter.get_input_channels(0), 2);

    let left = engine.new_mixer();
    let right = engine.new_mixer();
    assert!(sound.attach_output_bus(0, &splitter, 0));
    assert!(splitter.attach_output_bus(0, &left, 0));
    assert!(splitter.attach_output_bus(1, &right, 0));
    assert!(sound.play());

    assert_relative_eq!(peak(&engine.read(256)), 1.0);

    right.set_volume(0.0);
    assert_relative_eq!(peak(&engine.read(256)), 0.5);

    assert!(splitter.detach_all_output_buses());
    assert_eq!(peak(&engine.read(256)), 0.0);

    assert!(!splitter.attach_output_bus(5, &left, 0));
    assert_eq!(engine.last_error(), ErrorCode::InvalidArgument);
}

#[test]
fn splitter_rejects_empty_shapes() {
    let engine = offline_engine();
    assert!(SplitterNode::new(&engine, 0).is_err());
    assert!(SplitterNode::with_outputs(&engine, 2, 0).is_err());
    let wide = SplitterNode::with_outputs(&engine, 1, 4).unwrap();
    assert_eq!(wide.get_output_bus_count(), 4);
    assert_eq!(wide.get_output_channels(3), 1);
}

#[test]
fn binaural_node() {
    let engine = offline_engine();
    assert!(BinauralNode::new(&engine, 0).is_err());

    let binaural = BinauralNode::new(&engine, 2).unwrap();
    assert_eq!(binaural.get_input_channels(0), 2);
    assert_eq!(binaural.get_output_channels(0), 2);
    assert_eq!(binaural.get_direction(), Vec3::NEG_Z);
    assert_eq!(binaural.get_spatial_blend_max_distance(), 0.0);

    binaural.set_direction(-1.0, 0.0, 0.0);
    assert_eq!(binaural.get_direction(), Vec3::NEG_X);
    binaural.set_spatial_blend_max_distance(10.0);
    assert_eq!(binaural.get_spatial_blend_max_distance(), 10.0);
    binaural.set_spatial_blend_max_distance(0.0);

    let sound = engine.new_sound();
    assert!(sound.load_pcm(&dc_bytes(0.5, 4_096), SampleFormat::F32, RATE, 1));
    assert!(sound.attach_output_bus(0, &binaural, 0));
    assert!(binaural.attach_output_bus(0, &engine.endpoint(), 0));
    assert!(sound.play());

    let out = engine.read(1_024);
    let (l, r): (Vec<f32>, Vec<f32>) = out.chunks_exact(2).map(|f| (f[0], f[1])).unzip();
    assert!(peak(&l[512..]) > peak(&r[512..]));
}

#[test]
fn nodes_from_different_engines_do_not_mix() {
    let a = offline_engine();
    let b = offline_engine();
    let mixer = a.new_mixer();
    assert!(!mixer.attach_output_bus(0, &b.endpoint(), 0));
    assert_eq!(a.last_error(), ErrorCode::InvalidArgument);
}

#[test]
fn listeners() {
    let backend: Arc<dyn AudioBackend> = Arc::new(NullBackend::new());
    let engine = Engine::new(
        backend,
        EngineConfig::default().with_listener_count(9).without_device(),
    )
    .unwrap();
    assert_eq!(engine.listener_count(), 4);

    assert_eq!(engine.get_listener_position(9), Vec3::ZERO);
    assert_eq!(engine.get_listener_direction(9), Vec3::ZERO);
    assert_eq!(engine.get_listener_cone(9), Cone::default());
    assert!(!engine.get_listener_enabled(9));
    engine.set_listener_position(9, Vec3::ONE);

    assert_eq!(engine.get_listener_direction(0), Vec3::NEG_Z);
    assert_eq!(engine.get_listener_world_up(0), Vec3::Y);
    assert!(engine.get_listener_enabled(0));

    engine.set_listener_position(2, Vec3::new(10.0, 0.0, 0.0));
    assert_eq!(engine.get_listener_position(2), Vec3::new(10.0, 0.0, 0.0));
    assert_eq!(engine.find_closest_listener(Vec3::new(8.0, 0.0, 0.0)), Some(2));
    engine.set_listener_enabled(2, false);
    assert_eq!(engine.find_closest_listener(Vec3::new(8.0, 0.0, 0.0)), Some(0));

    let mixer = engine.new_mixer();
    mixer.set_position(Vec3::new(9.0, 0.0, 0.0));
    assert_eq!(mixer.get_listener(), Some(0));
    mixer.set_pinned_listener(Some(3));
    assert_eq!(mixer.get_pinned_listener(), Some(3));
    assert_eq!(mixer.get_listener(), Some(3));
}

#[test]
fn master_gain_is_in_decibels() {
    let engine = offline_engine();
    assert_eq!(engine.get_volume(), 1.0);
    assert_relative_eq!(engine.get_gain(), 0.0);

    assert!(engine.set_gain(-20.0));
    assert_relative_eq!(engine.get_volume(), 0.1, epsilon = 1e-6);
    assert!(engine.set_volume(0.5));
    assert_relative_eq!(engine.get_gain(), -6.0206, epsilon = 1e-3);

    let sound = engine.new_sound();
    assert!(sound.load_pcm(&dc_bytes(1.0, 1_024), SampleFormat::F32, RATE, 1));
    assert!(sound.play());
    assert_relative_eq!(peak(&engine.read(256)), 0.5);
}

#[test]
fn mixer_schedule_and_node_time() {
    let engine = offline_engine();
    let mixer = engine.new_mixer();
    mixer.set_start_time_in_frames(128);
    mixer.set_stop_time_in_frames(512);
    assert_eq!(mixer.get_state_time(NodeState::Started), 128);
    assert_eq!(mixer.get_state_by_time(64), NodeState::Stopped);
    assert_eq!(mixer.get_state_by_time_range(128, 256), NodeState::Started);
    assert_eq!(mixer.get_state_by_time(600), NodeState::Stopped);

    engine.read(1_024);
    assert_eq!(mixer.get_time_in_frames(), 384);
    assert!(!mixer.get_playing());
    assert!(mixer.set_node_time(0));
    assert_eq!(mixer.get_time(), 0);
}

#[test]
fn nan_spatial_parameters_are_ignored() {
    let engine = offline_engine();
    let sound = engine.new_sound();
    assert!(sound.load_pcm(&dc_bytes(0.5, 4_096), SampleFormat::F32, RATE, 1));
    sound.set_position(Vec3::new(2.0, 0.0, 0.0));
    assert!(sound.play());

    // Getters on content-less sounds report NaN; feeding them back is a no-op.
    let unloaded = engine.new_sound();
    sound.set_min_gain(unloaded.get_min_gain());
    sound.set_max_gain(unloaded.get_max_gain());
    sound.set_min_distance(f32::NAN);
    sound.set_max_distance(f32::NAN);
    sound.set_rolloff(f32::NAN);
    sound.set_doppler_factor(f32::NAN);
    sound.set_directional_attenuation_factor(f32::NAN);
    sound.set_position(Vec3::NAN);
    sound.set_velocity(Vec3::NAN);
    sound.set_cone(Cone::new(f32::NAN, 1.0, 0.0));

    assert_eq!(sound.get_min_gain(), 0.0);
    assert_eq!(sound.get_max_gain(), 1.0);
    assert_eq!(sound.get_min_distance(), 1.0);
    assert_eq!(sound.get_max_distance(), f32::MAX);
    assert_eq!(sound.get_rolloff(), 1.0);
    assert_eq!(sound.get_doppler_factor(), 1.0);
    assert_eq!(sound.get_directional_attenuation_factor(), 1.0);
    assert_eq!(sound.get_position(), Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(sound.get_velocity(), Vec3::ZERO);
    assert!(!sound.get_cone().inner_angle.is_nan());

    // Hard right, inverse distance at 2 m.
    assert_relative_eq!(peak(&engine.read(256)), 0.25);
}

#[test]
fn one_shot_into_a_node_bus() {
    let engine = offline_engine();
    let bytes = sine_wav_bytes(4_800);
    let mixer = engine.new_mixer();
    mixer.set_volume(0.0);

    assert!(engine.play(SoundSource::Memory(&bytes), Destination::Node(&mixer, 0)));
    assert_eq!(engine.node_count(), 3);
    assert_eq!(peak(&engine.read(4_864)), 0.0);
    assert_eq!(engine.node_count(), 2);

    assert!(!engine.play(SoundSource::Memory(&bytes), Destination::Node(&mixer, 3)));
    assert_eq!(engine.last_error(), ErrorCode::InvalidArgument);
    assert!(!engine.play(SoundSource::Memory(&bytes), Destination::Node(&NodeHandle::empty(), 0)));
    assert_eq!(engine.last_error(), ErrorCode::InvalidArgument);
    assert_eq!(engine.node_count(), 2);
}

#[test]
fn feedback_loops_are_rejected() {
    let engine = offline_engine();
    let a = engine.new_mixer();
    let b = engine.new_mixer();
    let c = engine.new_mixer();
    assert!(a.attach_output_bus(0, &b, 0));
    assert!(b.attach_output_bus(0, &c, 0));

    assert!(!b.attach_output_bus(0, &a, 0));
    assert!(!c.attach_output_bus(0, &a, 0));
    assert_eq!(engine.last_error(), ErrorCode::InvalidArgument);
    assert!(!engine.endpoint().attach_output_bus(0, &a, 0));
}
