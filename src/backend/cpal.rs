//! CPAL output backend
//!
//! `cpal::Stream` is not `Send`, so every stream lives on a dedicated
//! thread that owns it for its whole life. The handle talks to that thread
//! over a command channel.

use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use crossbeam_channel::{bounded, Receiver, Sender};
use dasp_sample::Sample;

use crate::device::{
    AudioBackend, DeviceDirection, DeviceId, DeviceInfo, Enumeration, OutputStream,
    RenderCallback, StreamConfig,
};
use crate::error::{SoundError, SoundResult};

/// Backend for the platform's default cpal host.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

fn backend_err(err: impl std::fmt::Display) -> SoundError {
    SoundError::Backend(err.to_string())
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".into())
}

fn describe(device: &cpal::Device, direction: DeviceDirection) -> DeviceInfo {
    let name = device_name(device);
    DeviceInfo {
        id: DeviceId::new(name.as_bytes()),
        name,
        direction,
    }
}

fn find_output(id: &DeviceId) -> SoundResult<cpal::Device> {
    let host = cpal::default_host();
    host.output_devices()
        .map_err(backend_err)?
        .find(|d| device_name(d).as_bytes() == id.as_bytes())
        .ok_or_else(|| SoundError::DeviceNotFound(format!("{id:?}")))
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn enumerate(&self) -> SoundResult<Enumeration> {
        let host = cpal::default_host();
        let inputs = host
            .input_devices()
            .map_err(backend_err)?
            .map(|d| describe(&d, DeviceDirection::Capture))
            .collect();
        let outputs = host
            .output_devices()
            .map_err(backend_err)?
            .map(|d| describe(&d, DeviceDirection::Playback))
            .collect();

        Ok(Enumeration { inputs, outputs })
    }

    fn default_output(&self) -> Option<DeviceId> {
        let device = cpal::default_host().default_output_device()?;
        Some(DeviceId::new(device_name(&device).as_bytes()))
    }

    fn preferred_sample_rate(&self, device: &DeviceId) -> Option<u32> {
        let device = find_output(device).ok()?;
        let config = device.default_output_config().ok()?;
        Some(config.sample_rate().0)
    }

    fn open_output(
        &self,
        device: &DeviceId,
        config: StreamConfig,
        render: RenderCallback,
    ) -> SoundResult<Box<dyn OutputStream>> {
        let (command_tx, command_rx) = bounded::<Command>(4);
        let (ready_tx, ready_rx) = bounded::<SoundResult<()>>(1);

        let id = device.clone();
        let thread = std::thread::Builder::new()
            .name("klangraum-cpal".into())
            .spawn(move || stream_thread(id, config, render, ready_tx, command_rx))
            .map_err(SoundError::Io)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                device: device.clone(),
                config,
                commands: command_tx,
                thread: Some(thread),
            })),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => Err(SoundError::Backend("stream thread exited".into())),
        }
    }
}

enum Command {
    Play(Sender<SoundResult<()>>),
    Pause(Sender<SoundResult<()>>),
}

/// Owns the cpal stream until the command channel closes.
fn stream_thread(
    id: DeviceId,
    config: StreamConfig,
    render: RenderCallback,
    ready: Sender<SoundResult<()>>,
    commands: Receiver<Command>,
) {
    let stream = match find_output(&id).and_then(|device| build_stream(&device, config, render)) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    // Stream lives as long as this loop
    while let Ok(command) = commands.recv() {
        match command {
            Command::Play(reply) => {
                let _ = reply.send(stream.play().map_err(backend_err));
            }
            Command::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(backend_err));
            }
        }
    }
    tracing::debug!(device = ?id, "cpal stream closed");
}

fn build_stream(
    device: &cpal::Device,
    config: StreamConfig,
    render: RenderCallback,
) -> SoundResult<cpal::Stream> {
    let sample_format = device
        .default_output_config()
        .map_err(backend_err)?
        .sample_format();
    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let on_error = |err: cpal::StreamError| tracing::warn!("cpal stream error: {err}");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| render(data),
            on_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _| convert(&render, &mut scratch, data),
                on_error,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                &stream_config,
                move |data: &mut [u16], _| convert(&render, &mut scratch, data),
                on_error,
                None,
            )
        }
        other => {
            return Err(SoundError::UnsupportedFormat(format!(
                "device sample format {other:?}"
            )))
        }
    };
    stream.map_err(backend_err)
}

/// Render into an `f32` scratch buffer, then convert to the device format.
fn convert<S>(render: &RenderCallback, scratch: &mut Vec<f32>, data: &mut [S])
where
    S: Sample + dasp_sample::FromSample<f32>,
{
    scratch.resize(data.len(), 0.0);
    render(scratch.as_mut_slice());
    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
        *out = s.clamp(-1.0, 1.0).to_sample::<S>();
    }
}

/// Handle to a stream living on its own thread.
struct CpalStream {
    device: DeviceId,
    config: StreamConfig,
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStream {
    fn request(&self, make: fn(Sender<SoundResult<()>>) -> Command) -> SoundResult<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| SoundError::Backend("stream thread exited".into()))?;
        reply_rx
            .recv()
            .map_err(|_| SoundError::Backend("stream thread exited".into()))?
    }
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> SoundResult<()> {
        self.request(Command::Play)
    }

    fn stop(&mut self) -> SoundResult<()> {
        self.request(Command::Pause)
    }

    fn device_id(&self) -> &DeviceId {
        &self.device
    }

    fn config(&self) -> StreamConfig {
        self.config
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        // Closing the channel ends the thread, which drops the stream.
        let (closed, _) = bounded(0);
        drop(std::mem::replace(&mut self.commands, closed));
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
