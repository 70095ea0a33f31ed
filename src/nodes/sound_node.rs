//! The processor behind every [`Mixer`](crate::Mixer) and
//! [`Sound`](crate::Sound).
//!
//! Without content it is a group: one input bus summed straight through.
//! With content it plays an in-memory [`PcmSource`] and has no inputs.
//! Either way volume, pan, pitch, the 3D parameters and the fader are
//! applied on the way out.

use crate::decode::{DataFormat, PcmData};
use crate::error::{SoundError, SoundResult};
use crate::node::{AudioNode, Bus, ProcessContext};
use crate::spatial::{balance_gains, pan_frame, PanMode, SpatialParams};

use super::fader::Fader;

/// Decoded content plus a fractional read cursor.
pub(crate) struct PcmSource {
    data: PcmData,
    /// Format of the content as it was handed to us, before conforming.
    format: DataFormat,
    cursor: f64,
    looping: bool,
    at_end: bool,
}

impl PcmSource {
    pub fn new(data: PcmData, format: DataFormat) -> Self {
        Self {
            data,
            format,
            cursor: 0.0,
            looping: false,
            at_end: false,
        }
    }

    pub fn length(&self) -> u64 {
        self.data.frames()
    }

    pub fn cursor(&self) -> u64 {
        (self.cursor as u64).min(self.length())
    }

    pub fn sample_rate(&self) -> u32 {
        self.data.sample_rate
    }

    pub fn data_format(&self) -> DataFormat {
        self.format
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if looping {
            self.at_end = false;
        }
    }

    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn seek(&mut self, frame: u64) -> SoundResult<()> {
        let length = self.length();
        if frame > length {
            return Err(SoundError::SeekOutOfRange {
                requested: frame,
                length,
            });
        }
        self.cursor = frame as f64;
        self.at_end = false;
        Ok(())
    }

    /// Fill the first `frames` samples of `out`, stepping `ratio` source
    /// frames per output frame with linear interpolation.
    fn read(&mut self, out: &mut Bus, frames: usize, ratio: f64) {
        let length = self.data.frames() as usize;
        let channels = self.data.channels as usize;
        if length == 0 || channels == 0 {
            self.at_end = !self.looping;
            return;
        }

        for i in 0..frames {
            if self.cursor >= length as f64 {
                if self.looping {
                    self.cursor %= length as f64;
                } else {
                    self.at_end = true;
                    break;
                }
            }

            let i0 = self.cursor as usize;
            let i1 = if i0 + 1 < length {
                i0 + 1
            } else if self.looping {
                0
            } else {
                i0
            };
            let frac = (self.cursor - i0 as f64) as f32;

            for (ch, buffer) in out.iter_mut().enumerate() {
                let src = if channels == 1 { 0 } else { ch.min(channels - 1) };
                let a = self.data.samples[i0 * channels + src];
                let b = self.data.samples[i1 * channels + src];
                buffer[i] = a + (b - a) * frac;
            }
            self.cursor += ratio;
        }

        if !self.looping && self.cursor >= length as f64 {
            self.at_end = true;
        }
    }
}

pub(crate) struct SoundNode {
    channels: u32,
    pub volume: f32,
    pub pan: f32,
    pub pan_mode: PanMode,
    pub pitch: f32,
    pub spatial: SpatialParams,
    pub fader: Fader,
    source: Option<PcmSource>,
}

impl SoundNode {
    /// A group that mixes whatever is attached to its input.
    pub fn group(channels: u32) -> Self {
        Self {
            channels,
            volume: 1.0,
            pan: 0.0,
            pan_mode: PanMode::default(),
            pitch: 1.0,
            spatial: SpatialParams::default(),
            fader: Fader::default(),
            source: None,
        }
    }

    /// A node that plays `data`, already conformed to `channels`.
    pub fn with_source(data: PcmData, format: DataFormat, channels: u32) -> Self {
        Self {
            source: Some(PcmSource::new(data, format)),
            ..Self::group(channels)
        }
    }

    pub fn source(&self) -> Option<&PcmSource> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut PcmSource> {
        self.source.as_mut()
    }
}

impl AudioNode for SoundNode {
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]) {
        let frames = ctx.frames;
        let spatial = self.spatial.evaluate(ctx.listeners);
        let out = &mut outputs[0];

        match self.source.as_mut() {
            Some(source) => {
                let rate = source.sample_rate() as f64 / ctx.sample_rate.max(1) as f64;
                let ratio = rate * self.pitch.max(0.0) as f64 * spatial.doppler_pitch as f64;
                source.read(out, frames, ratio);
            }
            None => {
                if let Some(input) = inputs.first().filter(|bus| !bus.is_empty()) {
                    for (ch, buffer) in out.iter_mut().enumerate() {
                        let src = &input[ch.min(input.len() - 1)];
                        buffer[..frames].copy_from_slice(&src[..frames]);
                    }
                }
            }
        }

        let (spatial_left, spatial_right) = balance_gains(spatial.pan);
        for i in 0..frames {
            let gain =
                self.volume * spatial.gain * self.fader.gain_at(ctx.global_time + i as u64);
            if let [left, right] = out.as_mut_slice() {
                let (l, r) = pan_frame(self.pan_mode, self.pan, left[i], right[i]);
                left[i] = l * gain * spatial_left;
                right[i] = r * gain * spatial_right;
            } else {
                for buffer in out.iter_mut() {
                    buffer[i] *= gain;
                }
            }
        }
    }

    fn num_input_buses(&self) -> usize {
        if self.source.is_some() {
            0
        } else {
            1
        }
    }

    fn input_channels(&self, _bus: usize) -> u32 {
        self.channels
    }

    fn output_channels(&self, _bus: usize) -> u32 {
        self.channels
    }

    fn is_finished(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|s| s.at_end() && !s.looping())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SampleFormat;
    use crate::listener::Listener;
    use dasp_graph::Buffer;

    fn ctx(listeners: &[Listener]) -> ProcessContext<'_> {
        ProcessContext {
            sample_rate: 100,
            frames: 4,
            global_time: 0,
            local_time: 0,
            listeners,
        }
    }

    fn format() -> DataFormat {
        DataFormat {
            format: SampleFormat::F32,
            channels: 1,
            sample_rate: 100,
        }
    }

    fn ramp(frames: usize) -> PcmData {
        PcmData {
            samples: (0..frames).map(|i| i as f32 / 10.0).collect(),
            channels: 1,
            sample_rate: 100,
        }
    }

    #[test]
    fn plays_then_finishes() {
        let mut node = SoundNode::with_source(ramp(6), format(), 1);
        let mut out = vec![vec![Buffer::SILENT]];
        let listeners = [Listener::default()];

        node.process(&ctx(&listeners), &[], &mut out);
        assert_eq!(&out[0][0][..4], &[0.0, 0.1, 0.2, 0.3]);
        assert!(!node.is_finished());

        out[0][0].silence();
        node.process(&ctx(&listeners), &[], &mut out);
        assert_eq!(&out[0][0][..3], &[0.4, 0.5, 0.0]);
        assert!(node.is_finished());
    }

    #[test]
    fn looping_wraps() {
        let mut node = SoundNode::with_source(ramp(3), format(), 1);
        node.source_mut().unwrap().set_looping(true);
        let mut out = vec![vec![Buffer::SILENT]];
        node.process(&ctx(&[]), &[], &mut out);
        assert_eq!(&out[0][0][..4], &[0.0, 0.1, 0.2, 0.0]);
        assert!(!node.is_finished());
    }

    #[test]
    fn seek_is_bounded() {
        let mut source = PcmSource::new(ramp(10), format());
        assert!(source.seek(10).is_ok());
        assert!(matches!(
            source.seek(11),
            Err(SoundError::SeekOutOfRange { requested: 11, length: 10 })
        ));
        assert_eq!(source.cursor(), 10);
    }

    #[test]
    fn group_applies_volume_to_input() {
        let mut node = SoundNode::group(1);
        node.volume = 0.5;
        let mut input = Buffer::SILENT;
        input.iter_mut().for_each(|s| *s = 1.0);
        let mut out = vec![vec![Buffer::SILENT]];
        node.process(&ctx(&[]), &[vec![input]], &mut out);
        assert_eq!(&out[0][0][..4], &[0.5; 4]);
    }
}
