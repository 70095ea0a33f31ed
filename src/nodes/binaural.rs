//! Binaural rendering of a single direction.

use std::sync::Arc;

use glam::Vec3;

use crate::engine::Engine;
use crate::error::{SoundError, SoundResult};
use crate::handle::{GraphNode, NodeHandle};
use crate::node::{AudioNode, Bus, ProcessContext, BLOCK_FRAMES};

use super::hrtf::{GridKey, HrtfContext};

/// Downmixes its input to mono and convolves it with the HRIR pair for
/// `direction`, producing stereo.
///
/// A direction change crossfades from the old filter to the new one over
/// one block.
pub(crate) struct Binaural {
    hrtf: Arc<HrtfContext>,
    channels: u32,
    pub direction: Vec3,
    pub blend_max_distance: f32,
    key: GridKey,
    /// Mono input, the previous `filter_len - 1` samples followed by the
    /// current block.
    mono: Vec<f32>,
}

impl Binaural {
    pub fn new(hrtf: Arc<HrtfContext>, channels: u32) -> Self {
        let direction = Vec3::NEG_Z;
        let key = hrtf.key_for(direction);
        let mono = vec![0.0; hrtf.filter_len() - 1 + BLOCK_FRAMES];
        Self {
            hrtf,
            channels,
            direction,
            blend_max_distance: 0.0,
            key,
            mono,
        }
    }

    /// 0 is fully dry, 1 fully binaural.
    fn blend(&self) -> f32 {
        if self.blend_max_distance > 0.0 {
            (self.direction.length() / self.blend_max_distance).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

fn convolve(taps: &[f32], history: &[f32], n: usize) -> f32 {
    taps.iter()
        .enumerate()
        .map(|(k, &h)| h * history[n - k])
        .sum()
}

impl AudioNode for Binaural {
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]) {
        let frames = ctx.frames;
        let past = self.hrtf.filter_len() - 1;
        let input = &inputs[0];

        for i in 0..frames {
            self.mono[past + i] = if input.is_empty() {
                0.0
            } else {
                input.iter().map(|b| b[i]).sum::<f32>() / input.len() as f32
            };
        }

        let blend = self.blend();
        let key = self.hrtf.key_for(self.direction);
        let previous = std::mem::replace(&mut self.key, key);

        let hrtf = &*self.hrtf;
        let mono = &self.mono;
        let (Some(current), [left, right]) = (hrtf.hrir(key), outputs[0].as_mut_slice()) else {
            return;
        };
        let fading_from = hrtf.hrir(previous).filter(|_| previous != key);

        for i in 0..frames {
            let n = past + i;
            let mut wet_l = convolve(&current.left, mono, n);
            let mut wet_r = convolve(&current.right, mono, n);
            if let Some(old) = fading_from {
                let t = (i + 1) as f32 / frames as f32;
                wet_l = convolve(&old.left, mono, n) * (1.0 - t) + wet_l * t;
                wet_r = convolve(&old.right, mono, n) * (1.0 - t) + wet_r * t;
            }

            let (dry_l, dry_r) = match input.len() {
                0 => (0.0, 0.0),
                1 => (input[0][i], input[0][i]),
                _ => (input[0][i], input[1][i]),
            };
            left[i] = dry_l * (1.0 - blend) + wet_l * blend;
            right[i] = dry_r * (1.0 - blend) + wet_r * blend;
        }

        self.mono.copy_within(frames..frames + past, 0);
    }

    fn num_input_buses(&self) -> usize {
        1
    }

    fn input_channels(&self, _bus: usize) -> u32 {
        self.channels
    }

    fn output_channels(&self, _bus: usize) -> u32 {
        2
    }
}

/// A node that renders its input binaurally for one direction.
///
/// Input has the channel count given at construction, output is always
/// stereo. The node is created unattached.
#[derive(Clone, Debug, Default)]
pub struct BinauralNode {
    node: NodeHandle,
}

impl BinauralNode {
    pub fn new(engine: &Engine, channels: u32) -> SoundResult<Self> {
        if channels == 0 {
            return Err(SoundError::invalid_argument(
                "binaural node needs at least one input channel",
            ));
        }
        let hrtf = engine.hrtf()?;
        let node = engine.add_node(Binaural::new(hrtf, channels));
        Ok(Self { node })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Binaural) -> R) -> Option<R> {
        self.node
            .with_graph(|g, id| g.node_mut::<Binaural>(id).map(f))
            .flatten()
    }

    /// Direction to the source in listener space (-Z ahead, +X right).
    pub fn set_direction(&self, x: f32, y: f32, z: f32) {
        self.set_direction_vector(Vec3::new(x, y, z));
    }

    pub fn set_direction_vector(&self, direction: Vec3) {
        self.with(|b| b.direction = direction);
    }

    pub fn get_direction(&self) -> Vec3 {
        self.with(|b| b.direction).unwrap_or(Vec3::ZERO)
    }

    /// Distance at which the output becomes fully binaural; closer sources
    /// are blended with the dry signal. Zero or less disables blending.
    pub fn set_spatial_blend_max_distance(&self, max_distance: f32) {
        self.with(|b| b.blend_max_distance = max_distance);
    }

    pub fn get_spatial_blend_max_distance(&self) -> f32 {
        self.with(|b| b.blend_max_distance).unwrap_or(f32::NAN)
    }
}

impl GraphNode for BinauralNode {
    fn node_handle(&self) -> NodeHandle {
        self.node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dasp_graph::Buffer;

    fn run(node: &mut Binaural, value: f32) -> (f32, f32) {
        let mut input = Buffer::SILENT;
        input.iter_mut().for_each(|s| *s = value);
        let mut out = vec![vec![Buffer::SILENT; 2]];
        let ctx = ProcessContext {
            sample_rate: 48_000,
            frames: BLOCK_FRAMES,
            global_time: 0,
            local_time: 0,
            listeners: &[],
        };
        node.process(&ctx, &[vec![input]], &mut out);
        (out[0][0][BLOCK_FRAMES - 1], out[0][1][BLOCK_FRAMES - 1])
    }

    #[test]
    fn source_on_the_left_favours_the_left_ear() {
        let hrtf = Arc::new(HrtfContext::synthetic(48_000).unwrap());
        let mut node = Binaural::new(hrtf, 1);
        node.direction = Vec3::NEG_X;
        // Second block: the filter has settled and no crossfade is running.
        run(&mut node, 1.0);
        let (l, r) = run(&mut node, 1.0);
        assert!(l > r, "left {l} right {r}");
    }

    #[test]
    fn near_sources_stay_dry() {
        let hrtf = Arc::new(HrtfContext::synthetic(48_000).unwrap());
        let mut node = Binaural::new(hrtf, 1);
        node.direction = Vec3::ZERO;
        node.blend_max_distance = 10.0;
        let (l, r) = run(&mut node, 0.5);
        assert_eq!((l, r), (0.5, 0.5));
    }
}
