use crate::node::{AudioNode, Bus, ProcessContext};

/// Node the device pulls from: sums its input and hands it on.
pub(crate) struct Endpoint {
    channels: u32,
}

impl Endpoint {
    pub fn new(channels: u32) -> Self {
        Self { channels }
    }
}

impl AudioNode for Endpoint {
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]) {
        for (out, input) in outputs[0].iter_mut().zip(inputs[0].iter()) {
            out[..ctx.frames].copy_from_slice(&input[..ctx.frames]);
        }
    }

    fn num_input_buses(&self) -> usize {
        1
    }

    fn input_channels(&self, _bus: usize) -> u32 {
        self.channels
    }

    fn output_channels(&self, _bus: usize) -> u32 {
        self.channels
    }
}
