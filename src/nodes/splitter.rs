//! Fan one signal out to several destinations.

use crate::engine::Engine;
use crate::error::{SoundError, SoundResult};
use crate::handle::{GraphNode, NodeHandle};
use crate::node::{AudioNode, Bus, ProcessContext};

/// Copies its single input bus to every output bus.
pub(crate) struct Splitter {
    channels: u32,
    outputs: usize,
}

impl AudioNode for Splitter {
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]) {
        for bus in outputs.iter_mut() {
            for (out, input) in bus.iter_mut().zip(inputs[0].iter()) {
                out[..ctx.frames].copy_from_slice(&input[..ctx.frames]);
            }
        }
    }

    fn num_input_buses(&self) -> usize {
        1
    }

    fn num_output_buses(&self) -> usize {
        self.outputs
    }

    fn input_channels(&self, _bus: usize) -> u32 {
        self.channels
    }

    fn output_channels(&self, _bus: usize) -> u32 {
        self.channels
    }
}

/// A node with one input and identical copies of it on each output bus.
///
/// The splitter is created unattached; wire its outputs with
/// [`GraphNode::attach_output_bus`].
#[derive(Clone, Debug, Default)]
pub struct SplitterNode {
    node: NodeHandle,
}

impl SplitterNode {
    /// A splitter with two output buses.
    pub fn new(engine: &Engine, channels: u32) -> SoundResult<Self> {
        Self::with_outputs(engine, channels, 2)
    }

    pub fn with_outputs(engine: &Engine, channels: u32, outputs: usize) -> SoundResult<Self> {
        if channels == 0 || outputs == 0 {
            return Err(SoundError::invalid_argument(
                "splitter needs at least one channel and one output",
            ));
        }
        let node = engine.add_node(Splitter { channels, outputs });
        Ok(Self { node })
    }
}

impl GraphNode for SplitterNode {
    fn node_handle(&self) -> NodeHandle {
        self.node.clone()
    }
}
