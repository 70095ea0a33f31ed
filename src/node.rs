//! Core processor trait and context types.

use dasp_graph::Buffer;

use crate::listener::Listener;

/// Frames processed per graph block.
///
/// This is the length of a [`dasp_graph::Buffer`]. Longer reads are split
/// into blocks of this size.
pub const BLOCK_FRAMES: usize = Buffer::LEN;

/// One bus worth of audio: a block buffer per channel.
pub type Bus = Vec<Buffer>;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext<'a> {
    /// Sample rate of the graph in Hz.
    pub sample_rate: u32,
    /// Number of valid frames in this block (at most [`BLOCK_FRAMES`]).
    pub frames: usize,
    /// Engine time at the first frame of the block, in frames.
    pub global_time: u64,
    /// The node's own clock at the first frame of the block, in frames.
    pub local_time: u64,
    /// Listener snapshot for spatialization.
    pub listeners: &'a [Listener],
}

/// Unique identifier for a node within an engine's graph.
///
/// Identifiers are never reused, so a stale id can only miss, never alias.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Whether a node takes part in processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    #[default]
    Started,
    Stopped,
}

/// A processor that lives inside the graph.
///
/// The graph sums everything attached to an input bus before calling
/// [`process`](Self::process), and routes each output bus to at most one
/// destination afterwards. Implementations only see plain buffers.
pub trait AudioNode: Send + 'static {
    /// Process one block.
    ///
    /// `inputs` holds one [`Bus`] per input bus, `outputs` one per output
    /// bus. Only the first `ctx.frames` samples of each buffer are
    /// meaningful.
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]);

    /// Number of input buses (0 for sources).
    fn num_input_buses(&self) -> usize {
        0
    }

    /// Number of output buses.
    fn num_output_buses(&self) -> usize {
        1
    }

    /// Channel count of an input bus.
    fn input_channels(&self, _bus: usize) -> u32 {
        0
    }

    /// Channel count of an output bus.
    fn output_channels(&self, bus: usize) -> u32;

    /// A source that ran out of content reports it here; the graph then
    /// stops the node.
    fn is_finished(&self) -> bool {
        false
    }
}
