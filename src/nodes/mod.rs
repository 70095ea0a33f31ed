//! Built-in audio nodes.
//!
//! - `SoundNode` - the processor behind mixers and sounds
//! - `Endpoint` - the node the device pulls from
//! - [`BinauralNode`] - HRTF rendering for one direction
//! - [`SplitterNode`] - one input fanned out to several outputs

mod binaural;
pub(crate) mod endpoint;
pub(crate) mod fader;
mod hrtf;
pub(crate) mod sound_node;
mod splitter;

pub use binaural::BinauralNode;
pub use hrtf::HrtfContext;
pub use splitter::SplitterNode;
