//! Reference-counted node handles and the [`GraphNode`] capability.
//!
//! A [`NodeHandle`] is either empty or shares ownership of one node in an
//! engine's graph. Cloning shares the node; when the last clone goes away
//! the node is removed from the graph, exactly once. Handles only hold a
//! weak reference to the engine, so they never keep it alive.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::engine::EngineShared;
use crate::error::{ErrorCode, SoundError};
use crate::graph::AudioGraph;
use crate::node::{NodeId, NodeState};

pub(crate) struct NodeRef {
    id: NodeId,
    engine: Weak<EngineShared>,
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.graph().remove(self.id);
        }
    }
}

/// Shared handle to a node, or the empty node.
///
/// Every operation on an empty handle, or on one whose engine is gone, is a
/// no-op returning a default.
#[derive(Clone, Default)]
pub struct NodeHandle {
    inner: Option<Arc<NodeRef>>,
}

impl NodeHandle {
    pub(crate) fn new(id: NodeId, engine: Weak<EngineShared>) -> Self {
        Self {
            inner: Some(Arc::new(NodeRef { id, engine })),
        }
    }

    /// The empty node.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    pub fn id(&self) -> Option<NodeId> {
        self.inner.as_ref().map(|r| r.id)
    }

    /// Whether both handles share the same underlying node.
    pub fn ptr_eq(&self, other: &NodeHandle) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of handles sharing this node (0 when empty).
    pub fn ref_count(&self) -> usize {
        self.inner.as_ref().map_or(0, Arc::strong_count)
    }

    pub(crate) fn resolve(&self) -> Option<(Arc<EngineShared>, NodeId)> {
        let node = self.inner.as_ref()?;
        Some((node.engine.upgrade()?, node.id))
    }

    /// Run `f` against the live node under the graph lock.
    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&mut AudioGraph, NodeId) -> R) -> Option<R> {
        let (engine, id) = self.resolve()?;
        let mut graph = engine.graph();
        if !graph.contains(id) {
            return None;
        }
        Some(f(&mut graph, id))
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.is_empty() && other.is_empty())
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => f.debug_tuple("NodeHandle").field(&id).finish(),
            None => f.write_str("NodeHandle(empty)"),
        }
    }
}

/// Anything that owns a node in the graph.
///
/// Only [`node_handle`](Self::node_handle) is required; everything else is
/// provided on top of it. Implemented by [`NodeHandle`],
/// [`Mixer`](crate::Mixer), [`Sound`](crate::Sound) and the built-in nodes.
pub trait GraphNode {
    fn node_handle(&self) -> NodeHandle;

    fn get_input_bus_count(&self) -> usize {
        self.node_handle()
            .with_graph(|g, id| g.input_bus_count(id))
            .unwrap_or(0)
    }

    fn get_output_bus_count(&self) -> usize {
        self.node_handle()
            .with_graph(|g, id| g.output_bus_count(id))
            .unwrap_or(0)
    }

    fn get_input_channels(&self, bus: usize) -> u32 {
        self.node_handle()
            .with_graph(|g, id| g.input_channels(id, bus))
            .unwrap_or(0)
    }

    fn get_output_channels(&self, bus: usize) -> u32 {
        self.node_handle()
            .with_graph(|g, id| g.output_channels(id, bus))
            .unwrap_or(0)
    }

    /// Route `output_bus` into `input_bus` of `destination`, replacing
    /// whatever that output bus fed before.
    fn attach_output_bus(&self, output_bus: usize, destination: &dyn GraphNode, input_bus: usize) -> bool {
        let source = self.node_handle();
        let target = destination.node_handle();
        let (Some((engine, from)), Some((other, to))) = (source.resolve(), target.resolve()) else {
            return false;
        };
        if !Arc::ptr_eq(&engine, &other) {
            engine.core.last_error.set(ErrorCode::InvalidArgument);
            return false;
        }
        let result = engine.graph().attach(from, output_bus, to, input_bus);
        engine.core.last_error.record(result)
    }

    fn detach_output_bus(&self, bus: usize) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.detach(id, bus))
            .unwrap_or(false)
    }

    fn detach_all_output_buses(&self) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.detach_all(id))
            .unwrap_or(false)
    }

    fn set_output_bus_volume(&self, bus: usize, volume: f32) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.set_output_volume(id, bus, volume))
            .unwrap_or(false)
    }

    fn get_output_bus_volume(&self, bus: usize) -> f32 {
        self.node_handle()
            .with_graph(|g, id| g.output_volume(id, bus))
            .flatten()
            .unwrap_or(0.0)
    }

    fn set_state(&self, state: NodeState) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.set_state(id, state))
            .unwrap_or(false)
    }

    /// Current state; the empty node reports [`NodeState::Stopped`].
    fn get_state(&self) -> NodeState {
        self.node_handle()
            .with_graph(|g, id| g.state(id))
            .flatten()
            .unwrap_or(NodeState::Stopped)
    }

    /// Schedule the global time (in frames) at which `state` takes effect.
    fn set_state_time(&self, state: NodeState, time: u64) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.set_state_time(id, state, time))
            .unwrap_or(false)
    }

    fn get_state_time(&self, state: NodeState) -> u64 {
        self.node_handle()
            .with_graph(|g, id| g.state_time(id, state))
            .flatten()
            .unwrap_or(0)
    }

    fn get_state_by_time(&self, time: u64) -> NodeState {
        self.get_state_by_time_range(time, time)
    }

    fn get_state_by_time_range(&self, begin: u64, end: u64) -> NodeState {
        self.node_handle()
            .with_graph(|g, id| g.state_by_time_range(id, begin, end))
            .flatten()
            .unwrap_or(NodeState::Stopped)
    }

    /// Node-local clock in frames.
    fn get_node_time(&self) -> u64 {
        self.node_handle()
            .with_graph(|g, id| g.local_time(id))
            .flatten()
            .unwrap_or(0)
    }

    fn set_node_time(&self, time: u64) -> bool {
        self.node_handle()
            .with_graph(|g, id| g.set_local_time(id, time))
            .unwrap_or(false)
    }
}

impl GraphNode for NodeHandle {
    fn node_handle(&self) -> NodeHandle {
        self.clone()
    }
}

pub(crate) fn engine_unavailable<T>() -> Result<T, SoundError> {
    Err(SoundError::EngineUnavailable)
}
