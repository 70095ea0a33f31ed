//! Audio graph - owns nodes, bus wiring and the block processor

use std::any::Any;

use dasp_graph::Buffer;
use hashbrown::HashMap;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{DfsPostOrder, EdgeRef, Reversed, Visitable};
use petgraph::Direction;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{SoundError, SoundResult};
use crate::listener::Listener;
use crate::node::{AudioNode, Bus, NodeId, NodeState, ProcessContext, BLOCK_FRAMES};

/// Capacity of the queue of finished one-shot nodes awaiting removal.
const FINISHED_QUEUE: usize = 256;

// Type-erased wrapper so we can store heterogeneous nodes and still get the
// concrete type back for parameter changes.
pub(crate) trait ErasedNode: AudioNode {
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<N: AudioNode> ErasedNode for N {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Edge weight: which output bus of the source feeds which input bus of
/// the destination.
#[derive(Clone, Copy, Debug)]
struct Connection {
    output_bus: usize,
    input_bus: usize,
}

/// Everything the graph keeps per node.
struct NodeSlot {
    id: NodeId,
    node: Box<dyn ErasedNode>,
    inputs: Vec<Bus>,
    outputs: Vec<Bus>,
    output_volumes: Vec<f32>,
    state: NodeState,
    /// Global times at which the node is considered started / stopped.
    state_times: [u64; 2],
    local_time: u64,
    /// Removed automatically once the processor reports it is finished.
    one_shot: bool,
    /// Finished one-shot that did not fit in the finished queue.
    reclaim_pending: bool,
}

impl NodeSlot {
    fn new(id: NodeId, node: Box<dyn ErasedNode>, one_shot: bool) -> Self {
        let inputs = (0..node.num_input_buses())
            .map(|bus| vec![Buffer::SILENT; node.input_channels(bus) as usize])
            .collect();
        let outputs: Vec<Bus> = (0..node.num_output_buses())
            .map(|bus| vec![Buffer::SILENT; node.output_channels(bus) as usize])
            .collect();
        let output_volumes = vec![1.0; outputs.len()];

        Self {
            id,
            node,
            inputs,
            outputs,
            output_volumes,
            state: NodeState::Started,
            state_times: [0, u64::MAX],
            local_time: 0,
            one_shot,
            reclaim_pending: false,
        }
    }

    fn state_by_time_range(&self, begin: u64, end: u64) -> NodeState {
        if self.state == NodeState::Stopped {
            return NodeState::Stopped;
        }
        if self.state_times[state_slot(NodeState::Started)] > begin {
            return NodeState::Stopped;
        }
        if self.state_times[state_slot(NodeState::Stopped)] <= end {
            return NodeState::Stopped;
        }
        NodeState::Started
    }
}

fn state_slot(state: NodeState) -> usize {
    match state {
        NodeState::Started => 0,
        NodeState::Stopped => 1,
    }
}

type InnerGraph = StableGraph<NodeSlot, Connection>;
type VisitMap = <InnerGraph as Visitable>::Map;

/// A pull-based processing graph at a fixed sample rate.
///
/// Nodes live in a stable arena and are addressed by [`NodeId`]; nothing
/// outside the graph holds a reference into it. Processing walks every node
/// upstream of the endpoint once per block, sources first.
pub(crate) struct AudioGraph {
    graph: InnerGraph,
    dfs: DfsPostOrder<NodeIndex, VisitMap>,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    endpoint: Option<NodeIndex>,
    sample_rate: u32,
    channels: usize,
    global_time: u64,

    finished_tx: Producer<NodeId>,
    finished_rx: Consumer<NodeId>,
    /// Finished one-shots flagged on their slot instead of queued.
    pending_reclaims: usize,
}

impl AudioGraph {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let graph = InnerGraph::with_capacity(64, 64);
        let dfs = DfsPostOrder::empty(&graph);
        let (finished_tx, finished_rx) = RingBuffer::new(FINISHED_QUEUE);

        Self {
            graph,
            dfs,
            node_indices: HashMap::new(),
            next_node_id: 0,
            endpoint: None,
            sample_rate,
            channels,
            global_time: 0,
            finished_tx,
            finished_rx,
            pending_reclaims: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_indices.contains_key(&id)
    }

    /// Add a node in the started state.
    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeId {
        self.insert(Box::new(node), false)
    }

    /// Add a node that is removed automatically once it finishes.
    pub fn add_one_shot<N: AudioNode>(&mut self, node: N) -> NodeId {
        self.insert(Box::new(node), true)
    }

    fn insert(&mut self, node: Box<dyn ErasedNode>, one_shot: bool) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let idx = self.graph.add_node(NodeSlot::new(id, node, one_shot));
        self.node_indices.insert(id, idx);
        tracing::debug!(node = id.0, one_shot, "node added");
        id
    }

    /// Mark the node the device pulls from.
    pub fn set_endpoint(&mut self, id: NodeId) {
        self.endpoint = self.node_indices.get(&id).copied();
    }

    /// Remove a node together with every connection touching it.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(idx) = self.node_indices.remove(&id) else {
            return false;
        };
        if self.endpoint == Some(idx) {
            self.endpoint = None;
        }
        if self.graph.remove_node(idx).is_some_and(|slot| slot.reclaim_pending) {
            self.pending_reclaims -= 1;
        }
        tracing::debug!(node = id.0, "node removed");
        true
    }

    /// Drop one-shot nodes the render thread reported as finished.
    pub fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        while let Ok(id) = self.finished_rx.pop() {
            if self.remove(id) {
                reaped += 1;
            }
        }
        if self.pending_reclaims > 0 {
            let overflow: Vec<NodeId> = self
                .graph
                .node_weights()
                .filter(|slot| slot.reclaim_pending)
                .map(|slot| slot.id)
                .collect();
            tracing::debug!(count = overflow.len(), "reaping one-shots past the finished queue");
            for id in overflow {
                if self.remove(id) {
                    reaped += 1;
                }
            }
        }
        reaped
    }

    fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        self.node_indices.get(&id).map(|&idx| &self.graph[idx])
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        let idx = *self.node_indices.get(&id)?;
        self.graph.node_weight_mut(idx)
    }

    /// Mutably borrow a node's processor as its concrete type.
    pub fn node_mut<T: AudioNode>(&mut self, id: NodeId) -> Option<&mut T> {
        self.slot_mut(id)?.node.as_any_mut().downcast_mut::<T>()
    }

    // ---- bus layout ----

    pub fn input_bus_count(&self, id: NodeId) -> usize {
        self.slot(id).map_or(0, |s| s.inputs.len())
    }

    pub fn output_bus_count(&self, id: NodeId) -> usize {
        self.slot(id).map_or(0, |s| s.outputs.len())
    }

    pub fn input_channels(&self, id: NodeId, bus: usize) -> u32 {
        self.slot(id)
            .and_then(|s| s.inputs.get(bus))
            .map_or(0, |b| b.len() as u32)
    }

    pub fn output_channels(&self, id: NodeId, bus: usize) -> u32 {
        self.slot(id)
            .and_then(|s| s.outputs.get(bus))
            .map_or(0, |b| b.len() as u32)
    }

    // ---- wiring ----

    /// Route `output_bus` of `from` into `input_bus` of `to`.
    ///
    /// An output bus feeds exactly one destination, so an existing
    /// attachment on that bus is replaced.
    pub fn attach(
        &mut self,
        from: NodeId,
        output_bus: usize,
        to: NodeId,
        input_bus: usize,
    ) -> SoundResult<()> {
        if from == to {
            return Err(SoundError::invalid_argument("a node cannot feed itself"));
        }
        let (Some(&src), Some(&dst)) = (self.node_indices.get(&from), self.node_indices.get(&to))
        else {
            return Err(SoundError::invalid_argument("node is not part of this graph"));
        };
        if output_bus >= self.graph[src].outputs.len() {
            return Err(SoundError::invalid_argument(format!(
                "output bus {output_bus} does not exist"
            )));
        }
        if input_bus >= self.graph[dst].inputs.len() {
            return Err(SoundError::invalid_argument(format!(
                "input bus {input_bus} does not exist"
            )));
        }
        if has_path_connecting(&self.graph, dst, src, None) {
            return Err(SoundError::invalid_argument(
                "attaching would create a feedback loop",
            ));
        }

        self.detach_index(src, output_bus);
        self.graph.add_edge(
            src,
            dst,
            Connection {
                output_bus,
                input_bus,
            },
        );
        Ok(())
    }

    /// Detach a single output bus. Returns false for an unknown node or bus.
    pub fn detach(&mut self, from: NodeId, output_bus: usize) -> bool {
        match self.node_indices.get(&from) {
            Some(&src) if output_bus < self.graph[src].outputs.len() => {
                self.detach_index(src, output_bus);
                true
            }
            _ => false,
        }
    }

    pub fn detach_all(&mut self, from: NodeId) -> bool {
        let Some(&src) = self.node_indices.get(&from) else {
            return false;
        };
        for bus in 0..self.graph[src].outputs.len() {
            self.detach_index(src, bus);
        }
        true
    }

    fn detach_index(&mut self, src: NodeIndex, output_bus: usize) {
        let stale: Vec<_> = self
            .graph
            .edges_directed(src, Direction::Outgoing)
            .filter(|e| e.weight().output_bus == output_bus)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }
    }

    /// Where `output_bus` of `from` currently goes.
    #[cfg(test)]
    pub fn destination(&self, from: NodeId, output_bus: usize) -> Option<(NodeId, usize)> {
        let &src = self.node_indices.get(&from)?;
        let edge = self
            .graph
            .edges_directed(src, Direction::Outgoing)
            .find(|e| e.weight().output_bus == output_bus)?;
        Some((self.graph[edge.target()].id, edge.weight().input_bus))
    }

    // ---- per-node state ----

    pub fn output_volume(&self, id: NodeId, bus: usize) -> Option<f32> {
        self.slot(id)?.output_volumes.get(bus).copied()
    }

    pub fn set_output_volume(&mut self, id: NodeId, bus: usize, volume: f32) -> bool {
        match self.slot_mut(id).and_then(|s| s.output_volumes.get_mut(bus)) {
            Some(v) => {
                *v = volume;
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.slot(id).map(|s| s.state)
    }

    pub fn set_state(&mut self, id: NodeId, state: NodeState) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.state = state;
                true
            }
            None => false,
        }
    }

    pub fn state_time(&self, id: NodeId, state: NodeState) -> Option<u64> {
        self.slot(id).map(|s| s.state_times[state_slot(state)])
    }

    pub fn set_state_time(&mut self, id: NodeId, state: NodeState, time: u64) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.state_times[state_slot(state)] = time;
                true
            }
            None => false,
        }
    }

    pub fn state_by_time_range(&self, id: NodeId, begin: u64, end: u64) -> Option<NodeState> {
        self.slot(id).map(|s| s.state_by_time_range(begin, end))
    }

    pub fn local_time(&self, id: NodeId) -> Option<u64> {
        self.slot(id).map(|s| s.local_time)
    }

    pub fn set_local_time(&mut self, id: NodeId, time: u64) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.local_time = time;
                true
            }
            None => false,
        }
    }

    // ---- clock ----

    pub fn global_time(&self) -> u64 {
        self.global_time
    }

    pub fn set_global_time(&mut self, time: u64) {
        self.global_time = time;
    }

    // ---- processing ----

    /// Render interleaved frames into `out`, advancing the global clock.
    ///
    /// `out.len()` must be a multiple of the channel count; the number of
    /// frames rendered is returned. Without an endpoint the output is
    /// silence but the clock still advances.
    pub fn render(&mut self, out: &mut [f32], listeners: &[Listener]) -> usize {
        let channels = self.channels.max(1);
        let frames = out.len() / channels;

        let mut done = 0;
        while done < frames {
            let block = (frames - done).min(BLOCK_FRAMES);
            let chunk = &mut out[done * channels..(done + block) * channels];

            match self.endpoint {
                Some(endpoint) => {
                    self.process_block(endpoint, block, listeners);
                    let slot = &self.graph[endpoint];
                    let volume = slot.output_volumes.first().copied().unwrap_or(1.0);
                    match slot.outputs.first() {
                        Some(bus) if !bus.is_empty() => {
                            for (i, frame) in chunk.chunks_exact_mut(channels).enumerate() {
                                for (ch, sample) in frame.iter_mut().enumerate() {
                                    let src = ch.min(bus.len() - 1);
                                    *sample = bus[src][i] * volume;
                                }
                            }
                        }
                        _ => chunk.fill(0.0),
                    }
                }
                None => chunk.fill(0.0),
            }

            self.global_time += block as u64;
            done += block;
        }
        frames
    }

    fn process_block(&mut self, endpoint: NodeIndex, frames: usize, listeners: &[Listener]) {
        self.dfs.reset(Reversed(&self.graph));
        self.dfs.move_to(endpoint);
        while let Some(idx) = self.dfs.next(Reversed(&self.graph)) {
            self.process_node(idx, frames, listeners);
        }
    }

    fn process_node(&mut self, idx: NodeIndex, frames: usize, listeners: &[Listener]) {
        let begin = self.global_time;
        let end = begin + frames as u64;

        // Sum everything attached to each input bus.
        let mut inputs = std::mem::take(&mut self.graph[idx].inputs);
        for bus in inputs.iter_mut() {
            for buffer in bus.iter_mut() {
                buffer.silence();
            }
        }
        for edge in self.graph.edges_directed(idx, Direction::Incoming) {
            let Connection {
                output_bus,
                input_bus,
            } = *edge.weight();
            let source = &self.graph[edge.source()];
            let (Some(src), Some(dst)) = (source.outputs.get(output_bus), inputs.get_mut(input_bus))
            else {
                continue;
            };
            if src.is_empty() {
                continue;
            }
            let volume = source.output_volumes[output_bus];
            for (ch, buffer) in dst.iter_mut().enumerate() {
                let from = &src[if src.len() == 1 { 0 } else { ch.min(src.len() - 1) }];
                for (d, s) in buffer.iter_mut().zip(from.iter()).take(frames) {
                    *d += s * volume;
                }
            }
        }

        let slot = &mut self.graph[idx];
        slot.inputs = inputs;

        for bus in slot.outputs.iter_mut() {
            for buffer in bus.iter_mut() {
                buffer.silence();
            }
        }

        if slot.state == NodeState::Stopped {
            return;
        }

        // Frames of this block inside the scheduled [start, stop) window.
        let [start, stop] = slot.state_times;
        let from = start.saturating_sub(begin).min(frames as u64) as usize;
        let to = stop.saturating_sub(begin).min(frames as u64) as usize;

        if from < to {
            let active = to - from;
            if from > 0 {
                for buffer in slot.inputs.iter_mut().flatten() {
                    buffer.copy_within(from..to, 0);
                }
            }

            let ctx = ProcessContext {
                sample_rate: self.sample_rate,
                frames: active,
                global_time: begin + from as u64,
                local_time: slot.local_time,
                listeners,
            };
            slot.node.process(&ctx, &slot.inputs, &mut slot.outputs);
            slot.local_time += active as u64;

            for buffer in slot.outputs.iter_mut().flatten() {
                if from > 0 {
                    buffer.copy_within(0..active, from);
                    buffer[..from].fill(0.0);
                }
                buffer[to..].fill(0.0);
            }
        }

        // A scheduled stop that has been reached becomes a real stop,
        // so a later start does not trip over the stale time.
        if stop <= end {
            slot.state = NodeState::Stopped;
            slot.state_times = [0, u64::MAX];
        }

        if from < to && slot.node.is_finished() {
            slot.state = NodeState::Stopped;
            if slot.one_shot && self.finished_tx.push(slot.id).is_err() {
                slot.reclaim_pending = true;
                self.pending_reclaims += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constant-value source.
    struct Dc(f32, u32);

    impl AudioNode for Dc {
        fn process(&mut self, ctx: &ProcessContext, _inputs: &[Bus], outputs: &mut [Bus]) {
            for buffer in outputs[0].iter_mut() {
                buffer[..ctx.frames].fill(self.0);
            }
        }

        fn output_channels(&self, _bus: usize) -> u32 {
            self.1
        }
    }

    /// Sums its single input into its single output.
    struct Pass(u32);

    impl AudioNode for Pass {
        fn process(&mut self, _ctx: &ProcessContext, inputs: &[Bus], outputs: &mut [Bus]) {
            for (o, i) in outputs[0].iter_mut().zip(inputs[0].iter()) {
                o.copy_from_slice(i);
            }
        }

        fn num_input_buses(&self) -> usize {
            1
        }

        fn input_channels(&self, _bus: usize) -> u32 {
            self.0
        }

        fn output_channels(&self, _bus: usize) -> u32 {
            self.0
        }
    }

    /// Finishes after the given number of blocks.
    struct Burst(u32);

    impl AudioNode for Burst {
        fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Bus], outputs: &mut [Bus]) {
            for buffer in outputs[0].iter_mut() {
                buffer.iter_mut().for_each(|s| *s = 1.0);
            }
            self.0 = self.0.saturating_sub(1);
        }

        fn output_channels(&self, _bus: usize) -> u32 {
            1
        }

        fn is_finished(&self) -> bool {
            self.0 == 0
        }
    }

    fn graph_with_endpoint() -> (AudioGraph, NodeId) {
        let mut graph = AudioGraph::new(48_000, 2);
        let endpoint = graph.add(Pass(2));
        graph.set_endpoint(endpoint);
        (graph, endpoint)
    }

    #[test]
    fn mono_source_is_spread_to_every_channel() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(0.5, 1));
        graph.attach(dc, 0, endpoint, 0).unwrap();

        let mut out = vec![0.0; 8];
        assert_eq!(graph.render(&mut out, &[]), 4);
        assert!(out.iter().all(|&s| s == 0.5));
        assert_eq!(graph.global_time(), 4);
    }

    #[test]
    fn inputs_are_summed_and_scaled_by_bus_volume() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let a = graph.add(Dc(0.25, 2));
        let b = graph.add(Dc(0.5, 2));
        graph.attach(a, 0, endpoint, 0).unwrap();
        graph.attach(b, 0, endpoint, 0).unwrap();
        graph.set_output_volume(b, 0, 0.5);

        let mut out = vec![0.0; 4];
        graph.render(&mut out, &[]);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn reattaching_replaces_the_edge() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let mid = graph.add(Pass(2));
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.attach(dc, 0, mid, 0).unwrap();
        assert_eq!(graph.destination(dc, 0), Some((mid, 0)));

        // `mid` is not routed anywhere, so the endpoint hears nothing.
        let mut out = vec![1.0; 4];
        graph.render(&mut out, &[]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn attach_rejects_bad_buses_and_self_loops() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 1));
        assert!(graph.attach(dc, 1, endpoint, 0).is_err());
        assert!(graph.attach(dc, 0, endpoint, 3).is_err());
        assert!(graph.attach(endpoint, 0, endpoint, 0).is_err());
        assert!(graph.attach(dc, 0, dc, 0).is_err());
    }

    #[test]
    fn stopped_nodes_are_silent_and_keep_their_clock() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.set_state(dc, NodeState::Stopped);

        let mut out = vec![1.0; 16];
        graph.render(&mut out, &[]);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(graph.local_time(dc), Some(0));
        assert_eq!(graph.local_time(endpoint), Some(8));
    }

    #[test]
    fn start_time_delays_processing() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.set_state_time(dc, NodeState::Started, BLOCK_FRAMES as u64);

        let mut out = vec![0.0; BLOCK_FRAMES * 2 * 2];
        graph.render(&mut out, &[]);
        let (first, second) = out.split_at(BLOCK_FRAMES * 2);
        assert!(first.iter().all(|&s| s == 0.0));
        assert!(second.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn reached_stop_time_becomes_stopped() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.set_state_time(dc, NodeState::Stopped, 10);

        let mut out = vec![0.0; BLOCK_FRAMES * 2];
        graph.render(&mut out, &[]);
        assert_eq!(graph.state(dc), Some(NodeState::Stopped));
        assert_eq!(graph.state_time(dc, NodeState::Stopped), Some(u64::MAX));
    }

    #[test]
    fn schedule_is_sample_accurate_inside_a_block() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 1));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.set_state_time(dc, NodeState::Started, 10);
        graph.set_state_time(dc, NodeState::Stopped, 50);

        let mut out = vec![0.0; BLOCK_FRAMES * 2];
        graph.render(&mut out, &[]);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert!(left[..10].iter().all(|&s| s == 0.0));
        assert!(left[10..50].iter().all(|&s| s == 1.0));
        assert!(left[50..].iter().all(|&s| s == 0.0));
        assert_eq!(graph.local_time(dc), Some(40));
        assert_eq!(graph.state(dc), Some(NodeState::Stopped));
    }

    #[test]
    fn stop_on_a_block_boundary_plays_the_whole_block() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        graph.set_state_time(dc, NodeState::Stopped, BLOCK_FRAMES as u64);

        let mut out = vec![0.0; BLOCK_FRAMES * 2 * 2];
        graph.render(&mut out, &[]);
        let (first, second) = out.split_at(BLOCK_FRAMES * 2);
        assert!(first.iter().all(|&s| s == 1.0));
        assert!(second.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn attach_rejects_feedback_loops() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let a = graph.add(Pass(2));
        let b = graph.add(Pass(2));
        graph.attach(a, 0, b, 0).unwrap();
        graph.attach(b, 0, endpoint, 0).unwrap();
        assert!(graph.attach(b, 0, a, 0).is_err());
        assert!(graph.attach(endpoint, 0, a, 0).is_err());
        assert_eq!(graph.destination(b, 0), Some((endpoint, 0)));
    }

    #[test]
    fn one_shots_beyond_the_queue_are_still_reaped() {
        let (mut graph, endpoint) = graph_with_endpoint();
        for _ in 0..FINISHED_QUEUE + 44 {
            let burst = graph.add_one_shot(Burst(1));
            graph.attach(burst, 0, endpoint, 0).unwrap();
        }

        let mut out = vec![0.0; BLOCK_FRAMES * 2];
        graph.render(&mut out, &[]);
        assert_eq!(graph.reap_finished(), FINISHED_QUEUE + 44);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn state_by_time_range_follows_schedule() {
        let (mut graph, _) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 1));
        graph.set_state_time(dc, NodeState::Started, 100);
        graph.set_state_time(dc, NodeState::Stopped, 200);

        assert_eq!(graph.state_by_time_range(dc, 50, 60), Some(NodeState::Stopped));
        assert_eq!(graph.state_by_time_range(dc, 100, 150), Some(NodeState::Started));
        assert_eq!(graph.state_by_time_range(dc, 150, 250), Some(NodeState::Stopped));
    }

    #[test]
    fn finished_one_shots_are_reaped() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let burst = graph.add_one_shot(Burst(2));
        graph.attach(burst, 0, endpoint, 0).unwrap();
        assert_eq!(graph.len(), 2);

        let mut out = vec![0.0; BLOCK_FRAMES * 2 * 3];
        graph.render(&mut out, &[]);
        assert_eq!(graph.state(burst), Some(NodeState::Stopped));
        assert_eq!(graph.reap_finished(), 1);
        assert!(!graph.contains(burst));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let (mut graph, endpoint) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 2));
        graph.attach(dc, 0, endpoint, 0).unwrap();
        assert!(graph.remove(dc));
        assert!(!graph.remove(dc));

        let mut out = vec![1.0; 4];
        graph.render(&mut out, &[]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn downcast_to_concrete_node() {
        let (mut graph, _) = graph_with_endpoint();
        let dc = graph.add(Dc(1.0, 1));
        graph.node_mut::<Dc>(dc).unwrap().0 = 0.25;
        assert_eq!(graph.node_mut::<Dc>(dc).map(|n| n.0), Some(0.25));
        assert!(graph.node_mut::<Pass>(dc).is_none());
    }
}
