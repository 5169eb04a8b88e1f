// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A sample-accurate audio graph that renders into plain buffers.
//!
//! The same graph is rendered offline (to a WAV file or in tests) and from the
//! real-time output callback. Its audio clock is the number of frames rendered
//! so far divided by the output sample rate.

use std::collections::BTreeMap;
use std::mem;

use tracing::debug;

use super::automation::AutomationTimeline;
use super::buffer::SampleBuffer;
use super::error::GraphError;
use super::filter::{Biquad, Filter};
use super::graph::{AudioGraph, LoopRegion, NodeId};

/// Frames rendered per block when rendering offline.
const DEFAULT_BLOCK_SIZE: usize = 128;

/// Tolerance when comparing the playhead against loop and end boundaries.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// When and how a sample player was asked to play.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerSchedule {
    /// Audio-clock time playback begins.
    pub at_time: f64,
    /// Position in the buffer, in seconds, playback begins from.
    pub offset: f64,
    /// Amount of buffer time to play before stopping.
    pub duration: Option<f64>,
}

/// A node that plays a sample buffer.
pub struct SamplePlayer {
    buffer: SampleBuffer,
    loop_region: Option<LoopRegion>,
    playback_rate: f64,
    schedule: Option<PlayerSchedule>,
    /// Output frames rendered since playback began.
    frames_played: u64,
    finished: bool,
}

impl SamplePlayer {
    fn new(buffer: SampleBuffer, loop_region: Option<LoopRegion>, playback_rate: f64) -> Self {
        Self {
            buffer,
            loop_region: loop_region.filter(|region| region.length() > 0.0),
            playback_rate,
            schedule: None,
            frames_played: 0,
            finished: false,
        }
    }

    /// Returns the buffer this player reads from.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Returns the loop region, if the player loops.
    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Returns the playback rate (pitch ratio).
    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// Returns the start schedule, if the player has been started.
    pub fn schedule(&self) -> Option<PlayerSchedule> {
        self.schedule
    }

    /// Returns true once playback has run to its end.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adds this player's output for the block starting at `start_frame`.
    /// The playhead is derived from the frame count rather than accumulated so
    /// that loop and end boundaries land on the expected frames.
    fn render(&mut self, output: &mut [Vec<f32>], start_frame: u64, sample_rate: u32) {
        let Some(schedule) = self.schedule else {
            return;
        };
        let buffer_channels = self.buffer.channel_count() as usize;
        if self.finished || buffer_channels == 0 {
            self.finished = true;
            return;
        }

        let frames = output.first().map(Vec::len).unwrap_or(0);
        let step = self.playback_rate / sample_rate as f64;
        let end = self.buffer.duration();

        for i in 0..frames {
            let time = (start_frame + i as u64) as f64 / sample_rate as f64;
            if time < schedule.at_time {
                continue;
            }

            let played = self.frames_played as f64 * step;
            if schedule
                .duration
                .is_some_and(|duration| played >= duration - BOUNDARY_EPSILON)
            {
                self.finished = true;
                return;
            }

            let mut position = schedule.offset + played;
            match self.loop_region {
                Some(region) if position >= region.end - BOUNDARY_EPSILON => {
                    let mut into_loop = (position - region.end).max(0.0) % region.length();
                    if into_loop >= region.length() - BOUNDARY_EPSILON {
                        into_loop = 0.0;
                    }
                    position = region.start + into_loop;
                }
                None if position >= end - BOUNDARY_EPSILON => {
                    self.finished = true;
                    return;
                }
                _ => {}
            }

            for (channel, out) in output.iter_mut().enumerate() {
                out[i] += self.buffer.sample_at(channel % buffer_channels, position);
            }
            self.frames_played += 1;
        }
    }
}

enum NodeKind {
    Destination,
    Player(Box<SamplePlayer>),
    Gain(AutomationTimeline),
    Filter(Biquad),
}

struct Node {
    kind: NodeKind,
    /// Nodes whose output feeds this node.
    inputs: Vec<NodeId>,
    /// Planar output of the current block, reused from block to block.
    output: Vec<Vec<f32>>,
    /// The render pass this node was last ordered in.
    pass: u64,
}

impl Node {
    fn new(kind: NodeKind, channels: u16) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            output: vec![Vec::with_capacity(DEFAULT_BLOCK_SIZE); channels as usize],
            pass: 0,
        }
    }
}

/// The in-process audio graph.
pub struct RenderGraph {
    sample_rate: u32,
    channels: u16,
    frames_rendered: u64,
    next_id: u64,
    destination: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    /// Counts render passes so each node is ordered once per pass.
    pass: u64,
    /// Nodes in the order they render: every input before its consumers.
    order: Vec<NodeId>,
    /// Work list used while ordering.
    pending: Vec<(NodeId, bool)>,
}

impl RenderGraph {
    /// Creates an empty graph rendering `channels` interleaved channels at `sample_rate`.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let destination = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(destination, Node::new(NodeKind::Destination, channels));
        Self {
            sample_rate,
            channels,
            frames_rendered: 0,
            next_id: 1,
            destination,
            nodes,
            pass: 0,
            order: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Returns the number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the number of nodes, not counting the destination.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns true if the node exists.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Returns the nodes feeding the given node.
    pub fn inputs(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|n| n.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the sample player with the given id.
    pub fn sample_player(&self, node: NodeId) -> Option<&SamplePlayer> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Player(player) => Some(player.as_ref()),
            _ => None,
        }
    }

    /// Returns the gain automation of the gain stage with the given id.
    pub fn gain_automation(&self, node: NodeId) -> Option<&AutomationTimeline> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Gain(timeline) => Some(timeline),
            _ => None,
        }
    }

    /// Renders `frames` frames and returns them interleaved.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * self.channels as usize];
        self.render_into(&mut output);
        output
    }

    /// Renders audio until the clock has advanced by `seconds`, returning the
    /// interleaved output.
    pub fn render_seconds(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * self.sample_rate as f64).round().max(0.0) as usize;
        self.render(frames)
    }

    /// Renders into an interleaved buffer whose length is a multiple of the
    /// channel count, overwriting its contents. Nothing is allocated once the
    /// node buffers have been sized, so this is safe to call from a
    /// real-time callback.
    pub fn render_into(&mut self, output: &mut [f32]) {
        let channels = self.channels as usize;
        self.order_nodes();

        for block in output.chunks_mut(DEFAULT_BLOCK_SIZE * channels) {
            let frames = block.len() / channels;
            for index in 0..self.order.len() {
                let id = self.order[index];
                self.render_node(id, frames);
            }

            let mixed = self.nodes.get(&self.destination).map(|node| &node.output);
            for (frame_idx, frame) in block.chunks_mut(channels).enumerate() {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = mixed
                        .and_then(|planar| planar.get(channel))
                        .and_then(|c| c.get(frame_idx))
                        .copied()
                        .unwrap_or(0.0);
                }
            }
            self.frames_rendered += frames as u64;
        }
    }

    /// Orders every node reachable from the destination so that each one
    /// comes after all of its inputs. Connections never form cycles, so a
    /// depth-first post-order visiting each node once is enough.
    fn order_nodes(&mut self) {
        self.pass += 1;
        let pass = self.pass;
        self.order.clear();
        self.pending.clear();
        self.pending.push((self.destination, false));

        while let Some((id, inputs_done)) = self.pending.pop() {
            if inputs_done {
                self.order.push(id);
                continue;
            }
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.pass == pass {
                continue;
            }
            node.pass = pass;
            self.pending.push((id, true));
            self.pending
                .extend(node.inputs.iter().map(|input| (*input, false)));
        }
    }

    /// Renders one node for the current block from its inputs' outputs,
    /// which have already been rendered.
    fn render_node(&mut self, id: NodeId, frames: usize) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let mut mixed = mem::take(&mut node.output);
        for channel in mixed.iter_mut() {
            channel.clear();
            channel.resize(frames, 0.0);
        }

        if let Some(node) = self.nodes.get(&id) {
            for input in node.inputs.iter() {
                let Some(source) = self.nodes.get(input) else {
                    continue;
                };
                for (out, input) in mixed.iter_mut().zip(source.output.iter()) {
                    for (o, i) in out.iter_mut().zip(input.iter()) {
                        *o += *i;
                    }
                }
            }
        }

        let start_frame = self.frames_rendered;
        let sample_rate = self.sample_rate;
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        match &mut node.kind {
            NodeKind::Destination => {}
            NodeKind::Player(player) => player.render(&mut mixed, start_frame, sample_rate),
            NodeKind::Gain(timeline) => {
                for i in 0..frames {
                    let time = (start_frame + i as u64) as f64 / sample_rate as f64;
                    let gain = timeline.value_at(time) as f32;
                    for channel in mixed.iter_mut() {
                        channel[i] *= gain;
                    }
                }
            }
            NodeKind::Filter(biquad) => {
                for (channel, samples) in mixed.iter_mut().enumerate() {
                    for sample in samples.iter_mut() {
                        *sample = biquad.process(channel, *sample);
                    }
                }
            }
        }
        node.output = mixed;
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind, self.channels));
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn gain_timeline_mut(&mut self, id: NodeId) -> Result<&mut AutomationTimeline, GraphError> {
        match &mut self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::UnknownNode(id))?
            .kind
        {
            NodeKind::Gain(timeline) => Ok(timeline),
            _ => Err(GraphError::NotAGainStage(id)),
        }
    }

    /// Returns true if `target` feeds, directly or indirectly, into `node`.
    fn is_upstream(&self, target: NodeId, node: NodeId) -> bool {
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            if current == target {
                return true;
            }
            if let Some(n) = self.nodes.get(&current) {
                pending.extend(n.inputs.iter().copied());
            }
        }
        false
    }
}

impl AudioGraph for RenderGraph {
    fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_sample_player(
        &mut self,
        buffer: SampleBuffer,
        loop_region: Option<LoopRegion>,
        playback_rate: f64,
    ) -> Result<NodeId, GraphError> {
        if !playback_rate.is_finite() || playback_rate <= 0.0 {
            return Err(GraphError::InvalidPlaybackRate(playback_rate));
        }
        let player = SamplePlayer::new(buffer, loop_region, playback_rate);
        Ok(self.add_node(NodeKind::Player(Box::new(player))))
    }

    fn create_gain_stage(&mut self) -> NodeId {
        self.add_node(NodeKind::Gain(AutomationTimeline::new(1.0)))
    }

    fn create_filter_stage(&mut self, filter: &Filter) -> NodeId {
        let biquad = Biquad::new(filter, self.sample_rate, self.channels as usize);
        self.add_node(NodeKind::Filter(biquad))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if let NodeKind::Destination = self.node(from)?.kind {
            return Err(GraphError::NoOutput(from));
        }
        self.node(to)?;
        if self.is_upstream(to, from) {
            return Err(GraphError::Cycle(from, to));
        }

        if let Some(node) = self.nodes.get_mut(&to) {
            if !node.inputs.contains(&from) {
                node.inputs.push(from);
            }
        }
        Ok(())
    }

    fn set_value_at_time(
        &mut self,
        node: NodeId,
        value: f64,
        time: f64,
    ) -> Result<(), GraphError> {
        self.gain_timeline_mut(node)?.set_value_at_time(value, time)
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        node: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), GraphError> {
        self.gain_timeline_mut(node)?
            .exponential_ramp_to_value_at_time(value, end_time)
    }

    fn cancel_scheduled_values(&mut self, node: NodeId, time: f64) -> Result<(), GraphError> {
        self.gain_timeline_mut(node)?.cancel_scheduled_values(time);
        Ok(())
    }

    fn start(
        &mut self,
        node: NodeId,
        at_time: f64,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<(), GraphError> {
        let player = match &mut self
            .nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .kind
        {
            NodeKind::Player(player) => player,
            _ => return Err(GraphError::NotAPlayer(node)),
        };
        if player.schedule.is_some() {
            return Err(GraphError::AlreadyStarted(node));
        }

        let offset = offset.max(0.0);
        player.schedule = Some(PlayerSchedule {
            at_time,
            offset,
            duration,
        });
        Ok(())
    }

    fn is_finished(&self, node: NodeId) -> Result<bool, GraphError> {
        match &self.node(node)?.kind {
            NodeKind::Player(player) => Ok(player.finished),
            _ => Err(GraphError::NotAPlayer(node)),
        }
    }

    fn dispose(&mut self, node: NodeId) {
        if node == self.destination || self.nodes.remove(&node).is_none() {
            return;
        }
        for other in self.nodes.values_mut() {
            other.inputs.retain(|input| *input != node);
        }
        debug!(node = %node, "Node disposed");
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("current_time", &self.current_time())
            .field("nodes", &self.node_count())
            .finish()
    }
}
