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
use std::fmt;

use super::buffer::SampleBuffer;
use super::error::GraphError;
use super::filter::Filter;

/// Identifies a node in an audio graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A loop region within a sample buffer, in seconds of buffer time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    /// Returns the length of the loop in seconds.
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// The audio rendering graph that voices are built from.
///
/// Every time handed to a graph is on its audio clock, which starts at zero
/// and advances as audio is rendered. All scheduling is done ahead of time;
/// the graph carries the scheduled work out as the clock passes it.
pub trait AudioGraph: Send {
    /// The current time of the audio clock in seconds.
    fn current_time(&self) -> f64;

    /// The output sample rate.
    fn sample_rate(&self) -> u32;

    /// The node that everything audible is ultimately connected to.
    fn destination(&self) -> NodeId;

    /// Creates a node that plays the buffer at `playback_rate`, optionally
    /// looping the given region once its playhead reaches the loop end.
    fn create_sample_player(
        &mut self,
        buffer: SampleBuffer,
        loop_region: Option<LoopRegion>,
        playback_rate: f64,
    ) -> Result<NodeId, GraphError>;

    /// Creates a gain stage. Its gain starts at 1.0 and is automatable.
    fn create_gain_stage(&mut self) -> NodeId;

    /// Creates a biquad filter stage.
    fn create_filter_stage(&mut self, filter: &Filter) -> NodeId;

    /// Connects the output of `from` to the input of `to`.
    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    /// Schedules the gain of a gain stage to jump to `value` at `time`.
    fn set_value_at_time(&mut self, node: NodeId, value: f64, time: f64)
        -> Result<(), GraphError>;

    /// Schedules an exponential ramp of a gain stage's gain, arriving at
    /// `value` at `end_time`.
    fn exponential_ramp_to_value_at_time(
        &mut self,
        node: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), GraphError>;

    /// Cancels every automation event of a gain stage at or after `time`.
    fn cancel_scheduled_values(&mut self, node: NodeId, time: f64) -> Result<(), GraphError>;

    /// Starts a sample player at `at_time`, reading from `offset` seconds into
    /// its buffer and stopping after `duration` seconds of buffer time, if given.
    fn start(
        &mut self,
        node: NodeId,
        at_time: f64,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<(), GraphError>;

    /// Returns true once a started sample player has played to its end.
    fn is_finished(&self, node: NodeId) -> Result<bool, GraphError>;

    /// Disconnects and frees a node. Disposing an unknown node is a no-op.
    fn dispose(&mut self, node: NodeId);
}
