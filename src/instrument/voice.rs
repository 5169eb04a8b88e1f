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

use tracing::debug;

use crate::audio::automation::AutomationEvent;
use crate::audio::{AudioGraph, GraphError, NodeId, SampleBuffer};

use super::envelope::{self, Envelope, DISPOSAL_MARGIN};
use super::error::Error;
use super::zone::Zone;

/// Identifies a voice within its performer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a voice is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    /// Attack, sustain and any decay.
    Playing,
    /// Stopped; the release is scheduled and disposal is pending.
    Releasing,
    /// The signal path has been freed.
    Disposed,
}

/// Everything a voice borrows from its instrument.
#[derive(Clone, Copy)]
pub struct VoiceContext<'a> {
    /// The instrument's zones.
    pub zones: &'a [Zone],
    /// The shared sample buffer, if one has been loaded.
    pub buffer: Option<&'a SampleBuffer>,
    /// Correction applied to every zone offset.
    pub master_offset: f64,
    /// The node voices are connected to.
    pub output: NodeId,
}

/// The graph nodes a voice plays through: a sample player, its filters and a
/// gain stage, connected in series.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalPath {
    player: NodeId,
    filters: Vec<NodeId>,
    gain: NodeId,
}

impl SignalPath {
    pub fn player(&self) -> NodeId {
        self.player
    }

    pub fn filters(&self) -> &[NodeId] {
        &self.filters
    }

    pub fn gain(&self) -> NodeId {
        self.gain
    }

    /// Connects the path into `output`, schedules the envelope and starts the
    /// player.
    fn wire(
        &self,
        graph: &mut dyn AudioGraph,
        output: NodeId,
        envelope: &Envelope,
        offset: f64,
    ) -> Result<(), GraphError> {
        let mut upstream = self.player;
        for node in self.filters.iter().chain(std::iter::once(&self.gain)) {
            graph.connect(upstream, *node)?;
            upstream = *node;
        }
        graph.connect(self.gain, output)?;

        for event in envelope.events() {
            schedule(graph, self.gain, *event)?;
        }
        graph.start(self.player, envelope.trigger_time(), offset, None)
    }

    fn dispose(self, graph: &mut dyn AudioGraph) {
        graph.dispose(self.player);
        for filter in self.filters {
            graph.dispose(filter);
        }
        graph.dispose(self.gain);
    }
}

/// Hands an automation event to the graph.
fn schedule(
    graph: &mut dyn AudioGraph,
    node: NodeId,
    event: AutomationEvent,
) -> Result<(), GraphError> {
    match event {
        AutomationEvent::SetValue { value, time } => graph.set_value_at_time(node, value, time),
        AutomationEvent::ExponentialRamp { value, end_time } => {
            graph.exponential_ramp_to_value_at_time(node, value, end_time)
        }
    }
}

/// One sounding instance of a zone.
pub struct Voice {
    id: VoiceId,
    key: u8,
    velocity: u8,
    pitch_ratio: f64,
    release: f64,
    /// Non-looping voices without a decay end when the player runs out.
    plays_to_end: bool,
    /// Audio-clock time the release begins, once one is scheduled.
    stop_time: Option<f64>,
    state: VoiceState,
    path: Option<SignalPath>,
    envelope: Envelope,
}

impl Voice {
    /// Builds the voice's signal path in the graph and starts it
    /// `time_offset` seconds from now.
    pub fn start(
        id: VoiceId,
        graph: &mut dyn AudioGraph,
        context: &VoiceContext,
        zone: &Zone,
        key: u8,
        velocity: u8,
        time_offset: f64,
    ) -> Result<Voice, Error> {
        let buffer = context.buffer.ok_or(Error::BufferUnavailable)?;
        let pitch_ratio = zone.pitch_ratio(key);
        let trigger_time = graph.current_time() + time_offset;
        let envelope = Envelope::new(
            envelope::start_gain(zone.gain(), velocity),
            trigger_time,
            trigger_time + zone.loop_exit(),
            zone.decay(),
        )?;

        let player = graph.create_sample_player(
            buffer.clone(),
            zone.loop_region(context.master_offset),
            pitch_ratio,
        )?;
        let filters = zone
            .filters()
            .iter()
            .map(|filter| graph.create_filter_stage(filter))
            .collect();
        let gain = graph.create_gain_stage();
        let path = SignalPath {
            player,
            filters,
            gain,
        };

        let offset = zone.source_offset(context.master_offset);
        if let Err(e) = path.wire(graph, context.output, &envelope, offset) {
            path.dispose(graph);
            return Err(e.into());
        }

        debug!(
            voice = %id,
            key,
            velocity,
            pitch_ratio,
            at = trigger_time,
            offset,
            "Voice started"
        );

        Ok(Voice {
            id,
            key,
            velocity,
            pitch_ratio,
            release: zone.release(),
            plays_to_end: !zone.loops() && zone.decay() <= 0.0,
            stop_time: None,
            state: VoiceState::Playing,
            path: Some(path),
            envelope,
        })
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    pub fn start_gain(&self) -> f64 {
        self.envelope.start_gain()
    }

    /// The audio-clock time the voice starts sounding.
    pub fn start_time(&self) -> f64 {
        self.envelope.trigger_time()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The voice's nodes, until it is disposed.
    pub fn signal_path(&self) -> Option<&SignalPath> {
        self.path.as_ref()
    }

    /// When the release begins, if one has been scheduled.
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    /// Returns true once a playing voice's scheduled release has begun.
    pub fn is_stopping(&self, now: f64) -> bool {
        self.state == VoiceState::Playing && self.stop_time.is_some_and(|stop| now >= stop)
    }

    /// Schedules the release `when` seconds from now. The voice keeps
    /// playing until the release begins; `stop` can still bring it forward.
    pub fn schedule_stop(&mut self, graph: &mut dyn AudioGraph, when: f64) -> Result<f64, Error> {
        if self.state != VoiceState::Playing {
            return Err(Error::DoubleStop(self.id));
        }
        let stop_time = graph.current_time() + when;
        self.release_at(graph, stop_time)?;
        Ok(stop_time)
    }

    /// Releases the voice `when` seconds from now and returns the
    /// audio-clock time after which it can be disposed. A release already
    /// scheduled earlier than that is kept. A voice can only be stopped once.
    pub fn stop(&mut self, graph: &mut dyn AudioGraph, when: f64) -> Result<f64, Error> {
        if self.state != VoiceState::Playing {
            return Err(Error::DoubleStop(self.id));
        }

        let requested = graph.current_time() + when;
        let stop_time = match self.stop_time {
            Some(scheduled) if scheduled <= requested => scheduled,
            _ => {
                self.release_at(graph, requested)?;
                requested
            }
        };
        self.state = VoiceState::Releasing;

        let deadline = stop_time + self.release + DISPOSAL_MARGIN;
        debug!(
            voice = %self.id,
            key = self.key,
            at = stop_time,
            deadline,
            "Voice released"
        );
        Ok(deadline)
    }

    /// Replaces everything automated from `stop_time` on with the release.
    fn release_at(&mut self, graph: &mut dyn AudioGraph, stop_time: f64) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Err(Error::DoubleStop(self.id));
        };
        let events = self.envelope.release(stop_time, self.release)?;
        graph.cancel_scheduled_values(path.gain, stop_time)?;
        for event in events {
            schedule(graph, path.gain, event)?;
        }
        self.stop_time = Some(stop_time);
        Ok(())
    }

    /// Returns true once a playing voice has gone silent on its own.
    pub fn has_ended(&self, graph: &dyn AudioGraph) -> bool {
        if self.state != VoiceState::Playing {
            return false;
        }
        if self
            .envelope
            .natural_end()
            .is_some_and(|end| graph.current_time() >= end)
        {
            return true;
        }
        self.plays_to_end
            && self
                .path
                .as_ref()
                .is_some_and(|path| graph.is_finished(path.player).unwrap_or(false))
    }

    /// Frees the signal path. Later calls do nothing.
    pub fn dispose(&mut self, graph: &mut dyn AudioGraph) {
        if let Some(path) = self.path.take() {
            path.dispose(graph);
            debug!(voice = %self.id, key = self.key, "Voice disposed");
        }
        self.state = VoiceState::Disposed;
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("velocity", &self.velocity)
            .field("state", &self.state)
            .field("start_time", &self.start_time())
            .field("stop_time", &self.stop_time)
            .finish()
    }
}
