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
//! The instrument: one sample buffer, the zones that map keys onto it and
//! the performer that plays them.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{self, AudioGraph, NodeId, SampleBuffer};
use crate::preset::Preset;

pub mod envelope;
mod error;
pub mod performer;
pub mod sequence;
pub mod voice;
pub mod zone;

pub use envelope::velocity_from_normalized;
pub use error::Error;
pub use performer::Performer;
pub use sequence::{Sequence, SequenceNote};
pub use voice::{Voice, VoiceContext, VoiceId, VoiceState};
pub use zone::Zone;

/// Velocity used when none is given.
pub const DEFAULT_VELOCITY: u8 = envelope::MAX_VELOCITY;

/// Amplitude that marks the first audible sample of a buffer.
const ONSET_THRESHOLD: f32 = 0.5;

/// How far into the buffer to look for the onset, in seconds.
const ONSET_WINDOW: f64 = 1.0;

/// Where the onset sits in the reference encoding: 27 frames at 22050 Hz.
const REFERENCE_ONSET: f64 = 27.0 / 22050.0;

/// Computes the correction applied to every zone offset of a buffer: the
/// position of the first sample louder than half scale within the first
/// second, less the reference onset. Zero if there is no such sample.
pub fn master_offset(buffer: &SampleBuffer) -> f64 {
    match buffer.first_frame_above(ONSET_THRESHOLD, ONSET_WINDOW) {
        Some(frame) => frame as f64 / buffer.sample_rate() as f64 - REFERENCE_ONSET,
        None => 0.0,
    }
}

/// A sample-based instrument playing into a shared audio graph.
pub struct Instrument<G: AudioGraph> {
    graph: Arc<Mutex<G>>,
    /// Where voices are connected. The graph destination if unset.
    output: Option<NodeId>,
    zones: Vec<Zone>,
    buffer: Option<SampleBuffer>,
    master_offset: f64,
    performer: Performer,
}

impl<G: AudioGraph> Instrument<G> {
    /// Creates an instrument with no zones and no buffer.
    pub fn new(graph: Arc<Mutex<G>>) -> Instrument<G> {
        Instrument {
            graph,
            output: None,
            zones: Vec::new(),
            buffer: None,
            master_offset: 0.0,
            performer: Performer::new(),
        }
    }

    /// Connects voices to `output` instead of the graph destination.
    pub fn with_output(mut self, output: NodeId) -> Instrument<G> {
        self.output = Some(output);
        self
    }

    pub fn graph(&self) -> &Arc<Mutex<G>> {
        &self.graph
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.buffer.as_ref()
    }

    pub fn master_offset(&self) -> f64 {
        self.master_offset
    }

    pub fn performer(&self) -> &Performer {
        &self.performer
    }

    /// The number of voices that have not been disposed.
    pub fn active_voice_count(&self) -> usize {
        self.performer.voice_count()
    }

    /// Replaces the zones after validating every one of them. On error the
    /// current zones are kept.
    pub fn set_zones(&mut self, zones: Vec<Zone>) -> Result<(), Error> {
        for zone in zones.iter() {
            zone.validate()?;
        }
        self.zones = zones;
        Ok(())
    }

    /// Uses the given buffer for every voice started from now on.
    pub fn load_buffer(&mut self, buffer: SampleBuffer) {
        self.master_offset = master_offset(&buffer);
        info!(
            duration = buffer.duration(),
            sample_rate = buffer.sample_rate(),
            channels = buffer.channel_count(),
            master_offset = self.master_offset,
            "Sample buffer loaded"
        );
        self.buffer = Some(buffer);
    }

    /// Decodes an audio file and loads it. If decoding fails the instrument
    /// is left without a buffer.
    pub fn load_audio_file(&mut self, path: &Path) -> Result<(), Error> {
        match audio::decode_file(path) {
            Ok(buffer) => {
                self.load_buffer(buffer);
                Ok(())
            }
            Err(e) => {
                self.buffer = None;
                self.master_offset = 0.0;
                Err(e.into())
            }
        }
    }

    /// Loads the zones of a preset file.
    pub fn load_preset(&mut self, path: &Path) -> Result<(), Error> {
        self.set_zones(Preset::load(path)?.into_zones())
    }

    /// The instrument's zones as a preset.
    pub fn preset(&self) -> Preset {
        Preset::new(self.zones.clone())
    }

    /// Saves the zones to a preset file.
    pub fn save_preset(&self, path: &Path) -> Result<(), Error> {
        Ok(self.preset().save(path)?)
    }

    /// Plays `key` until it is stopped. Returns the number of voices started.
    pub fn start(&mut self, key: u8, velocity: u8) -> Result<usize, Error> {
        self.start_note(key, velocity, 0.0, 0.0)
    }

    /// Plays `key` starting `time_offset` seconds from now. A positive
    /// `duration` releases the note after that long. Playing without a
    /// buffer or outside every zone starts nothing.
    pub fn start_note(
        &mut self,
        key: u8,
        velocity: u8,
        time_offset: f64,
        duration: f64,
    ) -> Result<usize, Error> {
        let mut graph = self.graph.lock();
        let context = VoiceContext {
            zones: &self.zones,
            buffer: self.buffer.as_ref(),
            master_offset: self.master_offset,
            output: self.output.unwrap_or_else(|| graph.destination()),
        };
        match self
            .performer
            .start(&mut *graph, &context, key, velocity, time_offset, duration)
        {
            Err(Error::BufferUnavailable) => {
                debug!(key, "No sample buffer loaded, ignoring note");
                Ok(0)
            }
            result => result,
        }
    }

    /// Schedules a sequence to start `when` seconds from now.
    pub fn start_sequence(&mut self, sequence: &Sequence, when: f64) -> Result<usize, Error> {
        let mut graph = self.graph.lock();
        let context = VoiceContext {
            zones: &self.zones,
            buffer: self.buffer.as_ref(),
            master_offset: self.master_offset,
            output: self.output.unwrap_or_else(|| graph.destination()),
        };
        match self
            .performer
            .start_sequence(&mut *graph, &context, sequence, when)
        {
            Err(Error::BufferUnavailable) => {
                debug!("No sample buffer loaded, ignoring sequence");
                Ok(0)
            }
            result => result,
        }
    }

    /// Releases the voices playing `key`, or all voices if no key is given.
    pub fn stop(&mut self, key: Option<u8>) -> usize {
        let mut graph = self.graph.lock();
        self.performer.stop(&mut *graph, key)
    }

    /// Frees voices that have finished. Call this periodically while the
    /// graph is rendering.
    pub fn update(&mut self) -> usize {
        let mut graph = self.graph.lock();
        self.performer.reap(&mut *graph)
    }

    /// Frees every voice immediately.
    pub fn shutdown(&mut self) {
        let mut graph = self.graph.lock();
        self.performer.shutdown(&mut *graph);
    }
}

impl<G: AudioGraph> Drop for Instrument<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<G: AudioGraph> std::fmt::Debug for Instrument<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("zones", &self.zones.len())
            .field("buffer", &self.buffer)
            .field("master_offset", &self.master_offset)
            .field("voices", &self.performer.voice_count())
            .finish()
    }
}
