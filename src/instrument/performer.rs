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
//! Voice allocation and teardown.
//!
//! The performer owns every voice of an instrument. Playing voices live in
//! the live set until they are stopped, their scheduled release begins, or
//! they end on their own. Released voices move to the releasing set with a
//! disposal task that comes due once their release has finished on the audio
//! clock. Nothing here waits on a timer:
//! `reap` compares deadlines against the graph's clock and is called on every
//! start and stop, and periodically by whoever drives the instrument.

use std::mem;

use tracing::{debug, warn};

use crate::audio::AudioGraph;
use crate::playsync::CancelHandle;

use super::error::Error;
use super::sequence::Sequence;
use super::voice::{Voice, VoiceContext, VoiceId};

/// A scheduled disposal of a released voice.
#[derive(Clone, Debug)]
pub struct DisposalTask {
    /// Audio-clock time after which the voice is freed.
    deadline: f64,
    cancel_handle: CancelHandle,
}

impl DisposalTask {
    fn new(deadline: f64) -> DisposalTask {
        DisposalTask {
            deadline,
            cancel_handle: CancelHandle::new(),
        }
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    /// The handle that cancels this task.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel_handle
    }

    fn is_due(&self, now: f64) -> bool {
        !self.cancel_handle.is_cancelled() && now >= self.deadline
    }
}

/// Allocates, tracks and disposes the voices of one instrument.
#[derive(Default)]
pub struct Performer {
    next_id: u64,
    live: Vec<Voice>,
    releasing: Vec<(Voice, DisposalTask)>,
}

impl Performer {
    pub fn new() -> Performer {
        Performer::default()
    }

    /// Voices that have not been stopped.
    pub fn live_voices(&self) -> impl Iterator<Item = &Voice> {
        self.live.iter()
    }

    /// Voices that have been stopped and are waiting to be disposed.
    pub fn releasing_voices(&self) -> impl Iterator<Item = &Voice> {
        self.releasing.iter().map(|(voice, _)| voice)
    }

    /// Every voice that has not been disposed.
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.live_voices().chain(self.releasing_voices())
    }

    pub fn disposal_tasks(&self) -> impl Iterator<Item = &DisposalTask> {
        self.releasing.iter().map(|(_, task)| task)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    pub fn voice_count(&self) -> usize {
        self.live.len() + self.releasing.len()
    }

    /// Starts one voice for every zone that matches `key`, `time_offset`
    /// seconds from now. A positive `duration` also schedules the stop.
    /// Returns the number of voices started.
    pub fn start(
        &mut self,
        graph: &mut dyn AudioGraph,
        context: &VoiceContext,
        key: u8,
        velocity: u8,
        time_offset: f64,
        duration: f64,
    ) -> Result<usize, Error> {
        self.reap(graph);

        let mut started = 0;
        for zone in context.zones.iter().filter(|zone| zone.matches(key)) {
            let id = self.next_voice_id();
            let mut voice = Voice::start(id, graph, context, zone, key, velocity, time_offset)?;
            started += 1;

            if duration > 0.0 {
                if let Err(e) = voice.schedule_stop(graph, time_offset + duration) {
                    voice.dispose(graph);
                    return Err(e);
                }
            }
            self.insert_live(voice);
        }

        if started == 0 {
            debug!(key, "No zone matches key");
        }
        Ok(started)
    }

    /// Schedules every note of the sequence, `when` seconds from now.
    pub fn start_sequence(
        &mut self,
        graph: &mut dyn AudioGraph,
        context: &VoiceContext,
        sequence: &Sequence,
        when: f64,
    ) -> Result<usize, Error> {
        let mut started = 0;
        for note in sequence.notes() {
            started += self.start(
                graph,
                context,
                note.key(),
                note.velocity(),
                note.offset() + when,
                note.duration(),
            )?;
        }
        debug!(notes = sequence.len(), voices = started, when, "Sequence scheduled");
        Ok(started)
    }

    /// Releases the live voices playing `key`, or every live voice if no key
    /// is given. Scheduled releases that have not begun are brought forward
    /// to now. Returns the number of voices released.
    pub fn stop(&mut self, graph: &mut dyn AudioGraph, key: Option<u8>) -> usize {
        self.reap(graph);

        let (matched, rest): (Vec<Voice>, Vec<Voice>) = mem::take(&mut self.live)
            .into_iter()
            .partition(|voice| key.is_none_or(|key| voice.key() == key));
        self.live = rest;

        let mut stopped = 0;
        for voice in matched {
            if self.release(graph, voice) {
                stopped += 1;
            }
        }
        stopped
    }

    /// Moves live voices whose scheduled release has begun to the releasing
    /// set, then disposes released voices whose disposal is due and live
    /// voices that have ended on their own. Returns the number of voices
    /// disposed.
    pub fn reap(&mut self, graph: &mut dyn AudioGraph) -> usize {
        let now = graph.current_time();

        let (stopping, live): (Vec<_>, Vec<_>) = mem::take(&mut self.live)
            .into_iter()
            .partition(|voice| voice.is_stopping(now));
        self.live = live;
        for voice in stopping {
            self.release(graph, voice);
        }

        let (due, pending): (Vec<_>, Vec<_>) = mem::take(&mut self.releasing)
            .into_iter()
            .partition(|(_, task)| task.is_due(now));
        self.releasing = pending;

        let (ended, live): (Vec<_>, Vec<_>) = mem::take(&mut self.live)
            .into_iter()
            .partition(|voice| voice.has_ended(&*graph));
        self.live = live;

        let reaped = due.len() + ended.len();
        for (mut voice, _) in due {
            voice.dispose(graph);
        }
        for mut voice in ended {
            voice.dispose(graph);
        }
        reaped
    }

    /// Cancels every pending disposal and frees every voice now.
    pub fn shutdown(&mut self, graph: &mut dyn AudioGraph) {
        let count = self.voice_count();
        for (mut voice, task) in self.releasing.drain(..) {
            task.cancel_handle.cancel();
            voice.dispose(graph);
        }
        for mut voice in self.live.drain(..) {
            voice.dispose(graph);
        }
        if count > 0 {
            debug!(voices = count, "Performer shut down");
        }
    }

    /// Stops a voice and queues its disposal. A voice that cannot be
    /// released is disposed now.
    fn release(&mut self, graph: &mut dyn AudioGraph, mut voice: Voice) -> bool {
        match voice.stop(graph, 0.0) {
            Ok(deadline) => {
                self.releasing.push((voice, DisposalTask::new(deadline)));
                true
            }
            Err(e) => {
                warn!(voice = %voice.id(), err = %e, "Unable to release voice");
                voice.dispose(graph);
                false
            }
        }
    }

    fn next_voice_id(&mut self) -> VoiceId {
        self.next_id += 1;
        VoiceId(self.next_id)
    }

    fn insert_live(&mut self, voice: Voice) {
        assert!(
            !self.live.iter().any(|live| live.id() == voice.id()),
            "voice {} is already live",
            voice.id()
        );
        self.live.push(voice);
    }
}

impl Drop for Performer {
    fn drop(&mut self) {
        for (_, task) in self.releasing.iter() {
            task.cancel_handle.cancel();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::{RenderGraph, SampleBuffer};
    use crate::instrument::voice::VoiceState;
    use crate::instrument::zone::Zone;
    use crate::testutil::{constant_buffer, TEST_SAMPLE_RATE};

    fn context<'a>(
        zones: &'a [Zone],
        buffer: Option<&'a SampleBuffer>,
        graph: &RenderGraph,
    ) -> VoiceContext<'a> {
        VoiceContext {
            zones,
            buffer,
            master_offset: 0.0,
            output: graph.destination(),
        }
    }

    #[test]
    fn test_one_voice_per_matching_zone() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 1.0);
        let zones = vec![
            Zone::new(60, 48, 72),
            Zone::new(60, 60, 80).with_pitched(false),
            Zone::new(30, 0, 40),
        ];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        for key in 0..=127u8 {
            let expected = zones.iter().filter(|zone| zone.matches(key)).count();
            let started = performer
                .start(&mut graph, &context, key, 100, 0.0, 0.0)
                .unwrap();
            assert_eq!(started, expected, "key {}", key);
            assert_eq!(performer.live_count(), expected, "key {}", key);
            assert!(performer.live_voices().all(|voice| voice.key() == key));
            performer.shutdown(&mut graph);
        }
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_start_without_buffer() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let zones = vec![Zone::new(60, 48, 72)];
        let context = context(&zones, None, &graph);
        let mut performer = Performer::new();

        assert!(matches!(
            performer.start(&mut graph, &context, 60, 100, 0.0, 0.0),
            Err(Error::BufferUnavailable)
        ));
        assert_eq!(
            performer
                .start(&mut graph, &context, 100, 100, 0.0, 0.0)
                .unwrap(),
            0
        );
        assert_eq!(performer.voice_count(), 0);
    }

    #[test]
    fn test_stop_disposes_after_release() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 48, 72).with_release(0.5)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        assert_eq!(performer.stop(&mut graph, Some(60)), 1);
        assert_eq!(performer.live_count(), 0);
        assert_eq!(performer.releasing_count(), 1);
        assert!(performer
            .releasing_voices()
            .all(|voice| voice.state() == VoiceState::Releasing));

        let deadline = performer.disposal_tasks().next().unwrap().deadline();
        assert!((deadline - 0.7).abs() < 1e-9);

        graph.render_seconds(0.65);
        assert_eq!(performer.reap(&mut graph), 0);
        assert_eq!(performer.releasing_count(), 1);
        assert_eq!(graph.node_count(), 2);

        graph.render_seconds(0.1);
        assert_eq!(performer.reap(&mut graph), 1);
        assert_eq!(performer.voice_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_stop_by_key_keeps_other_voices() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127).with_release(0.1)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        performer
            .start(&mut graph, &context, 64, 127, 0.0, 0.0)
            .unwrap();

        assert_eq!(performer.stop(&mut graph, Some(64)), 1);
        assert_eq!(performer.live_voices().map(Voice::key).collect::<Vec<_>>(), vec![60]);
        assert_eq!(performer.releasing_count(), 1);

        assert_eq!(performer.stop(&mut graph, Some(99)), 0);
        assert_eq!(performer.stop(&mut graph, None), 1);
        assert_eq!(performer.live_count(), 0);
        assert_eq!(performer.releasing_count(), 2);
    }

    #[test]
    fn test_duration_schedules_stop() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127).with_release(0.25)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.25, 0.5)
            .unwrap();
        assert_eq!(performer.live_count(), 1);
        assert_eq!(performer.releasing_count(), 0);

        let voice = performer.live_voices().next().unwrap();
        assert!((voice.start_time() - 0.25).abs() < 1e-12);
        assert!((voice.stop_time().unwrap() - 0.75).abs() < 1e-12);
        assert!((voice.envelope().release_start().unwrap() - 0.75).abs() < 1e-12);

        graph.render_seconds(0.8);
        assert_eq!(performer.reap(&mut graph), 0);
        assert_eq!(performer.live_count(), 0);
        assert_eq!(performer.releasing_count(), 1);
        let deadline = performer.disposal_tasks().next().unwrap().deadline();
        assert!((deadline - 1.2).abs() < 1e-9);

        // A released voice is not stopped again.
        assert_eq!(performer.stop(&mut graph, None), 0);

        graph.render_seconds(0.5);
        assert_eq!(performer.reap(&mut graph), 1);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_overlapping_sequence_notes_coexist() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 4.0);
        let zones = vec![Zone::new(60, 0, 127)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        let mut sequence = Sequence::new();
        sequence.add_note(60, 127, 0.0, 1.0);
        sequence.add_note(64, 127, 0.5, 1.0);
        assert_eq!(
            performer
                .start_sequence(&mut graph, &context, &sequence, 0.0)
                .unwrap(),
            2
        );

        graph.render_seconds(0.75);
        performer.reap(&mut graph);
        assert_eq!(performer.live_count(), 2);
        assert_eq!(
            performer.live_voices().map(Voice::key).collect::<Vec<_>>(),
            vec![60, 64]
        );

        graph.render_seconds(0.5);
        performer.reap(&mut graph);
        assert_eq!(performer.voice_count(), 1);
        assert_eq!(performer.live_voices().map(Voice::key).collect::<Vec<_>>(), vec![64]);

        graph.render_seconds(0.5);
        performer.reap(&mut graph);
        assert_eq!(performer.voice_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_stop_all_during_sequence_silences_it() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127)
            .with_pitched(false)
            .with_release(0.1)
            .with_loop(0.0, 1.0, 1.0)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        let mut sequence = Sequence::new();
        sequence.add_note(60, 127, 0.0, 1.0);
        sequence.add_note(64, 127, 0.5, 1.0);
        performer
            .start_sequence(&mut graph, &context, &sequence, 0.0)
            .unwrap();

        let output = graph.render_seconds(0.75);
        assert!((output[output.len() - 1] - 1.0).abs() < 1e-5);

        assert_eq!(performer.stop(&mut graph, None), 2);
        assert_eq!(performer.live_count(), 0);
        assert_eq!(performer.releasing_count(), 2);
        for task in performer.disposal_tasks() {
            assert!((task.deadline() - 1.05).abs() < 1e-9);
        }

        let output = graph.render_seconds(0.21);
        assert!(output[output.len() - 1].abs() < 1e-5);

        graph.render_seconds(0.2);
        assert_eq!(performer.reap(&mut graph), 2);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_sequence_offset_by_when() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        let mut sequence = Sequence::new();
        sequence.add_note(60, 127, 0.25, 0.0);
        performer
            .start_sequence(&mut graph, &context, &sequence, 1.0)
            .unwrap();

        let voice = performer.live_voices().next().unwrap();
        assert!((voice.start_time() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_reap_disposes_finished_voices() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127).with_decay(0.2)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        graph.render_seconds(0.1);
        assert_eq!(performer.reap(&mut graph), 0);

        graph.render_seconds(0.2);
        assert_eq!(performer.reap(&mut graph), 1);
        assert_eq!(performer.voice_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_shutdown_cancels_pending_disposals() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127).with_release(1.0)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        performer
            .start(&mut graph, &context, 62, 127, 0.0, 0.0)
            .unwrap();
        performer.stop(&mut graph, Some(60));
        let handle = performer
            .disposal_tasks()
            .next()
            .unwrap()
            .cancel_handle()
            .clone();

        performer.shutdown(&mut graph);
        assert!(handle.is_cancelled());
        assert_eq!(performer.voice_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_drop_cancels_pending_disposals() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127).with_release(1.0)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        performer.stop(&mut graph, None);
        let handle = performer
            .disposal_tasks()
            .next()
            .unwrap()
            .cancel_handle()
            .clone();

        drop(performer);
        assert!(handle.is_cancelled());
    }

    #[test]
    #[should_panic(expected = "already live")]
    fn test_duplicate_live_voice_panics() {
        let mut graph = RenderGraph::new(TEST_SAMPLE_RATE, 1);
        let buffer = constant_buffer(0.5, 2.0);
        let zones = vec![Zone::new(60, 0, 127)];
        let context = context(&zones, Some(&buffer), &graph);
        let mut performer = Performer::new();

        performer
            .start(&mut graph, &context, 60, 127, 0.0, 0.0)
            .unwrap();
        let id = performer.live_voices().next().unwrap().id();
        let duplicate = Voice::start(id, &mut graph, &context, &zones[0], 60, 127, 0.0).unwrap();
        performer.insert_live(duplicate);
    }
}
