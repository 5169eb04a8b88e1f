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
//! Gain envelopes for voices.
//!
//! An envelope holds the start gain from the trigger until the loop exit, then
//! optionally decays exponentially to the silence floor. Stopping the voice
//! fades from wherever the curve is to the floor over the release time. The
//! envelope mirrors every event it hands to the audio graph so the curve can
//! be evaluated without touching the graph.

use crate::audio::automation::{AutomationEvent, AutomationTimeline};
use crate::audio::GraphError;

/// The quietest gain an envelope ramps to. Exponential ramps cannot reach zero.
pub const SILENCE_FLOOR: f64 = 1e-6;

/// Extra time after a release ends before a voice's nodes are freed.
pub const DISPOSAL_MARGIN: f64 = 0.2;

/// The highest velocity.
pub const MAX_VELOCITY: u8 = 127;

/// The gain a voice starts at for the given zone gain and velocity.
pub fn start_gain(gain: f64, velocity: u8) -> f64 {
    gain * velocity.min(MAX_VELOCITY) as f64 / MAX_VELOCITY as f64
}

/// Converts a velocity in 0.0..=1.0 to the 0..=127 scale.
pub fn velocity_from_normalized(velocity: f64) -> u8 {
    if !velocity.is_finite() {
        return 0;
    }
    (velocity.clamp(0.0, 1.0) * MAX_VELOCITY as f64).round() as u8
}

/// The gain curve of a single voice.
#[derive(Debug, Clone)]
pub struct Envelope {
    start_gain: f64,
    trigger_time: f64,
    decay_start: f64,
    decay: f64,
    release_start: Option<f64>,
    timeline: AutomationTimeline,
}

impl Envelope {
    /// Builds the attack and decay of an envelope triggered at `trigger_time`
    /// whose sustain ends at `decay_start`.
    pub fn new(
        start_gain: f64,
        trigger_time: f64,
        decay_start: f64,
        decay: f64,
    ) -> Result<Envelope, GraphError> {
        let level = start_gain.max(SILENCE_FLOOR);
        let mut events = vec![AutomationEvent::SetValue {
            value: level,
            time: trigger_time,
        }];
        if decay > 0.0 {
            events.push(AutomationEvent::SetValue {
                value: level,
                time: decay_start,
            });
            events.push(AutomationEvent::ExponentialRamp {
                value: SILENCE_FLOOR,
                end_time: decay_start + decay,
            });
        }

        Ok(Envelope {
            start_gain,
            trigger_time,
            decay_start,
            decay,
            release_start: None,
            timeline: AutomationTimeline::from_events(1.0, events)?,
        })
    }

    /// The unclamped start gain.
    pub fn start_gain(&self) -> f64 {
        self.start_gain
    }

    pub fn trigger_time(&self) -> f64 {
        self.trigger_time
    }

    pub fn decay_start(&self) -> f64 {
        self.decay_start
    }

    /// When the release begins, once the envelope has been released.
    pub fn release_start(&self) -> Option<f64> {
        self.release_start
    }

    /// When the decay reaches the floor, if the envelope decays.
    pub fn natural_end(&self) -> Option<f64> {
        (self.decay > 0.0).then_some(self.decay_start + self.decay)
    }

    /// The scheduled events, in time order.
    pub fn events(&self) -> &[AutomationEvent] {
        self.timeline.events()
    }

    /// The gain at time `t`.
    pub fn gain_at(&self, t: f64) -> f64 {
        self.timeline.value_at(t)
    }

    /// Releases the envelope at `stop_time`, fading to the floor over
    /// `release` seconds. Everything scheduled at or after `stop_time` is
    /// dropped. Returns the events that replace them; the caller cancels the
    /// same range on the graph before scheduling these.
    pub fn release(
        &mut self,
        stop_time: f64,
        release: f64,
    ) -> Result<Vec<AutomationEvent>, GraphError> {
        let held = if stop_time < self.trigger_time {
            SILENCE_FLOOR
        } else {
            self.timeline.value_at(stop_time).max(SILENCE_FLOOR)
        };

        // A ramp in progress is cut short at its current value so the curve
        // up to the stop is unchanged.
        let interrupts_ramp = self
            .timeline
            .events()
            .iter()
            .find(|event| event.time() >= stop_time)
            .is_some_and(|event| matches!(event, AutomationEvent::ExponentialRamp { .. }));
        let hold = if interrupts_ramp {
            AutomationEvent::ExponentialRamp {
                value: held,
                end_time: stop_time,
            }
        } else {
            AutomationEvent::SetValue {
                value: held,
                time: stop_time,
            }
        };

        let fade = if release > 0.0 {
            AutomationEvent::ExponentialRamp {
                value: SILENCE_FLOOR,
                end_time: stop_time + release,
            }
        } else {
            AutomationEvent::SetValue {
                value: SILENCE_FLOOR,
                time: stop_time,
            }
        };

        self.timeline.cancel_scheduled_values(stop_time);
        let events = vec![hold, fade];
        for event in events.iter() {
            self.timeline.schedule(*event)?;
        }
        self.release_start = Some(stop_time);
        Ok(events)
    }
}
