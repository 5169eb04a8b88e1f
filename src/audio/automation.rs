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

//! Parameter automation on the audio clock.
//!
//! A timeline holds value changes and exponential ramps keyed by audio-clock
//! time and can be evaluated at any instant. Evaluation follows the Web Audio
//! `AudioParam` rules: a ramp interpolates from the previous event's value and
//! time to its own target, and a set-value holds until the next event.

use super::error::GraphError;

/// A single scheduled change to a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
    /// Jump to `value` at `time`.
    SetValue { value: f64, time: f64 },
    /// Ramp exponentially from the previous event to `value`, arriving at `end_time`.
    ExponentialRamp { value: f64, end_time: f64 },
}

impl AutomationEvent {
    /// The time at which this event's value is reached.
    pub fn time(&self) -> f64 {
        match self {
            AutomationEvent::SetValue { time, .. } => *time,
            AutomationEvent::ExponentialRamp { end_time, .. } => *end_time,
        }
    }

    /// The value reached by this event.
    pub fn value(&self) -> f64 {
        match self {
            AutomationEvent::SetValue { value, .. } => *value,
            AutomationEvent::ExponentialRamp { value, .. } => *value,
        }
    }
}

/// An ordered list of automation events for one parameter.
#[derive(Debug, Clone)]
pub struct AutomationTimeline {
    default_value: f64,
    events: Vec<AutomationEvent>,
}

impl AutomationTimeline {
    /// Creates an empty timeline that evaluates to `default_value`.
    pub fn new(default_value: f64) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    /// Builds a timeline from events, validating each one.
    pub fn from_events(
        default_value: f64,
        events: impl IntoIterator<Item = AutomationEvent>,
    ) -> Result<Self, GraphError> {
        let mut timeline = Self::new(default_value);
        for event in events {
            timeline.schedule(event)?;
        }
        Ok(timeline)
    }

    /// Schedules an event, keeping events ordered by time. Events at the same
    /// time keep their scheduling order.
    pub fn schedule(&mut self, event: AutomationEvent) -> Result<(), GraphError> {
        let (value, time) = (event.value(), event.time());
        let valid = match event {
            AutomationEvent::SetValue { .. } => value.is_finite() && time.is_finite(),
            // Exponential ramps are undefined towards or away from zero.
            AutomationEvent::ExponentialRamp { .. } => {
                value.is_finite() && value != 0.0 && time.is_finite()
            }
        };
        if !valid {
            return Err(GraphError::InvalidAutomation { value, time });
        }

        let index = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(index, event);
        Ok(())
    }

    /// Schedules a jump to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> Result<(), GraphError> {
        self.schedule(AutomationEvent::SetValue { value, time })
    }

    /// Schedules an exponential ramp arriving at `value` at `end_time`.
    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f64,
        end_time: f64,
    ) -> Result<(), GraphError> {
        self.schedule(AutomationEvent::ExponentialRamp { value, end_time })
    }

    /// Removes every event at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Returns the scheduled events in time order.
    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Evaluates the parameter at time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        let (mut prev_time, mut prev_value) = (0.0, self.default_value);

        for event in self.events.iter() {
            if event.time() <= t {
                prev_time = event.time();
                prev_value = event.value();
                continue;
            }

            return match *event {
                AutomationEvent::SetValue { .. } => prev_value,
                AutomationEvent::ExponentialRamp { value, end_time } => {
                    exponential_interpolate(prev_time, prev_value, end_time, value, t)
                }
            };
        }

        prev_value
    }
}

/// Interpolates exponentially between (t0, v0) and (t1, v1). A ramp that starts
/// at zero or crosses zero holds its starting value, as Web Audio does.
fn exponential_interpolate(t0: f64, v0: f64, t1: f64, v1: f64, t: f64) -> f64 {
    if v0 == 0.0 || v0.signum() != v1.signum() {
        return v0;
    }
    if t1 <= t0 {
        return v1;
    }
    let progress = ((t - t0) / (t1 - t0)).clamp(0.0, 1.0);
    v0 * (v1 / v0).powf(progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_timeline_uses_default() {
        let timeline = AutomationTimeline::new(0.75);
        assert_eq!(timeline.value_at(0.0), 0.75);
        assert_eq!(timeline.value_at(100.0), 0.75);
    }

    #[test]
    fn test_set_value_holds_until_next_event() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.set_value_at_time(0.5, 1.0).unwrap();
        timeline.set_value_at_time(0.25, 2.0).unwrap();

        assert_eq!(timeline.value_at(0.5), 1.0);
        assert_eq!(timeline.value_at(1.0), 0.5);
        assert_eq!(timeline.value_at(1.99), 0.5);
        assert_eq!(timeline.value_at(2.0), 0.25);
    }

    #[test]
    fn test_exponential_ramp() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.set_value_at_time(1.0, 1.0).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.01, 3.0).unwrap();

        assert!(close(timeline.value_at(1.0), 1.0));
        // Halfway through an exponential ramp is the geometric mean.
        assert!(close(timeline.value_at(2.0), 0.1));
        assert!(close(timeline.value_at(3.0), 0.01));
        assert!(close(timeline.value_at(10.0), 0.01));
    }

    #[test]
    fn test_ramp_from_zero_holds() {
        let mut timeline = AutomationTimeline::new(0.0);
        timeline.set_value_at_time(0.0, 0.0).unwrap();
        timeline.exponential_ramp_to_value_at_time(1.0, 1.0).unwrap();

        assert_eq!(timeline.value_at(0.5), 0.0);
        assert_eq!(timeline.value_at(1.0), 1.0);
    }

    #[test]
    fn test_ramp_to_zero_rejected() {
        let mut timeline = AutomationTimeline::new(1.0);
        assert_eq!(
            timeline.exponential_ramp_to_value_at_time(0.0, 1.0),
            Err(GraphError::InvalidAutomation {
                value: 0.0,
                time: 1.0
            })
        );
        assert!(timeline.set_value_at_time(f64::NAN, 1.0).is_err());
        assert!(timeline.events().is_empty());
    }

    #[test]
    fn test_events_sorted_by_time() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.set_value_at_time(0.2, 2.0).unwrap();
        timeline.set_value_at_time(0.1, 1.0).unwrap();
        timeline.set_value_at_time(0.3, 2.0).unwrap();

        let times: Vec<f64> = timeline.events().iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![1.0, 2.0, 2.0]);
        // Later-scheduled events at the same time win.
        assert_eq!(timeline.value_at(2.0), 0.3);
    }

    #[test]
    fn test_cancel_scheduled_values() {
        let mut timeline = AutomationTimeline::new(1.0);
        timeline.set_value_at_time(1.0, 0.0).unwrap();
        timeline.exponential_ramp_to_value_at_time(0.001, 2.0).unwrap();
        timeline.cancel_scheduled_values(1.0);

        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.value_at(1.5), 1.0);
    }
}
