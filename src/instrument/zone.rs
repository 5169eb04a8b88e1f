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
use crate::audio::{Filter, LoopRegion};

use super::error::Error;

/// The reference pitch: A4 is key 69 at 440 Hz.
const REFERENCE_KEY: f64 = 69.0;
const REFERENCE_FREQUENCY: f64 = 440.0;

/// Returns the equal-tempered frequency of a key.
pub fn frequency(key: u8) -> f64 {
    REFERENCE_FREQUENCY * 2f64.powf((key as f64 - REFERENCE_KEY) / 12.0)
}

/// A mapping from a range of keys to a region of the instrument's sample
/// buffer, with the pitch, gain, loop and envelope settings used to play it.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    /// The key the sample was recorded at.
    key: u8,
    /// The first key this zone plays for.
    key_range_start: u8,
    /// The last key this zone plays for.
    key_range_end: u8,
    /// Unpitched zones play at the recorded pitch for every key.
    pitched: bool,
    /// Seconds into the buffer where this zone's sample begins.
    offset: f64,
    /// Linear gain.
    gain: f64,
    /// Seconds to decay to silence after the loop exit. Zero disables decay.
    decay: f64,
    /// Seconds to fade out after the note is stopped.
    release: f64,
    loops: bool,
    /// Seconds after the zone's sample start where the loop begins.
    loop_start: f64,
    /// Loop length in frames at `loop_rate`.
    loop_duration: f64,
    /// Rate the loop duration is expressed in.
    loop_rate: f64,
    /// Filters inserted between the sample player and the gain stage.
    filters: Vec<Filter>,
}

impl Zone {
    /// Creates a pitched, non-looping zone at unity gain.
    pub fn new(key: u8, key_range_start: u8, key_range_end: u8) -> Zone {
        Zone {
            key,
            key_range_start,
            key_range_end,
            pitched: true,
            offset: 0.0,
            gain: 1.0,
            decay: 0.0,
            release: 0.0,
            loops: false,
            loop_start: 0.0,
            loop_duration: 0.0,
            loop_rate: 0.0,
            filters: Vec::new(),
        }
    }

    pub fn with_pitched(mut self, pitched: bool) -> Zone {
        self.pitched = pitched;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Zone {
        self.offset = offset;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Zone {
        self.gain = gain;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Zone {
        self.decay = decay;
        self
    }

    pub fn with_release(mut self, release: f64) -> Zone {
        self.release = release;
        self
    }

    /// Sets the loop. `loop_duration` is measured in frames at `loop_rate`.
    pub fn with_loop(mut self, loop_start: f64, loop_duration: f64, loop_rate: f64) -> Zone {
        self.loops = true;
        self.loop_start = loop_start;
        self.loop_duration = loop_duration;
        self.loop_rate = loop_rate;
        self
    }

    /// Sets the loop fields without enabling looping.
    pub fn with_loop_points(mut self, loop_start: f64, loop_duration: f64, loop_rate: f64) -> Zone {
        self.loop_start = loop_start;
        self.loop_duration = loop_duration;
        self.loop_rate = loop_rate;
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Zone {
        self.filters = filters;
        self
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn key_range_start(&self) -> u8 {
        self.key_range_start
    }

    pub fn key_range_end(&self) -> u8 {
        self.key_range_end
    }

    pub fn pitched(&self) -> bool {
        self.pitched
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn release(&self) -> f64 {
        self.release
    }

    pub fn loops(&self) -> bool {
        self.loops
    }

    pub fn loop_start(&self) -> f64 {
        self.loop_start
    }

    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    pub fn loop_rate(&self) -> f64 {
        self.loop_rate
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns true if the zone plays for the given key.
    pub fn matches(&self, key: u8) -> bool {
        (self.key_range_start..=self.key_range_end).contains(&key)
    }

    /// The playback rate for the given key relative to the recorded key.
    pub fn pitch_ratio(&self, key: u8) -> f64 {
        if !self.pitched {
            return 1.0;
        }
        frequency(key) / frequency(self.key)
    }

    /// Length of the loop in seconds of buffer time.
    pub fn loop_length(&self) -> f64 {
        if self.loop_rate > 0.0 {
            self.loop_duration / self.loop_rate
        } else {
            0.0
        }
    }

    /// Seconds after the trigger at which the sustain ends and any decay
    /// begins.
    pub fn loop_exit(&self) -> f64 {
        if self.loops {
            self.loop_start + self.loop_length()
        } else {
            self.loop_start
        }
    }

    /// Where playback starts in the buffer once the master offset is applied.
    pub fn source_offset(&self, master_offset: f64) -> f64 {
        (self.offset + master_offset).max(0.0)
    }

    /// The buffer region to loop, if the zone loops.
    pub fn loop_region(&self, master_offset: f64) -> Option<LoopRegion> {
        if !self.loops {
            return None;
        }
        let start = self.offset + master_offset + self.loop_start;
        Some(LoopRegion {
            start,
            end: start + self.loop_length(),
        })
    }

    /// Checks the zone's invariants.
    pub fn validate(&self) -> Result<(), Error> {
        if self.key_range_start > self.key_range_end {
            return Err(Error::InvalidZoneRange {
                start: self.key_range_start,
                end: self.key_range_end,
            });
        }

        let parameters = [
            ("offset", self.offset),
            ("gain", self.gain),
            ("decay", self.decay),
            ("release", self.release),
            ("loop_start", self.loop_start),
            ("loop_duration", self.loop_duration),
            ("loop_rate", self.loop_rate),
        ];
        if let Some((name, value)) = parameters
            .into_iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(Error::InvalidZoneParameter { name, value });
        }

        if self.loops && (self.loop_rate <= 0.0 || self.loop_duration <= 0.0) {
            return Err(Error::InvalidZoneLoop {
                duration: self.loop_duration,
                rate: self.loop_rate,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_matches_inclusive_range() {
        let zone = Zone::new(60, 48, 72);
        assert!(!zone.matches(47));
        assert!(zone.matches(48));
        assert!(zone.matches(60));
        assert!(zone.matches(72));
        assert!(!zone.matches(73));

        // Unpitched zones still match by range.
        let zone = zone.with_pitched(false);
        assert!(zone.matches(50));
        assert!(!zone.matches(20));
    }

    #[test]
    fn test_pitch_ratio() {
        let zone = Zone::new(69, 0, 127);
        assert!((zone.pitch_ratio(81) - 2.0).abs() < 1e-12);
        assert!((zone.pitch_ratio(57) - 0.5).abs() < 1e-12);
        assert!((zone.pitch_ratio(69) - 1.0).abs() < 1e-12);
        assert!((zone.pitch_ratio(76) - frequency(76) / frequency(69)).abs() < 1e-12);

        let zone = zone.with_pitched(false);
        assert_eq!(zone.pitch_ratio(81), 1.0);
    }

    #[test]
    fn test_frequency() {
        assert!((frequency(69) - 440.0).abs() < 1e-9);
        assert!((frequency(60) - 261.625_565).abs() < 1e-5);
    }

    #[test]
    fn test_loop_region_and_exit() {
        let zone = Zone::new(60, 0, 127)
            .with_offset(1.0)
            .with_loop(0.5, 22050.0, 44100.0);
        let region = zone.loop_region(0.1).unwrap();
        assert!((region.start - 1.6).abs() < 1e-12);
        assert!((region.end - 2.1).abs() < 1e-12);
        assert!((zone.loop_exit() - 1.0).abs() < 1e-12);

        let zone = Zone::new(60, 0, 127).with_loop_points(0.25, 100.0, 100.0);
        assert_eq!(zone.loop_region(0.0), None);
        assert!((zone.loop_exit() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_source_offset_clamps() {
        let zone = Zone::new(60, 0, 127).with_offset(0.01);
        assert!((zone.source_offset(0.5) - 0.51).abs() < 1e-12);
        assert_eq!(zone.source_offset(-0.5), 0.0);
    }

    #[test]
    fn test_validate() {
        assert!(Zone::new(60, 48, 72).validate().is_ok());
        assert!(Zone::new(60, 60, 60).validate().is_ok());

        assert!(matches!(
            Zone::new(60, 72, 48).validate(),
            Err(Error::InvalidZoneRange { start: 72, end: 48 })
        ));
        assert!(matches!(
            Zone::new(60, 0, 127).with_gain(-1.0).validate(),
            Err(Error::InvalidZoneParameter { name: "gain", .. })
        ));
        assert!(matches!(
            Zone::new(60, 0, 127).with_release(f64::NAN).validate(),
            Err(Error::InvalidZoneParameter {
                name: "release",
                ..
            })
        ));
        assert!(matches!(
            Zone::new(60, 0, 127).with_loop(0.0, 100.0, 0.0).validate(),
            Err(Error::InvalidZoneLoop { .. })
        ));
        assert!(matches!(
            Zone::new(60, 0, 127).with_loop(0.0, 0.0, 44100.0).validate(),
            Err(Error::InvalidZoneLoop { .. })
        ));
    }
}
