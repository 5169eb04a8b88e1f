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
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize};

use super::envelope::{velocity_from_normalized, MAX_VELOCITY};

fn default_velocity() -> u8 {
    MAX_VELOCITY
}

/// A velocity as written in a sequence file.
#[derive(Deserialize)]
#[serde(untagged)]
enum VelocityValue {
    Midi(u64),
    Normalized(f64),
}

/// Reads a velocity as a whole number in 0..=127 or a fraction in 0.0..=1.0.
fn deserialize_velocity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    match VelocityValue::deserialize(deserializer)? {
        VelocityValue::Midi(velocity) if velocity <= MAX_VELOCITY as u64 => Ok(velocity as u8),
        VelocityValue::Normalized(velocity) if (0.0..=1.0).contains(&velocity) => {
            Ok(velocity_from_normalized(velocity))
        }
        _ => Err(de::Error::custom(
            "velocity must be between 0 and 127, or between 0.0 and 1.0",
        )),
    }
}

/// A note in a sequence. `offset` is seconds from the sequence start and
/// `duration` is how long the note is held; zero holds it until stopped.
/// Sequence files may give the velocity normalized to 0.0..=1.0.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct SequenceNote {
    key: u8,
    #[serde(
        default = "default_velocity",
        deserialize_with = "deserialize_velocity"
    )]
    velocity: u8,
    #[serde(default)]
    offset: f64,
    #[serde(default)]
    duration: f64,
}

impl SequenceNote {
    pub fn new(key: u8, velocity: u8, offset: f64, duration: f64) -> SequenceNote {
        SequenceNote {
            key,
            velocity,
            offset,
            duration,
        }
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}

/// An ordered list of notes. Notes are triggered in list order; when they
/// sound is up to their offsets.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Sequence {
    #[serde(default)]
    notes: Vec<SequenceNote>,
}

impl Sequence {
    pub fn new() -> Sequence {
        Sequence::default()
    }

    /// Parses a sequence from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Sequence, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }

    /// Loads a sequence from a YAML file.
    pub fn load(path: &Path) -> Result<Sequence, Box<dyn Error>> {
        match Sequence::from_yaml(&fs::read_to_string(path)?) {
            Ok(sequence) => Ok(sequence),
            Err(e) => Err(format!("error parsing file {}: {}", path.display(), e).into()),
        }
    }

    pub fn add_note(&mut self, key: u8, velocity: u8, offset: f64, duration: f64) {
        self.notes.push(SequenceNote::new(key, velocity, offset, duration));
    }

    pub fn notes(&self) -> &[SequenceNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The time the last bounded note is released, relative to the start.
    pub fn length(&self) -> f64 {
        self.notes
            .iter()
            .map(|note| note.offset + note.duration)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_add_note_keeps_order() {
        let mut sequence = Sequence::new();
        sequence.add_note(64, 100, 0.5, 1.0);
        sequence.add_note(60, 127, 0.0, 1.0);

        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.notes()[0].key(), 64);
        assert_eq!(sequence.notes()[1].key(), 60);
        assert_eq!(sequence.length(), 1.5);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "
notes:
  - key: 60
    velocity: 90
    offset: 0
    duration: 1
  - key: 64
    offset: 0.5
";
        let sequence = Sequence::from_yaml(yaml).unwrap();

        assert_eq!(
            sequence.notes(),
            &[
                SequenceNote::new(60, 90, 0.0, 1.0),
                SequenceNote::new(64, 127, 0.5, 0.0),
            ]
        );
    }

    #[test]
    fn test_normalized_velocity() {
        let yaml = "
notes:
  - key: 60
    velocity: 0.5
  - key: 62
    velocity: 1.0
  - key: 64
    velocity: 1
";
        let sequence = Sequence::from_yaml(yaml).unwrap();
        let velocities: Vec<u8> = sequence.notes().iter().map(SequenceNote::velocity).collect();
        assert_eq!(velocities, vec![64, 127, 1]);

        assert!(Sequence::from_yaml("notes: [ { key: 60, velocity: 200 } ]").is_err());
        assert!(Sequence::from_yaml("notes: [ { key: 60, velocity: 1.5 } ]").is_err());
        assert!(Sequence::from_yaml("notes: [ { key: 60, velocity: -0.5 } ]").is_err());
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "notes: [ { velocity: 3 } ]").unwrap();

        let err = Sequence::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }
}
