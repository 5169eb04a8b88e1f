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
//! Preset files.
//!
//! A preset is stored as JSON with each zone packed into a fixed-order tuple:
//!
//! ```text
//! [key, keyRangeStart, keyRangeEnd, pitched, offset, gain, decay, release,
//!  loops, loopStart, loopDuration, loopRate]
//! ```
//!
//! Missing, null or false numbers read as 0 and missing or null flags read as
//! false. Numeric flags are true when non-zero. An optional `filters` list
//! holds one list of filter records per zone.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::audio::Filter;
use crate::instrument::Zone;

/// The preset version this crate reads and writes.
pub const PRESET_VERSION: u64 = 1;

/// Positional field names of a zone tuple.
const ZONE_FIELDS: [&str; 12] = [
    "key",
    "key_range_start",
    "key_range_end",
    "pitched",
    "offset",
    "gain",
    "decay",
    "release",
    "loops",
    "loop_start",
    "loop_duration",
    "loop_rate",
];

/// Errors raised while reading or writing presets.
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unsupported preset version {0}")]
    UnsupportedVersion(u64),

    #[error("zone {zone} has {len} fields, expected at most {}", ZONE_FIELDS.len())]
    TupleLength { zone: usize, len: usize },

    #[error("zone {zone} has an invalid {field}: {value}")]
    InvalidField {
        zone: usize,
        field: &'static str,
        value: String,
    },

    #[error("preset has {filters} filter lists but only {zones} zones")]
    FilterCount { filters: usize, zones: usize },
}

fn default_version() -> u64 {
    PRESET_VERSION
}

/// The on-disk layout.
#[derive(Deserialize, Serialize)]
struct RawPreset {
    #[serde(default = "default_version")]
    version: u64,
    #[serde(default)]
    zones: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filters: Option<Vec<Vec<Filter>>>,
}

/// A versioned set of zones.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    version: u64,
    zones: Vec<Zone>,
}

impl Preset {
    /// Creates a preset at the current version.
    pub fn new(zones: Vec<Zone>) -> Preset {
        Preset {
            version: PRESET_VERSION,
            zones,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn into_zones(self) -> Vec<Zone> {
        self.zones
    }

    /// Parses a preset from JSON. Zones are not validated here.
    pub fn from_json(json: &str) -> Result<Preset, PresetError> {
        let raw: RawPreset = serde_json::from_str(json)?;
        if raw.version != PRESET_VERSION {
            return Err(PresetError::UnsupportedVersion(raw.version));
        }

        let filters = raw.filters.unwrap_or_default();
        if filters.len() > raw.zones.len() {
            return Err(PresetError::FilterCount {
                filters: filters.len(),
                zones: raw.zones.len(),
            });
        }

        let mut filters = filters.into_iter();
        let zones = raw
            .zones
            .iter()
            .enumerate()
            .map(|(index, tuple)| {
                let zone = zone_from_tuple(index, tuple)?;
                Ok(zone.with_filters(filters.next().unwrap_or_default()))
            })
            .collect::<Result<Vec<Zone>, PresetError>>()?;

        Ok(Preset {
            version: raw.version,
            zones,
        })
    }

    /// Serializes the preset to JSON.
    pub fn to_json(&self) -> Result<String, PresetError> {
        let has_filters = self.zones.iter().any(|zone| !zone.filters().is_empty());
        let raw = RawPreset {
            version: self.version,
            zones: self.zones.iter().map(zone_to_tuple).collect(),
            filters: has_filters.then(|| {
                self.zones
                    .iter()
                    .map(|zone| zone.filters().to_vec())
                    .collect()
            }),
        };
        Ok(serde_json::to_string(&raw)?)
    }

    /// Reads a preset file.
    pub fn load(path: &Path) -> Result<Preset, PresetError> {
        let preset = Preset::from_json(&fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            zones = preset.zones.len(),
            "Loaded preset"
        );
        Ok(preset)
    }

    /// Writes the preset to a file.
    pub fn save(&self, path: &Path) -> Result<(), PresetError> {
        fs::write(path, self.to_json()?)?;
        info!(
            path = %path.display(),
            zones = self.zones.len(),
            "Saved preset"
        );
        Ok(())
    }
}

fn invalid(zone: usize, field: usize, value: &Value) -> PresetError {
    PresetError::InvalidField {
        zone,
        field: ZONE_FIELDS[field],
        value: value.to_string(),
    }
}

/// Reads a numeric field. Missing, null and false read as zero.
fn number(zone: usize, tuple: &[Value], field: usize) -> Result<f64, PresetError> {
    match tuple.get(field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(0.0),
        Some(Value::Bool(true)) => Ok(1.0),
        Some(value @ Value::Number(n)) => match n.as_f64() {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(invalid(zone, field, value)),
        },
        Some(value) => Err(invalid(zone, field, value)),
    }
}

/// Reads a key field, which must be a whole number in the MIDI range.
fn key(zone: usize, tuple: &[Value], field: usize) -> Result<u8, PresetError> {
    let value = number(zone, tuple, field)?;
    if value.fract() != 0.0 || !(0.0..=127.0).contains(&value) {
        return Err(invalid(
            zone,
            field,
            tuple.get(field).unwrap_or(&Value::Null),
        ));
    }
    Ok(value as u8)
}

/// Reads a flag. Missing and null read as false; numbers are true when non-zero.
fn flag(zone: usize, tuple: &[Value], field: usize) -> Result<bool, PresetError> {
    match tuple.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(value @ Value::Number(n)) => match n.as_f64() {
            Some(n) => Ok(n != 0.0),
            None => Err(invalid(zone, field, value)),
        },
        Some(value) => Err(invalid(zone, field, value)),
    }
}

fn zone_from_tuple(index: usize, tuple: &[Value]) -> Result<Zone, PresetError> {
    if tuple.len() > ZONE_FIELDS.len() {
        return Err(PresetError::TupleLength {
            zone: index,
            len: tuple.len(),
        });
    }

    let zone = Zone::new(
        key(index, tuple, 0)?,
        key(index, tuple, 1)?,
        key(index, tuple, 2)?,
    )
    .with_pitched(flag(index, tuple, 3)?)
    .with_offset(number(index, tuple, 4)?)
    .with_gain(number(index, tuple, 5)?)
    .with_decay(number(index, tuple, 6)?)
    .with_release(number(index, tuple, 7)?);

    let (loop_start, loop_duration, loop_rate) = (
        number(index, tuple, 9)?,
        number(index, tuple, 10)?,
        number(index, tuple, 11)?,
    );
    Ok(if flag(index, tuple, 8)? {
        zone.with_loop(loop_start, loop_duration, loop_rate)
    } else {
        zone.with_loop_points(loop_start, loop_duration, loop_rate)
    })
}

fn zone_to_tuple(zone: &Zone) -> Vec<Value> {
    vec![
        json!(zone.key()),
        json!(zone.key_range_start()),
        json!(zone.key_range_end()),
        json!(zone.pitched()),
        json!(zone.offset()),
        json!(zone.gain()),
        json!(zone.decay()),
        json!(zone.release()),
        json!(zone.loops()),
        json!(zone.loop_start()),
        json!(zone.loop_duration()),
        json!(zone.loop_rate()),
    ]
}
