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
use crate::audio::{DecodeError, GraphError};
use crate::preset::PresetError;

use super::voice::VoiceId;

/// Errors raised by the instrument, its performer and its voices.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no sample buffer has been loaded")]
    BufferUnavailable,

    #[error("zone key range {start}..={end} is inverted")]
    InvalidZoneRange { start: u8, end: u8 },

    #[error("zone {name} must be a finite, non-negative number (got {value})")]
    InvalidZoneParameter { name: &'static str, value: f64 },

    #[error("looping zone needs a positive loop duration and rate (duration {duration}, rate {rate})")]
    InvalidZoneLoop { duration: f64, rate: f64 },

    #[error("voice {0} has already been stopped")]
    DoubleStop(VoiceId),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Preset(#[from] PresetError),
}
