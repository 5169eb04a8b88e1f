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
//! A sample-based polyphonic instrument engine.
//!
//! An instrument is one audio file cut into zones. Each zone maps a key range
//! onto a region of the file, with its own pitch, gain, loop points, decay and
//! release. Playing a key starts one voice per matching zone on an audio
//! graph; releasing it fades those voices out and frees them once silent.
pub mod audio;
pub mod config;
pub mod instrument;
pub mod player;
pub mod playsync;
pub mod preset;
pub mod verify;

#[cfg(test)]
mod testutil;
