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

pub mod automation;
mod buffer;
pub mod cpal;
mod decode;
mod error;
pub mod filter;
mod graph;
mod render;

pub use buffer::SampleBuffer;
pub use decode::decode_file;
pub use error::{DecodeError, GraphError};
pub use filter::{Filter, FilterKind};
pub use graph::{AudioGraph, LoopRegion, NodeId};
pub use render::{PlayerSchedule, RenderGraph, SamplePlayer};

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::Device>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the output device with the given name.
pub fn get_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    cpal::Device::get(name)
}
