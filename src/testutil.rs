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
//! Fixtures shared by the unit tests.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::audio::{RenderGraph, SampleBuffer};

/// Sample rate used by the test fixtures.
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Writes interleaved 16 bit samples to a WAV file.
pub fn write_wav(
    path: &Path,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// A mono buffer holding `value` for `seconds`.
pub fn constant_buffer(value: f32, seconds: f64) -> SampleBuffer {
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as usize;
    SampleBuffer::from_planar(vec![vec![value; frames]], TEST_SAMPLE_RATE)
}

/// A mono buffer of silence with a single loud frame at `onset` seconds.
pub fn onset_buffer(onset: f64, seconds: f64) -> SampleBuffer {
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as usize;
    let mut samples = vec![0.0; frames];
    let index = (onset * TEST_SAMPLE_RATE as f64).round() as usize;
    for sample in samples.iter_mut().skip(index) {
        *sample = 0.9;
    }
    SampleBuffer::from_planar(vec![samples], TEST_SAMPLE_RATE)
}

/// A mono render graph at the fixture sample rate, shared the way the
/// output device shares it.
pub fn shared_graph() -> Arc<Mutex<RenderGraph>> {
    Arc::new(Mutex::new(RenderGraph::new(TEST_SAMPLE_RATE, 1)))
}
