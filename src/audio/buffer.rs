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
use std::sync::Arc;

/// Decoded audio held entirely in memory in planar format.
/// The sample data is stored in an Arc so every voice can share it without copying.
#[derive(Clone)]
pub struct SampleBuffer {
    /// One Vec per channel, all of equal length.
    channels: Arc<[Vec<f32>]>,
    /// Native sample rate of the audio data.
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from planar channel data. Channels longer than the
    /// shortest one are truncated so every channel has the same frame count.
    pub fn from_planar(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        Self {
            channels: channels.into(),
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let num_channels = channel_count as usize;
        if num_channels == 0 {
            return Self::from_planar(Vec::new(), sample_rate);
        }

        let frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::from_planar(planar, sample_rate)
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Returns the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Returns the duration of the buffer in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reads a channel at a fractional position given in seconds, linearly
    /// interpolating between neighbouring frames. Positions outside the buffer
    /// read as silence.
    pub fn sample_at(&self, channel: usize, position: f64) -> f32 {
        let data = self.channel(channel);
        if position < 0.0 || data.is_empty() {
            return 0.0;
        }

        let frame_pos = position * self.sample_rate as f64;
        let index = frame_pos.floor() as usize;
        if index >= data.len() {
            return 0.0;
        }
        let frac = (frame_pos - index as f64) as f32;
        let s0 = data[index];
        let s1 = data.get(index + 1).copied().unwrap_or(0.0);
        s0 + (s1 - s0) * frac
    }

    /// Finds the first frame of channel 0 whose absolute amplitude exceeds the
    /// threshold, looking no further than `within` seconds into the buffer.
    pub fn first_frame_above(&self, threshold: f32, within: f64) -> Option<usize> {
        let limit = (within * self.sample_rate as f64).ceil() as usize;
        self.channel(0)
            .iter()
            .take(limit)
            .position(|sample| sample.abs() > threshold)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels.len() * self.frames() * std::mem::size_of::<f32>()
    }

    /// Returns true if both handles refer to the same decoded data.
    pub fn ptr_eq(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.channels, &other.channels)
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channel_count())
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved() {
        let buffer = SampleBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5, 0.25, -0.25], 2, 100);

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0), &[1.0, 0.5, 0.25]);
        assert_eq!(buffer.channel(1), &[-1.0, -0.5, -0.25]);
        assert!((buffer.duration() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_planar_channels_truncated_to_shortest() {
        let buffer = SampleBuffer::from_planar(vec![vec![0.0; 10], vec![0.0; 7]], 44100);
        assert_eq!(buffer.frames(), 7);
        assert_eq!(buffer.channel(1).len(), 7);
    }

    #[test]
    fn test_sample_at_interpolates() {
        let buffer = SampleBuffer::from_planar(vec![vec![0.0, 1.0, 0.0]], 10);

        assert_eq!(buffer.sample_at(0, 0.1), 1.0);
        assert!((buffer.sample_at(0, 0.05) - 0.5).abs() < 1e-6);
        assert_eq!(buffer.sample_at(0, -0.1), 0.0);
        assert_eq!(buffer.sample_at(0, 1.0), 0.0);
        assert_eq!(buffer.sample_at(3, 0.1), 0.0);
    }

    #[test]
    fn test_first_frame_above() {
        let mut data = vec![0.0f32; 200];
        data[150] = -0.75;
        let buffer = SampleBuffer::from_planar(vec![data], 100);

        assert_eq!(buffer.first_frame_above(0.5, 2.0), Some(150));
        // The loud frame lies beyond the first second.
        assert_eq!(buffer.first_frame_above(0.5, 1.0), None);
    }

    #[test]
    fn test_clones_share_data() {
        let buffer = SampleBuffer::from_planar(vec![vec![0.0; 4]], 10);
        let clone = buffer.clone();
        assert!(buffer.ptr_eq(&clone));

        let other = SampleBuffer::from_planar(vec![vec![0.0; 4]], 10);
        assert!(!buffer.ptr_eq(&other));
    }
}
