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

//! Decoding of audio files into in-memory sample buffers.
//!
//! The whole file is decoded up front so that voices can read from it without
//! touching the disk.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::buffer::SampleBuffer;
use super::error::DecodeError;

/// Decodes the audio file at the given path into a sample buffer.
/// Supports WAV, FLAC, MP3, AAC and the other formats symphonia understands.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<SampleBuffer, DecodeError> {
    let path = path.as_ref();
    let path_name = path.display().to_string();

    // Include the path in IO errors so the user sees which file failed.
    let file = File::open(path).map_err(|e| {
        DecodeError::IoError(std::io::Error::new(e.kind(), format!("{}: {}", path_name, e)))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|source| DecodeError::Audio {
            path: path_name.clone(),
            source,
        })?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(path_name.clone()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::UnknownSampleRate(path_name.clone()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|source| DecodeError::Audio {
            path: path_name.clone(),
            source,
        })?;

    let mut planar: Vec<Vec<f32>> = Vec::new();
    loop {
        let decoded = decode_next_packet(
            format_reader.as_mut(),
            decoder.as_mut(),
            track_id,
            &mut planar,
        )
        .map_err(|source| DecodeError::Audio {
            path: path_name.clone(),
            source,
        })?;
        if !decoded {
            break;
        }
    }

    if planar.is_empty() {
        return Err(DecodeError::NoChannels(path_name));
    }

    let buffer = SampleBuffer::from_planar(planar, sample_rate);
    info!(
        path = %path.display(),
        channels = buffer.channel_count(),
        sample_rate,
        duration_ms = (buffer.duration() * 1000.0) as u64,
        memory_kb = buffer.memory_size() / 1024,
        "Audio file decoded"
    );
    Ok(buffer)
}

/// Reads and decodes the next packet of the given track, appending its frames
/// to `planar`. Returns `Ok(false)` at the end of the stream.
fn decode_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    planar: &mut Vec<Vec<f32>>,
) -> Result<bool, SymphoniaError> {
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                append_planar(decoded, planar);
                return Ok(true);
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet is skipped rather than failing the whole file.
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Appends a decoded buffer, converted to f32, to the planar output.
fn append_planar(decoded: AudioBufferRef, planar: &mut Vec<Vec<f32>>) {
    match decoded {
        AudioBufferRef::F32(buf) => extend_planes(&buf, planar, |sample| sample),
        AudioBufferRef::F64(buf) => extend_planes(&buf, planar, |sample| sample as f32),
        AudioBufferRef::S8(buf) => extend_planes(&buf, planar, scale_s8),
        AudioBufferRef::S16(buf) => extend_planes(&buf, planar, scale_s16),
        AudioBufferRef::S24(buf) => extend_planes(&buf, planar, |sample| scale_s24(sample.inner())),
        AudioBufferRef::S32(buf) => extend_planes(&buf, planar, scale_s32),
        AudioBufferRef::U8(buf) => extend_planes(&buf, planar, scale_u8),
        AudioBufferRef::U16(buf) => extend_planes(&buf, planar, scale_u16),
        AudioBufferRef::U24(buf) => extend_planes(&buf, planar, |sample| scale_u24(sample.inner())),
        AudioBufferRef::U32(buf) => extend_planes(&buf, planar, scale_u32),
    }
}

fn extend_planes<T, F>(buf: &AudioBuffer<T>, planar: &mut Vec<Vec<f32>>, convert: F)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let channels = buf.spec().channels.count();
    if planar.len() < channels {
        // Channels appearing mid-stream start out padded with silence.
        let frames = planar.first().map(Vec::len).unwrap_or(0);
        planar.resize_with(channels, || vec![0.0; frames]);
    }

    for (ch_idx, plane) in buf.planes().planes().iter().enumerate().take(channels) {
        planar[ch_idx].extend(plane[..buf.frames()].iter().map(|sample| convert(*sample)));
    }
}

#[inline]
pub(crate) fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
pub(crate) fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
pub(crate) fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
pub(crate) fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
pub(crate) fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
pub(crate) fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}
