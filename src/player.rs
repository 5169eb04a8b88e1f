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
//! Plays instruments: offline into a WAV file, or live through an output device.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hound::{WavSpec, WavWriter};
use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::audio::{self, cpal::OutputStream, AudioGraph, RenderGraph};
use crate::config::InstrumentConfig;
use crate::instrument::envelope::DISPOSAL_MARGIN;
use crate::instrument::{self, Instrument, Sequence, Zone};
use crate::playsync::CancelHandle;

/// How often live playback frees finished voices.
const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Seconds rendered between frees when rendering offline.
const RENDER_CHUNK: f64 = 0.05;

/// Builds an instrument from its config: decodes the audio file and loads
/// the preset.
pub fn load_instrument<G: AudioGraph>(
    config: &InstrumentConfig,
    graph: Arc<Mutex<G>>,
) -> Result<Instrument<G>, instrument::Error> {
    let mut instrument = Instrument::new(graph);
    instrument.load_audio_file(&config.audio_file())?;
    instrument.load_preset(&config.preset())?;
    Ok(instrument)
}

/// How long a sequence started `when` seconds from now takes to play out,
/// including the longest release and the disposal margin.
pub fn playing_time(sequence: &Sequence, zones: &[Zone], when: f64) -> f64 {
    let release = zones.iter().map(Zone::release).fold(0.0, f64::max);
    when + sequence.length() + release + DISPOSAL_MARGIN
}

/// What an offline render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    pub voices: usize,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Renders a sequence into a 32 bit float WAV file.
pub fn render_to_wav(
    config: &InstrumentConfig,
    sequence: &Sequence,
    path: &Path,
    when: f64,
) -> Result<RenderSummary, Box<dyn Error>> {
    let sample_rate = config.output().sample_rate();
    let channels = config.output().channels();
    let graph = Arc::new(Mutex::new(RenderGraph::new(sample_rate, channels)));
    let mut instrument = load_instrument(config, graph.clone())?;

    let voices = instrument.start_sequence(sequence, when)?;
    let seconds = playing_time(sequence, instrument.zones(), when) + config.tail()?.as_secs_f64();
    let total_frames = (seconds * sample_rate as f64).round() as usize;
    let chunk_frames = ((RENDER_CHUNK * sample_rate as f64) as usize).max(1);

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let mut rendered = 0;
    while rendered < total_frames {
        let frames = chunk_frames.min(total_frames - rendered);
        let samples = graph.lock().render(frames);
        for sample in samples {
            writer.write_sample(sample)?;
        }
        instrument.update();
        rendered += frames;
    }
    writer.finalize()?;

    info!(
        path = %path.display(),
        frames = total_frames,
        voices,
        sample_rate,
        channels,
        "Rendered sequence"
    );
    Ok(RenderSummary {
        frames: total_frames,
        voices,
        sample_rate,
        channels,
    })
}

/// Plays an instrument live through an output device.
pub struct Player {
    /// Dropped before the stream so voices are freed while audio still runs.
    instrument: Instrument<RenderGraph>,
    _stream: OutputStream,
}

impl Player {
    /// Opens the configured output device and loads the instrument into it.
    pub fn new(config: &InstrumentConfig) -> Result<Player, Box<dyn Error>> {
        let device = audio::get_device(config.output().device())?;
        info!(device = %device, "Opening output device");
        let (graph, stream) = device.start(config.output().requested_sample_rate())?;
        let instrument = load_instrument(config, graph)?;
        Ok(Player {
            instrument,
            _stream: stream,
        })
    }

    pub fn instrument(&mut self) -> &mut Instrument<RenderGraph> {
        &mut self.instrument
    }

    /// Plays the sequence `when` seconds from now and waits until it has
    /// played out, plus `tail`, or until cancelled.
    pub async fn play(
        &mut self,
        sequence: &Sequence,
        when: f64,
        tail: Duration,
        cancel_handle: CancelHandle,
    ) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "play");
        let _enter = span.enter();

        let start = self.instrument.graph().lock().current_time();
        let voices = self.instrument.start_sequence(sequence, when)?;
        let end = start
            + playing_time(sequence, self.instrument.zones(), when)
            + tail.as_secs_f64();
        info!(notes = sequence.len(), voices, "Playing sequence");

        while !cancel_handle.is_cancelled() {
            tokio::time::sleep(UPDATE_INTERVAL).await;
            self.instrument.update();
            if self.instrument.graph().lock().current_time() >= end {
                break;
            }
        }

        if cancel_handle.is_cancelled() {
            info!("Playback cancelled");
            self.instrument.shutdown();
        } else {
            info!("Playback finished");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_playing_time() {
        let mut sequence = Sequence::new();
        sequence.add_note(60, 127, 0.5, 1.0);
        let zones = vec![
            Zone::new(60, 0, 127).with_release(0.25),
            Zone::new(60, 0, 127).with_release(1.0),
        ];
        assert!((playing_time(&sequence, &zones, 2.0) - 4.7).abs() < 1e-9);
    }

    #[test]
    fn test_render_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("tone.wav"), &[16384i16; 8000], 1, 8000).unwrap();
        fs::write(
            dir.path().join("tone.json"),
            r#"{"version": 1, "zones": [[60, 0, 127, false, 0, 1, 0, 0.1]]}"#,
        )
        .unwrap();
        let config = InstrumentConfig::from_yaml(
            r#"audio_file: tone.wav
preset: tone.json
tail: 100ms
output:
  sample_rate: 8000
  channels: 1
"#,
            dir.path(),
        )
        .unwrap();

        let mut sequence = Sequence::new();
        sequence.add_note(60, 127, 0.0, 0.5);
        let output = dir.path().join("out.wav");
        let summary = render_to_wav(&config, &sequence, &output, 0.0).unwrap();
        assert_eq!(summary.voices, 1);
        assert_eq!(summary.frames, 7200);

        let mut reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), summary.frames);
        assert!((samples[2000] - 0.5).abs() < 1e-4);
        assert!(samples[6800].abs() < 1e-4);
    }

    #[test]
    fn test_render_reports_missing_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            InstrumentConfig::from_yaml("audio_file: nope.wav\npreset: nope.json", dir.path())
                .unwrap();
        let result = render_to_wav(
            &config,
            &Sequence::new(),
            &dir.path().join("out.wav"),
            0.0,
        );
        assert!(result.is_err());
    }
}
