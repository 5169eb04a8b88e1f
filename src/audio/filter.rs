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
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// The response shape of a biquad filter stage.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    Peaking,
    Notch,
    Allpass,
}

/// Settings for one filter stage in a zone's signal path.
///
/// Fields missing from a preset record read as zero, the same as
/// `Filter::default()`. A stage whose frequency is zero or at or above
/// Nyquist passes audio through unchanged.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Filter {
    /// The filter response.
    #[serde(alias = "type")]
    pub kind: FilterKind,
    /// Cutoff or centre frequency in Hz.
    pub frequency: f64,
    /// Detune of the frequency in cents.
    pub detune: f64,
    /// Quality factor.
    #[serde(alias = "Q")]
    pub q: f64,
    /// Gain in dB, used by the shelf and peaking responses.
    pub gain: f64,
}

impl Filter {
    /// The frequency after applying detune.
    pub fn effective_frequency(&self) -> f64 {
        self.frequency * 2f64.powf(self.detune / 1200.0)
    }
}

/// Normalized biquad coefficients (a0 divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    const PASS_THROUGH: Coefficients = Coefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Computes coefficients from the Audio EQ Cookbook formulas.
    fn new(filter: &Filter, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f64 / 2.0;
        let frequency = filter.effective_frequency();
        if sample_rate == 0 || frequency <= 0.0 || frequency >= nyquist {
            return Self::PASS_THROUGH;
        }

        let q = if filter.q > 0.0 { filter.q } else { 1e-4 };
        let w0 = 2.0 * PI * frequency / sample_rate as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10f64.powf(filter.gain / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter.kind {
            FilterKind::Lowpass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Bandpass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Allpass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterKind::Lowshelf => {
                let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha,
                )
            }
            FilterKind::Highshelf => {
                let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// A running biquad filter with independent state for each channel.
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: Coefficients,
    /// Per-channel history: [x1, x2, y1, y2].
    state: Vec<[f64; 4]>,
}

impl Biquad {
    /// Creates a filter for the given settings at the given sample rate.
    pub fn new(filter: &Filter, sample_rate: u32, channels: usize) -> Self {
        Self {
            coefficients: Coefficients::new(filter, sample_rate),
            state: vec![[0.0; 4]; channels],
        }
    }

    /// Filters one sample on the given channel.
    pub fn process(&mut self, channel: usize, input: f32) -> f32 {
        let c = self.coefficients;
        let Some(state) = self.state.get_mut(channel) else {
            return input;
        };
        let [x1, x2, y1, y2] = *state;
        let x0 = input as f64;
        let y0 = c.b0 * x0 + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
        *state = [x0, x1, y0, y1];
        y0 as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI as PI32;

    fn sine(frequency: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI32 * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn peak_after_settling(filter: &Filter, input: &[f32]) -> f32 {
        let mut biquad = Biquad::new(filter, 44100, 1);
        let output: Vec<f32> = input.iter().map(|s| biquad.process(0, *s)).collect();
        output[output.len() / 2..]
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let filter = Filter {
            kind: FilterKind::Lowpass,
            frequency: 500.0,
            q: 0.707,
            ..Default::default()
        };

        let low = peak_after_settling(&filter, &sine(100.0, 44100, 8820));
        let high = peak_after_settling(&filter, &sine(8000.0, 44100, 8820));
        assert!(low > 0.9, "low frequency peak {}", low);
        assert!(high < 0.05, "high frequency peak {}", high);
    }

    #[test]
    fn test_highpass_attenuates_low_frequencies() {
        let filter = Filter {
            kind: FilterKind::Highpass,
            frequency: 2000.0,
            q: 0.707,
            ..Default::default()
        };

        let low = peak_after_settling(&filter, &sine(50.0, 44100, 8820));
        let high = peak_after_settling(&filter, &sine(10000.0, 44100, 8820));
        assert!(low < 0.05, "low frequency peak {}", low);
        assert!(high > 0.9, "high frequency peak {}", high);
    }

    #[test]
    fn test_out_of_range_frequency_passes_through() {
        let filter = Filter {
            frequency: 30000.0,
            ..Default::default()
        };
        let mut biquad = Biquad::new(&filter, 44100, 2);
        assert_eq!(biquad.process(0, 0.5), 0.5);
        assert_eq!(biquad.process(1, -0.25), -0.25);
        // Unknown channels pass through untouched.
        assert_eq!(biquad.process(5, 0.1), 0.1);
    }

    #[test]
    fn test_missing_fields_match_default() {
        let filter: Filter = serde_json::from_str(r#"{"kind": "lowpass"}"#).unwrap();
        assert_eq!(filter, Filter::default());
        assert_eq!(filter.frequency, 0.0);
        assert_eq!(filter.q, 0.0);

        let filter: Filter =
            serde_json::from_str(r#"{"type": "notch", "frequency": 800, "Q": 2}"#).unwrap();
        assert_eq!(filter.kind, FilterKind::Notch);
        assert_eq!(filter.frequency, 800.0);
        assert_eq!(filter.q, 2.0);

        // A zero frequency leaves the signal alone.
        let mut biquad = Biquad::new(&Filter::default(), 44100, 1);
        assert_eq!(biquad.process(0, 0.75), 0.75);
    }

    #[test]
    fn test_detune_shifts_frequency() {
        let filter = Filter {
            frequency: 440.0,
            detune: 1200.0,
            ..Default::default()
        };
        assert!((filter.effective_frequency() - 880.0).abs() < 1e-9);
    }
}
