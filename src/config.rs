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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

mod error;
mod output;

pub use error::ConfigError;
pub use output::Output;

/// Prefix of environment variables that override config values, e.g.
/// `ZONESYNTH_OUTPUT__SAMPLE_RATE=48000`.
const ENV_PREFIX: &str = "ZONESYNTH";

/// How long to keep rendering after the last note is released.
const DEFAULT_TAIL: Duration = Duration::from_secs(1);

/// A YAML representation of an instrument: its audio file, its preset and
/// where it plays.
#[derive(Deserialize, Clone, Debug)]
pub struct InstrumentConfig {
    /// The audio file holding every zone's sample, relative to the config file.
    audio_file: String,

    /// The preset file, relative to the config file.
    preset: String,

    /// Output settings.
    #[serde(default)]
    output: Output,

    /// Extra time to render after the last release, e.g. "2s".
    tail: Option<String>,

    /// The directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl InstrumentConfig {
    /// Loads the config from a YAML file. Environment variables prefixed
    /// with `ZONESYNTH_` override values from the file.
    pub fn load(path: &Path) -> Result<InstrumentConfig, ConfigError> {
        let mut config: InstrumentConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parses the config from a YAML string, resolving paths against `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: &Path) -> Result<InstrumentConfig, ConfigError> {
        let mut config: InstrumentConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.base_dir = base_dir.to_path_buf();
        Ok(config)
    }

    /// Returns the path to the audio file.
    pub fn audio_file(&self) -> PathBuf {
        self.base_dir.join(&self.audio_file)
    }

    /// Returns the path to the preset.
    pub fn preset(&self) -> PathBuf {
        self.base_dir.join(&self.preset)
    }

    /// Returns the output settings.
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Returns the render tail (default: 1s).
    pub fn tail(&self) -> Result<Duration, ConfigError> {
        match &self.tail {
            Some(tail) => parse_duration(tail),
            None => Ok(DEFAULT_TAIL),
        }
    }
}

/// Parses a duration string such as "500ms" or "2s".
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    match DurationString::from_string(value.to_string()) {
        Ok(duration) => Ok(duration.into()),
        Err(e) => Err(ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_instrument_config_deserialize() {
        let yaml = r#"
            audio_file: samples/piano.wav
            preset: presets/piano.json
            tail: 2500ms
            output:
              device: Studio Monitors
              sample_rate: 48000
              channels: 1
        "#;

        let config = InstrumentConfig::from_yaml(yaml, Path::new("/instruments")).unwrap();
        assert_eq!(
            config.audio_file(),
            PathBuf::from("/instruments/samples/piano.wav")
        );
        assert_eq!(
            config.preset(),
            PathBuf::from("/instruments/presets/piano.json")
        );
        assert_eq!(config.tail().unwrap(), Duration::from_millis(2500));
        assert_eq!(config.output().device(), "Studio Monitors");
        assert_eq!(config.output().sample_rate(), 48000);
        assert_eq!(config.output().requested_sample_rate(), Some(48000));
        assert_eq!(config.output().channels(), 1);
    }

    #[test]
    fn test_instrument_config_defaults() {
        let yaml = r#"
            audio_file: /abs/piano.wav
            preset: piano.json
        "#;

        let config = InstrumentConfig::from_yaml(yaml, Path::new("/instruments")).unwrap();
        assert_eq!(config.audio_file(), PathBuf::from("/abs/piano.wav"));
        assert_eq!(config.tail().unwrap(), DEFAULT_TAIL);
        assert_eq!(config.output().device(), "default");
        assert_eq!(config.output().sample_rate(), 44100);
        assert_eq!(config.output().requested_sample_rate(), None);
        assert_eq!(config.output().channels(), 2);
    }

    #[test]
    fn test_instrument_config_errors() {
        let missing = InstrumentConfig::from_yaml("preset: piano.json", Path::new("."));
        assert!(matches!(missing, Err(ConfigError::Load(_))));

        let config = InstrumentConfig::from_yaml(
            "audio_file: a.wav\npreset: p.json\ntail: soon",
            Path::new("."),
        )
        .unwrap();
        assert!(matches!(
            config.tail(),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_instrument_config_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instrument.yaml");
        fs::write(&path, "audio_file: piano.wav\npreset: piano.json\n").unwrap();

        let config = InstrumentConfig::load(&path).unwrap();
        assert_eq!(config.audio_file(), dir.path().join("piano.wav"));
        assert_eq!(config.preset(), dir.path().join("piano.json"));
    }
}
