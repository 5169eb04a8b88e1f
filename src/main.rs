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
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zonesynth::audio;
use zonesynth::config::{self, InstrumentConfig};
use zonesynth::instrument::{self, Sequence};
use zonesynth::player::{self, Player};
use zonesynth::playsync::CancelHandle;
use zonesynth::preset::Preset;
use zonesynth::verify;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample-based polyphonic instrument."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the zones in a preset file.
    Zones {
        /// The path to the preset.
        preset_path: String,
    },
    /// Verifies an instrument's zones against its audio file.
    Verify {
        /// The path to the instrument config.
        config_path: String,
    },
    /// Renders a sequence into a WAV file.
    Render {
        /// The path to the instrument config.
        config_path: String,
        /// The path to the sequence to render.
        sequence_path: String,
        /// The WAV file to write.
        output_path: String,
        /// How long to wait before the sequence starts, e.g. 500ms.
        #[arg(short, long)]
        when: Option<String>,
    },
    /// Plays a sequence through an audio device.
    Play {
        /// The path to the instrument config.
        config_path: String,
        /// The path to the sequence to play.
        sequence_path: String,
        /// How long to wait before the sequence starts, e.g. 500ms.
        #[arg(short, long)]
        when: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Zones { preset_path } => {
            let preset = Preset::load(&PathBuf::from(&preset_path))?;

            if preset.zones().is_empty() {
                println!("No zones found in {}.", preset_path);
                return Ok(());
            }

            println!("Zones (count: {}):", preset.zones().len());
            for zone in preset.zones() {
                println!(
                    "- key {} (keys {}..={}) offset={:.3}s gain={} release={:.3}s loop={}",
                    zone.key(),
                    zone.key_range_start(),
                    zone.key_range_end(),
                    zone.offset(),
                    zone.gain(),
                    zone.release(),
                    zone.loops(),
                );
            }
        }
        Commands::Verify { config_path } => {
            let config = InstrumentConfig::load(&PathBuf::from(config_path))?;
            let buffer = audio::decode_file(&config.audio_file())?;
            let preset = Preset::load(&config.preset())?;
            let report = verify::verify_instrument(
                preset.zones(),
                &buffer,
                instrument::master_offset(&buffer),
            );
            verify::print_report(&report, preset.zones());

            if report.has_errors() {
                return Err("instrument failed verification".into());
            }
        }
        Commands::Render {
            config_path,
            sequence_path,
            output_path,
            when,
        } => {
            let config = InstrumentConfig::load(&PathBuf::from(config_path))?;
            let sequence = Sequence::load(&PathBuf::from(sequence_path))?;
            let when = parse_when(when)?;
            let summary =
                player::render_to_wav(&config, &sequence, &PathBuf::from(&output_path), when)?;

            println!(
                "Rendered {} voice(s), {:.2}s, to {}.",
                summary.voices,
                summary.frames as f64 / summary.sample_rate as f64,
                output_path
            );
        }
        Commands::Play {
            config_path,
            sequence_path,
            when,
        } => {
            let config = InstrumentConfig::load(&PathBuf::from(config_path))?;
            let sequence = Sequence::load(&PathBuf::from(sequence_path))?;
            let when = parse_when(when)?;

            let cancel_handle = CancelHandle::new();
            let ctrl_c_handle = cancel_handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_handle.cancel();
                }
            });

            let mut player = Player::new(&config)?;
            player
                .play(&sequence, when, config.tail()?, cancel_handle)
                .await?;
        }
    }

    Ok(())
}

fn parse_when(when: Option<String>) -> Result<f64, Box<dyn Error>> {
    match when {
        Some(when) => Ok(config::parse_duration(&when)?.as_secs_f64()),
        None => Ok(0.0),
    }
}
