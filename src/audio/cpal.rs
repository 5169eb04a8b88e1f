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
use std::fmt;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info};

use super::render::RenderGraph;

/// A small wrapper around a cpal::Device that remembers where it came from.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

/// A running output stream. Audio stops when this is dropped.
pub struct OutputStream {
    _stream: cpal::Stream,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists output devices across every available host.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy backend output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                    });
                }
            }
        }

        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    /// Gets the device with the given name. The name "default" selects the
    /// default output device of the default host.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            let max_channels = device.default_output_config()?.channels();
            return Ok(Device {
                name: device.name()?,
                max_channels,
                host_id: host.id(),
                device,
            });
        }

        Device::list()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| format!("no device found with name {}", name).into())
    }

    /// Opens an output stream on this device and returns the graph that feeds
    /// it. The graph is created with the stream's sample rate and channel
    /// count; everything connected to its destination is heard.
    pub fn start(
        &self,
        sample_rate: Option<u32>,
    ) -> Result<(Arc<Mutex<RenderGraph>>, OutputStream), Box<dyn Error>> {
        let supported = self.device.default_output_config()?;
        let sample_format = supported.sample_format();
        let mut stream_config = supported.config();
        if let Some(sample_rate) = sample_rate {
            stream_config.sample_rate = sample_rate;
        }

        let rate: u32 = stream_config.sample_rate;
        let channels = stream_config.channels;
        let graph = Arc::new(Mutex::new(RenderGraph::new(rate, channels)));

        let err_fn = |err: cpal::StreamError| error!(err = %err, "Output stream error");
        let stream = match sample_format {
            cpal::SampleFormat::F32 => self.device.build_output_stream(
                &stream_config,
                create_f32_callback(graph.clone()),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => self.device.build_output_stream(
                &stream_config,
                create_converting_callback::<i16>(graph.clone()),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I32 => self.device.build_output_stream(
                &stream_config,
                create_converting_callback::<i32>(graph.clone()),
                err_fn,
                None,
            )?,
            other => return Err(format!("unsupported sample format {}", other).into()),
        };
        stream.play()?;

        info!(
            device = self.name,
            sample_rate = rate,
            channels,
            format = %sample_format,
            "Output stream started"
        );
        Ok((graph, OutputStream { _stream: stream }))
    }
}

/// f32 callback: render straight into the cpal buffer.
fn create_f32_callback(
    graph: Arc<Mutex<RenderGraph>>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        graph.lock().render_into(data);
    }
}

/// Integer callback: render into a scratch buffer and convert.
fn create_converting_callback<T>(
    graph: Arc<Mutex<RenderGraph>>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        graph.lock().render_into(&mut scratch);
        for (out, sample) in data.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(*sample);
        }
    }
}
