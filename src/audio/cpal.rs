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
use std::path::Path;
use std::sync::Arc;
use std::thread;

use ::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ::cpal::{FromSample, SizedSample};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::loader::SampleLoader;
use super::mixer::{AudioMixer, Voice};
use super::{EventSender, LifecycleEvent, LifecycleKind, PlayableHandle, PlaybackError};
use crate::config;
use crate::playsync::CancelHandle;
use crate::registry::SampleDescriptor;

/// The device name that selects the host's default output.
const DEFAULT_DEVICE: &str = "default";

/// The reason the output stream stopped working, if it did.
type Failure = Arc<Mutex<Option<String>>>;

/// An output device that decodes clips into memory and mixes them in the
/// stream callback.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: ::cpal::HostId,
    /// The output stream and mixer.
    output: OutputManager,
    loader: Mutex<SampleLoader>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name,
            self.output.mixer.channels(),
            self.output.mixer.sample_rate(),
            self.host_id.name()
        )
    }
}

/// Owns the thread that keeps the cpal stream alive.
struct OutputManager {
    mixer: AudioMixer,
    failure: Failure,
    cancel: CancelHandle,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl OutputManager {
    /// Starts the output thread and waits until the stream is playing.
    fn start(
        device: ::cpal::Device,
        stream_config: ::cpal::StreamConfig,
        sample_format: ::cpal::SampleFormat,
    ) -> Result<OutputManager, Box<dyn Error>> {
        let mixer = AudioMixer::new(stream_config.channels, stream_config.sample_rate);
        let failure: Failure = Arc::new(Mutex::new(None));
        let cancel = CancelHandle::new();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let output_thread = {
            let mixer = mixer.clone();
            let failure = failure.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("soundboard-output".to_string())
                .spawn(move || {
                    // The stream isn't Send on every host, so it lives and dies here.
                    let stream = match sample_format {
                        ::cpal::SampleFormat::F32 => {
                            build_stream::<f32>(&device, &stream_config, mixer, failure)
                        }
                        ::cpal::SampleFormat::I16 => {
                            build_stream::<i16>(&device, &stream_config, mixer, failure)
                        }
                        ::cpal::SampleFormat::I32 => {
                            build_stream::<i32>(&device, &stream_config, mixer, failure)
                        }
                        ::cpal::SampleFormat::U16 => {
                            build_stream::<u16>(&device, &stream_config, mixer, failure)
                        }
                        other => Err(format!("unsupported sample format {}", other)),
                    };
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }

                    let _ = ready_tx.send(Ok(()));
                    cancel.wait();
                    debug!("Output thread stopping.");
                })?
        };

        let manager = OutputManager {
            mixer,
            failure,
            cancel,
            output_thread: Some(output_thread),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(manager),
            Ok(Err(e)) => Err(format!("unable to start output stream: {}", e).into()),
            Err(_) => Err("output thread exited before starting the stream".into()),
        }
    }
}

/// Builds an output stream that renders the mixer into samples of type T.
fn build_stream<T>(
    device: &::cpal::Device,
    stream_config: &::cpal::StreamConfig,
    mixer: AudioMixer,
    failure: Failure,
) -> Result<::cpal::Stream, String>
where
    T: SizedSample + FromSample<f32>,
{
    let error_mixer = mixer.clone();
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &::cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch);
                for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                    *dst = T::from_sample(*src);
                }
            },
            move |err| match err {
                ::cpal::StreamError::DeviceNotAvailable => {
                    error!(err = %err, "Output device went away.");
                    *failure.lock() = Some(err.to_string());
                    error_mixer.fail_playing(LifecycleKind::Errored(err.to_string()));
                }
                other => {
                    warn!(err = %other, "Output stream error.");
                    error_mixer.report_playing(LifecycleKind::Stalled);
                }
            },
            None,
        )
        .map_err(|e| e.to_string())
}

impl Device {
    /// Lists the names of all output devices on every available host.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let mut names = Vec::new();
        for host_id in ::cpal::available_hosts() {
            let devices = match ::cpal::host_from_id(host_id)?.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in devices {
                match device.name() {
                    Ok(name) => names.push(format!("{} ({})", name, host_id.name())),
                    Err(e) => debug!(err = %e, "Skipping device without a name."),
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Gets the configured output device and starts its stream.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let (host_id, device) = find_device(config.device())?;
        let name = device.name()?;

        let default_config = device.default_output_config()?;
        let sample_format = default_config.sample_format();
        let mut stream_config = default_config.config();
        if let Some(sample_rate) = config.sample_rate() {
            stream_config.sample_rate = sample_rate;
        }

        info!(
            device = name,
            host = host_id.name(),
            channels = stream_config.channels,
            sample_rate = stream_config.sample_rate,
            format = %sample_format,
            "Opening output device."
        );

        let loader = SampleLoader::new(stream_config.sample_rate, stream_config.channels);
        let output = OutputManager::start(device, stream_config, sample_format)?;

        Ok(Device {
            name,
            host_id,
            output,
            loader: Mutex::new(loader),
        })
    }
}

/// Finds an output device by name across every host. "default" selects the
/// default host's default output.
fn find_device(name: &str) -> Result<(::cpal::HostId, ::cpal::Device), Box<dyn Error>> {
    if name == DEFAULT_DEVICE {
        let host = ::cpal::default_host();
        return match host.default_output_device() {
            Some(device) => Ok((host.id(), device)),
            None => Err("no default output device".into()),
        };
    }

    for host_id in ::cpal::available_hosts() {
        let Ok(devices) = ::cpal::host_from_id(host_id)?.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok((host_id, device));
            }
        }
    }

    Err(format!("no device found with name {}", name).into())
}

impl super::Device for Device {
    fn open(&self, sample: &SampleDescriptor, events: EventSender) -> Box<dyn PlayableHandle> {
        let loaded = self.loader.lock().load(Path::new(sample.source()));
        let voice = match loaded {
            Ok(clip) => {
                let voice = Arc::new(Voice::new(sample.id(), clip, events));
                self.output.mixer.add_voice(voice.clone());
                Ok(voice)
            }
            Err(e) => {
                warn!(sample = sample.id(), source = sample.source(), err = %e, "Unable to load sample.");
                // Generation 0 is the one a freshly opened channel starts with.
                let _ = events.send(LifecycleEvent::new(
                    sample.id(),
                    0,
                    LifecycleKind::Errored(e.to_string()),
                ));
                Err(PlaybackError::Load {
                    source_path: sample.source().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        Box::new(Handle {
            voice,
            failure: self.output.failure.clone(),
        })
    }
}

/// A handle to a voice in the device's mixer.
struct Handle {
    /// The voice, or the reason the clip couldn't be loaded.
    voice: Result<Arc<Voice>, PlaybackError>,
    failure: Failure,
}

impl Handle {
    fn voice(&self) -> Result<&Voice, PlaybackError> {
        self.voice.as_deref().map_err(Clone::clone)
    }
}

impl PlayableHandle for Handle {
    fn play(&mut self, generation: u64) -> Result<(), PlaybackError> {
        if let Some(reason) = self.failure.lock().as_ref() {
            return Err(PlaybackError::Stream(reason.clone()));
        }
        self.voice()?.play(generation);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.voice()?.pause();
        Ok(())
    }

    fn reset_position(&mut self) -> Result<(), PlaybackError> {
        self.voice()?.reset();
        Ok(())
    }
}
