//! Microphone capture.
//!
//! Opens the default input device, downmixes to mono, chops the signal into
//! wire-sized frames and hands the encoded payloads to the transport. The
//! cpal stream lives on its own thread for the same `Send` reason as the
//! output side; the handle only carries the shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};
use dasp_sample::Sample as DaspSample;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::audio::frame::{FRAME_SAMPLES, Frame, SAMPLE_RATE};

/// Running capture stream. Dropping the handle stops capture.
pub struct CaptureHandle {
    shutdown: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Start capturing; encoded frame payloads go to `outgoing`.
    pub fn start(outgoing: UnboundedSender<Vec<u8>>) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        std::thread::spawn(move || {
            let stream = match build_stream(outgoing) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !thread_shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        });

        ready_rx
            .recv()
            .context("Capture thread exited before reporting status")??;

        info!("Audio capture started");

        Ok(Self { shutdown })
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(outgoing: UnboundedSender<Vec<u8>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No input device available")?;

    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let default_config = device
        .default_input_config()
        .context("Failed to get default input config")?;

    let stream_config = StreamConfig {
        channels: default_config.channels().min(2),
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match default_config.sample_format() {
        SampleFormat::I16 => build_input_stream::<i16>(&device, &stream_config, outgoing)?,
        SampleFormat::U16 => build_input_stream::<u16>(&device, &stream_config, outgoing)?,
        SampleFormat::F32 => build_input_stream::<f32>(&device, &stream_config, outgoing)?,
        format => anyhow::bail!("Unsupported sample format: {:?}", format),
    };

    stream.play().context("Failed to play input stream")?;
    Ok(stream)
}

fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    outgoing: UnboundedSender<Vec<u8>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
{
    let channels = config.channels as usize;
    let mut mono = Vec::with_capacity(FRAME_SAMPLES);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for device_frame in data.chunks_exact(channels) {
                    // Downmix by averaging the channels.
                    let sum: f32 = device_frame
                        .iter()
                        .map(|s| {
                            let f: f32 = s.to_float_sample().to_sample();
                            f
                        })
                        .sum();
                    mono.push(sum / channels as f32);

                    if mono.len() >= FRAME_SAMPLES {
                        let payload = Frame::encode(&mono[..FRAME_SAMPLES]);
                        mono.clear();
                        if outgoing.send(payload).is_err() {
                            warn!("Transport gone, dropping captured frame");
                        }
                    }
                }
            },
            move |err| {
                error!("Audio capture error: {}", err);
            },
            None,
        )
        .context("Failed to build input stream")?;

    Ok(stream)
}
