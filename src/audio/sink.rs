//! Audio output.
//!
//! The playback scheduler talks to a minimal [`AudioSink`] seam: render one
//! frame, await completion, treat errors as transient. [`CpalSink`] is the
//! real implementation, feeding a cpal output stream through an SPSC ring so
//! the device callback never blocks on the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};
use dasp_sample::FromSample;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{error, info};

use crate::audio::frame::SAMPLE_RATE;

/// How many whole frames the device ring holds. Backpressure from a full
/// ring is what paces the scheduler to real time, so this also bounds the
/// latency added by the sink itself.
const RING_FRAMES: usize = 2;

/// Destination for decoded audio.
///
/// The scheduler keeps exactly one render in flight: the returned future
/// resolving is the completion signal, an `Err` is the failure signal.
/// Failures are transient; the caller skips the frame and continues.
#[async_trait]
pub trait AudioSink: Send {
    async fn render(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Release device resources. Further renders may fail.
    fn close(&mut self);
}

/// Plays frames on the default cpal output device.
///
/// The device stream lives on its own thread because cpal streams are not
/// `Send` on every platform; this handle only owns the producer side of the
/// ring plus shutdown/error flags, and can move into the scheduler task.
pub struct CpalSink {
    producer: Producer<Vec<f32>>,
    shutdown: Arc<AtomicBool>,
    stream_error: Arc<AtomicBool>,
}

impl CpalSink {
    /// Open the default output device and start its stream.
    pub fn open() -> Result<Self> {
        let (producer, consumer) = RingBuffer::<Vec<f32>>::new(RING_FRAMES);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let thread_shutdown = shutdown.clone();
        let thread_error = stream_error.clone();

        std::thread::spawn(move || {
            let stream = match build_stream(consumer, thread_error) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Keep the stream alive until the sink is closed.
            while !thread_shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        });

        ready_rx
            .recv()
            .context("Audio output thread exited before reporting status")??;

        info!("Audio output started");

        Ok(Self {
            producer,
            shutdown,
            stream_error,
        })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn render(&mut self, samples: Vec<f32>) -> Result<()> {
        push_until_accepted(
            &mut self.producer,
            &self.shutdown,
            &self.stream_error,
            samples,
        )
        .await
    }

    fn close(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Push one frame into the device ring, yielding while it is full.
///
/// Both flags are re-checked on every iteration: a device that fails while
/// the ring is full stops draining it, and the only way out is the error
/// flag. Returning `Err` here is the transient render failure the scheduler
/// skips past, so this must never wait forever.
async fn push_until_accepted(
    producer: &mut Producer<Vec<f32>>,
    shutdown: &AtomicBool,
    stream_error: &AtomicBool,
    samples: Vec<f32>,
) -> Result<()> {
    let mut samples = samples;
    loop {
        if stream_error.swap(false, Ordering::AcqRel) {
            anyhow::bail!("output stream reported an error");
        }
        if shutdown.load(Ordering::Relaxed) {
            anyhow::bail!("output stream is closed");
        }

        match producer.push(samples) {
            Ok(()) => return Ok(()),
            Err(rtrb::PushError::Full(rejected)) => {
                // Device ring is full: the previous frames have not
                // played out yet. Yield until the callback drains one.
                samples = rejected;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }
}

fn build_stream(
    consumer: Consumer<Vec<f32>>,
    stream_error: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("No output device available")?;

    info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let default_config = device
        .default_output_config()
        .context("Failed to get default output config")?;

    let stream_config = StreamConfig {
        channels: default_config.channels().min(2),
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match default_config.sample_format() {
        SampleFormat::I16 => {
            build_output_stream::<i16>(&device, &stream_config, consumer, stream_error)?
        }
        SampleFormat::U16 => {
            build_output_stream::<u16>(&device, &stream_config, consumer, stream_error)?
        }
        SampleFormat::F32 => {
            build_output_stream::<f32>(&device, &stream_config, consumer, stream_error)?
        }
        format => anyhow::bail!("Unsupported sample format: {:?}", format),
    };

    stream.play().context("Failed to play output stream")?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: Consumer<Vec<f32>>,
    stream_error: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut current: Vec<f32> = Vec::new();
    let mut index = 0;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for device_frame in data.chunks_mut(channels) {
                    if index >= current.len() {
                        match consumer.pop() {
                            Ok(frame) => {
                                current = frame;
                                index = 0;
                            }
                            Err(_) => {
                                current.clear();
                                index = 0;
                            }
                        }
                    }

                    // Mono source duplicated across device channels,
                    // silence on underrun.
                    let sample = if index < current.len() {
                        let s = current[index];
                        index += 1;
                        s
                    } else {
                        0.0
                    };

                    for slot in device_frame.iter_mut() {
                        *slot = T::from_sample(sample);
                    }
                }
            },
            {
                let stream_error = stream_error.clone();
                move |err| {
                    error!("Audio output error: {}", err);
                    stream_error.store(true, Ordering::Release);
                }
            },
            None,
        )
        .context("Failed to build output stream")?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_succeeds_with_free_slot() {
        let (mut producer, _consumer) = RingBuffer::<Vec<f32>>::new(RING_FRAMES);
        let shutdown = AtomicBool::new(false);
        let stream_error = AtomicBool::new(false);

        push_until_accepted(&mut producer, &shutdown, &stream_error, vec![0.5; 4])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_ring_with_dead_stream_fails_instead_of_hanging() {
        let (mut producer, _consumer) = RingBuffer::<Vec<f32>>::new(1);
        producer.push(vec![0.0; 4]).unwrap();

        // The error callback fired while the ring was full; nothing will
        // ever drain it again.
        let shutdown = AtomicBool::new(false);
        let stream_error = AtomicBool::new(true);

        let result =
            push_until_accepted(&mut producer, &shutdown, &stream_error, vec![0.5; 4]).await;
        assert!(result.is_err());
        // The flag is consumed by reporting the failure.
        assert!(!stream_error.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_close_during_backpressure_unblocks_render() {
        let (mut producer, _consumer) = RingBuffer::<Vec<f32>>::new(1);
        producer.push(vec![0.0; 4]).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(AtomicBool::new(false));

        let setter = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.store(true, Ordering::Relaxed);
        });

        let result =
            push_until_accepted(&mut producer, &shutdown, &stream_error, vec![0.5; 4]).await;
        assert!(result.is_err());
    }
}
