//! cpal implementation of the intake session's audio seam.
//!
//! cpal streams are not `Send`, so each stream lives on its own thread and is
//! dropped there when the owning handle stops it.

use crate::audio::{mixdown, resample_buffer};
use crate::capture::spawn_blocker;
use crate::device;
use crate::mixer::PlaybackTimeline;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use locallink_core::audio_io::{
    AudioBackend, CaptureContext, MicrophoneStream, PlaybackContext, PlaybackSource,
};
use locallink_core::error::IntakeError;
use locallink_core::pcm::PcmBuffer;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MIC_FEED_CAPACITY: usize = 256;

/// Opens the default (or named) devices of the default host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

/// Owns the thread that keeps one cpal stream alive.
struct StreamThread {
    stop: Option<std::sync::mpsc::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl StreamThread {
    /// Runs `build` on a new thread and keeps the stream it returns playing
    /// until [`StreamThread::stop`]. `ready` receives the build result.
    fn spawn<T, F>(
        name: &str,
        build: F,
    ) -> Result<(Self, std::sync::mpsc::Receiver<Result<T, IntakeError>>), IntakeError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<(cpal::Stream, T), IntakeError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match build() {
                Ok((stream, value)) => {
                    if ready_tx.send(Ok(value)).is_err() {
                        return;
                    }
                    // Blocks until stopped or the handle is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| IntakeError::AudioUnavailable(format!("cannot spawn {name}: {e}")))?;
        Ok((
            Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            ready_rx,
        ))
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Audio stream thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn await_ready<T>(
    ready: std::sync::mpsc::Receiver<Result<T, IntakeError>>,
) -> Result<T, IntakeError> {
    ready
        .recv()
        .map_err(|_| IntakeError::AudioUnavailable("audio thread exited during setup".into()))?
}

#[async_trait]
impl AudioBackend for CpalBackend {
    async fn request_microphone(&self) -> Result<Box<dyn MicrophoneStream>, IntakeError> {
        let device_name = self.input_device.clone();
        let (feed_tx, feed_rx) = mpsc::channel::<Vec<f32>>(MIC_FEED_CAPACITY);

        let (thread, ready) = StreamThread::spawn("mic-stream", move || {
            let input = device::get_or_default_input(device_name.as_deref())
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            let config = input
                .default_input_config()
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            let channels = config.channels() as usize;
            let rate = config.sample_rate().0;
            tracing::info!(
                "Using input device {:?} ({}ch, {}hz)",
                input.name().ok(),
                channels,
                rate
            );

            let data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Err(e) = feed_tx.try_send(mixdown(data, channels)) {
                    tracing::debug!("Microphone feed is full: {}", e);
                }
            };
            let stream = input
                .build_input_stream(
                    &config.config(),
                    data_fn,
                    move |err| tracing::error!("An error occurred on input stream: {}", err),
                    None,
                )
                .map_err(|e| IntakeError::PermissionDenied(e.to_string()))?;
            stream
                .play()
                .map_err(|e| IntakeError::PermissionDenied(e.to_string()))?;
            Ok((stream, rate))
        })?;

        let rate = tokio::task::spawn_blocking(move || await_ready(ready))
            .await
            .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))??;

        Ok(Box::new(CpalMicrophone {
            feed: Some(feed_rx),
            rate,
            stream: Some(thread),
        }))
    }

    fn open_capture(&self, sample_rate: u32) -> Result<Box<dyn CaptureContext>, IntakeError> {
        Ok(Box::new(BlockingCapture {
            sample_rate,
            task: None,
            closed: false,
        }))
    }

    async fn open_playback(
        &self,
        sample_rate: u32,
    ) -> Result<Arc<dyn PlaybackContext>, IntakeError> {
        let device_name = self.output_device.clone();
        let timeline: Arc<Mutex<Option<PlaybackTimeline>>> = Arc::new(Mutex::new(None));
        let render_timeline = timeline.clone();

        let (thread, ready) = StreamThread::spawn("playback-stream", move || {
            let output = device::get_or_default_output(device_name.as_deref())
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            let default = output
                .default_output_config()
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            let config = StreamConfig {
                channels: default.channels(),
                sample_rate: SampleRate(default.sample_rate().0),
                buffer_size: cpal::BufferSize::Default,
            };
            let channels = config.channels as usize;
            let device_rate = config.sample_rate.0;
            *lock(&render_timeline) = Some(PlaybackTimeline::new(device_rate));
            tracing::info!(
                "Using output device {:?} ({}ch, {}hz)",
                output.name().ok(),
                channels,
                device_rate
            );

            let mut mono = Vec::new();
            let data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mono.resize(data.len() / channels.max(1), 0.0);
                let finished = match lock(&render_timeline).as_mut() {
                    Some(timeline) => timeline.render(&mut mono),
                    None => {
                        data.fill(0.0);
                        return;
                    }
                };
                for (frame, sample) in data.chunks_mut(channels.max(1)).zip(&mono) {
                    frame.fill(*sample);
                }
                for on_ended in finished {
                    on_ended();
                }
            };
            let stream = output
                .build_output_stream(
                    &config,
                    data_fn,
                    move |err| tracing::error!("An error occurred on output stream: {}", err),
                    None,
                )
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            stream
                .play()
                .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
            Ok((stream, device_rate))
        })?;
        let device_rate = tokio::task::spawn_blocking(move || await_ready(ready))
            .await
            .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))??;

        Ok(Arc::new(CpalPlayback {
            declared_rate: sample_rate,
            device_rate,
            timeline,
            stream: Mutex::new(Some(thread)),
        }))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct CpalMicrophone {
    feed: Option<mpsc::Receiver<Vec<f32>>>,
    rate: u32,
    stream: Option<StreamThread>,
}

impl MicrophoneStream for CpalMicrophone {
    fn take_feed(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.feed.take()
    }

    fn native_rate(&self) -> u32 {
        self.rate
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!("Microphone released");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

/// Resamples the microphone to the declared rate and cuts it into blocks.
struct BlockingCapture {
    sample_rate: u32,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl CaptureContext for BlockingCapture {
    fn attach(
        &mut self,
        microphone: &mut dyn MicrophoneStream,
        block_size: usize,
    ) -> Result<mpsc::Receiver<Vec<f32>>, IntakeError> {
        if self.closed {
            return Err(IntakeError::AudioUnavailable("capture context is closed".into()));
        }
        let feed = microphone
            .take_feed()
            .ok_or_else(|| IntakeError::AudioUnavailable("microphone already attached".into()))?;
        let (blocks, task) = spawn_blocker(feed, microphone.native_rate(), self.sample_rate, block_size)
            .map_err(|e| IntakeError::AudioUnavailable(e.to_string()))?;
        self.task = Some(task);
        Ok(blocks)
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct CpalPlayback {
    declared_rate: u32,
    device_rate: u32,
    timeline: Arc<Mutex<Option<PlaybackTimeline>>>,
    stream: Mutex<Option<StreamThread>>,
}

impl PlaybackContext for CpalPlayback {
    fn sample_rate(&self) -> u32 {
        self.declared_rate
    }

    fn current_time(&self) -> f64 {
        lock(&self.timeline)
            .as_ref()
            .map(PlaybackTimeline::current_time)
            .unwrap_or(0.0)
    }

    fn start(
        &self,
        buffer: PcmBuffer,
        at: f64,
        on_ended: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn PlaybackSource> {
        let samples = resample_buffer(&buffer.samples, buffer.format.sample_rate, self.device_rate)
            .unwrap_or_else(|e| {
                tracing::warn!("Cannot resample playback buffer: {}", e);
                Vec::new()
            });
        let id = lock(&self.timeline)
            .as_mut()
            .map(|timeline| timeline.schedule(samples, at, on_ended));
        Box::new(TimelineSource {
            id,
            timeline: Arc::downgrade(&self.timeline),
        })
    }

    fn close(&self) {
        if let Some(mut stream) = lock(&self.stream).take() {
            stream.stop();
            tracing::debug!("Playback context closed");
        }
        if let Some(timeline) = lock(&self.timeline).as_mut() {
            timeline.clear();
        }
    }

    fn is_closed(&self) -> bool {
        lock(&self.stream).is_none()
    }
}

struct TimelineSource {
    id: Option<u64>,
    timeline: Weak<Mutex<Option<PlaybackTimeline>>>,
}

impl PlaybackSource for TimelineSource {
    fn stop(&mut self) {
        let (Some(id), Some(timeline)) = (self.id.take(), self.timeline.upgrade()) else {
            return;
        };
        if let Some(timeline) = lock(&timeline).as_mut() {
            timeline.stop(id);
        }
    }
}
