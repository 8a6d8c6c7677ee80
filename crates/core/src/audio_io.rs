//! Audio device seam.
//!
//! The session talks to microphones and speakers only through these traits, so
//! the native backend, a "no audio" backend and test fakes are interchangeable.

use crate::error::IntakeError;
use crate::pcm::PcmBuffer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Asks for the microphone. Refusal is `IntakeError::PermissionDenied`.
    async fn request_microphone(&self) -> Result<Box<dyn MicrophoneStream>, IntakeError>;

    /// A capture context delivering mono blocks at `sample_rate`.
    fn open_capture(&self, sample_rate: u32) -> Result<Box<dyn CaptureContext>, IntakeError>;

    /// An output context that accepts buffers declared at `sample_rate`.
    async fn open_playback(
        &self,
        sample_rate: u32,
    ) -> Result<Arc<dyn PlaybackContext>, IntakeError>;
}

pub trait MicrophoneStream: Send {
    /// Raw mono samples at [`MicrophoneStream::native_rate`]. Yields `Some` once.
    fn take_feed(&mut self) -> Option<mpsc::Receiver<Vec<f32>>>;
    fn native_rate(&self) -> u32;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

pub trait CaptureContext: Send {
    /// Routes the microphone through this context and returns fixed-size blocks.
    fn attach(
        &mut self,
        microphone: &mut dyn MicrophoneStream,
        block_size: usize,
    ) -> Result<mpsc::Receiver<Vec<f32>>, IntakeError>;
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

pub trait PlaybackContext: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// The playback clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedules `buffer` to start at `at` seconds on the playback clock.
    /// `on_ended` runs once when playback finishes naturally, never after `stop`
    /// and never from inside `start`.
    fn start(
        &self,
        buffer: PcmBuffer,
        at: f64,
        on_ended: Box<dyn FnOnce() + Send>,
    ) -> Box<dyn PlaybackSource>;

    fn close(&self);
    fn is_closed(&self) -> bool;
}

pub trait PlaybackSource: Send {
    fn stop(&mut self);
}

/// Fakes shared by the pipeline and session tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Scheduled {
        pub id: usize,
        pub at: f64,
        pub duration: f64,
    }

    /// A playback context with a manually driven clock.
    #[derive(Default)]
    pub struct FakePlayback {
        pub now: Mutex<f64>,
        pub scheduled: Mutex<Vec<Scheduled>>,
        pub stopped: Arc<Mutex<Vec<usize>>>,
        pub closed: AtomicBool,
        endings: Mutex<Vec<(usize, Box<dyn FnOnce() + Send>)>>,
        next_id: AtomicUsize,
    }

    impl FakePlayback {
        pub fn set_time(&self, t: f64) {
            *self.now.lock().unwrap() = t;
        }

        /// Fires `on_ended` for every source scheduled to finish by the current time.
        pub fn finish_due(&self) {
            let now = *self.now.lock().unwrap();
            let scheduled = self.scheduled.lock().unwrap().clone();
            let due: Vec<usize> = scheduled
                .iter()
                .filter(|s| s.at + s.duration <= now + 1e-9)
                .map(|s| s.id)
                .collect();
            let callbacks: Vec<_> = {
                let mut endings = self.endings.lock().unwrap();
                let (fire, keep): (Vec<_>, Vec<_>) =
                    endings.drain(..).partition(|(id, _)| due.contains(id));
                *endings = keep;
                fire
            };
            for (_, cb) in callbacks {
                cb();
            }
        }
    }

    impl PlaybackContext for FakePlayback {
        fn sample_rate(&self) -> u32 {
            crate::pcm::DOWNLINK_SAMPLE_RATE
        }

        fn current_time(&self) -> f64 {
            *self.now.lock().unwrap()
        }

        fn start(
            &self,
            buffer: PcmBuffer,
            at: f64,
            on_ended: Box<dyn FnOnce() + Send>,
        ) -> Box<dyn PlaybackSource> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.scheduled.lock().unwrap().push(Scheduled {
                id,
                at,
                duration: buffer.duration(),
            });
            self.endings.lock().unwrap().push((id, on_ended));
            Box::new(FakeSource {
                id,
                stopped: self.stopped.clone(),
            })
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct FakeSource {
        id: usize,
        stopped: Arc<Mutex<Vec<usize>>>,
    }

    impl PlaybackSource for FakeSource {
        fn stop(&mut self) {
            self.stopped.lock().unwrap().push(self.id);
        }
    }

    /// Observable state of every device the fake backend handed out.
    #[derive(Default)]
    pub struct DeviceProbe {
        pub microphones_open: AtomicUsize,
        pub captures_open: AtomicUsize,
        pub playbacks_open: AtomicUsize,
        pub playbacks: Mutex<Vec<Arc<FakePlayback>>>,
        /// Feeds into the most recent microphone.
        pub mic_tx: Mutex<Option<mpsc::Sender<Vec<f32>>>>,
    }

    impl DeviceProbe {
        pub fn open_total(&self) -> usize {
            self.microphones_open.load(Ordering::SeqCst)
                + self.captures_open.load(Ordering::SeqCst)
                + self.playbacks_open.load(Ordering::SeqCst)
        }

        pub fn last_playback(&self) -> Option<Arc<FakePlayback>> {
            self.playbacks.lock().unwrap().last().cloned()
        }
    }

    pub struct FakeBackend {
        pub probe: Arc<DeviceProbe>,
        pub deny_microphone: bool,
        pub fail_playback: bool,
        /// When set, `open_playback` signals `entered` and waits for `release`.
        pub playback_gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                probe: Arc::new(DeviceProbe::default()),
                deny_microphone: false,
                fail_playback: false,
                playback_gate: None,
            }
        }
    }

    #[async_trait]
    impl AudioBackend for FakeBackend {
        async fn request_microphone(&self) -> Result<Box<dyn MicrophoneStream>, IntakeError> {
            if self.deny_microphone {
                return Err(IntakeError::PermissionDenied("user dismissed prompt".into()));
            }
            let (tx, rx) = mpsc::channel(64);
            *self.probe.mic_tx.lock().unwrap() = Some(tx);
            self.probe.microphones_open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeMicrophone {
                feed: Some(rx),
                active: true,
                probe: self.probe.clone(),
            }))
        }

        fn open_capture(&self, _sample_rate: u32) -> Result<Box<dyn CaptureContext>, IntakeError> {
            self.probe.captures_open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeCapture {
                closed: false,
                probe: self.probe.clone(),
            }))
        }

        async fn open_playback(
            &self,
            _sample_rate: u32,
        ) -> Result<Arc<dyn PlaybackContext>, IntakeError> {
            if let Some((entered, release)) = &self.playback_gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.fail_playback {
                return Err(IntakeError::AudioUnavailable("no output device".into()));
            }
            self.probe.playbacks_open.fetch_add(1, Ordering::SeqCst);
            let playback = Arc::new(FakePlayback::default());
            self.probe.playbacks.lock().unwrap().push(playback.clone());
            Ok(Arc::new(TrackedPlayback {
                inner: playback,
                probe: self.probe.clone(),
            }))
        }
    }

    struct FakeMicrophone {
        feed: Option<mpsc::Receiver<Vec<f32>>>,
        active: bool,
        probe: Arc<DeviceProbe>,
    }

    impl MicrophoneStream for FakeMicrophone {
        fn take_feed(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
            self.feed.take()
        }

        fn native_rate(&self) -> u32 {
            crate::pcm::UPLINK_SAMPLE_RATE
        }

        fn stop(&mut self) {
            if self.active {
                self.active = false;
                self.probe.microphones_open.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    struct FakeCapture {
        closed: bool,
        probe: Arc<DeviceProbe>,
    }

    impl CaptureContext for FakeCapture {
        fn attach(
            &mut self,
            microphone: &mut dyn MicrophoneStream,
            _block_size: usize,
        ) -> Result<mpsc::Receiver<Vec<f32>>, IntakeError> {
            microphone
                .take_feed()
                .ok_or_else(|| IntakeError::AudioUnavailable("microphone already attached".into()))
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.probe.captures_open.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    struct TrackedPlayback {
        inner: Arc<FakePlayback>,
        probe: Arc<DeviceProbe>,
    }

    impl PlaybackContext for TrackedPlayback {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn current_time(&self) -> f64 {
            self.inner.current_time()
        }

        fn start(
            &self,
            buffer: PcmBuffer,
            at: f64,
            on_ended: Box<dyn FnOnce() + Send>,
        ) -> Box<dyn PlaybackSource> {
            self.inner.start(buffer, at, on_ended)
        }

        fn close(&self) {
            if !self.inner.is_closed() {
                self.inner.close();
                self.probe.playbacks_open.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }
}
