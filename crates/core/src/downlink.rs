use crate::audio_io::{PlaybackContext, PlaybackSource};
use crate::error::IntakeError;
use crate::pcm::{self, PcmBuffer, PcmFormat};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Gapless scheduling state for inbound speech.
///
/// Each buffer starts at `max(now, cursor)` and moves the cursor forward by
/// exactly its duration, so back-to-back fragments never overlap or leave gaps
/// while the clock is behind the cursor.
#[derive(Default)]
pub struct PlaybackSchedule {
    cursor: f64,
    live: HashMap<u64, Box<dyn PlaybackSource>>,
    next_id: u64,
}

impl PlaybackSchedule {
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Reserves the slot for a buffer of `duration` seconds and returns its start.
    fn reserve(&mut self, now: f64, duration: f64) -> (u64, f64) {
        let start = self.cursor.max(now);
        self.cursor = start + duration;
        let id = self.next_id;
        self.next_id += 1;
        (id, start)
    }

    fn take_all(&mut self) -> Vec<Box<dyn PlaybackSource>> {
        self.cursor = 0.0;
        self.live.drain().map(|(_, source)| source).collect()
    }
}

/// Decodes inbound frames and plays them back to back.
pub struct DownlinkPipeline {
    context: Arc<dyn PlaybackContext>,
    schedule: Arc<Mutex<PlaybackSchedule>>,
}

impl DownlinkPipeline {
    pub fn new(context: Arc<dyn PlaybackContext>) -> Self {
        Self {
            context,
            schedule: Arc::new(Mutex::new(PlaybackSchedule::default())),
        }
    }

    /// Decodes and schedules one fragment. Returns the start time on the playback clock.
    pub fn schedule_base64(&self, data: &str, mime_type: &str) -> Result<f64, IntakeError> {
        let format = PcmFormat::from_mime(mime_type).unwrap_or(PcmFormat::DOWNLINK);
        let samples = pcm::decode_f32(data)?;
        Ok(self.schedule_buffer(PcmBuffer::new(samples, format)))
    }

    /// Like [`DownlinkPipeline::schedule_base64`] but logs and skips bad frames.
    pub fn push(&self, data: &str, mime_type: &str) {
        if let Err(e) = self.schedule_base64(data, mime_type) {
            tracing::warn!("Skipping undecodable audio frame: {}", e);
        }
    }

    pub fn schedule_buffer(&self, buffer: PcmBuffer) -> f64 {
        let now = self.context.current_time();
        let mut schedule = lock(&self.schedule);
        if buffer.frames() == 0 {
            return schedule.cursor.max(now);
        }
        let (id, start) = schedule.reserve(now, buffer.duration());

        let weak: Weak<Mutex<PlaybackSchedule>> = Arc::downgrade(&self.schedule);
        let on_ended = Box::new(move || {
            if let Some(schedule) = weak.upgrade() {
                lock(&schedule).live.remove(&id);
            }
        });
        let source = self.context.start(buffer, start, on_ended);
        schedule.live.insert(id, source);
        tracing::debug!("Scheduled audio fragment {} at {:.3}s", id, start);
        start
    }

    /// Stops every scheduled fragment and resets the cursor.
    pub fn stop_all(&self) {
        let sources = lock(&self.schedule).take_all();
        if !sources.is_empty() {
            tracing::debug!("Stopping {} scheduled audio fragments", sources.len());
        }
        for mut source in sources {
            source.stop();
        }
    }

    pub fn cursor(&self) -> f64 {
        lock(&self.schedule).cursor()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.schedule).live_count()
    }

    pub fn context(&self) -> &Arc<dyn PlaybackContext> {
        &self.context
    }
}

fn lock(schedule: &Mutex<PlaybackSchedule>) -> std::sync::MutexGuard<'_, PlaybackSchedule> {
    schedule.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
