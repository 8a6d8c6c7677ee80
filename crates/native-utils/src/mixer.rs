use std::collections::BTreeMap;

type EndedCallback = Box<dyn FnOnce() + Send>;

struct Voice {
    start_frame: u64,
    samples: Vec<f32>,
    on_ended: Option<EndedCallback>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// A sample-accurate mono playback timeline.
///
/// The clock is the number of frames rendered so far. Buffers are placed at an
/// absolute time on that clock and mixed into whatever the output device pulls.
pub struct PlaybackTimeline {
    sample_rate: u32,
    position: u64,
    voices: BTreeMap<u64, Voice>,
    next_id: u64,
}

impl PlaybackTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            position: 0,
            voices: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds rendered so far.
    pub fn current_time(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Places `samples` at `at` seconds. A start in the past plays immediately.
    pub fn schedule(&mut self, samples: Vec<f32>, at: f64, on_ended: EndedCallback) -> u64 {
        let requested = (at.max(0.0) * self.sample_rate as f64).round() as u64;
        let id = self.next_id;
        self.next_id += 1;
        self.voices.insert(
            id,
            Voice {
                start_frame: requested.max(self.position),
                samples,
                on_ended: Some(on_ended),
            },
        );
        id
    }

    /// Removes a voice without running its callback.
    pub fn stop(&mut self, id: u64) -> bool {
        self.voices.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Mixes the next `out.len()` frames into `out` and advances the clock.
    ///
    /// Returns the callbacks of voices that finished. The caller runs them once
    /// it no longer holds the timeline.
    #[must_use]
    pub fn render(&mut self, out: &mut [f32]) -> Vec<EndedCallback> {
        out.fill(0.0);
        let window_start = self.position;
        let window_end = window_start + out.len() as u64;

        for voice in self.voices.values() {
            if voice.start_frame >= window_end || voice.end_frame() <= window_start {
                continue;
            }
            let from = voice.start_frame.max(window_start);
            let to = voice.end_frame().min(window_end);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                let slot = &mut out[(frame - window_start) as usize];
                *slot = (*slot + sample).clamp(-1.0, 1.0);
            }
        }
        self.position = window_end;

        let finished: Vec<u64> = self
            .voices
            .iter()
            .filter(|(_, v)| v.end_frame() <= window_end)
            .map(|(id, _)| *id)
            .collect();
        finished
            .into_iter()
            .filter_map(|id| self.voices.remove(&id).and_then(|mut v| v.on_ended.take()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> EndedCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as EndedCallback
        })
    }

    #[test]
    fn test_back_to_back_buffers_are_gapless() {
        let mut timeline = PlaybackTimeline::new(10);
        let (ended, cb) = counter();
        timeline.schedule(vec![0.1; 5], 0.0, cb());
        timeline.schedule(vec![0.2; 5], 0.5, cb());

        let mut out = vec![0.0; 10];
        for callback in timeline.render(&mut out) {
            callback();
        }
        assert_eq!(out, [vec![0.1; 5], vec![0.2; 5]].concat());
        assert_eq!(ended.load(Ordering::SeqCst), 2);
        assert_eq!(timeline.active(), 0);
        assert_eq!(timeline.current_time(), 1.0);
    }

    #[test]
    fn test_future_start_and_partial_windows() {
        let mut timeline = PlaybackTimeline::new(10);
        let (ended, cb) = counter();
        timeline.schedule(vec![0.5; 4], 0.3, cb());

        let mut out = vec![0.0; 5];
        assert!(timeline.render(&mut out).is_empty());
        assert_eq!(out, vec![0.0, 0.0, 0.0, 0.5, 0.5]);

        let callbacks = timeline.render(&mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.0, 0.0]);
        assert_eq!(callbacks.len(), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_past_start_plays_now_and_stop_skips_callback() {
        let mut timeline = PlaybackTimeline::new(10);
        let mut out = vec![0.0; 10];
        let _ = timeline.render(&mut out);

        let (ended, cb) = counter();
        let id = timeline.schedule(vec![0.3; 3], 0.2, cb());
        let mut out = vec![0.0; 2];
        let _ = timeline.render(&mut out);
        assert_eq!(out, vec![0.3, 0.3]);

        assert!(timeline.stop(id));
        assert!(!timeline.stop(id));
        let _ = timeline.render(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overlapping_voices_mix_and_clamp() {
        let mut timeline = PlaybackTimeline::new(10);
        let (_, cb) = counter();
        timeline.schedule(vec![0.7; 2], 0.0, cb());
        timeline.schedule(vec![0.7; 2], 0.0, cb());
        let mut out = vec![0.0; 2];
        let _ = timeline.render(&mut out);
        assert_eq!(out, vec![1.0, 1.0]);
    }
}
