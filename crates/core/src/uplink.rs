use crate::pcm::{AudioFrame, PcmFormat};
use crate::realtime_api::FrameSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Samples per capture block at 16 kHz (64 ms).
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

#[derive(Debug, Default)]
pub struct UplinkStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl UplinkStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Encodes capture blocks and offers them to the transport.
///
/// Frames the transport cannot take immediately are dropped, never queued.
pub struct UplinkPipeline {
    task: Option<JoinHandle<()>>,
    stats: Arc<UplinkStats>,
}

impl UplinkPipeline {
    pub fn spawn(mut blocks: mpsc::Receiver<Vec<f32>>, sink: Arc<dyn FrameSink>) -> Self {
        let stats = Arc::new(UplinkStats::default());
        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            while let Some(block) = blocks.recv().await {
                if block.is_empty() {
                    continue;
                }
                let frame = AudioFrame::from_samples(&block, PcmFormat::UPLINK);
                if sink.offer(frame) {
                    task_stats.sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    let dropped = task_stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped.is_power_of_two() {
                        tracing::debug!("Uplink dropped {} frames so far", dropped);
                    }
                }
            }
            tracing::debug!("Capture feed ended, uplink stopping");
        });
        Self {
            task: Some(task),
            stats,
        }
    }

    pub fn stats(&self) -> Arc<UplinkStats> {
        self.stats.clone()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!(
                "Uplink stopped: {} frames sent, {} dropped",
                self.stats.sent(),
                self.stats.dropped()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for UplinkPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
