use crate::audio::{RESAMPLER_CHUNK_SIZE, StreamResampler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Regroups a sample stream into blocks of exactly `block_size` samples.
#[derive(Debug)]
pub struct CaptureBlocker {
    block_size: usize,
    pending: Vec<f32>,
}

impl CaptureBlocker {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Appends samples and returns every block that is now complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.block_size;
        let mut blocks = Vec::with_capacity(complete);
        for _ in 0..complete {
            blocks.push(self.pending.drain(..self.block_size).collect());
        }
        blocks
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Turns a raw microphone feed at `native_rate` into fixed-size blocks at
/// `target_rate`.
///
/// Blocks are handed on with `try_send`: if the consumer falls behind, the
/// block is dropped so capture never waits on it.
pub fn spawn_blocker(
    mut feed: mpsc::Receiver<Vec<f32>>,
    native_rate: u32,
    target_rate: u32,
    block_size: usize,
) -> anyhow::Result<(mpsc::Receiver<Vec<f32>>, JoinHandle<()>)> {
    let mut resampler = StreamResampler::new(native_rate, target_rate, RESAMPLER_CHUNK_SIZE)?;
    let mut blocker = CaptureBlocker::new(block_size);
    let (tx, rx) = mpsc::channel(64);

    let task = tokio::spawn(async move {
        while let Some(samples) = feed.recv().await {
            let resampled = resampler.process(&samples);
            for block in blocker.push(&resampled) {
                match tx.try_send(block) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Capture consumer is behind, dropping block");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            }
        }
    });
    Ok((rx, task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_exact() {
        let mut blocker = CaptureBlocker::new(4);
        assert!(blocker.push(&[0.1, 0.2, 0.3]).is_empty());
        let blocks = blocker.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(blocks, vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]);
        assert_eq!(blocker.pending(), 1);
    }

    #[test]
    fn test_zero_block_size_is_clamped() {
        let mut blocker = CaptureBlocker::new(0);
        assert_eq!(blocker.block_size(), 1);
        assert_eq!(blocker.push(&[0.5, 0.5]).len(), 2);
    }

    #[tokio::test]
    async fn test_spawned_blocker_at_native_rate() {
        let (feed_tx, feed_rx) = mpsc::channel(8);
        let (mut blocks, task) = spawn_blocker(feed_rx, 16_000, 16_000, 1024).unwrap();

        feed_tx.send(vec![0.25; 700]).await.unwrap();
        feed_tx.send(vec![0.25; 700]).await.unwrap();
        drop(feed_tx);

        let block = blocks.recv().await.unwrap();
        assert_eq!(block.len(), 1024);
        assert!(blocks.recv().await.is_none());
        task.await.unwrap();
    }
}
