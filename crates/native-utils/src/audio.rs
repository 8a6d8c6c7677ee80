use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input frames per resampler call.
pub const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Creates a mono resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, padding the last one with zeros.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Averages interleaved channels down to mono.
pub fn mixdown(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples a continuous mono stream delivered in arbitrary slices.
///
/// Samples that don't fill a whole resampler chunk are kept for the next call.
/// When both rates match the stream passes through untouched.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let inner = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate as f64, out_rate as f64, chunk_size)?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk.as_slice()], None) {
                Ok(frames) => {
                    if let Some(channel) = frames.first() {
                        out.extend_from_slice(channel);
                    }
                }
                Err(e) => {
                    tracing::warn!("Resampling failed, dropping chunk: {}", e);
                    break;
                }
            }
        }
        out
    }

    /// Pads whatever is pending with silence and pushes it through.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(resampler) = self.inner.as_ref() else {
            return Vec::new();
        };
        if self.pending.is_empty() {
            return Vec::new();
        }
        let needed = resampler.input_frames_next();
        let padding = vec![0.0; needed - self.pending.len() % needed];
        self.process(&padding)
    }
}

/// Resamples one complete buffer. The result has exactly the length implied
/// by the rate ratio.
pub fn resample_buffer(samples: &[f32], in_rate: u32, out_rate: u32) -> anyhow::Result<Vec<f32>> {
    if in_rate == out_rate {
        return Ok(samples.to_vec());
    }
    let mut resampler = StreamResampler::new(in_rate, out_rate, RESAMPLER_CHUNK_SIZE)?;
    let mut out = resampler.process(samples);
    out.extend(resampler.flush());
    let expected = (samples.len() as u64 * out_rate as u64 / in_rate as u64) as usize;
    out.resize(expected, 0.0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixdown_averages_channels() {
        let stereo = [0.5, -0.5, 1.0, 0.0, 0.25, 0.25];
        assert_eq!(mixdown(&stereo, 2), vec![0.0, 0.5, 0.25]);
        assert_eq!(mixdown(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_split_pads_last_chunk() {
        let chunks = split_for_chunks(&[1.0; 5], 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], vec![1.0, 0.0]);
    }

    #[test]
    fn test_passthrough_when_rates_match() {
        let mut resampler = StreamResampler::new(16_000, 16_000, 256).unwrap();
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.process(&[0.1, 0.2, 0.3]), vec![0.1, 0.2, 0.3]);
        assert!(resampler.flush().is_empty());
    }

    #[test]
    fn test_stream_resampler_keeps_remainder() {
        let mut resampler = StreamResampler::new(48_000, 16_000, 480).unwrap();
        // Less than one chunk: nothing comes out yet.
        assert!(resampler.process(&vec![0.0; 100]).is_empty());
        let out = resampler.process(&vec![0.0; 4_800]);
        assert!(!out.is_empty());
        assert!(out.len() <= 4_900 / 3 + 1);
    }

    #[test]
    fn test_resample_buffer_length() {
        let tone: Vec<f32> = (0..2_400).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let up = resample_buffer(&tone, 24_000, 48_000).unwrap();
        assert_eq!(up.len(), 4_800);
        let down = resample_buffer(&tone, 24_000, 16_000).unwrap();
        assert_eq!(down.len(), 1_600);
        assert!(down.iter().all(|s| s.abs() <= 1.0));
    }
}
