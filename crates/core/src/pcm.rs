use crate::error::IntakeError;
use base64::Engine;

/// Sample rate the service expects for microphone audio.
pub const UPLINK_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of the service's synthesized speech.
pub const DOWNLINK_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const UPLINK: PcmFormat = PcmFormat {
        sample_rate: UPLINK_SAMPLE_RATE,
        channels: 1,
    };
    pub const DOWNLINK: PcmFormat = PcmFormat {
        sample_rate: DOWNLINK_SAMPLE_RATE,
        channels: 1,
    };

    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Parses `audio/pcm;rate=N`. Mono is assumed; the service never sends more channels.
    pub fn from_mime(mime: &str) -> Option<PcmFormat> {
        let mut params = mime.split(';').map(str::trim);
        if !params.next()?.eq_ignore_ascii_case("audio/pcm") {
            return None;
        }
        let sample_rate = params
            .find_map(|p| p.strip_prefix("rate="))
            .and_then(|r| r.parse::<u32>().ok())
            .filter(|r| *r > 0)?;
        Some(PcmFormat {
            sample_rate,
            channels: 1,
        })
    }
}

/// One encoded chunk of PCM16 little-endian audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: String,
    pub format: PcmFormat,
}

impl AudioFrame {
    pub fn from_samples(samples: &[f32], format: PcmFormat) -> Self {
        Self {
            data: encode_f32(samples),
            format,
        }
    }

    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }
}

/// Decoded float samples ready to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub format: PcmFormat,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, format: PcmFormat) -> Self {
        Self { samples, format }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.format.sample_rate as f64
    }
}

/// Scales floats in [-1, 1] to i16, clamping anything outside the range.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

pub fn encode_i16(pcm16: &[i16]) -> String {
    let bytes: Vec<u8> = pcm16.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(&bytes)
}

pub fn encode_f32(pcm32: &[f32]) -> String {
    encode_i16(&convert_f32_to_i16(pcm32))
}

/// Decodes base64 PCM16 LE. A trailing odd byte is ignored.
pub fn decode_i16(base64_fragment: &str) -> Result<Vec<i16>, IntakeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .map_err(|e| IntakeError::protocol(format!("invalid base64 audio: {e}")))?;
    if bytes.len() % 2 != 0 {
        tracing::warn!("Audio fragment has odd length {}, dropping last byte", bytes.len());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

pub fn decode_f32(base64_fragment: &str) -> Result<Vec<f32>, IntakeError> {
    decode_i16(base64_fragment).map(|pcm16| convert_i16_to_f32(&pcm16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_scaling_and_clamp() {
        let pcm = convert_f32_to_i16(&[0.0, 0.5, -0.5, 1.0, -1.0, 1.7, -3.0]);
        assert_eq!(pcm, vec![0, 16384, -16384, 32767, -32768, 32767, -32768]);
    }

    #[test]
    fn test_decode_known_bytes() {
        // 0x0001 = 1, 0x8000 = -32768, little-endian.
        let encoded = base64::engine::general_purpose::STANDARD.encode([0x01, 0x00, 0x00, 0x80]);
        assert_eq!(decode_i16(&encoded).unwrap(), vec![1, -32768]);
        let floats = decode_f32(&encoded).unwrap();
        assert_eq!(floats[1], -1.0);
    }

    #[test]
    fn test_decode_odd_length_and_garbage() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0x10, 0x00, 0x7f]);
        assert_eq!(decode_i16(&encoded).unwrap(), vec![16]);
        assert!(decode_i16("not base64!!").is_err());
    }

    #[test]
    fn test_mime_parsing() {
        assert_eq!(PcmFormat::UPLINK.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(
            PcmFormat::from_mime("audio/pcm;rate=24000"),
            Some(PcmFormat::DOWNLINK)
        );
        assert_eq!(
            PcmFormat::from_mime("audio/pcm; rate=16000"),
            Some(PcmFormat::UPLINK)
        );
        assert_eq!(PcmFormat::from_mime("audio/pcm"), None);
        assert_eq!(PcmFormat::from_mime("audio/ogg;rate=16000"), None);
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = PcmBuffer::new(vec![0.0; 12_000], PcmFormat::DOWNLINK);
        assert_eq!(buffer.duration(), 0.5);
    }
}
