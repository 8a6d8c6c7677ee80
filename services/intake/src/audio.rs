//! Picks the audio backend this binary was built with.

use async_trait::async_trait;
use locallink_core::audio_io::{AudioBackend, CaptureContext, MicrophoneStream, PlaybackContext};
use locallink_core::error::IntakeError;
use std::sync::Arc;

/// Stands in when the binary has no audio support. Voice mode then ends with
/// the audio-unavailable notice and text keeps working.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudioBackend;

fn unavailable() -> IntakeError {
    IntakeError::AudioUnavailable("built without the native-audio feature".to_string())
}

#[async_trait]
impl AudioBackend for NoAudioBackend {
    async fn request_microphone(&self) -> Result<Box<dyn MicrophoneStream>, IntakeError> {
        Err(unavailable())
    }

    fn open_capture(&self, _sample_rate: u32) -> Result<Box<dyn CaptureContext>, IntakeError> {
        Err(unavailable())
    }

    async fn open_playback(
        &self,
        _sample_rate: u32,
    ) -> Result<Arc<dyn PlaybackContext>, IntakeError> {
        Err(unavailable())
    }
}

#[cfg(feature = "native-audio")]
pub fn default_backend(
    input_device: Option<String>,
    output_device: Option<String>,
) -> Arc<dyn AudioBackend> {
    Arc::new(locallink_native_utils::backend::CpalBackend::new(
        input_device,
        output_device,
    ))
}

#[cfg(not(feature = "native-audio"))]
pub fn default_backend(
    input_device: Option<String>,
    output_device: Option<String>,
) -> Arc<dyn AudioBackend> {
    if input_device.is_some() || output_device.is_some() {
        tracing::warn!("Audio devices were named but this build has no audio support");
    }
    Arc::new(NoAudioBackend)
}

/// Lists the devices the native backend can open.
#[cfg(feature = "native-audio")]
pub fn describe_devices() -> anyhow::Result<String> {
    use locallink_native_utils::device;
    Ok(format!(
        "Input devices:\n{}\nOutput devices:\n{}",
        device::get_available_inputs()?,
        device::get_available_outputs()?
    ))
}

#[cfg(not(feature = "native-audio"))]
pub fn describe_devices() -> anyhow::Result<String> {
    Ok("No audio devices: built without the native-audio feature.".to_string())
}
