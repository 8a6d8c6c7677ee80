use crate::error::IntakeError;
use crate::generic_types::{GeoPoint, LiveEvent, LiveSessionConfig, ModelReply};
use crate::pcm::AudioFrame;
use crate::turn_log::ConversationTurn;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A request/response model that answers with the whole conversation as context.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        turns: &[ConversationTurn],
        location: Option<GeoPoint>,
    ) -> Result<ModelReply, IntakeError>;
}

/// Opens streaming duplex voice connections.
///
/// `connect` resolves only after the provider acknowledged the setup, so a
/// returned connection is ready to accept audio.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait LiveConnector: Send + Sync {
    async fn connect(
        &self,
        config: LiveSessionConfig,
    ) -> Result<Box<dyn LiveConnection>, IntakeError>;
}

pub trait LiveConnection: Send {
    /// Non-blocking sink for microphone frames.
    fn uplink(&self) -> Arc<dyn FrameSink>;

    /// The event stream. Yields `Some` once; later calls return `None`.
    fn take_events(&mut self) -> Option<mpsc::Receiver<LiveEvent>>;

    /// Closes the connection. Safe to call more than once.
    fn close(&mut self);
}

/// Accepts a frame only if it can be sent right away.
pub trait FrameSink: Send + Sync {
    /// Returns `false` when the frame was not accepted and has been dropped.
    fn offer(&self, frame: AudioFrame) -> bool;
}
