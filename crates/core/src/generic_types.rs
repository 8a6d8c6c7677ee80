use crate::turn_log::GroundingLink;
use serde::{Deserialize, Serialize};

/// Configuration for opening a streaming voice connection with any provider.
#[derive(Debug, Clone, Default)]
pub struct LiveSessionConfig {
    pub instructions: String,
    pub voice_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A complete text reply from the request/response model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub grounding: Vec<GroundingLink>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: Vec::new(),
        }
    }
}

/// Events a streaming voice provider emits back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// A base64 PCM16 fragment of synthesized speech.
    Audio { data: String, mime_type: String },
    OutputTranscription(String),
    InputTranscription(String),
    TurnComplete,
    /// The user spoke over the model; queued speech should stop.
    Interrupted,
    Error(String),
    Closed,
}
