use async_trait::async_trait;
use gemini_realtime::types::{
    Blob, Content, GenerateContentRequest, GenerationConfig, GoogleMaps, LatLng, Part,
    RetrievalConfig, ServerEvent, ServerMessage, Setup, Tool, ToolConfig,
};
use gemini_realtime::{AudioSender, GeminiError, GenerateClient, LiveClient};
use locallink_core::error::{IntakeError, TransportKind};
use locallink_core::generic_types::{GeoPoint, LiveEvent, LiveSessionConfig, ModelReply};
use locallink_core::pcm::AudioFrame;
use locallink_core::realtime_api::{FrameSink, LiveConnection, LiveConnector, TextModel};
use locallink_core::turn_log::{self, ConversationTurn, GroundingLink, Role};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const TEXT_TEMPERATURE: f32 = 0.7;
const EVENT_CAPACITY: usize = 256;

/// Classifies a failure from the Gemini client for the session.
pub fn map_error(err: anyhow::Error) -> IntakeError {
    let kind = match err.downcast_ref::<GeminiError>() {
        Some(GeminiError::MissingApiKey) => return IntakeError::MissingCredential,
        Some(GeminiError::Unauthorized { .. }) => TransportKind::Auth,
        Some(GeminiError::QuotaExceeded(_)) => TransportKind::Quota,
        Some(GeminiError::EmptyResponse) | Some(GeminiError::SetupFailed(_)) => {
            TransportKind::Protocol
        }
        Some(GeminiError::Http { .. }) | Some(GeminiError::Closed) | Some(GeminiError::Busy) => {
            TransportKind::Network
        }
        None => TransportKind::Network,
    };
    IntakeError::Transport {
        kind,
        message: format!("{err:#}"),
    }
}

/// An adapter that implements `TextModel` for Gemini `generateContent`.
pub struct GeminiTextModel {
    client: GenerateClient,
}

impl GeminiTextModel {
    pub fn new(config: gemini_realtime::Config) -> Self {
        Self {
            client: GenerateClient::new(config),
        }
    }
}

fn to_content(turn: &ConversationTurn) -> Content {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts = turn
        .parts
        .iter()
        .map(|part| match part {
            turn_log::Part::Text(text) => Part::text(text),
            turn_log::Part::InlineImage(image) => Part::inline(&image.mime_type, &image.data),
        })
        .collect();
    Content::new(role, parts)
}

/// The request body for one text exchange. A known location switches on map grounding.
pub fn build_request(
    system_instruction: &str,
    turns: &[ConversationTurn],
    location: Option<GeoPoint>,
) -> GenerateContentRequest {
    let (tools, tool_config) = match location {
        Some(point) => (
            vec![Tool {
                google_maps: Some(GoogleMaps {}),
            }],
            Some(ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: point.latitude,
                        longitude: point.longitude,
                    },
                },
            }),
        ),
        None => (Vec::new(), None),
    };
    GenerateContentRequest {
        contents: turns
            .iter()
            .filter(|t| !t.parts.is_empty())
            .map(to_content)
            .collect(),
        system_instruction: Some(Content::instruction(system_instruction)),
        generation_config: Some(GenerationConfig {
            temperature: Some(TEXT_TEMPERATURE),
            ..Default::default()
        }),
        tools,
        tool_config,
    }
}

#[async_trait]
impl TextModel for GeminiTextModel {
    async fn generate(
        &self,
        system_instruction: &str,
        turns: &[ConversationTurn],
        location: Option<GeoPoint>,
    ) -> Result<ModelReply, IntakeError> {
        let request = build_request(system_instruction, turns, location);
        let response = self.client.generate(&request).await.map_err(map_error)?;
        let text = response
            .text()
            .ok_or_else(|| map_error(GeminiError::EmptyResponse.into()))?;
        let grounding = response
            .grounding_chunks()
            .into_iter()
            .filter_map(|chunk| chunk.maps)
            .filter(|maps| !maps.uri.is_empty())
            .map(|maps| GroundingLink {
                uri: maps.uri,
                title: maps.title,
            })
            .collect();
        Ok(ModelReply { text, grounding })
    }
}

/// Translates one live server message into session events, in the order the
/// session should see them.
pub fn translate(msg: &ServerMessage) -> Vec<LiveEvent> {
    let mut events = Vec::new();
    if let Some(go_away) = &msg.go_away {
        tracing::debug!("goAway received, time left: {:?}", go_away.time_left);
    }
    let Some(content) = &msg.server_content else {
        return events;
    };

    if content.interrupted == Some(true) {
        events.push(LiveEvent::Interrupted);
    }
    if let Some(turn) = &content.model_turn {
        for blob in turn.parts.iter().filter_map(|p| p.inline_data.as_ref()) {
            if blob.mime_type.starts_with("audio/") {
                events.push(LiveEvent::Audio {
                    data: blob.data.clone(),
                    mime_type: blob.mime_type.clone(),
                });
            }
        }
    }
    if let Some(transcription) = &content.input_transcription {
        if !transcription.text.is_empty() {
            events.push(LiveEvent::InputTranscription(transcription.text.clone()));
        }
    }
    if let Some(transcription) = &content.output_transcription {
        if !transcription.text.is_empty() {
            events.push(LiveEvent::OutputTranscription(transcription.text.clone()));
        }
    }
    if content.turn_complete == Some(true) {
        events.push(LiveEvent::TurnComplete);
    }
    events
}

/// Forwards the client's broadcast as session events until either side ends.
fn spawn_translator(
    mut gemini_rx: broadcast::Receiver<ServerEvent>,
    tx: mpsc::Sender<LiveEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let events = match gemini_rx.recv().await {
                Ok(ServerEvent::Message(msg)) => translate(&msg),
                Ok(ServerEvent::Failed(e)) => {
                    let _ = tx.send(LiveEvent::Error(e)).await;
                    break;
                }
                Ok(ServerEvent::Closed { reason }) => {
                    tracing::info!("Gemini live session ended: {:?}", reason);
                    let _ = tx.send(LiveEvent::Closed).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Gemini event stream lagged by {} messages.", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Gemini event channel closed.");
                    let _ = tx.send(LiveEvent::Closed).await;
                    break;
                }
            };
            for event in events {
                if tx.send(event).await.is_err() {
                    tracing::debug!("Live event receiver dropped, stopping translator.");
                    return;
                }
            }
        }
    })
}

/// An adapter that implements `LiveConnector` for the Gemini Live API.
pub struct GeminiLiveConnector {
    config: gemini_realtime::Config,
}

impl GeminiLiveConnector {
    pub fn new(config: gemini_realtime::Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        config: LiveSessionConfig,
    ) -> Result<Box<dyn LiveConnection>, IntakeError> {
        let setup = Setup::audio(
            self.config.live_model(),
            &config.instructions,
            &config.voice_name,
        );
        let client = gemini_realtime::connect(&self.config, setup)
            .await
            .map_err(map_error)?;
        let sender = client
            .audio_sender()
            .ok_or_else(|| map_error(GeminiError::Closed.into()))?;

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let translator = spawn_translator(client.server_events(), tx);
        Ok(Box::new(GeminiLiveConnection {
            client,
            sink: Arc::new(GeminiSink { sender }),
            events: Some(rx),
            translator,
        }))
    }
}

struct GeminiSink {
    sender: AudioSender,
}

impl FrameSink for GeminiSink {
    fn offer(&self, frame: AudioFrame) -> bool {
        let blob = Blob {
            mime_type: frame.mime_type(),
            data: frame.data,
        };
        match self.sender.try_send_audio(blob) {
            Ok(()) => true,
            Err(GeminiError::Closed) => {
                tracing::debug!("Dropping microphone frame: live connection closed");
                false
            }
            Err(_) => false,
        }
    }
}

pub struct GeminiLiveConnection {
    client: LiveClient,
    sink: Arc<GeminiSink>,
    events: Option<mpsc::Receiver<LiveEvent>>,
    translator: JoinHandle<()>,
}

impl LiveConnection for GeminiLiveConnection {
    fn uplink(&self) -> Arc<dyn FrameSink> {
        self.sink.clone()
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<LiveEvent>> {
        self.events.take()
    }

    fn close(&mut self) {
        // The translator goes first so our own close isn't reported as a drop.
        self.translator.abort();
        self.client.close();
    }
}

impl Drop for GeminiLiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}
