//! The intake session: one conversation between a customer and the assistant.
//!
//! A session drives text exchanges and live voice runs against injected
//! providers, keeps the turn log, and watches every model output for the
//! finalization payload. Voice resources are held in a guard that releases
//! them on drop, and [`IntakeSession::stop_voice`] is the one place that takes
//! them out of the session.

use crate::audio_io::{AudioBackend, CaptureContext, MicrophoneStream, PlaybackContext};
use crate::downlink::DownlinkPipeline;
use crate::error::IntakeError;
use crate::finalization::{BalancedBraceDetector, FinalizationDetector, StructuredIntent};
use crate::generic_types::{LiveEvent, LiveSessionConfig};
use crate::instruction::default_system_instruction;
use crate::messages::{MessageKey, MessageTable};
use crate::pcm::{DOWNLINK_SAMPLE_RATE, UPLINK_SAMPLE_RATE};
use crate::realtime_api::{LiveConnection, LiveConnector, TextModel};
use crate::request::{CustomerContext, FinalizedIntake};
use crate::turn_log::{ConversationTurn, InlineImage, TurnLog};
use crate::uplink::{DEFAULT_BLOCK_SIZE, UplinkPipeline};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_FINALIZE_DELAY: Duration = Duration::from_millis(1500);

/// Callbacks into the surrounding application.
pub trait IntakeListener: Send + Sync {
    /// A turn was added to the conversation (or shown, for notices).
    fn on_turn(&self, _turn: &ConversationTurn) {}

    /// Called at most once, after voice and text cleanup finished.
    fn on_finalized(&self, intake: FinalizedIntake);

    /// The customer dismissed the session without finalizing.
    fn on_close(&self) {}
}

/// Providers the session runs against.
#[derive(Clone)]
pub struct IntakeDeps {
    pub text_model: Arc<dyn TextModel>,
    pub live: Arc<dyn LiveConnector>,
    pub audio: Arc<dyn AudioBackend>,
    pub detector: Arc<dyn FinalizationDetector>,
    pub messages: Arc<MessageTable>,
}

impl IntakeDeps {
    pub fn new(
        text_model: Arc<dyn TextModel>,
        live: Arc<dyn LiveConnector>,
        audio: Arc<dyn AudioBackend>,
    ) -> Self {
        Self {
            text_model,
            live,
            audio,
            detector: Arc::new(BalancedBraceDetector),
            messages: Arc::new(MessageTable::default()),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn FinalizationDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_messages(mut self, messages: MessageTable) -> Self {
        self.messages = Arc::new(messages);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub system_instruction: String,
    pub voice_name: String,
    pub finalize_delay: Duration,
    pub uplink_block_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
            voice_name: "Kore".to_string(),
            finalize_delay: DEFAULT_FINALIZE_DELAY,
            uplink_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingResponse,
    VoiceConnecting,
    VoiceActive,
    /// Finalization detected; cleanup is pending.
    Finalizing,
    Closed,
}

/// Result of [`IntakeSession::send_text`].
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing to send.
    Ignored,
    Replied,
    Finalized,
    /// The exchange failed; an apology turn was added.
    Failed(IntakeError),
    /// The reply arrived after the session ended and was dropped.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStart {
    Active,
    AlreadyRunning,
    /// `stop_voice` ran while the connection was being set up.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoicePhase {
    Idle,
    Connecting,
    Active,
}

/// Everything one voice run holds. Dropping it releases all of it.
#[derive(Default)]
struct VoiceResources {
    connection: Option<Box<dyn LiveConnection>>,
    downlink: Option<Arc<DownlinkPipeline>>,
    uplink: Option<UplinkPipeline>,
    microphone: Option<Box<dyn MicrophoneStream>>,
    capture: Option<Box<dyn CaptureContext>>,
    playback: Option<Arc<dyn PlaybackContext>>,
    pump: Option<JoinHandle<()>>,
}

impl VoiceResources {
    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        if let Some(downlink) = self.downlink.take() {
            downlink.stop_all();
        }
        if let Some(mut uplink) = self.uplink.take() {
            uplink.stop();
        }
        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        if let Some(playback) = self.playback.take() {
            playback.close();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for VoiceResources {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Default)]
struct Transcript {
    input: String,
    output: String,
}

struct SessionState {
    log: TurnLog,
    pending_image: Option<InlineImage>,
    voice: VoicePhase,
    /// Bumped by every `stop_voice`; work tagged with an older epoch is stale.
    epoch: u64,
    resources: Option<VoiceResources>,
    transcript: Transcript,
    text_pending: bool,
    finalized: bool,
    closed: bool,
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if self.resources.is_some() {
            tracing::warn!("Intake session dropped with voice active, releasing audio resources");
        }
    }
}

struct Shared {
    deps: IntakeDeps,
    settings: SessionSettings,
    customer: CustomerContext,
    listener: Arc<dyn IntakeListener>,
    state: Mutex<SessionState>,
}

/// Cloneable handle to one intake session.
///
/// Callers serialize text sends: one `send_text` at a time, and none while
/// voice is active.
#[derive(Clone)]
pub struct IntakeSession {
    shared: Arc<Shared>,
}

impl IntakeSession {
    pub fn new(
        deps: IntakeDeps,
        settings: SessionSettings,
        customer: CustomerContext,
        listener: Arc<dyn IntakeListener>,
    ) -> Self {
        let state = SessionState {
            log: TurnLog::new(),
            pending_image: None,
            voice: VoicePhase::Idle,
            epoch: 0,
            resources: None,
            transcript: Transcript::default(),
            text_pending: false,
            finalized: false,
            closed: false,
        };
        Self {
            shared: Arc::new(Shared {
                deps,
                settings,
                customer,
                listener,
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The opening line shown to the customer. It is not part of the log.
    pub fn greeting(&self) -> ConversationTurn {
        let text = self
            .shared
            .deps
            .messages
            .render(MessageKey::Greeting, &[("name", &self.shared.customer.name)]);
        ConversationTurn::assistant(&text)
    }

    pub fn customer(&self) -> &CustomerContext {
        &self.shared.customer
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.state().log.turns().to_vec()
    }

    pub fn phase(&self) -> SessionPhase {
        let st = self.state();
        if st.closed {
            SessionPhase::Closed
        } else if st.finalized {
            SessionPhase::Finalizing
        } else if st.voice == VoicePhase::Connecting {
            SessionPhase::VoiceConnecting
        } else if st.voice == VoicePhase::Active {
            SessionPhase::VoiceActive
        } else if st.text_pending {
            SessionPhase::AwaitingResponse
        } else {
            SessionPhase::Idle
        }
    }

    pub fn is_voice_active(&self) -> bool {
        self.state().voice == VoicePhase::Active
    }

    /// Sends one user turn and waits for the reply.
    ///
    /// Failures never escape: they become an apology turn and
    /// [`SendOutcome::Failed`].
    pub async fn send_text(&self, input: &str, image: Option<InlineImage>) -> SendOutcome {
        let input = input.trim();
        if input.is_empty() && image.is_none() {
            return SendOutcome::Ignored;
        }

        let (turn, context) = {
            let mut st = self.state();
            if st.closed || st.finalized {
                return SendOutcome::Ignored;
            }
            if image.is_some() {
                st.pending_image = image.clone();
            }
            let turn = ConversationTurn::user(input, image);
            st.log.append(turn.clone());
            st.text_pending = true;
            (turn, st.log.turns().to_vec())
        };
        self.shared.listener.on_turn(&turn);

        tracing::debug!("Sending text exchange with {} turns", context.len());
        let result = self
            .shared
            .deps
            .text_model
            .generate(
                &self.shared.settings.system_instruction,
                &context,
                self.shared.customer.location,
            )
            .await;

        let reply = {
            let mut st = self.state();
            st.text_pending = false;
            if st.closed || st.finalized {
                tracing::debug!("Discarding reply for an ended session");
                return SendOutcome::Discarded;
            }
            match result {
                Ok(reply) => {
                    let turn = ConversationTurn::assistant(&reply.text).with_grounding(reply.grounding);
                    st.log.append(turn.clone());
                    Ok((turn, reply.text))
                }
                Err(e) => Err(e),
            }
        };

        match reply {
            // The payload reply stays in the log but is never shown.
            Ok((turn, text)) => match self.shared.deps.detector.detect(&text) {
                Some(intent) => {
                    if self.finalize(intent).await {
                        SendOutcome::Finalized
                    } else {
                        SendOutcome::Replied
                    }
                }
                None => {
                    self.shared.listener.on_turn(&turn);
                    SendOutcome::Replied
                }
            },
            Err(e) => {
                tracing::error!("Text exchange failed: {}", e);
                self.notify(e.message_key().unwrap_or(MessageKey::TransportApology));
                SendOutcome::Failed(e)
            }
        }
    }

    /// Opens the microphone, both audio contexts and the live connection.
    ///
    /// On failure every acquired resource is released before returning, and one
    /// notice turn is added. The error is returned for the caller's information.
    pub async fn start_voice(&self) -> Result<VoiceStart, IntakeError> {
        let epoch = {
            let mut st = self.state();
            if st.closed || st.finalized {
                return Err(IntakeError::SessionClosed);
            }
            if st.voice != VoicePhase::Idle {
                return Ok(VoiceStart::AlreadyRunning);
            }
            st.voice = VoicePhase::Connecting;
            st.transcript = Transcript::default();
            st.epoch += 1;
            st.epoch
        };
        tracing::info!("Starting voice run {}", epoch);

        match self.acquire_voice(epoch).await {
            Ok(Some(resources)) => {
                let mut st = self.state();
                if st.epoch != epoch || st.closed {
                    drop(st);
                    tracing::info!("Voice run {} stopped during setup", epoch);
                    drop(resources);
                    return Ok(VoiceStart::Cancelled);
                }
                st.resources = Some(resources);
                st.voice = VoicePhase::Active;
                tracing::info!("Voice run {} active", epoch);
                Ok(VoiceStart::Active)
            }
            Ok(None) => {
                tracing::info!("Voice run {} stopped during setup", epoch);
                Ok(VoiceStart::Cancelled)
            }
            Err(e) => {
                tracing::warn!("Voice run {} failed to start: {}", epoch, e);
                let current = {
                    let mut st = self.state();
                    let current = st.epoch == epoch;
                    if current {
                        st.voice = VoicePhase::Idle;
                    }
                    current
                };
                if current {
                    if let Some(key) = e.message_key() {
                        self.notify(key);
                    }
                }
                Err(e)
            }
        }
    }

    /// Acquires everything a voice run needs. Anything acquired before an
    /// error or a cancellation is released when `resources` drops.
    async fn acquire_voice(&self, epoch: u64) -> Result<Option<VoiceResources>, IntakeError> {
        let deps = &self.shared.deps;
        let mut resources = VoiceResources::default();

        let microphone = resources
            .microphone
            .insert(deps.audio.request_microphone().await?);
        if !self.is_current(epoch) {
            return Ok(None);
        }
        let capture = resources
            .capture
            .insert(deps.audio.open_capture(UPLINK_SAMPLE_RATE)?);
        let playback = resources
            .playback
            .insert(deps.audio.open_playback(DOWNLINK_SAMPLE_RATE).await?)
            .clone();
        if !self.is_current(epoch) {
            return Ok(None);
        }

        let config = LiveSessionConfig {
            instructions: self.shared.settings.system_instruction.clone(),
            voice_name: self.shared.settings.voice_name.clone(),
        };
        let connection = resources.connection.insert(deps.live.connect(config).await?);
        if !self.is_current(epoch) {
            return Ok(None);
        }

        let blocks = capture.attach(&mut **microphone, self.shared.settings.uplink_block_size)?;
        let events = connection
            .take_events()
            .ok_or_else(|| IntakeError::protocol("live connection has no event stream"))?;
        let sink = connection.uplink();

        resources.uplink = Some(UplinkPipeline::spawn(blocks, sink));
        let downlink = Arc::new(DownlinkPipeline::new(playback));
        resources.downlink = Some(downlink.clone());
        resources.pump = Some(tokio::spawn(pump_events(
            Arc::downgrade(&self.shared),
            epoch,
            events,
            downlink,
        )));
        Ok(Some(resources))
    }

    fn is_current(&self, epoch: u64) -> bool {
        let st = self.state();
        st.epoch == epoch && !st.closed
    }

    /// Releases every voice resource. Idempotent and safe from any state.
    pub fn stop_voice(&self) {
        let resources = {
            let mut st = self.state();
            st.epoch += 1;
            st.voice = VoicePhase::Idle;
            st.transcript = Transcript::default();
            st.resources.take()
        };
        if let Some(mut resources) = resources {
            tracing::info!("Stopping voice");
            resources.release();
        }
    }

    /// Stops voice only if `epoch` is still the running voice run.
    fn stop_voice_run(&self, epoch: u64) {
        if self.state().epoch == epoch {
            self.stop_voice();
        }
    }

    /// Ends the session. `on_close` fires unless the session finalized.
    pub fn close(&self) {
        self.stop_voice();
        let dismissed = {
            let mut st = self.state();
            if st.closed {
                return;
            }
            st.closed = true;
            st.log.discard();
            st.pending_image = None;
            !st.finalized
        };
        tracing::info!("Intake session closed");
        if dismissed {
            self.shared.listener.on_close();
        }
    }

    /// Appends a localized assistant notice.
    fn notify(&self, key: MessageKey) {
        let text = self.shared.deps.messages.get(key).to_string();
        let turn = ConversationTurn::assistant(&text);
        {
            let mut st = self.state();
            if st.closed {
                return;
            }
            st.log.append(turn.clone());
        }
        self.shared.listener.on_turn(&turn);
    }

    /// Marks the session finalized and adds the confirmation turn. `None` if
    /// it already finalized or closed.
    fn begin_finalization(&self, intent: StructuredIntent) -> Option<FinalizedIntake> {
        let text = self.shared.deps.messages.render(
            MessageKey::Finalized,
            &[("category", intent.category().as_str())],
        );
        let confirmation = ConversationTurn::assistant(&text);
        let image = {
            let mut st = self.state();
            if st.finalized || st.closed {
                return None;
            }
            st.finalized = true;
            st.log.append(confirmation.clone());
            st.pending_image.clone()
        };
        tracing::info!(
            "Intake finalized: category={}, summary={:?}",
            intent.category(),
            intent.summary()
        );
        self.shared.listener.on_turn(&confirmation);
        Some(FinalizedIntake {
            intent,
            image,
            customer: self.shared.customer.clone(),
        })
    }

    async fn complete_finalization(&self, intake: FinalizedIntake) {
        tokio::time::sleep(self.shared.settings.finalize_delay).await;
        self.stop_voice();
        {
            let mut st = self.state();
            st.log.discard();
            st.pending_image = None;
            st.closed = true;
        }
        self.shared.listener.on_finalized(intake);
    }

    async fn finalize(&self, intent: StructuredIntent) -> bool {
        match self.begin_finalization(intent) {
            Some(intake) => {
                self.complete_finalization(intake).await;
                true
            }
            None => false,
        }
    }

    /// Handles one event of voice run `epoch`. Returns `false` once the run is over.
    fn on_live_event(&self, epoch: u64, event: LiveEvent, downlink: &DownlinkPipeline) -> bool {
        if !self.is_current(epoch) {
            return false;
        }
        match event {
            LiveEvent::Audio { data, mime_type } => downlink.push(&data, &mime_type),
            LiveEvent::OutputTranscription(fragment) => {
                let output = {
                    let mut st = self.state();
                    st.transcript.output.push_str(&fragment);
                    st.transcript.output.clone()
                };
                if let Some(intent) = self.shared.deps.detector.detect(&output) {
                    if let Some(intake) = self.begin_finalization(intent) {
                        let session = self.clone();
                        tokio::spawn(async move {
                            session.complete_finalization(intake).await;
                        });
                    }
                }
            }
            LiveEvent::InputTranscription(fragment) => {
                self.state().transcript.input.push_str(&fragment);
            }
            LiveEvent::TurnComplete => self.commit_transcripts(),
            LiveEvent::Interrupted => {
                tracing::debug!("Model interrupted, dropping queued speech");
                downlink.stop_all();
            }
            LiveEvent::Error(message) => {
                tracing::error!("Voice connection error: {}", message);
                if !self.state().finalized {
                    self.notify(MessageKey::TransportApology);
                }
                self.stop_voice_run(epoch);
                return false;
            }
            LiveEvent::Closed => {
                self.on_remote_close(epoch);
                return false;
            }
        }
        true
    }

    fn on_remote_close(&self, epoch: u64) {
        let (current, finalized) = {
            let st = self.state();
            (st.epoch == epoch && !st.closed, st.finalized)
        };
        if !current {
            return;
        }
        tracing::info!("Voice connection closed by the service");
        if !finalized {
            self.notify(MessageKey::VoiceDropped);
        }
        self.stop_voice_run(epoch);
    }

    /// Moves the finished turn's transcripts into the log.
    fn commit_transcripts(&self) {
        let turns = {
            let mut st = self.state();
            let transcript = std::mem::take(&mut st.transcript);
            if st.finalized {
                return;
            }
            let mut turns = Vec::new();
            let input = transcript.input.trim();
            if !input.is_empty() {
                turns.push(ConversationTurn::user(input, None));
            }
            let output = transcript.output.trim();
            if !output.is_empty() {
                turns.push(ConversationTurn::assistant(output));
            }
            for turn in &turns {
                st.log.append(turn.clone());
            }
            turns
        };
        for turn in &turns {
            self.shared.listener.on_turn(turn);
        }
    }
}

async fn pump_events(
    session: Weak<Shared>,
    epoch: u64,
    mut events: mpsc::Receiver<LiveEvent>,
    downlink: Arc<DownlinkPipeline>,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = session.upgrade() else {
            return;
        };
        if !(IntakeSession { shared }).on_live_event(epoch, event, &downlink) {
            return;
        }
    }
    if let Some(shared) = session.upgrade() {
        IntakeSession { shared }.on_remote_close(epoch);
    }
}
