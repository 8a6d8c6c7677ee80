pub mod audio_io;
pub mod downlink;
pub mod error;
pub mod finalization;
pub mod generic_types;
pub mod instruction;
pub mod messages;
pub mod pcm;
pub mod realtime_api;
pub mod request;
pub mod session;
pub mod turn_log;
pub mod uplink;

pub use error::{IntakeError, TransportKind};
pub use finalization::{BalancedBraceDetector, Category, FinalizationDetector, StructuredIntent};
pub use generic_types::{GeoPoint, LiveEvent, LiveSessionConfig, ModelReply};
pub use messages::{MessageKey, MessageTable};
pub use request::{CustomerContext, FinalizedIntake, ProductRequestDraft, RequestStatus};
pub use session::{
    IntakeDeps, IntakeListener, IntakeSession, SendOutcome, SessionPhase, SessionSettings,
    VoiceStart,
};
pub use turn_log::{ConversationTurn, GroundingLink, InlineImage, Part, Role, TurnLog};
