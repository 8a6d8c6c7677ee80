//! Terminal listener and the JSON-lines request store.

use anyhow::{Context, Result};
use chrono::Utc;
use locallink_core::request::{FinalizedIntake, ProductRequestDraft};
use locallink_core::session::IntakeListener;
use locallink_core::turn_log::{ConversationTurn, Role};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

/// Appends each request draft as one JSON line.
#[derive(Debug)]
pub struct JsonlRequestSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRequestSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, draft: &ProductRequestDraft) -> Result<()> {
        let line = serde_json::to_string(draft).context("Failed to serialize request draft")?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open request store: {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to write request store: {}", self.path.display()))?;
        Ok(())
    }
}

/// How a turn is shown in the terminal.
pub fn render_turn(turn: &ConversationTurn) -> String {
    let speaker = match turn.role {
        Role::User => "You",
        Role::Assistant => "Sahayak",
    };
    let mut out = format!("{speaker}: {}", turn.text());
    if turn.image().is_some() {
        out.push_str(" [photo]");
    }
    for link in &turn.grounding {
        out.push_str(&format!("\n    {} <{}>", link.title, link.uri));
    }
    out
}

/// What ended the session, as seen by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Running,
    Finalized,
    Dismissed,
}

/// Prints turns and stores the finalized request.
pub struct ConsoleListener {
    sink: JsonlRequestSink,
    end: watch::Sender<SessionEnd>,
}

impl ConsoleListener {
    pub fn new(sink: JsonlRequestSink) -> (Self, watch::Receiver<SessionEnd>) {
        let (end, end_rx) = watch::channel(SessionEnd::Running);
        (Self { sink, end }, end_rx)
    }
}

impl IntakeListener for ConsoleListener {
    fn on_turn(&self, turn: &ConversationTurn) {
        println!("{}", render_turn(turn));
    }

    fn on_finalized(&self, intake: FinalizedIntake) {
        let draft = intake.to_request_draft(Utc::now());
        match self.sink.append(&draft) {
            Ok(()) => tracing::info!(
                "Request stored in {} (category: {})",
                self.sink.path().display(),
                draft.category
            ),
            Err(e) => tracing::error!("Could not store the request: {:#}", e),
        }
        let _ = self.end.send(SessionEnd::Finalized);
    }

    fn on_close(&self) {
        let _ = self.end.send(SessionEnd::Dismissed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locallink_core::finalization::{BalancedBraceDetector, FinalizationDetector};
    use locallink_core::request::CustomerContext;
    use locallink_core::turn_log::{GroundingLink, InlineImage};
    use tempfile::tempdir;

    fn intake(summary: &str, image: Option<InlineImage>) -> FinalizedIntake {
        let payload =
            format!(r#"{{"finalized": true, "summary": "{summary}", "category": "Sports"}}"#);
        FinalizedIntake {
            intent: BalancedBraceDetector.detect(&payload).unwrap(),
            image,
            customer: CustomerContext {
                id: "cust-1".to_string(),
                name: "Ravi".to_string(),
                pin_code: "110001".to_string(),
                city: "Delhi".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_sink_appends_one_line_per_request() -> Result<()> {
        let dir = tempdir()?;
        let sink = JsonlRequestSink::new(dir.path().join("requests.jsonl"));
        sink.append(&intake("Kashmir willow bat, size 6", None).to_request_draft(Utc::now()))?;
        sink.append(&intake("Tennis balls", None).to_request_draft(Utc::now()))?;

        let text = std::fs::read_to_string(sink.path())?;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["description"], "Kashmir willow bat, size 6");
        assert_eq!(lines[0]["category"], "Sports");
        assert_eq!(lines[0]["status"], "broadcasted");
        assert_eq!(lines[1]["customerId"], "cust-1");
        Ok(())
    }

    #[test]
    fn test_listener_stores_and_signals() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.jsonl");
        let (listener, end) = ConsoleListener::new(JsonlRequestSink::new(&path));
        assert_eq!(*end.borrow(), SessionEnd::Running);

        let photo = InlineImage::new("image/png", "iVBORw0KGgo=");
        listener.on_finalized(intake("Red kurta, size M", Some(photo)));

        assert_eq!(*end.borrow(), SessionEnd::Finalized);
        let stored: serde_json::Value =
            serde_json::from_str(std::fs::read_to_string(&path)?.trim())?;
        assert_eq!(stored["image"], "data:image/png;base64,iVBORw0KGgo=");
        Ok(())
    }

    #[test]
    fn test_close_signals_dismissal() {
        let dir = tempdir().unwrap();
        let (listener, end) = ConsoleListener::new(JsonlRequestSink::new(dir.path().join("x")));
        listener.on_close();
        assert_eq!(*end.borrow(), SessionEnd::Dismissed);
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn test_render_turn() {
        let turn = ConversationTurn::assistant("Sharma Sports ke paas milega.").with_grounding(vec![
            GroundingLink {
                uri: "https://maps.example/1".to_string(),
                title: "Sharma Sports".to_string(),
            },
        ]);
        assert_eq!(
            render_turn(&turn),
            "Sahayak: Sharma Sports ke paas milega.\n    Sharma Sports <https://maps.example/1>"
        );
        let photo = InlineImage::new("image/jpeg", "AA==");
        assert_eq!(
            render_turn(&ConversationTurn::user("Ye wala", Some(photo))),
            "You: Ye wala [photo]"
        );
    }
}
