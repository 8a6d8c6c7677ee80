use locallink_core::session::SessionPhase;

/// One line of terminal input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    Help,
    Stop,
    Voice,
    /// `/image` with its path, empty when none was given.
    Image(&'a str),
    Unknown,
    Say(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (cmd, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(cmd, rest)| (cmd, rest.trim()));
        match cmd {
            "/quit" => Command::Quit,
            "/help" => Command::Help,
            "/stop" => Command::Stop,
            "/voice" => Command::Voice,
            "/image" => Command::Image(rest),
            c if c.starts_with('/') => Command::Unknown,
            _ => Command::Say(line),
        }
    }
}

/// Typed messages are refused while the microphone owns the conversation.
pub fn accepts_text(phase: SessionPhase) -> bool {
    !matches!(
        phase,
        SessionPhase::VoiceConnecting | SessionPhase::VoiceActive
    )
}
