//! Localized user-facing strings.
//!
//! Every message the session shows comes from a [`MessageTable`], so wording can be
//! changed (or translated) without touching the failure sites. Placeholders use
//! `{name}` syntax and are filled by [`MessageTable::render`].

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Greeting,
    TransportApology,
    MissingCredential,
    CredentialRejected,
    MicrophoneDenied,
    AudioUnavailable,
    VoiceDropped,
    Finalized,
}

impl MessageKey {
    pub const ALL: [MessageKey; 8] = [
        MessageKey::Greeting,
        MessageKey::TransportApology,
        MessageKey::MissingCredential,
        MessageKey::CredentialRejected,
        MessageKey::MicrophoneDenied,
        MessageKey::AudioUnavailable,
        MessageKey::VoiceDropped,
        MessageKey::Finalized,
    ];

    /// The file stem used to override this message.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Greeting => "greeting",
            MessageKey::TransportApology => "transport_apology",
            MessageKey::MissingCredential => "missing_credential",
            MessageKey::CredentialRejected => "credential_rejected",
            MessageKey::MicrophoneDenied => "microphone_denied",
            MessageKey::AudioUnavailable => "audio_unavailable",
            MessageKey::VoiceDropped => "voice_dropped",
            MessageKey::Finalized => "finalized",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    fn default_text(&self) -> &'static str {
        match self {
            MessageKey::Greeting => {
                "Namaste {name}! I'm LocalLink Sahayak. Aapko market se kya chahiye?"
            }
            MessageKey::TransportApology => {
                "I'm having a bit of trouble connecting. Please try again, bhai!"
            }
            MessageKey::MissingCredential => {
                "Bhai, AI brain connect nahi ho raha. GEMINI_API_KEY set karke dobara try kijiye."
            }
            MessageKey::CredentialRejected => {
                "Bhai, AI key kaam nahi kar rahi. Sahi key set karke dobara try kijiye."
            }
            MessageKey::MicrophoneDenied => {
                "Mic ki permission nahi mili. Aap type karke bhi bata sakte hain."
            }
            MessageKey::AudioUnavailable => {
                "Voice mode abhi chalu nahi ho paaya. Aap type karke bata dijiye."
            }
            MessageKey::VoiceDropped => {
                "Voice connection toot gaya. Dobara mic dabaiye ya type kijiye."
            }
            MessageKey::Finalized => {
                "✅ Samjha! Maine aapka order \"{category}\" category mein shops ko bhej diya hai."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageTable {
    entries: HashMap<MessageKey, String>,
}

impl Default for MessageTable {
    fn default() -> Self {
        let entries = MessageKey::ALL
            .into_iter()
            .map(|k| (k, k.default_text().to_string()))
            .collect();
        Self { entries }
    }
}

impl MessageTable {
    /// Builds the default table and applies overrides keyed by message name.
    /// Unknown names are skipped with a warning.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        for (name, text) in overrides {
            match MessageKey::from_name(name) {
                Some(key) => table.set(key, text.trim()),
                None => tracing::debug!("Ignoring unknown message override '{}'", name),
            }
        }
        table
    }

    pub fn set(&mut self, key: MessageKey, text: &str) {
        self.entries.insert(key, text.to_string());
    }

    pub fn get(&self, key: MessageKey) -> &str {
        self.entries
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_text())
    }

    /// Looks up `key` and substitutes each `{name}` placeholder.
    pub fn render(&self, key: MessageKey, args: &[(&str, &str)]) -> String {
        let mut text = self.get(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}
