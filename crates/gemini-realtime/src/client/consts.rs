pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

pub const API_KEY_HEADER: &str = "x-goog-api-key";

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_SETUP_TIMEOUT_SECS: u64 = 15;
