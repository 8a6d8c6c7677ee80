use super::consts;
use secrecy::SecretString;
use std::time::Duration;

pub struct Config {
    base_url: String,
    live_url: String,
    api_key: Option<SecretString>,
    text_model: String,
    live_model: String,
    capacity: usize,
    setup_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_live_url(mut self, live_url: &str) -> Self {
        self.config.live_url = live_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn without_api_key(mut self) -> Self {
        self.config.api_key = None;
        self
    }

    pub fn with_text_model(mut self, model: &str) -> Self {
        self.config.text_model = model.to_string();
        self
    }

    pub fn with_live_model(mut self, model: &str) -> Self {
        self.config.live_model = model.to_string();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.config.setup_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults, with the key taken from GEMINI_API_KEY when it is set and non-empty.
    pub fn new() -> Self {
        let api_key = std::env::var(consts::GEMINI_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty() && k != "undefined")
            .map(SecretString::from);
        Self {
            base_url: consts::BASE_URL.to_string(),
            live_url: consts::LIVE_URL.to_string(),
            api_key,
            text_model: consts::DEFAULT_TEXT_MODEL.to_string(),
            live_model: consts::DEFAULT_LIVE_MODEL.to_string(),
            capacity: consts::DEFAULT_CAPACITY,
            setup_timeout: Duration::from_secs(consts::DEFAULT_SETUP_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn live_url(&self) -> &str {
        &self.live_url
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn live_model(&self) -> &str {
        &self.live_model
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn setup_timeout(&self) -> Duration {
        self.setup_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .with_base_url("http://localhost:8080/v1beta/")
            .with_api_key("test-key")
            .with_text_model("gemini-test")
            .with_capacity(0)
            .build();

        assert_eq!(config.base_url(), "http://localhost:8080/v1beta");
        assert_eq!(config.api_key().unwrap().expose_secret(), "test-key");
        assert_eq!(config.text_model(), "gemini-test");
        assert_eq!(config.capacity(), 1);
    }

    #[test]
    fn test_without_api_key() {
        let config = Config::builder().without_api_key().build();
        assert!(config.api_key().is_none());
    }
}
