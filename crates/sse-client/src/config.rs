//! Client configuration.
//!
//! [`StreamConfig`] is plain data and can be loaded from TOML or any serde
//! format; callbacks live in [`StreamHooks`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_MAX_MESSAGES, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY, RetryState, StreamError,
    StreamResult, TransportFault,
};

/// Stream client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Include cookies/credentials on the transport.
    pub with_credentials: bool,

    /// Delay before the first reconnect, in milliseconds.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,

    /// Cap on the reconnect delay, in milliseconds.
    #[serde(rename = "max_retry_delay_ms", with = "duration_ms")]
    pub max_retry_delay: Duration,

    /// History capacity.
    pub max_messages: usize,

    /// Randomize each waited delay by 0.5x to 1.5x.
    pub jitter: bool,

    /// Headers sent on every attempt. The header provider hook wins on conflicts.
    pub headers: HashMap<String, String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            with_credentials: false,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            max_messages: DEFAULT_MAX_MESSAGES,
            jitter: false,
            headers: HashMap::new(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl StreamConfig {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> StreamResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the backoff cannot honor.
    pub fn validate(&self) -> StreamResult<()> {
        if self.retry_delay.is_zero() {
            return Err(StreamError::InvalidConfig(
                "retry_delay_ms must be greater than zero".into(),
            ));
        }
        if self.max_retry_delay < self.retry_delay {
            return Err(StreamError::InvalidConfig(format!(
                "max_retry_delay_ms ({}) is below retry_delay_ms ({})",
                self.max_retry_delay.as_millis(),
                self.retry_delay.as_millis()
            )));
        }
        Ok(())
    }

    /// Set credential inclusion.
    #[must_use]
    pub const fn with_credentials(mut self, enabled: bool) -> Self {
        self.with_credentials = enabled;
        self
    }

    /// Set the initial reconnect delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the reconnect delay cap.
    #[must_use]
    pub const fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Set the history capacity.
    #[must_use]
    pub const fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Add a static header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Backoff state derived from this configuration.
    #[must_use]
    pub fn retry_state(&self) -> RetryState {
        RetryState::new(self.retry_delay, self.max_retry_delay).with_jitter(self.jitter)
    }
}

/// Called after every successful open.
pub type OpenHook = Arc<dyn Fn() + Send + Sync>;

/// Called on every transport fault.
pub type ErrorHook = Arc<dyn Fn(&TransportFault) + Send + Sync>;

/// Produces request headers for each connection attempt.
pub type HeaderProvider = Arc<dyn Fn() -> HashMap<String, String> + Send + Sync>;

/// Optional callbacks into the host.
#[derive(Clone, Default)]
pub struct StreamHooks {
    /// Invoked on every successful open.
    pub on_open: Option<OpenHook>,
    /// Invoked on every transport fault.
    pub on_error: Option<ErrorHook>,
    /// Invoked once per connection attempt.
    pub headers: Option<HeaderProvider>,
}

impl fmt::Debug for StreamHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("headers", &self.headers.is_some())
            .finish()
    }
}

impl StreamHooks {
    /// Static headers overlaid with the provider's headers for one attempt.
    #[must_use]
    pub fn request_headers(&self, config: &StreamConfig) -> HashMap<String, String> {
        let mut headers = config.headers.clone();
        if let Some(provider) = &self.headers {
            headers.extend(provider());
        }
        headers
    }
}
