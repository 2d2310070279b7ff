use std::time::Duration;

use livefeed_protocol::Envelope;

use crate::{
    backoff::{BackoffStrategy, RetryPolicy},
    endpoint::Endpoint,
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters of one logical stream.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub endpoint: Endpoint,
    pub retry: RetryPolicy,
    /// Upper bound on a single connection attempt, handshake included.
    pub connect_timeout: Duration,
    /// Sent after every successful connect, before the `connect` event fires.
    pub on_open: Vec<Envelope>,
}

impl ChannelConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            retry: RetryPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            on_open: Vec::new(),
        }
    }

    /// `None` keeps reconnecting forever.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.retry.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, cap: Option<Duration>) -> Self {
        self.retry.max_delay = cap;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_on_open(mut self, envelope: Envelope) -> Self {
        self.on_open.push(envelope);
        self
    }
}
