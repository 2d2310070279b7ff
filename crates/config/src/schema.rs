//! Config file schema and resolution into [`ChannelConfig`]s.

use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use {
    livefeed_channel::{BackoffStrategy, ChannelConfig, Endpoint, RetryPolicy, backoff},
    livefeed_protocol::Envelope,
    serde::{Deserialize, Deserializer, Serialize, Serializer},
};

use crate::error::{Error, Result};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Root configuration (`livefeed.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivefeedConfig {
    /// Page origin that relative channel paths are resolved against,
    /// e.g. `https://shop.example`.
    pub origin: Option<String>,
    /// Extra PEM bundle trusted for `wss://` endpoints.
    pub ca_file: Option<PathBuf>,
    pub defaults: RetryDefaults,
    pub channels: BTreeMap<String, ChannelEntry>,
}

/// Retry settings applied to every channel that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    pub max_retries: MaxRetries,
    pub base_delay_ms: u64,
    pub backoff: BackoffStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    pub connect_timeout_ms: u64,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_retries: MaxRetries::default(),
            base_delay_ms: u64::try_from(backoff::DEFAULT_BASE_DELAY.as_millis())
                .unwrap_or(u64::MAX),
            backoff: BackoffStrategy::default(),
            max_delay_ms: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

/// One `[channels.<name>]` table.
///
/// Exactly one of `url` and `path` should be set; `url` wins when both are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<MaxRetries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub on_open: Vec<Envelope>,
}

/// `max_retries = 5` or `max_retries = "unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxRetries {
    Limited(u32),
    Unlimited,
}

impl Default for MaxRetries {
    fn default() -> Self {
        Self::Limited(backoff::DEFAULT_MAX_RETRIES)
    }
}

impl MaxRetries {
    pub fn as_option(self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(n),
            Self::Unlimited => None,
        }
    }
}

impl fmt::Display for MaxRetries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl Serialize for MaxRetries {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxRetries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Self::Limited(n)),
            Raw::Word(w) if w.eq_ignore_ascii_case("unlimited") => Ok(Self::Unlimited),
            Raw::Word(w) => Err(serde::de::Error::custom(format!(
                "expected a retry count or \"unlimited\", got \"{w}\""
            ))),
        }
    }
}

impl LivefeedConfig {
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Resolve the named channel. `origin` overrides the file's `origin`.
    pub fn channel_config(&self, name: &str, origin: Option<&str>) -> Result<ChannelConfig> {
        let entry = self
            .channels
            .get(name)
            .ok_or_else(|| Error::UnknownChannel {
                name: name.to_string(),
            })?;
        let origin = origin.or(self.origin.as_deref());
        entry.resolve(name, origin, &self.defaults)
    }
}

impl RetryDefaults {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.as_option(),
            base_delay: Duration::from_millis(self.base_delay_ms),
            strategy: self.backoff,
            max_delay: self.max_delay_ms.map(Duration::from_millis),
        }
    }
}

impl ChannelEntry {
    pub fn endpoint(&self, name: &str, origin: Option<&str>) -> Result<Endpoint> {
        if let Some(url) = &self.url {
            return Ok(Endpoint::parse(url)?);
        }
        let Some(path) = &self.path else {
            return Err(Error::invalid_channel(name, "neither `url` nor `path` is set"));
        };
        let Some(origin) = origin else {
            return Err(Error::invalid_channel(
                name,
                format!("relative path `{path}` needs an `origin`"),
            ));
        };
        Ok(Endpoint::from_origin(origin, path)?)
    }

    /// Merge this entry over `defaults` and build the channel parameters.
    pub fn resolve(
        &self,
        name: &str,
        origin: Option<&str>,
        defaults: &RetryDefaults,
    ) -> Result<ChannelConfig> {
        let endpoint = self.endpoint(name, origin)?;
        let max_retries = self.max_retries.unwrap_or(defaults.max_retries);
        let base_delay_ms = self.base_delay_ms.unwrap_or(defaults.base_delay_ms);
        let max_delay_ms = self.max_delay_ms.or(defaults.max_delay_ms);
        let connect_timeout_ms = self
            .connect_timeout_ms
            .unwrap_or(defaults.connect_timeout_ms);

        let mut config = ChannelConfig::new(endpoint)
            .with_max_retries(max_retries.as_option())
            .with_base_delay(Duration::from_millis(base_delay_ms))
            .with_backoff(self.backoff.unwrap_or(defaults.backoff))
            .with_max_delay(max_delay_ms.map(Duration::from_millis))
            .with_connect_timeout(Duration::from_millis(connect_timeout_ms));
        config.on_open = self.on_open.clone();
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
origin = "https://shop.example"

[defaults]
max_retries = 5
base_delay_ms = 1000
backoff = "linear"

[channels.prices]
path = "/ws/price-feeds/"
on_open = [{ type = "get_prices" }]

[channels.tracking]
url = "wss://shop.example/ws/track/ABC123/s3cr3t/"
max_retries = "unlimited"
backoff = "fixed"
base_delay_ms = 5000
"#;

    #[test]
    fn parses_sample() {
        let cfg: LivefeedConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.origin.as_deref(), Some("https://shop.example"));
        assert_eq!(cfg.channel_names().collect::<Vec<_>>(), vec!["prices", "tracking"]);
        assert_eq!(
            cfg.channels["tracking"].max_retries,
            Some(MaxRetries::Unlimited)
        );
        assert_eq!(cfg.channels["prices"].on_open[0].kind, "get_prices");
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: LivefeedConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, LivefeedConfig::default());
        assert_eq!(cfg.defaults.max_retries, MaxRetries::Limited(5));
        assert_eq!(cfg.defaults.base_delay_ms, 1000);
        assert_eq!(cfg.defaults.backoff, BackoffStrategy::Linear);
    }

    #[test]
    fn relative_path_resolves_against_origin() {
        let cfg: LivefeedConfig = toml::from_str(SAMPLE).unwrap();
        let channel = cfg.channel_config("prices", None).unwrap();
        assert_eq!(channel.endpoint.as_str(), "wss://shop.example/ws/price-feeds/");
        assert_eq!(channel.retry.max_retries, Some(5));
        assert_eq!(channel.on_open.len(), 1);

        let local = cfg
            .channel_config("prices", Some("http://127.0.0.1:8000"))
            .unwrap();
        assert_eq!(local.endpoint.as_str(), "ws://127.0.0.1:8000/ws/price-feeds/");
    }

    #[test]
    fn entry_overrides_defaults() {
        let cfg: LivefeedConfig = toml::from_str(SAMPLE).unwrap();
        let channel = cfg.channel_config("tracking", None).unwrap();
        assert_eq!(channel.retry.max_retries, None);
        assert_eq!(channel.retry.strategy, BackoffStrategy::Fixed);
        assert_eq!(channel.retry.base_delay, Duration::from_secs(5));
        assert_eq!(
            channel.connect_timeout,
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS)
        );
    }

    #[test]
    fn relative_path_without_origin_fails() {
        let cfg: LivefeedConfig = toml::from_str(
            r#"
[channels.prices]
path = "/ws/price-feeds/"
"#,
        )
        .unwrap();
        let err = cfg.channel_config("prices", None).unwrap_err();
        assert!(matches!(err, Error::InvalidChannel { ref name, .. } if name == "prices"));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let cfg = LivefeedConfig::default();
        assert!(matches!(
            cfg.channel_config("nope", None),
            Err(Error::UnknownChannel { .. })
        ));
    }

    #[test]
    fn max_retries_rejects_other_words() {
        let err = toml::from_str::<RetryDefaults>("max_retries = \"forever\"").unwrap_err();
        assert!(err.to_string().contains("unlimited"));
    }

    #[test]
    fn max_retries_serializes_both_forms() {
        let defaults = RetryDefaults {
            max_retries: MaxRetries::Unlimited,
            ..RetryDefaults::default()
        };
        let text = toml::to_string(&defaults).unwrap();
        assert!(text.contains("max_retries = \"unlimited\""));
        assert!(
            toml::to_string(&RetryDefaults::default())
                .unwrap()
                .contains("max_retries = 5")
        );
    }
}
