//! Stream endpoint: server address plus path.

use std::{fmt, str::FromStr};

use url::Url;

use crate::error::{Error, Result};

/// A validated `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse a full WebSocket URL.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| Error::InvalidEndpoint(format!("{input}: {e}")))?;
        Self::from_url(url)
    }

    /// Resolve `path` against a page origin.
    ///
    /// `http` origins map to `ws` and `https` origins map to `wss`, so an
    /// origin of `https://example.com` and a path of `/ws/price-feeds/`
    /// yields `wss://example.com/ws/price-feeds/`.
    pub fn from_origin(origin: &str, path: &str) -> Result<Self> {
        let mut base = Url::parse(origin.trim())
            .map_err(|e| Error::InvalidEndpoint(format!("{origin}: {e}")))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported origin scheme `{other}`"
                )));
            },
        };
        base.set_scheme(scheme)
            .map_err(|()| Error::InvalidEndpoint(format!("cannot use scheme {scheme}")))?;
        let url = base
            .join(path)
            .map_err(|e| Error::InvalidEndpoint(format!("{path}: {e}")))?;
        Self::from_url(url)
    }

    fn from_url(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => {},
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "expected ws:// or wss://, got `{other}://`"
                )));
            },
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidEndpoint(format!("{url}: missing host")));
        }
        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// `host[:port]` part of the endpoint.
    pub fn address(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
