use std::path::PathBuf;

use livefeed_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Endpoint(#[from] livefeed_channel::Error),
    #[error("unsupported config format: .{0}")]
    UnsupportedFormat(String),
    #[error("unknown channel `{name}`")]
    UnknownChannel { name: String },
    #[error("channel `{name}`: {message}")]
    InvalidChannel { name: String, message: String },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_channel(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidChannel {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

livefeed_common::impl_context!();
