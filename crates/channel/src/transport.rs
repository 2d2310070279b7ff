//! Connection seam between the channel and the network.

use std::{path::PathBuf, pin::Pin, sync::Arc};

use {
    async_trait::async_trait,
    futures::{Sink, Stream, StreamExt},
    tokio_tungstenite::{
        Connector as TlsConnector, connect_async_tls_with_config,
        tungstenite::{Error as WsError, Message},
    },
    tracing::debug,
};

use crate::{
    endpoint::Endpoint,
    error::{Error, Result},
};

/// Write half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
/// Read half of an open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Opens connections for a channel.
///
/// The channel calls [`Connector::connect`] once per attempt and owns the
/// returned halves until the connection ends.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(FrameSink, FrameStream)>;
}

/// WebSocket connector over `tokio-tungstenite`.
///
/// `wss://` endpoints trust the system roots plus an optional extra PEM
/// bundle (for self-signed development servers).
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    extra_ca_file: Option<PathBuf>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust the certificates in `path` in addition to the system roots.
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_ca_file = Some(path.into());
        self
    }

    fn tls_connector(&self) -> Result<TlsConnector> {
        let mut root_store = rustls::RootCertStore::empty();

        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = root_store.add(cert);
        }

        if let Some(path) = &self.extra_ca_file {
            let pem_data = std::fs::read(path)?;
            let mut reader = std::io::BufReader::new(pem_data.as_slice());
            for cert in rustls_pemfile::certs(&mut reader).flatten() {
                let _ = root_store.add(cert);
            }
            debug!(path = %path.display(), "loaded extra CA bundle");
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(TlsConnector::Rustls(Arc::new(config)))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(FrameSink, FrameStream)> {
        let tls = if endpoint.is_secure() {
            Some(self.tls_connector()?)
        } else {
            None
        };
        let (ws_stream, _response) =
            connect_async_tls_with_config(endpoint.as_str(), None, false, tls).await?;
        let (sink, stream) = ws_stream.split();
        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
