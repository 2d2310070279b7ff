//! Reconnecting server-push channel.
//!
//! A [`RealtimeChannel`] owns one logical stream (`ws://` or `wss://`),
//! decodes inbound JSON envelopes, fans them out to callbacks registered by
//! `type`, and reconnects after failures according to a bounded
//! [`RetryPolicy`].
//!
//! ```no_run
//! use livefeed_channel::{ChannelConfig, Endpoint, RealtimeChannel, events};
//!
//! # async fn run() -> livefeed_channel::Result<()> {
//! let endpoint = Endpoint::from_origin("https://shop.example", "/ws/price-feeds/")?;
//! let channel = RealtimeChannel::new(
//!     ChannelConfig::new(endpoint).with_on_open(livefeed_protocol::get_prices()),
//! );
//! channel.on("price_update", |data| println!("{data:?}"));
//! channel.on(events::ERROR, |data| eprintln!("{:?}", data.get("message")));
//! channel.connect();
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod channel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod transport;

pub use {
    backoff::{BackoffStrategy, RetryPolicy},
    channel::{ConnectionStatus, RealtimeChannel},
    config::ChannelConfig,
    endpoint::Endpoint,
    error::{Error, Result},
    handlers::{Callback, HandlerId, Payload, events},
    transport::{Connector, FrameSink, FrameStream, WsConnector},
};
