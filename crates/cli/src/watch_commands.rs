//! `livefeed watch`: print a stream's envelopes to stdout until Ctrl-C.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    clap::Args,
    livefeed_channel::{ChannelConfig, RealtimeChannel, WsConnector, events},
    livefeed_config::{ChannelEntry, LivefeedConfig},
    livefeed_protocol::Envelope,
    serde_json::Value,
    tracing::info,
};

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Channel name from the config file.
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    channel: Option<String>,
    /// Full ws:// or wss:// URL instead of a configured channel.
    #[arg(long)]
    url: Option<String>,
    /// Envelope (JSON) to send after every connect. Repeatable.
    #[arg(long = "send", value_name = "JSON")]
    send: Vec<String>,
    /// Only print envelopes of this type. Repeatable.
    #[arg(long = "type", value_name = "TYPE")]
    kinds: Vec<String>,
    /// Reconnect forever regardless of the configured max_retries.
    #[arg(long)]
    forever: bool,
}

const IDLE_POLL: Duration = Duration::from_millis(500);

pub async fn handle_watch(
    config: &LivefeedConfig,
    origin: Option<&str>,
    args: &WatchArgs,
) -> Result<()> {
    let channel_config = channel_config_for(config, origin, args)?;
    let endpoint = channel_config.endpoint.clone();

    let mut connector = WsConnector::new();
    if let Some(ca_file) = &config.ca_file {
        connector = connector.with_ca_file(ca_file);
    }
    let channel = RealtimeChannel::with_connector(channel_config, Arc::new(connector));

    let kinds = args.kinds.clone();
    channel.on(events::MESSAGE, move |envelope| {
        let wanted = kinds.is_empty()
            || envelope
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| kinds.iter().any(|k| k == t));
        if wanted {
            println!("{}", Value::Object(envelope.clone()));
        }
    });
    {
        let endpoint = endpoint.clone();
        channel.on(events::CONNECT, move |_| info!(%endpoint, "stream open"));
    }
    {
        let endpoint = endpoint.clone();
        channel.on(events::DISCONNECT, move |_| info!(%endpoint, "stream closed"));
    }

    channel.connect();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut idle_check = tokio::time::interval(IDLE_POLL);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, closing stream");
                break;
            },
            _ = idle_check.tick() => {
                if channel.is_idle() {
                    bail!(
                        "gave up on {endpoint} after {} reconnect attempts",
                        channel.retry_count()
                    );
                }
            },
        }
    }

    channel.disconnect();
    Ok(())
}

fn channel_config_for(
    config: &LivefeedConfig,
    origin: Option<&str>,
    args: &WatchArgs,
) -> Result<ChannelConfig> {
    let mut channel_config = match (&args.url, &args.channel) {
        (Some(url), _) => {
            let entry = ChannelEntry {
                url: Some(url.clone()),
                ..ChannelEntry::default()
            };
            entry.resolve("--url", origin, &config.defaults)?
        },
        (None, Some(name)) => config.channel_config(name, origin)?,
        (None, None) => bail!("pass a channel name or --url"),
    };

    for raw in &args.send {
        let envelope = Envelope::parse(raw).with_context(|| format!("--send {raw}"))?;
        channel_config = channel_config.with_on_open(envelope);
    }
    if args.forever {
        channel_config = channel_config.with_max_retries(None);
    }
    Ok(channel_config)
}
