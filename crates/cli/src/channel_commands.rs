//! `livefeed channels`: list configured channels.

use {
    livefeed_config::LivefeedConfig,
    tracing::warn,
};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn handle_channels(config: &LivefeedConfig, origin: Option<&str>) {
    if config.channels.is_empty() {
        eprintln!("No channels configured.");
        return;
    }

    for name in config.channel_names() {
        match config.channel_config(name, origin) {
            Ok(channel) => {
                let retries = channel
                    .retry
                    .max_retries
                    .map_or_else(|| "unlimited".to_string(), |n| n.to_string());
                println!("{BOLD}{name}{RESET}  {}", channel.endpoint);
                println!(
                    "  {DIM}retries {retries}, {} backoff from {}ms, {} on-open envelope(s){RESET}",
                    channel.retry.strategy,
                    channel.retry.base_delay.as_millis(),
                    channel.on_open.len(),
                );
            },
            Err(e) => {
                warn!(channel = name, error = %e, "channel does not resolve");
                println!("{BOLD}{name}{RESET}  {RED}unresolved: {e}{RESET}");
            },
        }
    }
}
