//! `livefeed doctor`: config validation and channel health check.
//!
//! Runs a series of checks and prints a structured report with `[ok]`,
//! `[warn]`, `[fail]`, `[skip]`, or `[info]` status indicators per item.

use std::path::Path;

use {
    anyhow::Result,
    futures::SinkExt,
    livefeed_channel::{Connector, WsConnector},
    livefeed_config::{
        LivefeedConfig,
        validate::{self, Severity},
    },
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-check result used to build the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Skip,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Skip => DIM,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub async fn handle_doctor(
    config_path: Option<&Path>,
    origin: Option<&str>,
    probe: bool,
    verbose: bool,
) -> Result<()> {
    eprintln!("{BOLD}livefeed doctor{RESET}");
    eprintln!("{BOLD}==============={RESET}\n");

    let mut sections = Vec::new();

    // 1. Config validation
    let (section, config) = check_config(config_path, verbose);
    sections.push(section);

    // 2. Channel resolution
    sections.push(check_channels(&config, origin));

    // 3. TLS trust
    sections.push(check_tls(&config, origin));

    // 4. Connectivity
    sections.push(check_connectivity(&config, origin, probe).await);

    let (errors, warnings) = print_report(&sections);

    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

// ── 1. Config validation ────────────────────────────────────────────────────

fn check_config(config_path: Option<&Path>, verbose: bool) -> (Section, LivefeedConfig) {
    let result = validate::validate(config_path);
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));

    let Some(path) = &result.config_path else {
        section.push(Status::Info, "no config file found; using defaults");
        return (section, LivefeedConfig::default());
    };

    if result.diagnostics.iter().any(|d| d.category == "syntax") {
        for d in &result.diagnostics {
            section.push(Status::Fail, d.message.clone());
        }
        // Can't do further checks with broken syntax
        return (section, LivefeedConfig::default());
    }
    section.push(Status::Ok, "Syntax valid");

    if !result
        .diagnostics
        .iter()
        .any(|d| d.category == "unknown-field")
    {
        section.push(Status::Ok, "All fields recognized");
    }
    if !result.diagnostics.iter().any(|d| d.category == "type-error") {
        section.push(Status::Ok, "No type errors");
    }

    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        let msg = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(d.severity.into(), msg);
    }

    let config = livefeed_config::load_config(path).unwrap_or_default();
    (section, config)
}

// ── 2. Channel resolution ───────────────────────────────────────────────────

fn check_channels(config: &LivefeedConfig, origin: Option<&str>) -> Section {
    let mut section = Section::new("Channels");

    if config.channels.is_empty() {
        section.push(Status::Skip, "No channels configured");
        return section;
    }

    if let Some(origin) = origin {
        section.push(Status::Info, format!("Origin override: {origin}"));
    }

    for name in config.channel_names() {
        match config.channel_config(name, origin) {
            Ok(channel) => section.push(Status::Ok, format!("{name} → {}", channel.endpoint)),
            Err(e) => section.push(Status::Fail, e.to_string()),
        }
    }

    section
}

// ── 3. TLS trust ────────────────────────────────────────────────────────────

fn check_tls(config: &LivefeedConfig, origin: Option<&str>) -> Section {
    let mut section = Section::new("TLS");

    let secure = config
        .channel_names()
        .filter_map(|name| config.channel_config(name, origin).ok())
        .any(|c| c.endpoint.is_secure());
    if !secure && config.ca_file.is_none() {
        section.push(Status::Skip, "No wss:// channels");
        return section;
    }

    match &config.ca_file {
        None => section.push(Status::Ok, "Using system trust roots"),
        Some(path) => match std::fs::read_to_string(path) {
            Ok(pem) if pem.contains("BEGIN CERTIFICATE") => {
                section.push(Status::Ok, format!("Extra CA bundle: {}", path.display()));
            },
            Ok(_) => section.push(
                Status::Fail,
                format!("No PEM certificates in {}", path.display()),
            ),
            Err(e) => section.push(
                Status::Fail,
                format!("Cannot read CA bundle {}: {e}", path.display()),
            ),
        },
    }

    section
}

// ── 4. Connectivity ─────────────────────────────────────────────────────────

async fn check_connectivity(config: &LivefeedConfig, origin: Option<&str>, probe: bool) -> Section {
    let mut section = Section::new("Connectivity");

    if !probe {
        section.push(Status::Skip, "Pass --probe to try each channel once");
        return section;
    }

    let mut connector = WsConnector::new();
    if let Some(ca_file) = &config.ca_file {
        connector = connector.with_ca_file(ca_file);
    }

    for name in config.channel_names() {
        let Ok(channel) = config.channel_config(name, origin) else {
            section.push(Status::Skip, format!("{name}: endpoint does not resolve"));
            continue;
        };
        let attempt =
            tokio::time::timeout(channel.connect_timeout, connector.connect(&channel.endpoint))
                .await;
        match attempt {
            Ok(Ok((mut sink, _stream))) => {
                let _ = sink.close().await;
                section.push(Status::Ok, format!("{name}: connected"));
            },
            Ok(Err(e)) => section.push(Status::Fail, format!("{name}: {e}")),
            Err(_) => section.push(
                Status::Fail,
                format!(
                    "{name}: no handshake within {}ms",
                    channel.connect_timeout.as_millis()
                ),
            ),
        }
    }

    section
}
