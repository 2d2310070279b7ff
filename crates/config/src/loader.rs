use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::LivefeedConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "livefeed.toml",
    "livefeed.yaml",
    "livefeed.yml",
    "livefeed.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<LivefeedConfig> {
    let raw = read_with_env(path)?;
    parse_config(&raw, path)
}

/// Load the config file as an untyped tree, after env substitution.
pub fn load_config_value(path: &Path) -> Result<serde_json::Value> {
    let raw = read_with_env(path)?;
    parse_config_value(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./livefeed.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/livefeed/livefeed.{toml,yaml,yml,json}` (user-global)
///
/// Returns `LivefeedConfig::default()` if no config file is found or it
/// fails to load.
pub fn discover_and_load() -> LivefeedConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    LivefeedConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(p) = find_in_dir(Path::new(".")) {
        return Some(p);
    }
    config_dir().and_then(|dir| find_in_dir(&dir))
}

/// Returns the user-global config directory (`~/.config/livefeed/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "livefeed").map(|d| d.config_dir().to_path_buf())
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn read_with_env(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(substitute_env(&raw))
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<LivefeedConfig> {
    match extension(path) {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

pub(crate) fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    match extension(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        ext => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::schema::MaxRetries, std::io::Write};

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = write_file(
            dir.path(),
            "livefeed.toml",
            "origin = \"https://a.example\"\n[channels.prices]\npath = \"/ws/price-feeds/\"\n",
        );
        let yaml_path = write_file(
            dir.path(),
            "livefeed.yaml",
            "origin: https://a.example\nchannels:\n  prices:\n    path: /ws/price-feeds/\n",
        );
        let json_path = write_file(
            dir.path(),
            "livefeed.json",
            r#"{"origin":"https://a.example","channels":{"prices":{"path":"/ws/price-feeds/"}}}"#,
        );

        for path in [toml_path, yaml_path, json_path] {
            let cfg = load_config(&path).unwrap();
            assert_eq!(cfg.origin.as_deref(), Some("https://a.example"), "{path:?}");
            assert_eq!(
                cfg.channels["prices"].path.as_deref(),
                Some("/ws/price-feeds/")
            );
        }
    }

    #[test]
    fn yaml_accepts_unlimited_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "livefeed.yml",
            "channels:\n  map:\n    url: ws://127.0.0.1:8000/ws/admin/delivery-monitoring/\n    max_retries: unlimited\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.channels["map"].max_retries, Some(MaxRetries::Unlimited));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "livefeed.ini", "origin=x");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ref ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livefeed.toml");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("livefeed.toml"));
    }

    #[test]
    fn find_in_dir_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "livefeed.json", "{}");
        write_file(dir.path(), "livefeed.toml", "");
        assert_eq!(
            find_in_dir(dir.path()),
            Some(dir.path().join("livefeed.toml"))
        );
    }

    #[test]
    fn value_tree_is_format_independent() {
        let toml_value =
            parse_config_value("[defaults]\nbase_delay_ms = 0\n", Path::new("a.toml")).unwrap();
        let yaml_value =
            parse_config_value("defaults:\n  base_delay_ms: 0\n", Path::new("a.yaml")).unwrap();
        assert_eq!(toml_value, yaml_value);
    }
}
