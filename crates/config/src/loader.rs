use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::RiftConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["rift.toml", "rift.yaml", "rift.yml", "rift.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RiftConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./rift.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/rift/rift.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RiftConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> RiftConfig {
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
    RiftConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/rift/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "rift").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RiftConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rift.toml");
        std::fs::write(&path, "[relay]\nexit_keyword = \"leave\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.relay.exit_keyword, "leave");
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rift.yaml");
        std::fs::write(&path, "timeouts:\n  join_secs: 5\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.timeouts.join_secs, 5);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rift.json");
        std::fs::write(&path, r#"{"irc": {"nickname": "bridge"}}"#).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.irc.nickname, "bridge");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rift.ini");
        std::fs::write(&path, "").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/rift.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rift.toml"));
    }
}
