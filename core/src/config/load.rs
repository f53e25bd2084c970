use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default taskpulse data directory: ~/.taskpulse
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".taskpulse"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskpulse/config.toml (highest)
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    // Log files default into the data directory.
    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg.polling
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config: {e}"))?;

    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

/// Environment variable overrides (Priority 0: highest). Blank values are
/// ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TASKPULSE_BASE_URL") {
        cfg.backend.base_url = v;
    }
    if let Some(v) = get("TASKPULSE_API_KEY") {
        cfg.backend.api_key = v;
    }
    if let Some(v) = get("TASKPULSE_POLL_INTERVAL_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) => cfg.polling.task_interval_ms = ms,
            Err(_) => tracing::warn!(value = %v, "ignoring invalid TASKPULSE_POLL_INTERVAL_MS"),
        }
    }
}
