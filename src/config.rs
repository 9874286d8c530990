//! Engine configuration and file locations.
//!
//! `EngineConfig` is a JSON file (`dream_engine.json`); missing fields take
//! their defaults, a missing file means all defaults.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name
pub const CONFIG_FILE: &str = "dream_engine.json";
/// Default log file name for `--log` without a path
pub const LOG_FILE: &str = "dream_engine.log";
/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "DREAM_ENGINE_CONFIG_DIR";

const APP_DIR: &str = "dream-engine";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend used by Generate nodes without a `backend` parameter
    /// (empty = first registered)
    pub default_backend: String,
    pub procedural: ProceduralSettings,
    pub viewport: ViewportSettings,
    pub output: OutputSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_backend: String::new(),
            procedural: ProceduralSettings::default(),
            viewport: ViewportSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralSettings {
    /// Artificial latency per sampling step
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    /// Re-run the tree in the viewport on scene changes
    pub live_render: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Used when the CLI gets no `--output`
    pub path: PathBuf,
    /// Write progressive previews here when set
    pub preview_dir: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("render.png"),
            preview_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// Configuration for overriding default paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (DREAM_ENGINE_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. DREAM_ENGINE_CONFIG_DIR environment variable
/// 3. Current folder IF it holds dream_engine.json or dream_engine.log
/// 4. Platform config directory from dirs-next
///
/// Platform paths:
/// - Linux: ~/.config/dream-engine/{name}
/// - macOS: ~/Library/Application Support/dream-engine/{name}
/// - Windows: %APPDATA%\dream-engine\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Path to a data file (logs). Same priority, platform data directory last.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create the config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [CONFIG_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn local_dir() -> Option<PathBuf> {
    std::env::current_dir().ok().filter(|d| has_local_config_files(d))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file(LOG_FILE, &config), PathBuf::from("/custom/dream_engine.log"));
    }

    #[test]
    fn test_cli_dir_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("dream_engine_no_such_config.json");
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.output.path, PathBuf::from("render.png"));
    }

    #[test]
    fn test_partial_file_and_roundtrip() {
        let dir = std::env::temp_dir().join(format!("dream_engine_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);

        std::fs::write(&path, r#"{"viewport": {"live_render": true}}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert!(config.viewport.live_render);
        assert_eq!(config.procedural.step_delay_ms, 0);

        let mut changed = config.clone();
        changed.default_backend = "procedural".into();
        changed.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), changed);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(EngineConfig::load(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
