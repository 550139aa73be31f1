// Patitas Engine — Configuration
// Layered config: TOML file at ~/.patitas/config.toml, overridden by
// environment variables. Only the API key is mandatory; everything else has
// a working default.

use crate::atoms::constants::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::atoms::error::{RescueError, RescueResult};
use crate::engine::codec::NameRules;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    db_path: Option<String>,
    /// Known spelling variants and diminutives, alias → canonical name.
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub db_path: PathBuf,
    pub aliases: HashMap<String, String>,
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".patitas")
}

fn load_file(path: &PathBuf) -> RescueResult<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw)
        .map_err(|e| RescueError::config(format!("bad config file {}: {e}", path.display())))
}

impl Config {
    /// Resolve the effective configuration. Env vars win over the file;
    /// `OPENAI_API_KEY` is honored as the conventional key variable.
    pub fn load() -> RescueResult<Self> {
        let path = config_dir().join("config.toml");
        let file = load_file(&path)?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .or(file.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RescueError::config(format!(
                    "no API key: set OPENAI_API_KEY or api_key in {}",
                    path.display()
                ))
            })?;
        let base_url = std::env::var("PATITAS_BASE_URL")
            .ok()
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("PATITAS_MODEL")
            .ok()
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let db_path = std::env::var("PATITAS_DB")
            .ok()
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("patitas.db"));

        info!("[config] model {model}, store {}", db_path.display());
        Ok(Config {
            api_key,
            base_url,
            model,
            db_path,
            aliases: file.aliases,
        })
    }

    /// Name normalization rules seeded with the configured aliases.
    pub fn name_rules(&self) -> NameRules {
        NameRules::new(&self.aliases)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
