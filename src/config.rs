use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

/// Which backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Supabase,
    /// SQLite + local files + in-process relay, for offline development.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub messages_table: String,
    pub bucket: String,
    pub presence_channel: String,
    pub heartbeat_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            messages_table: "messages".to_string(),
            bucket: "uploads".to_string(),
            presence_channel: "online-status".to_string(),
            heartbeat_secs: 25,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/chat.db"),
            uploads_dir: PathBuf::from("data/uploads"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub supabase: SupabaseConfig,
    pub local: LocalConfig,
}

impl AppConfig {
    /// `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `CHAT_BACKEND` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("SUPABASE_URL") {
            self.supabase.url = url;
        }
        if let Ok(key) = env::var("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = key;
        }
        if let Ok(backend) = env::var("CHAT_BACKEND") {
            match BackendKind::from_str(&backend, true) {
                Ok(kind) => self.backend = kind,
                Err(err) => log::warn!("Ignoring CHAT_BACKEND={backend}: {err}"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.backend == BackendKind::Supabase {
            if self.supabase.url.trim().is_empty() {
                return Err(ChatError::Config("SUPABASE_URL is not set".into()));
            }
            if self.supabase.anon_key.trim().is_empty() {
                return Err(ChatError::Config("SUPABASE_ANON_KEY is not set".into()));
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|err| {
            log::warn!("Failed to parse config file {}: {err}", path.display());
            AppConfig::default()
        }),
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

fn parse_config(content: &str) -> serde_json::Result<AppConfig> {
    serde_json::from_str::<AppConfig>(content)
}
