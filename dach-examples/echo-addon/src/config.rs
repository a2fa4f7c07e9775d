use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dach_core::{AppConfig, DachConfig};

/// Settings for the echo add-on process.
pub struct EchoSettings {
    pub host: String,
    pub port: String,
    pub templates: PathBuf,
    pub dach: DachConfig,
}

impl EchoSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read settings from the environment (and `.env`, when present).
pub fn load() -> Result<EchoSettings> {
    let _ = dotenvy::dotenv();

    let host = env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("HTTP_PORT").unwrap_or_else(|_| "3000".to_string());
    let templates = env::var("DACH_TEMPLATES")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates")));

    let dach = match env::var("DACH_CONFIG") {
        Ok(path) => DachConfig::from_path(&path).with_context(|| format!("cannot load {path}"))?,
        Err(_) => default_config(),
    };

    Ok(EchoSettings {
        host,
        port,
        templates,
        dach,
    })
}

/// Add-on registry used when no config file is given.
pub fn default_config() -> DachConfig {
    DachConfig::new().with_app(
        "echo",
        AppConfig::new(["send_notification", "view_group"]).with_descriptor("echo/atlassian-connect.json"),
    )
}
