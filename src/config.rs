use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://workflowy.com/api/v1";
pub const DEFAULT_DATABASE_PATH: &str = "workflowy_flow.db";
pub const DEFAULT_APP_NAME: &str = "Workflowy Flow";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub wf_api_key: String,
    pub wf_api_base_url: String,
    pub database_path: PathBuf,
    pub app_name: String,
    pub debug: bool,
    pub bind_addr: String,
}

impl Settings {
    /// Load from the process environment. Only `WF_API_KEY` is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] over any key → value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let wf_api_key = get("WF_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .context("WF_API_KEY must be set")?;
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            wf_api_key,
            wf_api_base_url: or("WF_API_BASE_URL", DEFAULT_API_BASE_URL),
            database_path: PathBuf::from(or("DATABASE_PATH", DEFAULT_DATABASE_PATH)),
            app_name: or("APP_NAME", DEFAULT_APP_NAME),
            debug: get("DEBUG").map(|v| parse_bool(&v)).unwrap_or(false),
            bind_addr: or("BIND_ADDR", DEFAULT_BIND_ADDR),
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
