use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::resolution::matcher::DEFAULT_THRESHOLD;

const DEFAULT_LLM_CALL_CAP: u32 = 3;

/// Application configuration loaded from environment variables.
/// Every variable has a default; startup fails only on values that do not parse.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the KB files: `roles_kb.json`, `roles_kb_custom.json` and the template dirs.
    pub data_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    /// Score (0 to 100) reported as `meets_threshold`. Never finalizes a role.
    pub fuzzy_threshold: u8,
    pub anthropic_api_key: Option<String>,
    /// Consult the LLM extractor before the heuristic splitter. Needs `anthropic_api_key`.
    pub llm_extraction: bool,
    /// External extraction calls allowed per session.
    pub llm_call_cap: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let fuzzy_threshold = match optional_env("FUZZY_THRESHOLD") {
            Some(raw) => raw
                .parse::<u8>()
                .context("FUZZY_THRESHOLD must be an integer between 0 and 100")?,
            None => DEFAULT_THRESHOLD,
        };
        if fuzzy_threshold > 100 {
            bail!("FUZZY_THRESHOLD must be between 0 and 100, got {fuzzy_threshold}");
        }

        Ok(Config {
            data_dir: PathBuf::from(optional_env("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            port: optional_env("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            fuzzy_threshold,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            llm_extraction: optional_env("LLM_EXTRACTION")
                .map(|raw| parse_flag(&raw))
                .transpose()?
                .unwrap_or(false),
            llm_call_cap: match optional_env("LLM_CALL_CAP") {
                Some(raw) => raw
                    .parse::<u32>()
                    .context("LLM_CALL_CAP must be a non-negative integer")?,
                None => DEFAULT_LLM_CALL_CAP,
            },
        })
    }

    /// Defaults rooted at `data_dir`, without reading the environment.
    #[cfg(test)]
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            port: 0,
            rust_log: "debug".to_string(),
            fuzzy_threshold: DEFAULT_THRESHOLD,
            anthropic_api_key: None,
            llm_extraction: false,
            llm_call_cap: DEFAULT_LLM_CALL_CAP,
        }
    }
}

/// Unset and blank variables are treated the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean flag, got '{other}'"),
    }
}
