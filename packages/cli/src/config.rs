use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "pages.config.json";

/// Pages configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL that mutation and query endpoints are resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page parameters available to endpoint templates (e.g. `namespace`)
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Code-mode re-parse delay
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_debounce_ms() -> u64 {
    300
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    /// Config params overlaid with `KEY=VALUE` pairs from the command line
    pub fn params_with(&self, overrides: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
        let mut params = self.params.clone();
        for pair in overrides {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got \"{}\"", pair))?;
            params.insert(key.trim().to_string(), value.to_string());
        }
        Ok(params)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            params: BTreeMap::new(),
            debounce_ms: default_debounce_ms(),
        }
    }
}
