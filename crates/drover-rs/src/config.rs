//! Configuration: tier-to-model routing and user permission overrides.
//!
//! All fields have built-in defaults; a config file only needs the keys it
//! changes. An unreadable or malformed file degrades to the defaults with
//! a warning — configuration problems never crash the process.

use crate::Tier;
use crate::tools::permission::ToolPermissions;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Model ids per tier, in OpenRouter `provider/model` form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierModels {
    pub superfast: String,
    pub fast: String,
    pub smart: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            superfast: "google/gemini-2.5-flash-lite".to_string(),
            fast: "google/gemini-2.5-flash".to_string(),
            smart: "anthropic/claude-sonnet-4".to_string(),
        }
    }
}

/// Routing configuration for the agent loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Model selected per tier.
    pub models: TierModels,
    /// Optional provider-order hint per tier (OpenRouter provider names).
    /// Applied only when the turn carries no images.
    pub providers: HashMap<Tier, Vec<String>>,
    /// Model used whenever the turn carries images, regardless of tier.
    pub vision_model: String,
    /// Tier used when the classifier has no verdict.
    pub default_tier: Tier,
    /// Explicit tier override; skips classification entirely.
    pub tier_override: Option<Tier>,
    /// Max completion tokens per request. 0 omits the field.
    pub max_tokens: u32,
    /// Sampling temperature. 0.0 omits the field.
    pub temperature: f32,
    /// Maximum streaming rounds per turn before giving up on tool loops.
    pub max_rounds: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            models: TierModels::default(),
            providers: HashMap::new(),
            vision_model: "google/gemini-2.5-flash".to_string(),
            default_tier: Tier::Fast,
            tier_override: None,
            max_tokens: 8192,
            temperature: 0.0,
            max_rounds: 25,
        }
    }
}

impl RouterConfig {
    /// The model id for a tier.
    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Superfast => &self.models.superfast,
            Tier::Fast => &self.models.fast,
            Tier::Smart => &self.models.smart,
        }
    }

    /// The provider-order hint for a tier, if configured.
    pub fn providers_for(&self, tier: Tier) -> Option<&[String]> {
        self.providers.get(&tier).map(|v| v.as_slice())
    }

    /// Force a tier, skipping classification (builder pattern).
    pub fn with_tier_override(mut self, tier: Tier) -> Self {
        self.tier_override = Some(tier);
        self
    }
}

/// Top-level configuration file shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfig,
    /// Per-tool permission overrides, merged ahead of the built-in rules.
    pub permissions: HashMap<String, ToolPermissions>,
}

impl Config {
    /// Load configuration from a JSON file. A missing, unreadable, or
    /// malformed file yields the defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No config at {}: {e}; using defaults", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Malformed config at {}: {e}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::permission::PermissionAction;

    #[test]
    fn defaults_cover_every_tier() {
        let config = RouterConfig::default();
        assert!(!config.model_for(Tier::Superfast).is_empty());
        assert!(!config.model_for(Tier::Fast).is_empty());
        assert!(!config.model_for(Tier::Smart).is_empty());
        assert!(config.providers_for(Tier::Smart).is_none());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "router": {
                    "models": { "smart": "anthropic/claude-opus-4" },
                    "default_tier": "superfast"
                },
                "permissions": {
                    "shell": { "default": "allow", "rules": [] }
                }
            }"#,
        )
        .unwrap();

        let config = Config::load(&path);
        assert_eq!(config.router.model_for(Tier::Smart), "anthropic/claude-opus-4");
        // Unspecified fields keep their defaults.
        assert_eq!(
            config.router.model_for(Tier::Fast),
            TierModels::default().fast
        );
        assert_eq!(config.router.default_tier, Tier::Superfast);
        assert_eq!(
            config.permissions.get("shell").map(|p| p.default),
            Some(PermissionAction::Allow)
        );
    }

    #[test]
    fn malformed_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(&path);
        assert_eq!(config.router.max_rounds, RouterConfig::default().max_rounds);
    }

    #[test]
    fn missing_file_degrades_to_defaults() {
        let config = Config::load("/nonexistent/config.json");
        assert_eq!(config.router.default_tier, Tier::Fast);
    }
}
