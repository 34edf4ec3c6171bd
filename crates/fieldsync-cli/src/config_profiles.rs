//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fieldsync_core::{EngineConfig, EntityType};
use serde::{Deserialize, Serialize};

pub use fieldsync_core::util::{is_http_url, normalize_text_option};

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    /// Entity types routed to the API; the built-in set when empty
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub engine: EngineConfig,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("fieldsync")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) =
            normalize_profile_name(std::env::var("FIELDSYNC_PROFILE").ok().as_deref())
        {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// API base URL, `FIELDSYNC_API_URL` taking precedence over the profile
    pub fn api_base_url(&self) -> Option<String> {
        normalize_text_option(std::env::var("FIELDSYNC_API_URL").ok())
            .or_else(|| normalize_text_option(self.api_base_url.clone()))
    }

    /// Bearer token, only ever read from the environment
    pub fn api_token() -> Option<String> {
        normalize_text_option(std::env::var("FIELDSYNC_API_TOKEN").ok())
    }

    /// Entity types to register endpoints for
    pub fn entity_types(&self) -> Result<Vec<EntityType>, String> {
        if self.entities.is_empty() {
            return Ok(vec![
                EntityType::inspection(),
                EntityType::template(),
                EntityType::user(),
            ]);
        }
        self.entities
            .iter()
            .map(|name| EntityType::new(name).map_err(|error| error.to_string()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = normalize_text_option(self.api_base_url.clone()) {
            if !is_http_url(&url) {
                return Err("api_base_url must include http:// or https://".to_string());
            }
        }
        if self.quota_bytes == Some(0) {
            return Err("quota_bytes must be greater than zero".to_string());
        }
        self.entity_types()?;
        self.engine.validate()
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        let mut entities: Vec<String> = self
            .entities
            .iter()
            .filter_map(|name| normalize_text_option(Some(name.to_ascii_lowercase())))
            .collect();
        entities.sort();
        entities.dedup();
        self.entities = entities;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cli-config.json");

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some("default".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_base_url: Some(" https://api.example.com/v1/ ".to_string()),
                quota_bytes: Some(5_000_000),
                entities: vec![" Inspection ".to_string(), "user".to_string()],
                engine: EngineConfig::default(),
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        let profile = loaded.profiles.get("default").unwrap();
        assert_eq!(
            profile.api_base_url.as_deref(),
            Some("https://api.example.com/v1")
        );
        assert_eq!(profile.quota_bytes, Some(5_000_000));
        assert_eq!(profile.entities, vec!["inspection", "user"]);
    }

    #[test]
    fn missing_engine_section_uses_defaults() {
        let config: CliProfilesConfig = serde_json::from_str(
            r#"{"profiles":{"work":{"api_base_url":"https://api.example.com"}}}"#,
        )
        .unwrap();
        let profile = config.profile("work").unwrap();
        assert_eq!(profile.engine, EngineConfig::default());
        assert_eq!(config.version, 1);
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("tablet")), "tablet");
        assert_eq!(config.resolve_profile_name(None), "work");
    }

    #[test]
    fn entity_types_default_to_builtin_set() {
        let profile = CliProfile::default();
        assert_eq!(
            profile.entity_types().unwrap(),
            vec![
                EntityType::inspection(),
                EntityType::template(),
                EntityType::user()
            ]
        );
    }

    #[test]
    fn validate_rejects_bad_url_and_zero_quota() {
        let profile = CliProfile {
            api_base_url: Some("api.example.com".to_string()),
            ..CliProfile::default()
        };
        assert!(profile.validate().is_err());

        let profile = CliProfile {
            quota_bytes: Some(0),
            ..CliProfile::default()
        };
        assert!(profile.validate().is_err());
    }
}
