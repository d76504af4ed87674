//! Backend configuration.
//!
//! Built once by the caller and handed to constructors; nothing here is global.

use std::fmt;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{LifecycleSettings, Notifier, TransitionPolicy};
use crate::registration::{ConflictPolicy, RegistrationSettings};

/// Application-level constants
pub const APP_NAME: &str = "CarePulse";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "carepulse_core=info,carepulse_appwrite=info"
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration variable {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection and behavior settings for the hosted backend.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub endpoint: String,
    pub project_id: String,
    #[serde(default)]
    pub api_key: String,
    pub database_id: String,
    pub patient_collection_id: String,
    pub appointment_collection_id: String,
    pub bucket_id: String,
    /// Sender name in notifications
    #[serde(default = "default_brand_name")]
    pub brand_name: String,
    /// Offset used to render appointment times in messages
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
}

fn default_brand_name() -> String {
    APP_NAME.to_string()
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("api_key", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("patient_collection_id", &self.patient_collection_id)
            .field("appointment_collection_id", &self.appointment_collection_id)
            .field("bucket_id", &self.bucket_id)
            .field("brand_name", &self.brand_name)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("conflict_policy", &self.conflict_policy)
            .field("transition_policy", &self.transition_policy)
            .finish()
    }
}

impl Default for BackendConfig {
    /// Settings for the local SQLite backend.
    fn default() -> Self {
        Self {
            endpoint: "http://localhost/v1".into(),
            project_id: "local".into(),
            api_key: String::new(),
            database_id: "carepulse".into(),
            patient_collection_id: "patients".into(),
            appointment_collection_id: "appointments".into(),
            bucket_id: "identification".into(),
            brand_name: default_brand_name(),
            utc_offset_minutes: 0,
            conflict_policy: ConflictPolicy::default(),
            transition_policy: TransitionPolicy::default(),
        }
    }
}

impl BackendConfig {
    /// Load from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> ConfigResult<String> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let utc_offset_minutes = match lookup("UTC_OFFSET_MINUTES") {
            Some(raw) => {
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                        name: "UTC_OFFSET_MINUTES",
                        reason: e.to_string(),
                    })?
            }
            None => 0,
        };

        let config = Self {
            endpoint: required("ENDPOINT")?,
            project_id: required("PROJECT_ID")?,
            api_key: required("API_KEY")?,
            database_id: required("DATABASE_ID")?,
            patient_collection_id: required("PATIENT_COLLECTION_ID")?,
            appointment_collection_id: required("APPOINTMENT_COLLECTION_ID")?,
            bucket_id: required("STORAGE_BUCKET_ID")?,
            brand_name: lookup("BRAND_NAME").unwrap_or_else(default_brand_name),
            utc_offset_minutes,
            conflict_policy: ConflictPolicy::default(),
            transition_policy: TransitionPolicy::default(),
        };
        config.display_offset()?;
        Ok(config)
    }

    /// Load from a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.display_offset()?;
        Ok(config)
    }

    /// Timezone for rendering appointment times.
    pub fn display_offset(&self) -> ConfigResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::Invalid {
                name: "UTC_OFFSET_MINUTES",
                reason: format!("{} is out of range", self.utc_offset_minutes),
            }
        })
    }

    pub fn lifecycle_settings(&self) -> ConfigResult<LifecycleSettings> {
        Ok(LifecycleSettings {
            collection_id: self.appointment_collection_id.clone(),
            notifier: Notifier::new(self.brand_name.clone(), self.display_offset()?),
            transition_policy: self.transition_policy,
        })
    }

    pub fn registration_settings(&self) -> RegistrationSettings {
        RegistrationSettings {
            patient_collection_id: self.patient_collection_id.clone(),
            bucket_id: self.bucket_id.clone(),
            endpoint: self.endpoint.clone(),
            project_id: self.project_id.clone(),
            conflict_policy: self.conflict_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ENDPOINT", "https://cloud.example.com/v1"),
            ("PROJECT_ID", "carepulse"),
            ("API_KEY", "secret-key"),
            ("DATABASE_ID", "db"),
            ("PATIENT_COLLECTION_ID", "patients"),
            ("APPOINTMENT_COLLECTION_ID", "appointments"),
            ("STORAGE_BUCKET_ID", "ids"),
        ])
    }

    #[test]
    fn test_from_lookup() {
        let vars = env();
        let config = BackendConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.endpoint, "https://cloud.example.com/v1");
        assert_eq!(config.bucket_id, "ids");
        assert_eq!(config.brand_name, "CarePulse");
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.transition_policy, TransitionPolicy::Enforce);
    }

    #[test]
    fn test_missing_variable() {
        let mut vars = env();
        vars.remove("API_KEY");

        let err = BackendConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("API_KEY")));
    }

    #[test]
    fn test_invalid_offset() {
        let mut vars = env();
        vars.insert("UTC_OFFSET_MINUTES", "abc");
        assert!(BackendConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_err());

        vars.insert("UTC_OFFSET_MINUTES", "100000");
        assert!(BackendConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn test_from_json_with_defaults() {
        let config = BackendConfig::from_json_str(
            r#"{
                "endpoint": "https://cloud.example.com/v1",
                "project_id": "carepulse",
                "database_id": "db",
                "patient_collection_id": "patients",
                "appointment_collection_id": "appointments",
                "bucket_id": "ids",
                "utc_offset_minutes": -300,
                "conflict_policy": "fail"
            }"#,
        )
        .unwrap();

        assert_eq!(config.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(config.display_offset().unwrap().local_minus_utc(), -300 * 60);
        assert_eq!(config.lifecycle_settings().unwrap().collection_id, "appointments");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = BackendConfig {
            api_key: "secret-key".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("secret-key"));
    }

    #[test]
    fn test_app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
