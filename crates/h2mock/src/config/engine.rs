use crate::events::RetentionPolicy;
use serde::{Deserialize, Serialize};

/// Engine-wide knobs, fixed at boot (retention can still be switched at runtime).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Event history kept per key
    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Status answered when no rule matches
    #[serde(default = "default_unprovisioned_status_code")]
    pub unprovisioned_status_code: u16,

    /// Close delay handed to file writers
    #[serde(default = "default_file_close_delay_us")]
    pub file_close_delay_us: u64,

    /// Default cap on keys listed by the event summary
    #[serde(default = "default_summary_max_keys")]
    pub summary_max_keys: usize,

    /// Validate administrative documents against the embedded schemas
    #[serde(default = "default_true")]
    pub schema_validation: bool,
}

fn default_unprovisioned_status_code() -> u16 {
    501
}

fn default_file_close_delay_us() -> u64 {
    1_000_000
}

fn default_summary_max_keys() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            unprovisioned_status_code: default_unprovisioned_status_code(),
            file_close_delay_us: default_file_close_delay_us(),
            summary_max_keys: default_summary_max_keys(),
            schema_validation: default_true(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(100..=599).contains(&self.unprovisioned_status_code) {
            anyhow::bail!(
                "engine.unprovisionedStatusCode must be a valid HTTP status (100-599), got {}",
                self.unprovisioned_status_code
            );
        }
        if self.summary_max_keys == 0 {
            anyhow::bail!("engine.summaryMaxKeys must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let settings: EngineSettings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.unprovisioned_status_code, 501);
        assert_eq!(settings.retention, RetentionPolicy::Unbounded);
        assert!(settings.schema_validation);
    }

    #[test]
    fn test_engine_overrides() {
        let yaml = r#"
retention: latestOnly
unprovisionedStatusCode: 404
summaryMaxKeys: 5
schemaValidation: false
"#;
        let settings: EngineSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.retention, RetentionPolicy::LatestOnly);
        assert_eq!(settings.unprovisioned_status_code, 404);
        assert_eq!(settings.summary_max_keys, 5);
        assert!(!settings.schema_validation);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_engine_validation() {
        let settings = EngineSettings {
            unprovisioned_status_code: 42,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
        let settings = EngineSettings {
            summary_max_keys: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
