//! MQTT connection settings.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Connection settings for the broker, normally loaded from the `"mqtt"`
/// section of a JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("bart-{}", uuid::Uuid::new_v4().simple())
}

fn default_keepalive() -> u64 {
    30
}

#[derive(Deserialize)]
struct ConfigFile {
    mqtt: MqttSettings,
}

impl MqttSettings {
    /// Load the `"mqtt"` section from a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ConfigFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.mqtt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mqtt": {{"host": "broker.local", "port": 1884, "client_id": "dev1",
                 "username": "u", "password": "p"}}}}"#
        )
        .unwrap();

        let settings = MqttSettings::load(file.path()).unwrap();
        assert_eq!(settings.host, "broker.local");
        assert_eq!(settings.port, 1884);
        assert_eq!(settings.client_id, "dev1");
        assert_eq!(settings.username.as_deref(), Some("u"));
        assert_eq!(settings.keepalive_secs, 30);
    }

    #[test]
    fn test_defaults() {
        let settings: MqttSettings = serde_json::from_str(r#"{"host": "localhost"}"#).unwrap();
        assert_eq!(settings.port, 1883);
        assert!(settings.client_id.starts_with("bart-"));
        assert!(settings.username.is_none());
    }

    #[test]
    fn test_missing_mqtt_section_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"other": {{}}}}"#).unwrap();
        assert!(MqttSettings::load(file.path()).is_err());
    }
}
