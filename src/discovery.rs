//! Topic and payload grammar of the discovery convention.
//!
//! Every topic and template string this crate emits is built here, so the
//! wire format lives in one place:
//! - discovery config: `homeassistant/{component}[/{node_id}]/{obj_id}/config`
//! - component-owned state/command: `{component}/{unique_id}/get` / `.../set`
//! - device-shared state/command/availability: `device/{serial}/get|set|status`
//! - command payloads: `"{key};{payload}"`, first `;` delimits

use crate::error::{Error, Result};

/// Prefix the hub watches for discovery config messages.
pub const HASS_PREFIX: &str = "homeassistant";

/// Discovery config topic. The node_id segment is present only when set.
pub fn config_topic(
    prefix: &str,
    component_name: &str,
    node_id: Option<&str>,
    obj_id: &str,
) -> String {
    match node_id {
        Some(node_id) => format!("{}/{}/{}/{}/config", prefix, component_name, node_id, obj_id),
        None => format!("{}/{}/{}/config", prefix, component_name, obj_id),
    }
}

/// State topic of an unattached component.
pub fn state_topic(component_name: &str, unique_id: &str) -> String {
    format!("{}/{}/get", component_name, unique_id)
}

/// Command topic of an unattached component.
pub fn command_topic(component_name: &str, unique_id: &str) -> String {
    format!("{}/{}/set", component_name, unique_id)
}

/// Availability topic of an unattached component.
pub fn availability_topic(component_name: &str, unique_id: &str) -> String {
    format!("{}/{}/state", component_name, unique_id)
}

/// Device-shared state topic.
pub fn device_state_topic(serial_number: &str) -> String {
    format!("device/{}/get", serial_number)
}

/// Device-shared command topic.
pub fn device_command_topic(serial_number: &str) -> String {
    format!("device/{}/set", serial_number)
}

/// Device-shared availability topic.
pub fn device_availability_topic(serial_number: &str) -> String {
    format!("device/{}/status", serial_number)
}

/// Template expression selecting a component's value out of a state payload:
/// the raw payload when the component owns its root, otherwise the named slot
/// of the shared JSON snapshot.
pub fn value_source(value_path: Option<&str>) -> String {
    match value_path {
        None => "value".to_string(),
        Some(path) => format!("value_json.{}", path),
    }
}

/// Wrap a template expression in delimiters.
pub fn wrap_template(expr: &str) -> String {
    format!("{{{{ {} }}}}", expr)
}

/// Availability template: the whole payload, or one key of the aggregate map.
pub fn availability_template(key: Option<&str>) -> String {
    match key {
        None => wrap_template("value_json"),
        Some(key) => wrap_template(&format!("value_json.{}", key)),
    }
}

/// Command template telling the hub how to address one component of a device.
pub fn command_template(key: &str) -> String {
    format!("{};{{{{ value }}}}", key)
}

/// Split an inbound device command into `(component_key, payload)`.
///
/// The first `;` delimits; the key must be UTF-8. A payload without a
/// delimiter is a protocol violation, not a no-op.
pub fn split_command(payload: &[u8]) -> Result<(&str, &[u8])> {
    let split = payload
        .iter()
        .position(|&b| b == b';')
        .ok_or(Error::MalformedCommand)?;
    let key = std::str::from_utf8(&payload[..split]).map_err(|_| Error::MalformedCommand)?;
    Ok((key, &payload[split + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_topic_with_node_id() {
        assert_eq!(
            config_topic(HASS_PREFIX, "sensor", Some("n1"), "dev_temp"),
            "homeassistant/sensor/n1/dev_temp/config"
        );
    }

    #[test]
    fn test_config_topic_without_node_id() {
        assert_eq!(
            config_topic(HASS_PREFIX, "sensor", None, "dev_temp"),
            "homeassistant/sensor/dev_temp/config"
        );
    }

    #[test]
    fn test_component_topics() {
        assert_eq!(state_topic("sensor", "s1"), "sensor/s1/get");
        assert_eq!(command_topic("sensor", "s1"), "sensor/s1/set");
        assert_eq!(availability_topic("switch", "s1"), "switch/s1/state");
    }

    #[test]
    fn test_device_topics() {
        assert_eq!(device_state_topic("abc123"), "device/abc123/get");
        assert_eq!(device_command_topic("abc123"), "device/abc123/set");
        assert_eq!(device_availability_topic("abc123"), "device/abc123/status");
    }

    #[test]
    fn test_value_templates() {
        assert_eq!(wrap_template(&value_source(None)), "{{ value }}");
        assert_eq!(
            wrap_template(&value_source(Some("temp"))),
            "{{ value_json.temp }}"
        );
    }

    #[test]
    fn test_availability_templates() {
        assert_eq!(availability_template(None), "{{ value_json }}");
        assert_eq!(availability_template(Some("fan")), "{{ value_json.fan }}");
    }

    #[test]
    fn test_command_template() {
        assert_eq!(command_template("fan"), "fan;{{ value }}");
    }

    #[test]
    fn test_split_command() {
        let (key, payload) = split_command(b"fan;42").unwrap();
        assert_eq!(key, "fan");
        assert_eq!(payload, b"42");
    }

    #[test]
    fn test_split_command_on_first_semicolon_only() {
        let (key, payload) = split_command(b"fan;a;b").unwrap();
        assert_eq!(key, "fan");
        assert_eq!(payload, b"a;b");
    }

    #[test]
    fn test_split_command_empty_payload() {
        let (key, payload) = split_command(b"fan;").unwrap();
        assert_eq!(key, "fan");
        assert_eq!(payload, b"");
    }

    #[test]
    fn test_split_command_without_delimiter_is_an_error() {
        assert!(matches!(
            split_command(b"fan42"),
            Err(Error::MalformedCommand)
        ));
    }
}
