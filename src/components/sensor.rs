//! Sensor kinds and their discovery defaults.

use super::base::{Component, ComponentKind};

/// The closed set of sensor kinds, each carrying its default device class,
/// unit of measurement, and value-cast for the emitted template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// A sensor with no particular class; defaults are placeholders meant to
    /// be overridden.
    Generic,
    Temperature,
    Humidity,
    Battery,
    /// Reports epoch seconds; the emitted template wraps the slot in a
    /// datetime construction so the hub sees a timestamp, not an integer.
    Timestamp,
}

impl SensorKind {
    pub fn device_class(&self) -> &'static str {
        match self {
            SensorKind::Generic => "None",
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Battery => "battery",
            SensorKind::Timestamp => "timestamp",
        }
    }

    /// The timestamp class takes no unit.
    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        match self {
            SensorKind::Generic => Some("u"),
            SensorKind::Temperature => Some("°C"),
            SensorKind::Humidity | SensorKind::Battery => Some("%"),
            SensorKind::Timestamp => None,
        }
    }

    pub(crate) fn cast(&self, expr: &str) -> String {
        match self {
            SensorKind::Timestamp => format!("as_datetime({})", expr),
            _ => expr.to_string(),
        }
    }
}

/// Build a sensor component of the given kind. The value starts at 0.
pub fn sensor(kind: SensorKind) -> Component {
    let component = Component::new(ComponentKind::Sensor(kind));
    component.set_value(0);
    component
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_temperature_defaults() {
        let data = sensor(SensorKind::Temperature).config_data();
        assert_eq!(data["device_class"], json!("temperature"));
        assert_eq!(data["unit_of_measurement"], json!("°C"));
    }

    #[test]
    fn test_humidity_and_battery_defaults() {
        let data = sensor(SensorKind::Humidity).config_data();
        assert_eq!(data["device_class"], json!("humidity"));
        assert_eq!(data["unit_of_measurement"], json!("%"));

        let data = sensor(SensorKind::Battery).config_data();
        assert_eq!(data["device_class"], json!("battery"));
        assert_eq!(data["unit_of_measurement"], json!("%"));
    }

    #[test]
    fn test_generic_defaults_are_placeholders() {
        let data = sensor(SensorKind::Generic).config_data();
        assert_eq!(data["device_class"], json!("None"));
        assert_eq!(data["unit_of_measurement"], json!("u"));
    }

    #[test]
    fn test_device_class_override_wins() {
        let component = sensor(SensorKind::Temperature);
        component.set_field("device_class", json!("heat"));
        assert_eq!(component.config_data()["device_class"], json!("heat"));
    }

    #[test]
    fn test_timestamp_has_no_unit_and_casts_its_template() {
        let data = sensor(SensorKind::Timestamp).config_data();
        assert_eq!(data["device_class"], json!("timestamp"));
        assert!(!data.contains_key("unit_of_measurement"));
        assert_eq!(data["value_template"], json!("{{ as_datetime(value) }}"));
    }

    #[test]
    fn test_sensor_value_starts_at_zero() {
        assert_eq!(sensor(SensorKind::Temperature).get_value(), json!(0));
    }
}
