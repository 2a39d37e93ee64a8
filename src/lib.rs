//! # bart
//!
//! Device-side home automation over MQTT: build components (sensors,
//! switches), register them on a [`Device`], and the device announces them to
//! the hub via the discovery convention, samples them concurrently, publishes
//! one aggregate state snapshot, and routes inbound commands back to the
//! right component.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bart::{Device, DeviceInfo, MqttClient, MqttSettings, QoS, SensorKind};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = MqttSettings::load("config.json".as_ref())?;
//! let (client, eventloop) = MqttClient::connect(&settings);
//!
//! let device = Arc::new(Device::new(client.clone()));
//! device.configure(DeviceInfo {
//!     serial_number: Some("living-room-node".to_string()),
//!     manufacturer: Some("acme".to_string()),
//!     ..DeviceInfo::default()
//! });
//! device.add_component("temp", bart::sensor(SensorKind::Temperature))?;
//! device.add_component("fan", bart::switch())?;
//! device.set_availability();
//!
//! device.send_config(true, QoS::AtMostOnce).await?;
//! device.online(true, true, QoS::AtMostOnce).await?;
//! device.clone().subscribe().await?;
//!
//! tokio::spawn(client.run(eventloop, device.shutdown_signal()));
//! device.run(Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

/// Contains the MQTT client and transport boundary
pub mod client;
/// Contains the component kinds a device can expose
pub mod components;
/// Contains connection settings loading
pub mod config;
/// Contains the device aggregating components
pub mod device;
/// Contains the discovery topic and payload grammar
pub mod discovery;
/// Contains the error taxonomy
pub mod error;
/// Contains the attribute store
pub mod model;
/// Contains value-template rendering
pub mod template;

pub use client::{Callback, MqttClient, QoS, Transport};
pub use components::{
    sensor, switch, Component, ComponentKind, FnReader, IdleReader, Reader, SensorKind, ValueSlot,
    Writer,
};
pub use config::MqttSettings;
pub use device::{Device, DeviceInfo};
pub use error::{Error, Result};
pub use model::{Field, Model};
