//! The device: a registry of components sharing one state mapping.
//!
//! The device owns the canonical value mapping. Each registered component's
//! slot is redirected into one named entry of it, so any component's state
//! publish carries the whole snapshot, and the device's periodic push loop
//! serializes the same mapping. Inbound commands arrive on the device command
//! topic as `"{key};{payload}"` and are routed to the keyed component's write
//! hook.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::client::{MqttClient, QoS};
use crate::components::{Component, ValueSlot};
use crate::discovery;
use crate::error::{Error, Result};
use crate::model::{listify, Field, Model};

static NAME: Field = Field::new("name");
static CONFIGURATION_URL: Field = Field::new("configuration_url");
static CONNECTIONS: Field = Field::with_factory("connections", || Value::Array(Vec::new())).coerced(listify);
static HW_VERSION: Field = Field::new("hw_version");
static IDENTIFIERS: Field = Field::with_factory("identifiers", || Value::Array(Vec::new())).coerced(listify);
static MANUFACTURER: Field = Field::new("manufacturer");
static MODEL: Field = Field::new("model");
static MODEL_ID: Field = Field::new("model_id");
static SERIAL_NUMBER: Field = Field::with_default("serial_number", "serial");
static SUGGESTED_AREA: Field = Field::new("suggested_area");
static SW_VERSION: Field = Field::new("sw_version");
static VIA_DEVICE: Field = Field::new("via_device");

/// Registry metadata shared with every component's discovery payload.
/// `identifiers`/`connections` accept a bare string for a single entry.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub configuration_url: Option<String>,
    pub connections: Option<Value>,
    pub hw_version: Option<String>,
    pub identifiers: Option<Value>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub model_id: Option<String>,
    pub serial_number: Option<String>,
    pub suggested_area: Option<String>,
    pub sw_version: Option<String>,
    pub via_device: Option<String>,
}

#[derive(Default)]
struct Topics {
    state: Option<String>,
    command: Option<String>,
    availability: Option<String>,
}

/// A device aggregating many components under one shared state mapping.
pub struct Device {
    client: Arc<MqttClient>,
    info: Arc<Mutex<Model>>,
    node_id: Mutex<Option<String>>,
    topics: Mutex<Topics>,
    components: Mutex<IndexMap<String, Arc<Component>>>,
    /// The canonical state: one entry per registered component.
    value: Arc<Mutex<Value>>,
    availability_payload: Arc<Mutex<Map<String, Value>>>,
    unknown_commands: AtomicU64,
    name_counter: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl Device {
    pub fn new(client: Arc<MqttClient>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut info = Model::new();
        info.get(&SERIAL_NUMBER); // materialize the default serial
        Self {
            client,
            info: Arc::new(Mutex::new(info)),
            node_id: Mutex::new(None),
            topics: Mutex::new(Topics::default()),
            components: Mutex::new(IndexMap::new()),
            value: Arc::new(Mutex::new(Value::Object(Map::new()))),
            availability_payload: Arc::new(Mutex::new(Map::new())),
            unknown_commands: AtomicU64::new(0),
            name_counter: AtomicU64::new(0),
            shutdown_tx,
        }
    }

    /// Apply device info. Defaults `node_id` to the serial number.
    pub fn configure(&self, info: DeviceInfo) -> &Self {
        {
            let mut model = self.info.lock().unwrap();
            if let Some(v) = &info.name {
                model.set(&NAME, v.as_str());
            }
            if let Some(v) = &info.configuration_url {
                model.set(&CONFIGURATION_URL, v.as_str());
            }
            if let Some(v) = info.connections {
                model.set(&CONNECTIONS, listify(v));
            }
            if let Some(v) = &info.hw_version {
                model.set(&HW_VERSION, v.as_str());
            }
            if let Some(v) = info.identifiers {
                model.set(&IDENTIFIERS, listify(v));
            }
            if let Some(v) = &info.manufacturer {
                model.set(&MANUFACTURER, v.as_str());
            }
            if let Some(v) = &info.model {
                model.set(&MODEL, v.as_str());
            }
            if let Some(v) = &info.model_id {
                model.set(&MODEL_ID, v.as_str());
            }
            if let Some(v) = &info.serial_number {
                model.set(&SERIAL_NUMBER, v.as_str());
            }
            if let Some(v) = &info.suggested_area {
                model.set(&SUGGESTED_AREA, v.as_str());
            }
            if let Some(v) = &info.sw_version {
                model.set(&SW_VERSION, v.as_str());
            }
            if let Some(v) = &info.via_device {
                model.set(&VIA_DEVICE, v.as_str());
            }
        }
        if let Some(serial) = &info.serial_number {
            let mut node_id = self.node_id.lock().unwrap();
            if node_id.is_none() {
                *node_id = Some(serial.clone());
            }
        }
        self
    }

    pub fn serial_number(&self) -> String {
        self.info
            .lock()
            .unwrap()
            .get_str(&SERIAL_NUMBER)
            .unwrap_or_else(|| "serial".to_string())
    }

    pub fn node_id(&self) -> Option<String> {
        self.node_id.lock().unwrap().clone()
    }

    pub fn set_node_id(&self, node_id: impl Into<String>) {
        *self.node_id.lock().unwrap() = Some(node_id.into());
    }

    pub fn state_topic(&self) -> String {
        let serial = self.serial_number();
        self.topics
            .lock()
            .unwrap()
            .state
            .get_or_insert_with(|| discovery::device_state_topic(&serial))
            .clone()
    }

    pub fn command_topic(&self) -> String {
        let serial = self.serial_number();
        self.topics
            .lock()
            .unwrap()
            .command
            .get_or_insert_with(|| discovery::device_command_topic(&serial))
            .clone()
    }

    pub fn availability_topic(&self) -> String {
        let serial = self.serial_number();
        self.topics
            .lock()
            .unwrap()
            .availability
            .get_or_insert_with(|| discovery::device_availability_topic(&serial))
            .clone()
    }

    /// Monotonic name generator for callers wiring up many components.
    pub fn yield_name(&self, prefix: &str) -> String {
        let n = self.name_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", self.serial_number(), prefix, n)
    }

    /// Commands referencing unregistered keys since startup.
    pub fn unknown_commands(&self) -> u64 {
        self.unknown_commands.load(Ordering::Relaxed)
    }

    /// Register a component under `key` and rewire it to share this device's
    /// state: its current value is snapshotted into `value[key]`, its slot is
    /// redirected there, and it takes on the device-shared topics.
    pub fn add_component(&self, key: &str, mut component: Component) -> Result<Arc<Component>> {
        let mut components = self.components.lock().unwrap();
        if components.contains_key(key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }

        component.bind_client(self.client.clone());
        component.inherit_node_id(self.node_id.lock().unwrap().as_deref());
        let serial = self.serial_number();
        component.ensure_unique_id(&format!("{}_{}", serial, key).to_lowercase());

        {
            let mut root = self.value.lock().unwrap();
            if !root.is_object() {
                *root = Value::Object(Map::new());
            }
            root.as_object_mut()
                .unwrap()
                .insert(key.to_string(), component.get_value());
        }
        component.attach_slot(ValueSlot::shared(self.value.clone(), key.to_string()));

        component.set_shared_topics(&self.state_topic(), &self.command_topic());
        component.set_command_template(&discovery::command_template(key));
        component.share_device_info(self.info.clone());

        let component = Arc::new(component);
        components.insert(key.to_string(), component.clone());
        tracing::info!("registered component {} as {}", key, component.unique_id());
        Ok(component)
    }

    /// Point every component at the device availability channel, sharing one
    /// aggregate payload mapping.
    pub fn set_availability(&self) {
        let topic = self.availability_topic();
        for (key, component) in self.components.lock().unwrap().iter() {
            component.set_aggregated_availability(key, &topic, self.availability_payload.clone());
        }
    }

    /// Announce every component, in registration order. Fail-fast: the first
    /// failing send aborts the rest.
    pub async fn send_config(&self, retain: bool, qos: QoS) -> Result<()> {
        let components: Vec<Arc<Component>> =
            self.components.lock().unwrap().values().cloned().collect();
        for component in components {
            component.send_config(retain, qos).await?;
        }
        Ok(())
    }

    /// Subscribe to the device command topic.
    pub async fn subscribe(self: Arc<Self>) -> Result<()> {
        let topic = self.command_topic();
        let device = Arc::downgrade(&self);
        self.client
            .subscribe(
                &topic,
                Arc::new(move |_topic: &str, payload: &[u8]| {
                    let Some(device) = device.upgrade() else {
                        return;
                    };
                    if let Err(err) = device.on_command(payload) {
                        tracing::warn!("dropping command: {}", err);
                    }
                }),
            )
            .await
    }

    /// Route one inbound command to the keyed component's write hook.
    ///
    /// A payload without the `;` delimiter is an error (callers at the
    /// dispatch boundary log it); an unknown key is dropped and counted.
    pub fn on_command(&self, payload: &[u8]) -> Result<()> {
        let (key, body) = discovery::split_command(payload)?;
        let component = self.components.lock().unwrap().get(key).cloned();
        match component {
            Some(component) => component.write(body),
            None => {
                self.unknown_commands.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("command for unknown component key: {}", key);
                Ok(())
            }
        }
    }

    /// Mark every registered key online/offline and publish the aggregate
    /// availability mapping once.
    pub async fn online(&self, is_online: bool, retain: bool, qos: QoS) -> Result<()> {
        let state = if is_online { "online" } else { "offline" };
        let topic = self.availability_topic();
        let body = {
            let keys: Vec<String> = self.components.lock().unwrap().keys().cloned().collect();
            let mut payload = self.availability_payload.lock().unwrap();
            for key in keys {
                payload.insert(key, Value::String(state.to_string()));
            }
            Value::Object(payload.clone())
        };
        self.client.publish_json(&topic, &body, retain, qos).await
    }

    /// Serialize the canonical mapping and publish it.
    pub async fn push_state(&self, retain: bool, qos: QoS) -> Result<()> {
        let topic = self.state_topic();
        let snapshot = self.value.lock().unwrap().clone();
        self.client.publish_json(&topic, &snapshot, retain, qos).await
    }

    async fn push_loop(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("push loop stopped");
                    return Ok(());
                }
                _ = ticker.tick() => self.push_state(false, QoS::AtMostOnce).await?,
            }
        }
    }

    /// Run every component's sampling loop (without individual publishes)
    /// together with the periodic aggregate push. The first task failure
    /// tears the whole group down and is returned; [`Device::shutdown`]
    /// terminates the group cleanly.
    pub async fn run(self: Arc<Self>, interval: Duration) -> Result<()> {
        let components: Vec<Arc<Component>> =
            self.components.lock().unwrap().values().cloned().collect();

        let mut tasks = JoinSet::new();
        for component in components {
            tasks.spawn(component.run(false, self.shutdown_tx.subscribe()));
        }
        {
            let device = self.clone();
            let shutdown = self.shutdown_tx.subscribe();
            tasks.spawn(async move { device.push_loop(interval, shutdown).await });
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => Error::Task(err.to_string()),
            };
            tracing::error!("device task failed: {}", failure);
            if result.is_ok() {
                result = Err(failure);
            }
            self.shutdown();
        }
        result
    }

    /// Signal every loop spawned by [`Device::run`] to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A receiver on the device's shutdown channel, for wiring external
    /// loops (like the MQTT pump) to the same teardown signal.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
