//! The component type shared by every kind.
//!
//! A component is an attribute store plus a value slot plus two hooks: an
//! async `read` that samples the underlying hardware into the slot, and a
//! `write` that applies inbound command payloads. Topics, unique ids and
//! templates derive from the store through a staged pipeline — each stage
//! takes its prerequisite as an argument, so name → unique_id → topics →
//! value template cannot run out of order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::client::{MqttClient, QoS};
use crate::discovery;
use crate::error::{Error, Result};
use crate::model::{Field, Model};

use super::sensor::SensorKind;

pub(crate) static NAME: Field = Field::new("name");
pub(crate) static UNIQUE_ID: Field = Field::new("unique_id");
pub(crate) static STATE_TOPIC: Field = Field::new("state_topic");
pub(crate) static COMMAND_TOPIC: Field = Field::new("command_topic");
pub(crate) static COMMAND_TEMPLATE: Field = Field::new("command_template");
pub(crate) static VALUE_TEMPLATE: Field = Field::new("value_template");
pub(crate) static AVAILABILITY_TOPIC: Field = Field::new("availability_topic");
pub(crate) static AVAILABILITY_TEMPLATE: Field = Field::new("availability_template");
pub(crate) static DEVICE_CLASS: Field = Field::new("device_class");
pub(crate) static UNIT_OF_MEASUREMENT: Field = Field::new("unit_of_measurement");

/// The closed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Sensor(SensorKind),
    Switch,
}

impl ComponentKind {
    /// The discovery component name (the `{component_name}` topic segment).
    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Sensor(_) => "sensor",
            ComponentKind::Switch => "switch",
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            ComponentKind::Sensor(kind) => kind.device_class(),
            ComponentKind::Switch => "switch",
        }
    }

    fn cast(&self, expr: &str) -> String {
        match self {
            ComponentKind::Sensor(kind) => kind.cast(expr),
            ComponentKind::Switch => expr.to_string(),
        }
    }
}

/// Handle to a component's value: either the root of a private mapping
/// (unattached), or one named slot of a device-shared mapping.
#[derive(Debug, Clone)]
pub struct ValueSlot {
    raw: Arc<Mutex<Value>>,
    path: Option<String>,
}

impl ValueSlot {
    /// A private root of its own, as components start out.
    pub(crate) fn detached() -> Self {
        Self {
            raw: Arc::new(Mutex::new(Value::Null)),
            path: None,
        }
    }

    /// A named slot of a shared mapping owned elsewhere.
    pub(crate) fn shared(raw: Arc<Mutex<Value>>, path: String) -> Self {
        Self {
            raw,
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// This component's value: the root, or `root[path]`.
    pub fn get(&self) -> Value {
        let raw = self.raw.lock().unwrap();
        match &self.path {
            None => raw.clone(),
            Some(key) => raw.get(key).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn set(&self, value: impl Into<Value>) {
        let mut raw = self.raw.lock().unwrap();
        match &self.path {
            None => *raw = value.into(),
            Some(key) => {
                if !raw.is_object() {
                    *raw = Value::Object(Map::new());
                }
                raw.as_object_mut()
                    .unwrap()
                    .insert(key.clone(), value.into());
            }
        }
    }

    /// The entire raw root — the whole device snapshot once attached.
    pub fn root(&self) -> Value {
        self.raw.lock().unwrap().clone()
    }
}

/// Async sampling hook: populate the slot with a fresh value.
#[async_trait]
pub trait Reader: Send {
    async fn read(&mut self, slot: ValueSlot) -> Result<()>;
}

/// Command hook: apply an inbound payload to the slot.
pub trait Writer: Send {
    fn write(&mut self, slot: &ValueSlot, payload: &[u8]) -> Result<()>;
}

impl<F> Writer for F
where
    F: FnMut(&ValueSlot, &[u8]) -> Result<()> + Send,
{
    fn write(&mut self, slot: &ValueSlot, payload: &[u8]) -> Result<()> {
        self(slot, payload)
    }
}

/// Default read hook: waits out the interval without touching the slot, for
/// kinds with no autonomous sampling.
pub struct IdleReader {
    pub interval: Duration,
}

impl Default for IdleReader {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl Reader for IdleReader {
    async fn read(&mut self, _slot: ValueSlot) -> Result<()> {
        tokio::time::sleep(self.interval).await;
        Ok(())
    }
}

/// Adapter turning an async closure into a [`Reader`].
pub struct FnReader<F>(pub F);

#[async_trait]
impl<F, Fut> Reader for FnReader<F>
where
    F: FnMut(ValueSlot) -> Fut + Send,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    async fn read(&mut self, slot: ValueSlot) -> Result<()> {
        (self.0)(slot).await
    }
}

/// Default write hook: commands to components without one are an oddity, not
/// a crash.
struct IgnoreWriter;

impl Writer for IgnoreWriter {
    fn write(&mut self, _slot: &ValueSlot, payload: &[u8]) -> Result<()> {
        tracing::debug!("ignoring {}-byte command payload", payload.len());
        Ok(())
    }
}

/// Where availability publishes go: a payload of our own, or one entry of a
/// device-aggregated mapping published as a whole.
enum AvailabilitySink {
    Direct,
    Aggregated {
        key: String,
        payload: Arc<Mutex<Map<String, Value>>>,
    },
}

/// One logical entity a device exposes.
pub struct Component {
    kind: ComponentKind,
    client: Option<Arc<MqttClient>>,
    node_id: Option<String>,
    obj_id: Option<String>,
    model: Mutex<Model>,
    slot: ValueSlot,
    device_info: Option<Arc<Mutex<Model>>>,
    availability: Mutex<AvailabilitySink>,
    reader: tokio::sync::Mutex<Box<dyn Reader>>,
    writer: Mutex<Box<dyn Writer>>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("kind", &self.kind)
            .field("node_id", &self.node_id)
            .field("obj_id", &self.obj_id)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl Component {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            client: None,
            node_id: None,
            obj_id: None,
            model: Mutex::new(Model::new()),
            slot: ValueSlot::detached(),
            device_info: None,
            availability: Mutex::new(AvailabilitySink::Direct),
            reader: tokio::sync::Mutex::new(Box::new(IdleReader::default())),
            writer: Mutex::new(Box::new(IgnoreWriter)),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn component_name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn set_client(&mut self, client: Arc<MqttClient>) {
        self.client = Some(client);
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn set_node_id(&mut self, node_id: impl Into<String>) {
        self.node_id = Some(node_id.into());
    }

    pub fn set_obj_id(&mut self, obj_id: impl Into<String>) {
        self.obj_id = Some(obj_id.into());
    }

    pub fn set_name(&self, name: &str) {
        self.model.lock().unwrap().set(&NAME, name);
    }

    /// Override any attribute of the discovery record by raw key.
    pub fn set_field(&self, name: &str, value: Value) {
        self.model.lock().unwrap().set_raw(name, value);
    }

    /// Read back an attribute, `None` when unset.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.model.lock().unwrap().peek(name).cloned()
    }

    pub fn set_reader(&mut self, reader: impl Reader + 'static) {
        self.reader = tokio::sync::Mutex::new(Box::new(reader));
    }

    pub fn set_writer(&mut self, writer: impl Writer + 'static) {
        self.writer = Mutex::new(Box::new(writer));
    }

    pub fn get_value(&self) -> Value {
        self.slot.get()
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        self.slot.set(value);
    }

    pub fn slot(&self) -> ValueSlot {
        self.slot.clone()
    }

    /// Apply an inbound command payload through the write hook.
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        self.writer.lock().unwrap().write(&self.slot, payload)
    }

    // ── Device attachment (crate-internal) ──────────────

    pub(crate) fn bind_client(&mut self, client: Arc<MqttClient>) {
        self.client = Some(client);
    }

    pub(crate) fn inherit_node_id(&mut self, node_id: Option<&str>) {
        if self.node_id.is_none() {
            self.node_id = node_id.map(str::to_string);
        }
    }

    pub(crate) fn attach_slot(&mut self, slot: ValueSlot) {
        self.slot = slot;
    }

    pub(crate) fn share_device_info(&mut self, info: Arc<Mutex<Model>>) {
        self.device_info = Some(info);
    }

    pub(crate) fn ensure_unique_id(&self, unique_id: &str) {
        let mut model = self.model.lock().unwrap();
        if !model.is_set(&UNIQUE_ID) {
            model.set(&UNIQUE_ID, unique_id);
        }
    }

    pub(crate) fn set_shared_topics(&self, state_topic: &str, command_topic: &str) {
        let mut model = self.model.lock().unwrap();
        model.set(&STATE_TOPIC, state_topic);
        model.set(&COMMAND_TOPIC, command_topic);
    }

    pub(crate) fn set_command_template(&self, template: &str) {
        self.model.lock().unwrap().set(&COMMAND_TEMPLATE, template);
    }

    pub(crate) fn set_aggregated_availability(
        &self,
        key: &str,
        topic: &str,
        payload: Arc<Mutex<Map<String, Value>>>,
    ) {
        {
            let mut model = self.model.lock().unwrap();
            model.set(&AVAILABILITY_TOPIC, topic);
            model.set(&AVAILABILITY_TEMPLATE, discovery::availability_template(Some(key)));
        }
        *self.availability.lock().unwrap() = AvailabilitySink::Aggregated {
            key: key.to_string(),
            payload,
        };
    }

    // ── Derivation pipeline ─────────────────────────────

    fn resolve_name(&self, model: &mut Model) -> String {
        if let Some(name) = model.get_str(&NAME) {
            return name;
        }
        let name = self.kind.default_name().to_string();
        model.set(&NAME, name.as_str());
        name
    }

    fn resolve_unique_id(&self, model: &mut Model, name: &str) -> String {
        if let Some(unique_id) = model.get_str(&UNIQUE_ID) {
            return unique_id;
        }
        model.set(&UNIQUE_ID, name);
        name.to_string()
    }

    fn resolve_state_topic(&self, model: &mut Model, unique_id: &str) -> String {
        if let Some(topic) = model.get_str(&STATE_TOPIC) {
            return topic;
        }
        let topic = discovery::state_topic(self.kind.name(), unique_id);
        model.set(&STATE_TOPIC, topic.as_str());
        topic
    }

    fn resolve_command_topic(&self, model: &mut Model, unique_id: &str) -> String {
        if let Some(topic) = model.get_str(&COMMAND_TOPIC) {
            return topic;
        }
        let topic = discovery::command_topic(self.kind.name(), unique_id);
        model.set(&COMMAND_TOPIC, topic.as_str());
        topic
    }

    fn resolve_value_template(&self, model: &mut Model) -> String {
        if let Some(template) = model.get_str(&VALUE_TEMPLATE) {
            return template;
        }
        let expr = self.kind.cast(&discovery::value_source(self.slot.path()));
        let template = discovery::wrap_template(&expr);
        model.set(&VALUE_TEMPLATE, template.as_str());
        template
    }

    fn resolve_availability(&self, model: &mut Model, unique_id: &str) -> String {
        if model.get_str(&AVAILABILITY_TEMPLATE).is_none() {
            model.set(&AVAILABILITY_TEMPLATE, discovery::availability_template(None));
        }
        if let Some(topic) = model.get_str(&AVAILABILITY_TOPIC) {
            return topic;
        }
        let topic = discovery::availability_topic(self.kind.name(), unique_id);
        model.set(&AVAILABILITY_TOPIC, topic.as_str());
        topic
    }

    /// The resolved human label.
    pub fn name(&self) -> String {
        self.resolve_name(&mut self.model.lock().unwrap())
    }

    /// The resolved unique id (assigned from the name when unset).
    pub fn unique_id(&self) -> String {
        let mut model = self.model.lock().unwrap();
        let name = self.resolve_name(&mut model);
        self.resolve_unique_id(&mut model, &name)
    }

    pub fn state_topic(&self) -> String {
        let mut model = self.model.lock().unwrap();
        let name = self.resolve_name(&mut model);
        let unique_id = self.resolve_unique_id(&mut model, &name);
        self.resolve_state_topic(&mut model, &unique_id)
    }

    pub fn command_topic(&self) -> String {
        let mut model = self.model.lock().unwrap();
        let name = self.resolve_name(&mut model);
        let unique_id = self.resolve_unique_id(&mut model, &name);
        self.resolve_command_topic(&mut model, &unique_id)
    }

    pub fn value_template(&self) -> String {
        self.resolve_value_template(&mut self.model.lock().unwrap())
    }

    /// Run the full pipeline and return the discovery record.
    pub fn config_data(&self) -> Map<String, Value> {
        let mut model = self.model.lock().unwrap();
        if let ComponentKind::Sensor(kind) = self.kind {
            if !model.is_set(&DEVICE_CLASS) {
                model.set(&DEVICE_CLASS, kind.device_class());
            }
            if !model.is_set(&UNIT_OF_MEASUREMENT) {
                if let Some(unit) = kind.unit_of_measurement() {
                    model.set(&UNIT_OF_MEASUREMENT, unit);
                }
            }
        }
        let name = self.resolve_name(&mut model);
        let unique_id = self.resolve_unique_id(&mut model, &name);
        self.resolve_state_topic(&mut model, &unique_id);
        self.resolve_command_topic(&mut model, &unique_id);
        self.resolve_value_template(&mut model);
        if let Some(info) = &self.device_info {
            model.set_raw("device", info.lock().unwrap().to_value());
        }
        model.data().clone()
    }

    // ── Publishing ──────────────────────────────────────

    fn client(&self) -> Result<&Arc<MqttClient>> {
        self.client.as_ref().ok_or(Error::NoClient)
    }

    /// Announce this component to the hub.
    pub async fn send_config(&self, retain: bool, qos: QoS) -> Result<()> {
        let mut data = self.config_data();
        let unique_id = data
            .get("unique_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let obj_id = self.obj_id.clone().unwrap_or(unique_id);
        data.insert("object_id".to_string(), Value::String(obj_id.clone()));
        let topic = discovery::config_topic(
            discovery::HASS_PREFIX,
            self.kind.name(),
            self.node_id.as_deref(),
            &obj_id,
        );
        tracing::info!("announcing {} on {}", self.kind.name(), topic);
        self.client()?
            .publish_json(&topic, &Value::Object(data), retain, qos)
            .await
    }

    pub async fn online(&self, is_online: bool) -> Result<()> {
        self.push_availability(if is_online { "online" } else { "offline" })
            .await
    }

    /// Publish availability. In the device-aggregated case only this
    /// component's entry changes, but the whole mapping is published.
    pub async fn push_availability(&self, state: &str) -> Result<()> {
        let topic = {
            let mut model = self.model.lock().unwrap();
            let name = self.resolve_name(&mut model);
            let unique_id = self.resolve_unique_id(&mut model, &name);
            self.resolve_availability(&mut model, &unique_id)
        };
        let body = {
            match &*self.availability.lock().unwrap() {
                AvailabilitySink::Direct => Value::String(state.to_string()),
                AvailabilitySink::Aggregated { key, payload } => {
                    let mut map = payload.lock().unwrap();
                    map.insert(key.clone(), Value::String(state.to_string()));
                    Value::Object(map.clone())
                }
            }
        };
        self.client()?
            .publish_json(&topic, &body, false, QoS::AtMostOnce)
            .await
    }

    /// Publish the raw root to the state topic. Once attached, both are
    /// device-shared, so this republishes the entire device snapshot.
    pub async fn push_state(&self, retain: bool, qos: QoS) -> Result<()> {
        let topic = self.state_topic();
        let snapshot = self.slot.root();
        self.client()?
            .publish_json(&topic, &snapshot, retain, qos)
            .await
    }

    /// Sample forever: await the read hook, then push state when asked.
    /// Terminates on shutdown, or on the first hook/publish error.
    pub async fn run(
        self: Arc<Self>,
        push: bool,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            let sample = async {
                let mut reader = self.reader.lock().await;
                reader.read(self.slot.clone()).await
            };
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!("{} sampling loop stopped", self.kind.name());
                    return Ok(());
                }
                result = sample => result?,
            }
            if push {
                self.push_state(false, QoS::AtMostOnce).await?;
            }
        }
    }
}
