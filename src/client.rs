//! MQTT client with a topic → callback dispatch registry.
//!
//! [`MqttClient`] wraps a [`Transport`] (publish/subscribe against the
//! broker) with a registry mapping topics to callback lists. Incoming
//! publishes are fed through [`MqttClient::dispatch`]: an optional
//! receive-any tap fires first (diagnostics), then every callback registered
//! for the topic. The `rumqttc` event loop is pumped by [`MqttClient::run`].

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, MqttOptions};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::MqttSettings;
use crate::error::Result;

pub use rumqttc::QoS;

/// Callback invoked with `(topic, payload)` for matching publishes.
pub type Callback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// The broker-facing half of the client.
///
/// Payload bytes pass through unmodified; JSON encoding happens before this
/// boundary (see [`MqttClient::publish_json`]).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) -> Result<()>;
    async fn subscribe(&self, topic: &str) -> Result<()>;
}

struct RumqttcTransport {
    client: AsyncClient,
}

#[async_trait]
impl Transport for RumqttcTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) -> Result<()> {
        self.client.publish(topic, qos, retain, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }
}

/// Transport wrapper that routes inbound messages to registered callbacks.
pub struct MqttClient {
    transport: Arc<dyn Transport>,
    routes: DashMap<String, Vec<Callback>>,
    tap: RwLock<Option<Callback>>,
}

impl MqttClient {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            routes: DashMap::new(),
            tap: RwLock::new(None),
        })
    }

    /// Build a client against a real broker. The returned event loop must be
    /// handed to [`MqttClient::run`] for callbacks to fire.
    pub fn connect(settings: &MqttSettings) -> (Arc<Self>, rumqttc::EventLoop) {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keepalive_secs));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = AsyncClient::new(options, 64);
        (
            Self::new(Arc::new(RumqttcTransport { client })),
            eventloop,
        )
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
        qos: QoS,
    ) -> Result<()> {
        tracing::debug!("publish {} ({} bytes)", topic, payload.len());
        self.transport.publish(topic, payload, retain, qos).await
    }

    /// JSON-encode a body to text, then bytes, then publish.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        body: &T,
        retain: bool,
        qos: QoS,
    ) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.publish(topic, payload, retain, qos).await
    }

    /// Subscribe to a topic and register a callback for it. Multiple
    /// registrations for one topic accumulate; all of them fire on delivery.
    pub async fn subscribe(&self, topic: &str, callback: Callback) -> Result<()> {
        self.transport.subscribe(topic).await?;
        self.routes.entry(topic.to_string()).or_default().push(callback);
        Ok(())
    }

    /// Install the receive-any tap, invoked before topic dispatch for every
    /// inbound message.
    pub fn set_tap(&self, callback: Callback) {
        *self.tap.write().unwrap() = Some(callback);
    }

    /// Route one inbound message: tap first, then every callback registered
    /// for the topic.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) {
        if let Some(tap) = self.tap.read().unwrap().as_ref() {
            tap(topic, payload);
        }
        // Callbacks may re-enter the registry (e.g. to subscribe), so invoke
        // them on a snapshot.
        let callbacks: Vec<Callback> = match self.routes.get(topic) {
            Some(entry) => entry.clone(),
            None => return,
        };
        for callback in callbacks {
            callback(topic, payload);
        }
    }

    /// Pump the broker connection: poll, dispatch publishes, repeat until
    /// shutdown. Connection errors are logged and retried by the underlying
    /// client; reliability beyond that is out of scope here.
    pub async fn run(
        self: Arc<Self>,
        mut eventloop: rumqttc::EventLoop,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("MQTT loop shutting down");
                    return Ok(());
                }
                event = eventloop.poll() => match event {
                    Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                        self.dispatch(&publish.topic, &publish.payload);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!("MQTT connection error: {}", err);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTransport;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_callbacks() {
        let transport = MemoryTransport::new();
        let client = MqttClient::new(transport.clone());

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        client
            .subscribe(
                "device/abc/set",
                Arc::new(move |_topic: &str, payload: &[u8]| {
                    assert_eq!(payload, b"fan;on");
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        client.dispatch("device/abc/set", b"fan;on");
        client.dispatch("device/other/set", b"ignored");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            transport.subscriptions.lock().unwrap().as_slice(),
            &["device/abc/set".to_string()]
        );
    }

    #[tokio::test]
    async fn test_multiple_callbacks_accumulate() {
        let client = MqttClient::new(MemoryTransport::new());
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = hits.clone();
            client
                .subscribe(
                    "t",
                    Arc::new(move |_: &str, _: &[u8]| {
                        seen.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .await
                .unwrap();
        }
        client.dispatch("t", b"x");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tap_sees_every_message() {
        let client = MqttClient::new(MemoryTransport::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        client.set_tap(Arc::new(move |_: &str, _: &[u8]| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        // No topic-specific callback registered; the tap still fires.
        client.dispatch("anything", b"x");
        client.dispatch("else", b"y");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_json_encodes_to_text() {
        let transport = MemoryTransport::new();
        let client = MqttClient::new(transport.clone());
        client
            .publish_json("t", &serde_json::json!({"a": 1}), true, QoS::AtLeastOnce)
            .await
            .unwrap();

        let message = transport.last_on("t").unwrap();
        assert_eq!(message.payload, br#"{"a":1}"#);
        assert!(message.retain);
        assert_eq!(message.qos, QoS::AtLeastOnce);
    }
}
