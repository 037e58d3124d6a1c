//! Exposes the controller as a Homie 5 device.
//!
//! Every entity becomes a node of the device. Property values are derived from the entity state
//! each time the coordinator publishes a snapshot, but only the values that actually changed are
//! sent to the broker.

mod common;

use crate::coordinator::Coordinator;
use crate::controller::{ControllerCall, Snapshot};
use crate::dispatch::Dispatcher;
use crate::entity::{CommandError, Entity};
use homie5::client::{Publish, QoS, Subscription};
use homie5::device_description::HomieDeviceDescription;
use homie5::{Homie5DeviceProtocol, HomieDeviceStatus, HomieID, PropertyRef};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::task::AbortOnDropHandle;

pub const DEVICE_NAME: &str = "IQtec";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not send a message to the MQTT broker")]
    Publish(#[source] rumqttc::v5::ClientError),
    #[error("could not produce the Homie device description")]
    Description(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("entity {0} cannot be exposed as a Homie node")]
    NodeId(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("MQTT event loop has terminated")]
    MqttClosed,
}

#[derive(thiserror::Error, Debug)]
pub enum SetError {
    #[error("property set is addressed to another device")]
    OtherDevice,
    #[error("device has no node {0}")]
    UnknownNode(HomieID),
    #[error("could not translate the property set into a command")]
    Command(#[source] CommandError),
}

/// Last published payload of every property, to suppress re-publishing unchanged values.
#[derive(Default)]
struct PublishedValues(BTreeMap<(HomieID, HomieID), String>);

impl PublishedValues {
    /// Record `payload` as the current value. Returns `false` if it is the same as last time.
    fn update(&mut self, node_id: &HomieID, prop_id: &HomieID, payload: &str) -> bool {
        let key = (node_id.clone(), prop_id.clone());
        if self.0.get(&key).map(String::as_str) == Some(payload) {
            return false;
        }
        self.0.insert(key, payload.to_string());
        true
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

pub struct IqtecDevice {
    mqtt: rumqttc::v5::AsyncClient,
    protocol: Homie5DeviceProtocol,
    state: HomieDeviceStatus,
    description: HomieDeviceDescription,
    nodes: BTreeMap<HomieID, Box<dyn Entity>>,
    published: PublishedValues,
    coordinator: Arc<Coordinator>,
    dispatcher: Dispatcher,
    snapshots: broadcast::Receiver<Arc<Snapshot>>,
    availability: watch::Receiver<bool>,
    commands: mpsc::UnboundedReceiver<Command>,
    connected_once: bool,
}

impl IqtecDevice {
    pub fn new(
        mqtt: rumqttc::v5::AsyncClient,
        protocol: Homie5DeviceProtocol,
        coordinator: Arc<Coordinator>,
        entities: Vec<Box<dyn Entity>>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<Self, Error> {
        let mut nodes = BTreeMap::new();
        for entity in entities {
            let node_id = common::node_id(&*entity)?;
            if nodes.contains_key(&node_id) {
                tracing::warn!(
                    %node_id,
                    entity = entity.unique_id(),
                    "duplicate node id, skipping"
                );
                continue;
            }
            nodes.insert(node_id, entity);
        }
        let mut description =
            homie5::device_description::DeviceDescriptionBuilder::new().name(DEVICE_NAME);
        for (node_id, entity) in &nodes {
            description =
                description.add_node(node_id.clone(), common::node_description(&**entity));
        }
        let description = description.build();
        let dispatcher = Dispatcher::new(Arc::clone(coordinator.controller()));
        Ok(Self {
            mqtt,
            protocol,
            state: HomieDeviceStatus::Init,
            description,
            nodes,
            published: PublishedValues::default(),
            snapshots: coordinator.subscribe(),
            availability: coordinator.availability(),
            coordinator,
            dispatcher,
            commands,
            connected_once: false,
        })
    }

    pub async fn publish_device(&mut self) -> Result<(), Error> {
        for step in homie5::homie_device_publish_steps() {
            match step {
                homie5::DevicePublishStep::DeviceStateInit => {
                    self.state = HomieDeviceStatus::Init;
                    let p = self.protocol.publish_state(self.state);
                    self.mqtt.homie_publish(p).await.map_err(Error::Publish)?;
                }
                homie5::DevicePublishStep::DeviceDescription => {
                    let p = self
                        .protocol
                        .publish_description(&self.description)
                        .map_err(|e| Error::Description(Box::new(e)))?;
                    self.mqtt.homie_publish(p).await.map_err(Error::Publish)?;
                }
                homie5::DevicePublishStep::PropertyValues => {
                    self.published.clear();
                    self.publish_values().await?;
                    // rumqttc appears to be sending publishes in a weird order that results in
                    // some of the properties getting published *after* `$state = Ready` unless we
                    // yield here...
                    tokio::task::yield_now().await;
                }
                homie5::DevicePublishStep::SubscribeProperties => {
                    // An empty subscription surfaces as `MqttState(EmptySubscription)` in the
                    // event loop.
                    let mut p = self
                        .protocol
                        .subscribe_props(&self.description)
                        .map_err(|e| Error::Description(Box::new(e)))?
                        .peekable();
                    if p.peek().is_some() {
                        self.mqtt.homie_subscribe(p).await.map_err(Error::Publish)?;
                    }
                }
                homie5::DevicePublishStep::DeviceStateReady => {
                    self.state = self.availability_state();
                    tracing::debug!(state = ?self.state, "device description published");
                    let p = self.protocol.publish_state(self.state);
                    self.mqtt.homie_publish(p).await.map_err(Error::Publish)?;
                }
            }
        }
        Ok(())
    }

    /// `ready` while the last refresh succeeded, `init` (not operational) otherwise.
    fn availability_state(&self) -> HomieDeviceStatus {
        if *self.availability.borrow() {
            HomieDeviceStatus::Ready
        } else {
            HomieDeviceStatus::Init
        }
    }

    async fn publish_values(&mut self) -> Result<(), Error> {
        let Self { nodes, description, protocol, mqtt, published, .. } = self;
        for (node_id, entity) in nodes.iter() {
            let Some(node) = description.nodes.get(node_id) else {
                continue;
            };
            for (prop_id, property) in &node.properties {
                if !property.retained {
                    continue;
                }
                let Some(value) = entity.state(prop_id.as_str()) else {
                    continue;
                };
                let payload = value.to_string();
                if !published.update(node_id, prop_id, &payload) {
                    continue;
                }
                tracing::trace!(%node_id, %prop_id, payload, "publishing property value");
                let msg = protocol.publish_value(node_id, prop_id, payload, property.retained);
                mqtt.homie_publish(msg).await.map_err(Error::Publish)?;
            }
        }
        Ok(())
    }

    async fn handle_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), Error> {
        for entity in self.nodes.values_mut() {
            entity.on_snapshot_update(snapshot);
        }
        self.publish_values().await
    }

    async fn handle_availability(&mut self) -> Result<(), Error> {
        let state = self.availability_state();
        if state == self.state {
            return Ok(());
        }
        tracing::info!(?state, "device state changed");
        self.state = state;
        let p = self.protocol.publish_state(self.state);
        self.mqtt.homie_publish(p).await.map_err(Error::Publish)
    }

    /// Translate a property set into controller calls for the addressed entity.
    fn route_set(
        &self,
        property: &PropertyRef,
        value: &str,
    ) -> Result<(String, Vec<ControllerCall>), SetError> {
        if property.device_id() != self.protocol.device_ref().device_id() {
            return Err(SetError::OtherDevice);
        }
        let entity = self
            .nodes
            .get(property.node_id())
            .ok_or_else(|| SetError::UnknownNode(property.node_id().clone()))?;
        let command =
            entity.parse_set(property.prop_id().as_str(), value).map_err(SetError::Command)?;
        let calls = entity.command(command).map_err(SetError::Command)?;
        Ok((entity.unique_id(), calls))
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Set { property, value } => match self.route_set(&property, &value) {
                Ok((entity, calls)) => {
                    tracing::debug!(entity, value, calls = calls.len(), "property set");
                    // Fire and forget, the next poll reflects the outcome.
                    drop(self.dispatcher.dispatch(entity, calls));
                }
                Err(e) => {
                    tracing::warn!(
                        node_id = %property.node_id(),
                        prop_id = %property.prop_id(),
                        value,
                        err = %e,
                        "ignoring property set"
                    );
                }
            },
            Command::Connected => {
                if self.connected_once {
                    tracing::info!("reconnected to the MQTT broker, republishing the device");
                    self.publish_device().await?;
                }
                self.connected_once = true;
            }
        }
        Ok(())
    }

    pub async fn step(&mut self) -> Result<(), Error> {
        loop {
            tokio::select! {
                snapshot = self.snapshots.recv() => {
                    let snapshot = match snapshot {
                        Ok(snapshot) => snapshot,
                        Err(RecvError::Lagged(count)) => {
                            tracing::warn!(count, "snapshot handler lagged");
                            let Some(snapshot) = self.coordinator.data() else { continue };
                            snapshot
                        }
                        // Coordinator is owned by us, so this is not reachable in practice.
                        Err(RecvError::Closed) => return Ok(()),
                    };
                    return self.handle_snapshot(&snapshot).await;
                },
                changed = self.availability.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    return self.handle_availability().await;
                },
                command = self.commands.recv() => {
                    let Some(command) = command else { return Err(Error::MqttClosed) };
                    return self.handle_command(command).await;
                },
            }
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        self.publish_device().await?;
        loop {
            self.step().await?;
        }
    }
}

/// Drive the MQTT event loop, forwarding property sets and connection events to the device.
pub fn spawn_event_loop(
    mut event_loop: rumqttc::v5::EventLoop,
    commands: mpsc::UnboundedSender<Command>,
) -> AbortOnDropHandle<()> {
    use rumqttc::v5::mqttbytes::v5::Packet;
    use rumqttc::v5::Event;
    AbortOnDropHandle::new(tokio::spawn(async move {
        loop {
            let command = match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match Command::try_from_mqtt_command(publish) {
                        Ok(command) => command,
                        Err(publish) => {
                            tracing::debug!(topic = ?publish.topic, "ignoring unexpected publish");
                            continue;
                        }
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("connected to the MQTT broker");
                    Command::Connected
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(err = %e, "MQTT connection error, reconnecting");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };
            if commands.send(command).is_err() {
                return;
            }
        }
    }))
}

trait MqttClientExt {
    type PublishError;
    type SubscribeError;
    async fn homie_publish(&self, p: Publish) -> Result<(), Self::PublishError>;
    async fn homie_subscribe(
        &self,
        subs: impl Iterator<Item = Subscription> + Send,
    ) -> Result<(), Self::SubscribeError>;
}

impl MqttClientExt for rumqttc::v5::AsyncClient {
    type PublishError = rumqttc::v5::ClientError;
    type SubscribeError = rumqttc::v5::ClientError;
    async fn homie_publish(&self, p: Publish) -> Result<(), Self::PublishError> {
        self.publish(p.topic, convert_qos(p.qos), p.retain, p.payload).await
    }

    async fn homie_subscribe(
        &self,
        subs: impl Iterator<Item = Subscription> + Send,
    ) -> Result<(), Self::SubscribeError> {
        self.subscribe_many(
            subs.map(|sub| {
                rumqttc::v5::mqttbytes::v5::Filter::new(sub.topic, convert_qos(sub.qos))
            }),
        )
        .await
    }
}

pub fn convert_qos(homie: QoS) -> rumqttc::v5::mqttbytes::QoS {
    match homie {
        QoS::AtMostOnce => rumqttc::v5::mqttbytes::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::v5::mqttbytes::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::v5::mqttbytes::QoS::ExactlyOnce,
    }
}

/// The Homie last will message, converted for the MQTT client.
pub fn last_will(will: homie5::client::LastWill) -> rumqttc::v5::mqttbytes::v5::LastWill {
    rumqttc::v5::mqttbytes::v5::LastWill::new(
        will.topic,
        will.message,
        convert_qos(will.qos),
        will.retain,
        None,
    )
}

pub enum Command {
    Set { property: PropertyRef, value: String },
    /// The MQTT connection has been (re-)established.
    Connected,
}

impl Command {
    pub(crate) fn try_from_mqtt_command(
        msg: rumqttc::v5::mqttbytes::v5::Publish,
    ) -> Result<Self, rumqttc::v5::mqttbytes::v5::Publish> {
        let Ok(topic) = std::str::from_utf8(&msg.topic) else {
            return Err(msg);
        };
        match homie5::parse_mqtt_message(topic, &msg.payload) {
            Ok(homie5::Homie5Message::PropertySet { property, set_value }) => {
                Ok(Self::Set { property, value: set_value })
            }
            _ => Err(msg),
        }
    }
}
