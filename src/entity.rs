//! Entity adapters: per controller value projections of the polled [`Snapshot`].

pub mod binary_sensor;
pub mod climate;
pub mod cover;
pub mod number;
pub mod select;
pub mod sensor;
pub mod switch;

use crate::config::EntryConfig;
use crate::controller::{self, Controller, ControllerCall, Inventory, PointType, Snapshot};
use crate::mapping::{CalendarTable, HvacMode, TriState};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MANUFACTURER: &str = "IQtec/Kobra";
pub const UNIQUE_ID_PREFIX: &str = "iqtec";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EntityKind {
    BinarySensor,
    Sensor,
    Number,
    Switch,
    Select,
    Cover,
    Climate,
}

/// The physical device an entity is grouped under.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: Option<String>,
    pub manufacturer: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeFormat {
    Boolean,
    Integer { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64>, step: Option<f64> },
    Enum(Vec<String>),
    Text,
}

/// Description of one platform visible value of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub id: &'static str,
    pub name: &'static str,
    pub format: AttributeFormat,
    pub unit: Option<&'static str>,
    pub settable: bool,
    /// Whether the value is a state (`true`) or a momentary action (`false`).
    pub retained: bool,
}

impl Attribute {
    pub fn state(id: &'static str, name: &'static str, format: AttributeFormat) -> Self {
        Self { id, name, format, unit: None, settable: false, retained: true }
    }

    pub fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn action(mut self) -> Self {
        self.settable = true;
        self.retained = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateValue::Bool(v) => v.fmt(f),
            StateValue::Integer(v) => v.fmt(f),
            StateValue::Float(v) => v.fmt(f),
            StateValue::Text(v) => f.write_str(v),
        }
    }
}

/// Commands the platform can issue to entities.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    TurnOn,
    TurnOff,
    Toggle,
    SetValue(f64),
    SelectOption(TriState),
    OpenCover,
    CloseCover,
    StopCover,
    SetCoverPosition(u8),
    OpenCoverTilt,
    CloseCoverTilt,
    StopCoverTilt,
    SetCoverTiltPosition(u8),
    SetHvacMode(HvacMode),
    SetPresetMode(String),
    SetTemperature(f64),
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("{entity} does not support {command:?}")]
    Unsupported { entity: String, command: Command },
    #[error("{entity} has no settable attribute `{attribute}`")]
    UnknownAttribute { entity: String, attribute: String },
    #[error("`{value}` is not a valid value for `{attribute}`")]
    InvalidValue { attribute: String, value: String },
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
}

impl CommandError {
    fn invalid(attribute: &str, value: &str) -> Self {
        Self::InvalidValue { attribute: attribute.to_string(), value: value.to_string() }
    }
}

/// A projection of one controller value into the platform.
///
/// Entities only ever learn about controller state through [`Entity::on_snapshot_update`]. They
/// never talk to the controller directly either: commands are translated to
/// [`ControllerCall`]s which the caller dispatches.
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> String;
    fn name(&self) -> String;
    fn kind(&self) -> EntityKind;
    fn device(&self) -> DeviceInfo;
    fn hidden_by_default(&self) -> bool {
        false
    }
    fn attributes(&self) -> Vec<Attribute>;
    fn state(&self, attribute: &str) -> Option<StateValue>;
    /// The raw controller record behind this entity, if it is worth exposing.
    fn extra_state_attributes(&self) -> Option<serde_json::Value> {
        None
    }
    /// Re-evaluate the entity against a freshly polled snapshot.
    fn on_snapshot_update(&mut self, snapshot: &Snapshot);

    /// Parse a platform write to one of the settable attributes.
    fn parse_set(&self, attribute: &str, _value: &str) -> Result<Command, CommandError> {
        Err(CommandError::UnknownAttribute {
            entity: self.unique_id(),
            attribute: attribute.to_string(),
        })
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        Err(CommandError::Unsupported { entity: self.unique_id(), command })
    }
}

/// A generic device point, addressed by its device and `device.field` point id.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub device: String,
    pub id: String,
}

impl Point {
    pub fn new(device: impl Into<String>, id: impl Into<String>) -> Self {
        Self { device: device.into(), id: id.into() }
    }

    /// Parse a `device.field` point id.
    pub fn from_id(id: &str) -> Option<Self> {
        let (device, field) = id.split_once('.')?;
        if device.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self::new(device, id))
    }

    pub fn unique_id(&self) -> String {
        format!("{UNIQUE_ID_PREFIX}-{}", self.id)
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.device.clone(),
            name: Some(format!("_{}", self.device)),
            manufacturer: MANUFACTURER,
        }
    }

    pub fn set(&self, value: impl Into<String>) -> ControllerCall {
        ControllerCall::SetPoint {
            device: self.device.clone(),
            point: self.id.clone(),
            value: value.into(),
        }
    }
}

/// Build every entity the controller exposes.
///
/// Each entity is evaluated against `snapshot` before it is returned.
pub fn discover(
    inventory: &Inventory,
    snapshot: &Snapshot,
    calendars: Arc<CalendarTable>,
    config: &EntryConfig,
) -> Vec<Box<dyn Entity>> {
    let mut entities = Vec::<Box<dyn Entity>>::new();
    for (device, points) in &inventory.devices {
        for (id, typ) in &points.sensors {
            let point = Point::new(device, id);
            match typ {
                PointType::OnOff | PointType::Bool => {
                    entities.push(Box::new(binary_sensor::BinarySensor::new(point)))
                }
                PointType::Temperature => entities.push(Box::new(sensor::Sensor::new(
                    point,
                    sensor::SensorClass::Temperature,
                ))),
                PointType::Byte | PointType::Float | PointType::Short => entities
                    .push(Box::new(sensor::Sensor::new(point, sensor::SensorClass::Plain))),
                PointType::OnOffAuto | PointType::Unsupported => {
                    debug!(device, point = id, ?typ, "no entity for sensor point")
                }
            }
        }
        for (id, typ) in &points.switches {
            let point = Point::new(device, id);
            match typ {
                PointType::OnOff | PointType::Bool => {
                    entities.push(Box::new(switch::Switch::new(point)))
                }
                PointType::OnOffAuto => entities.push(Box::new(select::Select::new(point))),
                PointType::Temperature => entities.push(Box::new(number::Number::new(
                    point,
                    number::NumberClass::Temperature,
                ))),
                PointType::Byte => entities
                    .push(Box::new(number::Number::new(point, number::NumberClass::Byte))),
                PointType::Float | PointType::Short => entities
                    .push(Box::new(number::Number::new(point, number::NumberClass::Float))),
                PointType::Unsupported => {
                    debug!(device, point = id, ?typ, "no entity for switch point")
                }
            }
        }
    }
    for id in &config.manual_switches {
        match Point::from_id(id) {
            Some(point) => entities.push(Box::new(switch::Switch::new(point))),
            None => warn!(point = id, "manual switch must be specified as `device.field`"),
        }
    }
    for id in &inventory.sunblinds {
        let tilt = snapshot.sunblinds.get(id).is_some_and(|s| s.full_tilt_time > 0);
        entities.push(Box::new(cover::Cover::new(id, tilt, config.cover_use_short_tilt)));
    }
    for id in &inventory.rooms {
        entities.push(Box::new(climate::Climate::new(id, Arc::clone(&calendars))));
    }
    for entity in &mut entities {
        entity.on_snapshot_update(snapshot);
    }
    entities
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("could not read the controller inventory")]
    Inventory(#[source] controller::Error),
    #[error("could not read the controller calendar names")]
    Calendars(#[source] controller::Error),
    #[error("controller task failed")]
    Join(#[source] tokio::task::JoinError),
}

/// Fetch the inventory and calendar table off the async runtime and discover entities.
pub async fn discover_from(
    controller: Arc<dyn Controller>,
    snapshot: &Snapshot,
    config: &EntryConfig,
) -> Result<Vec<Box<dyn Entity>>, DiscoveryError> {
    let (inventory, calendars) = tokio::task::spawn_blocking(move || {
        let inventory = controller.inventory().map_err(DiscoveryError::Inventory)?;
        let calendars = controller.calendar_names().map_err(DiscoveryError::Calendars)?;
        Ok::<_, DiscoveryError>((inventory, calendars))
    })
    .await
    .map_err(DiscoveryError::Join)??;
    let calendars = Arc::new(CalendarTable::from_raw(calendars));
    let entities = discover(&inventory, snapshot, calendars, config);
    tracing::info!(count = entities.len(), "discovered entities");
    Ok(entities)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::DevicePoints;

    pub(crate) fn snapshot() -> Snapshot {
        serde_json::from_value(serde_json::json!({
            "rooms": {
                "r1": {
                    "name": "Living room",
                    "actual_temperature": 21.4,
                    "requested_temperature": 22.0,
                    "room_mode": "CALENDAR",
                    "correction_status": "NONE",
                    "calendar_number": 1,
                    "heating_enabled": true,
                    "heating": true
                }
            },
            "sunblinds": {
                "r1_1": { "name": "Window", "position": 0, "rotation": 90, "full_tilt_time": 3 },
                "r1_2": { "name": "Door", "position": 255, "rotation": 0 }
            },
            "devices": {
                "d1": {
                    "sensors": { "d1.contact": "1", "d1.temp": "21.5", "d1.count": "7" },
                    "switches": {
                        "d1.relay": "0",
                        "d1.mode": "2",
                        "d1.setpoint": "20.5",
                        "d1.level": "128",
                        "d1.pump": "1"
                    }
                }
            }
        }))
        .unwrap()
    }

    pub(crate) fn inventory() -> Inventory {
        let sensors = [
            ("d1.contact", PointType::OnOff),
            ("d1.temp", PointType::Temperature),
            ("d1.count", PointType::Short),
            ("d1.weird", PointType::Unsupported),
        ];
        let switches = [
            ("d1.relay", PointType::Bool),
            ("d1.mode", PointType::OnOffAuto),
            ("d1.setpoint", PointType::Temperature),
            ("d1.level", PointType::Byte),
        ];
        Inventory {
            rooms: vec!["r1".into()],
            sunblinds: vec!["r1_1".into(), "r1_2".into()],
            devices: [(
                "d1".to_string(),
                DevicePoints {
                    sensors: sensors.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                    switches: switches.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                },
            )]
            .into(),
        }
    }

    fn calendars() -> Arc<CalendarTable> {
        Arc::new(CalendarTable::from_raw([("_CALENDAR_1".to_string(), "Workdays".to_string())]))
    }

    #[test]
    fn discovers_entity_per_point_type() {
        let config = EntryConfig {
            cover_use_short_tilt: false,
            manual_switches: vec!["d1.pump".into(), "nodot".into()],
        };
        let entities = discover(&inventory(), &snapshot(), calendars(), &config);
        let found = entities
            .iter()
            .map(|e| (e.unique_id(), e.kind()))
            .collect::<std::collections::BTreeMap<_, _>>();
        assert_eq!(found.len(), 11);
        assert_eq!(found["iqtec-d1.contact"], EntityKind::BinarySensor);
        assert_eq!(found["iqtec-d1.temp"], EntityKind::Sensor);
        assert_eq!(found["iqtec-d1.count"], EntityKind::Sensor);
        assert_eq!(found["iqtec-d1.relay"], EntityKind::Switch);
        assert_eq!(found["iqtec-d1.pump"], EntityKind::Switch);
        assert_eq!(found["iqtec-d1.mode"], EntityKind::Select);
        assert_eq!(found["iqtec-d1.setpoint"], EntityKind::Number);
        assert_eq!(found["iqtec-d1.level"], EntityKind::Number);
        assert_eq!(found["iqtec-r1_1"], EntityKind::Cover);
        assert_eq!(found["iqtec-r1_2"], EntityKind::Cover);
        assert_eq!(found["iqtec-r1"], EntityKind::Climate);
        assert!(!found.contains_key("iqtec-d1.weird"));
    }

    #[test]
    fn discovered_entities_are_evaluated() {
        let entities = discover(&inventory(), &snapshot(), calendars(), &EntryConfig::default());
        let relay = entities.iter().find(|e| e.unique_id() == "iqtec-d1.relay").unwrap();
        assert_eq!(relay.state("state"), Some(StateValue::Bool(false)));
        assert!(relay.hidden_by_default());
        let room = entities.iter().find(|e| e.unique_id() == "iqtec-r1").unwrap();
        assert_eq!(room.name(), "Living room");
        assert!(!room.hidden_by_default());
    }

    #[test]
    fn point_ids() {
        let point = Point::from_id("d1.relay").unwrap();
        assert_eq!(point.device, "d1");
        assert_eq!(point.unique_id(), "iqtec-d1.relay");
        assert_eq!(point.device_info().name.as_deref(), Some("_d1"));
        assert_eq!(Point::from_id("relay"), None);
        assert_eq!(Point::from_id(".relay"), None);
    }
}
