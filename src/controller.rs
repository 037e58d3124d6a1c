//! The seam towards the IQtec controller client.
//!
//! The actual wire protocol lives in the client implementation. Everything else in this crate
//! only ever talks to a controller through the blocking [`Controller`] trait and the plain data
//! model defined here.

#[cfg(test)]
pub(crate) mod fake;
pub mod snapshot_file;

use std::collections::BTreeMap;

/// Raw sunblind position at which the blind is fully extended (closed).
pub const SUNBLIND_EXTENDED: u16 = 255;
/// Raw sunblind rotation at which the slats are fully closed.
pub const SUNBLIND_TILT_CLOSED: u16 = 90;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not connect to the controller at {0}")]
    Connect(String, #[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("controller request failed")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("controller returned malformed data")]
    Malformed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("controller has no room `{0}`")]
    UnknownRoom(String),
    #[error("controller has no sunblind `{0}`")]
    UnknownSunblind(String),
    #[error("controller has no point `{1}` on device `{0}`")]
    UnknownPoint(String, String),
}

impl Error {
    /// Whether the error means the controller could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connect(..) | Error::Request(_))
    }
}

/// A blocking client of the IQtec controller.
///
/// Every method may perform network I/O, so callers on an async runtime must run them on the
/// blocking pool.
pub trait Controller: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn inventory(&self) -> Result<Inventory, Error>;
    /// Read the complete controller state.
    fn update_status(&self) -> Result<Snapshot, Error>;
    /// Raw calendar names as `("_CALENDAR_<n>", name)` pairs.
    fn calendar_names(&self) -> Result<Vec<(String, String)>, Error>;
    /// Build and send a set request for a generic device point.
    fn set_point(&self, device: &str, point: &str, value: &str) -> Result<(), Error>;
    fn set_room_mode(&self, room: &str, mode: RoomMode) -> Result<(), Error>;
    fn set_correction_mode(&self, room: &str, mode: CorrectionMode) -> Result<(), Error>;
    fn set_correction_temperature(&self, room: &str, temperature: f64) -> Result<(), Error>;
    fn set_calendar(&self, room: &str, calendar: u8) -> Result<(), Error>;
    fn set_sunblind_command(&self, sunblind: &str, command: SunblindCommand)
    -> Result<(), Error>;
    fn set_sunblind_position(&self, sunblind: &str, position: u16) -> Result<(), Error>;
    fn set_sunblind_rotation(&self, sunblind: &str, rotation: u16) -> Result<(), Error>;
}

/// The addressable parts of a controller, known once connected.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Inventory {
    pub rooms: Vec<String>,
    pub sunblinds: Vec<String>,
    pub devices: BTreeMap<String, DevicePoints>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DevicePoints {
    #[serde(default)]
    pub sensors: BTreeMap<String, PointType>,
    #[serde(default)]
    pub switches: BTreeMap<String, PointType>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::IntoStaticStr,
)]
pub enum PointType {
    OnOff,
    #[serde(rename = "bool")]
    #[strum(serialize = "bool")]
    Bool,
    OnOffAuto,
    Temperature,
    #[serde(rename = "byte")]
    #[strum(serialize = "byte")]
    Byte,
    #[serde(rename = "float")]
    #[strum(serialize = "float")]
    Float,
    #[serde(rename = "short")]
    #[strum(serialize = "short")]
    Short,
    #[serde(other)]
    Unsupported,
}

/// One full state read of the controller.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub rooms: BTreeMap<String, RoomState>,
    #[serde(default)]
    pub sunblinds: BTreeMap<String, SunblindState>,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceState>,
}

impl Snapshot {
    /// Raw value of a sensor point, keyed by the `device.field` point id.
    pub fn sensor(&self, device: &str, point: &str) -> Option<&str> {
        self.devices.get(device)?.sensors.get(point).map(String::as_str)
    }

    /// Raw value of a switch point, keyed by the `device.field` point id.
    pub fn switch(&self, device: &str, point: &str) -> Option<&str> {
        self.devices.get(device)?.switches.get(point).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoomState {
    pub name: String,
    pub actual_temperature: Option<f64>,
    pub requested_temperature: Option<f64>,
    pub room_mode: RoomMode,
    pub correction_status: CorrectionMode,
    pub calendar_number: u8,
    pub heating_enabled: bool,
    /// Whether the heating relay for the room is active right now.
    pub heating: bool,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SunblindState {
    pub name: String,
    /// `0` is fully open, [`SUNBLIND_EXTENDED`] is fully closed.
    pub position: u16,
    /// `0` is fully open, [`SUNBLIND_TILT_CLOSED`] is fully closed.
    pub rotation: u16,
    /// Time it takes to rotate the slats end to end. Zero when the blind cannot tilt.
    #[serde(default)]
    pub full_tilt_time: u32,
    #[serde(default)]
    pub out_up_1: bool,
    #[serde(default)]
    pub out_up_2: bool,
    #[serde(default)]
    pub out_dn_1: bool,
    #[serde(default)]
    pub out_dn_2: bool,
}

/// Raw point values of a generic device.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceState {
    #[serde(default)]
    pub sensors: BTreeMap<String, String>,
    #[serde(default)]
    pub switches: BTreeMap<String, String>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomMode {
    Off,
    Antifreeze,
    Calendar,
    Holiday,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionMode {
    None,
    Manual,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SunblindCommand {
    Up,
    Down,
    Stop,
    TiltOpen,
    TiltOpenShort,
}

/// A single write to the controller, as produced by the entity adapters.
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerCall {
    SetPoint { device: String, point: String, value: String },
    SetRoomMode { room: String, mode: RoomMode },
    SetCorrectionMode { room: String, mode: CorrectionMode },
    SetCorrectionTemperature { room: String, temperature: f64 },
    SetCalendar { room: String, calendar: u8 },
    SetSunblindCommand { sunblind: String, command: SunblindCommand },
    SetSunblindPosition { sunblind: String, position: u16 },
    SetSunblindRotation { sunblind: String, rotation: u16 },
}

impl ControllerCall {
    pub fn apply(&self, controller: &dyn Controller) -> Result<(), Error> {
        match self {
            Self::SetPoint { device, point, value } => controller.set_point(device, point, value),
            Self::SetRoomMode { room, mode } => controller.set_room_mode(room, *mode),
            Self::SetCorrectionMode { room, mode } => controller.set_correction_mode(room, *mode),
            Self::SetCorrectionTemperature { room, temperature } => {
                controller.set_correction_temperature(room, *temperature)
            }
            Self::SetCalendar { room, calendar } => controller.set_calendar(room, *calendar),
            Self::SetSunblindCommand { sunblind, command } => {
                controller.set_sunblind_command(sunblind, *command)
            }
            Self::SetSunblindPosition { sunblind, position } => {
                controller.set_sunblind_position(sunblind, *position)
            }
            Self::SetSunblindRotation { sunblind, rotation } => {
                controller.set_sunblind_rotation(sunblind, *rotation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_types_parse_controller_names() {
        let points: BTreeMap<String, PointType> = serde_json::from_str(
            r#"{"a": "OnOff", "b": "bool", "c": "OnOffAuto", "d": "byte", "e": "Weird"}"#,
        )
        .unwrap();
        assert_eq!(points["a"], PointType::OnOff);
        assert_eq!(points["b"], PointType::Bool);
        assert_eq!(points["c"], PointType::OnOffAuto);
        assert_eq!(points["d"], PointType::Byte);
        assert_eq!(points["e"], PointType::Unsupported);
        assert_eq!(<&str>::from(PointType::Byte), "byte");
    }

    #[test]
    fn snapshot_point_lookup() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"devices": {"d1": {"sensors": {"d1.t": "21.5"}, "switches": {"d1.r": "!"}}}}"#,
        )
        .unwrap();
        assert_eq!(snapshot.sensor("d1", "d1.t"), Some("21.5"));
        assert_eq!(snapshot.switch("d1", "d1.r"), Some("!"));
        assert_eq!(snapshot.switch("d2", "d2.r"), None);
        assert!(snapshot.rooms.is_empty());
    }

    #[test]
    fn connection_errors_are_classified() {
        let io = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(Error::Connect("host".into(), Box::new(io)).is_connection());
        assert!(!Error::UnknownRoom("r".into()).is_connection());
    }
}
