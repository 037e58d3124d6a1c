//! A controller backed by a JSON document on disk.
//!
//! The document is re-read on every status update and writes are applied back into it, so it
//! behaves like a (very patient) controller. Useful for running the bridge against recorded
//! controller state.
//!
//! ```json
//! {
//!   "name": "Kobra",
//!   "calendars": [["_CALENDAR_1", "Workdays"]],
//!   "inventory": { "rooms": ["r1"], "sunblinds": ["r1_1"], "devices": {} },
//!   "status": { "rooms": {}, "sunblinds": {}, "devices": {} }
//! }
//! ```

use super::{
    Controller, CorrectionMode, Error, Inventory, RoomMode, Snapshot, SunblindCommand,
    SUNBLIND_EXTENDED, SUNBLIND_TILT_CLOSED,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(serde::Serialize, serde::Deserialize)]
struct Document {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inventory: Option<Inventory>,
    #[serde(default)]
    calendars: Vec<(String, String)>,
    #[serde(default)]
    status: Snapshot,
}

pub struct SnapshotFile {
    path: PathBuf,
    name: String,
    // Serializes read-modify-write cycles of the document.
    lock: Mutex<()>,
}

impl SnapshotFile {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let document = read_document(path)?;
        info!(path = %path.display(), name = %document.name, "opened controller snapshot");
        Ok(Self { path: path.to_path_buf(), name: document.name, lock: Mutex::new(()) })
    }

    fn read(&self) -> Result<Document, Error> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        read_document(&self.path)
    }

    fn modify(&self, f: impl FnOnce(&mut Snapshot) -> Result<(), Error>) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = read_document(&self.path)?;
        f(&mut document.status)?;
        let data = serde_json::to_vec_pretty(&document).map_err(|e| Error::Malformed(e.into()))?;
        std::fs::write(&self.path, data).map_err(|e| Error::Request(e.into()))
    }

    fn modify_room(
        &self,
        room: &str,
        f: impl FnOnce(&mut super::RoomState),
    ) -> Result<(), Error> {
        self.modify(|status| {
            let state = status.rooms.get_mut(room).ok_or_else(|| Error::UnknownRoom(room.into()))?;
            f(state);
            Ok(())
        })
    }

    fn modify_sunblind(
        &self,
        sunblind: &str,
        f: impl FnOnce(&mut super::SunblindState),
    ) -> Result<(), Error> {
        self.modify(|status| {
            let state = status
                .sunblinds
                .get_mut(sunblind)
                .ok_or_else(|| Error::UnknownSunblind(sunblind.into()))?;
            f(state);
            Ok(())
        })
    }
}

fn read_document(path: &Path) -> Result<Document, Error> {
    let data = std::fs::read(path)
        .map_err(|e| Error::Connect(path.display().to_string(), Box::new(e)))?;
    serde_json::from_slice(&data).map_err(|e| Error::Malformed(Box::new(e)))
}

impl Controller for SnapshotFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn inventory(&self) -> Result<Inventory, Error> {
        let document = self.read()?;
        Ok(document.inventory.unwrap_or_else(|| Inventory {
            rooms: document.status.rooms.keys().cloned().collect(),
            sunblinds: document.status.sunblinds.keys().cloned().collect(),
            devices: Default::default(),
        }))
    }

    fn update_status(&self) -> Result<Snapshot, Error> {
        Ok(self.read()?.status)
    }

    fn calendar_names(&self) -> Result<Vec<(String, String)>, Error> {
        Ok(self.read()?.calendars)
    }

    fn set_point(&self, device: &str, point: &str, value: &str) -> Result<(), Error> {
        debug!(device, point, value, "set point");
        self.modify(|status| {
            let unknown = || Error::UnknownPoint(device.into(), point.into());
            let state = status.devices.get_mut(device).ok_or_else(unknown)?;
            let raw = state.switches.get_mut(point).ok_or_else(unknown)?;
            *raw = value.to_string();
            Ok(())
        })
    }

    fn set_room_mode(&self, room: &str, mode: RoomMode) -> Result<(), Error> {
        debug!(room, ?mode, "set room mode");
        self.modify_room(room, |state| state.room_mode = mode)
    }

    fn set_correction_mode(&self, room: &str, mode: CorrectionMode) -> Result<(), Error> {
        debug!(room, ?mode, "set correction mode");
        self.modify_room(room, |state| state.correction_status = mode)
    }

    fn set_correction_temperature(&self, room: &str, temperature: f64) -> Result<(), Error> {
        debug!(room, temperature, "set correction temperature");
        self.modify_room(room, |state| state.requested_temperature = Some(temperature))
    }

    fn set_calendar(&self, room: &str, calendar: u8) -> Result<(), Error> {
        debug!(room, calendar, "set calendar");
        self.modify_room(room, |state| state.calendar_number = calendar)
    }

    fn set_sunblind_command(
        &self,
        sunblind: &str,
        command: SunblindCommand,
    ) -> Result<(), Error> {
        debug!(sunblind, ?command, "set sunblind command");
        // Movements complete instantly here.
        self.modify_sunblind(sunblind, |state| match command {
            SunblindCommand::Up => state.position = 0,
            SunblindCommand::Down => state.position = SUNBLIND_EXTENDED,
            SunblindCommand::TiltOpen | SunblindCommand::TiltOpenShort => state.rotation = 0,
            SunblindCommand::Stop => {}
        })
    }

    fn set_sunblind_position(&self, sunblind: &str, position: u16) -> Result<(), Error> {
        debug!(sunblind, position, "set sunblind position");
        self.modify_sunblind(sunblind, |state| state.position = position.min(SUNBLIND_EXTENDED))
    }

    fn set_sunblind_rotation(&self, sunblind: &str, rotation: u16) -> Result<(), Error> {
        debug!(sunblind, rotation, "set sunblind rotation");
        self.modify_sunblind(sunblind, |state| {
            state.rotation = rotation.min(SUNBLIND_TILT_CLOSED)
        })
    }
}
