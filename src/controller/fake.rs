//! An in-memory controller for tests.

use super::{
    Controller, ControllerCall, CorrectionMode, Error, Inventory, RoomMode, Snapshot,
    SunblindCommand,
};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct FakeController {
    pub inventory: Inventory,
    pub calendars: Vec<(String, String)>,
    pub status: Mutex<Snapshot>,
    /// Makes `update_status` sleep before answering.
    pub delay: Mutex<Duration>,
    /// Makes `update_status` fail with the produced error.
    pub failure: Mutex<Option<fn() -> Error>>,
    /// Calls matching this predicate fail and are not recorded.
    pub rejects: Mutex<Option<fn(&ControllerCall) -> bool>>,
    /// Calls that were applied.
    pub calls: Mutex<Vec<ControllerCall>>,
    pub status_reads: Mutex<usize>,
    /// The number of `update_status` calls currently running, and the most seen at once.
    pub in_flight: Mutex<(usize, usize)>,
}

pub(crate) fn refused() -> Error {
    Error::Connect(
        "fake".into(),
        Box::new(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)),
    )
}

pub(crate) fn malformed() -> Error {
    Error::Malformed("garbage".into())
}

impl FakeController {
    pub fn with_status(status: Snapshot) -> Self {
        Self { status: Mutex::new(status), ..Default::default() }
    }

    pub fn recorded(&self) -> Vec<ControllerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ControllerCall) -> Result<(), Error> {
        if self.rejects.lock().unwrap().is_some_and(|rejects| rejects(&call)) {
            return Err(Error::Request("write rejected".into()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Controller for FakeController {
    fn name(&self) -> &str {
        "fake"
    }

    fn inventory(&self) -> Result<Inventory, Error> {
        Ok(self.inventory.clone())
    }

    fn update_status(&self) -> Result<Snapshot, Error> {
        *self.status_reads.lock().unwrap() += 1;
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.in_flight.lock().unwrap().0 -= 1;
        if let Some(failure) = *self.failure.lock().unwrap() {
            return Err(failure());
        }
        Ok(self.status.lock().unwrap().clone())
    }

    fn calendar_names(&self) -> Result<Vec<(String, String)>, Error> {
        Ok(self.calendars.clone())
    }

    fn set_point(&self, device: &str, point: &str, value: &str) -> Result<(), Error> {
        self.record(ControllerCall::SetPoint {
            device: device.into(),
            point: point.into(),
            value: value.into(),
        })
    }

    fn set_room_mode(&self, room: &str, mode: RoomMode) -> Result<(), Error> {
        self.record(ControllerCall::SetRoomMode { room: room.into(), mode })
    }

    fn set_correction_mode(&self, room: &str, mode: CorrectionMode) -> Result<(), Error> {
        self.record(ControllerCall::SetCorrectionMode { room: room.into(), mode })
    }

    fn set_correction_temperature(&self, room: &str, temperature: f64) -> Result<(), Error> {
        self.record(ControllerCall::SetCorrectionTemperature { room: room.into(), temperature })
    }

    fn set_calendar(&self, room: &str, calendar: u8) -> Result<(), Error> {
        self.record(ControllerCall::SetCalendar { room: room.into(), calendar })
    }

    fn set_sunblind_command(
        &self,
        sunblind: &str,
        command: SunblindCommand,
    ) -> Result<(), Error> {
        self.record(ControllerCall::SetSunblindCommand { sunblind: sunblind.into(), command })
    }

    fn set_sunblind_position(&self, sunblind: &str, position: u16) -> Result<(), Error> {
        self.record(ControllerCall::SetSunblindPosition { sunblind: sunblind.into(), position })
    }

    fn set_sunblind_rotation(&self, sunblind: &str, rotation: u16) -> Result<(), Error> {
        self.record(ControllerCall::SetSunblindRotation { sunblind: sunblind.into(), rotation })
    }
}
