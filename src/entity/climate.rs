//! Room heating.

use super::{
    Attribute, AttributeFormat, Command, CommandError, DeviceInfo, Entity, EntityKind,
    StateValue, MANUFACTURER, UNIQUE_ID_PREFIX,
};
use crate::controller::{ControllerCall, CorrectionMode, RoomMode, RoomState, Snapshot};
use crate::mapping::{self, CalendarTable, HvacAction, HvacMode, Preset};
use std::sync::Arc;
use strum::VariantNames as _;

pub const TEMPERATURE_STEP: f64 = 0.1;

pub struct Climate {
    id: String,
    calendars: Arc<CalendarTable>,
    state: Option<RoomState>,
}

impl Climate {
    pub fn new(id: impl Into<String>, calendars: Arc<CalendarTable>) -> Self {
        Self { id: id.into(), calendars, state: None }
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        let s = self.state.as_ref()?;
        Some(mapping::hvac_mode(s.heating_enabled, s.room_mode, s.correction_status))
    }

    pub fn hvac_action(&self) -> Option<HvacAction> {
        let s = self.state.as_ref()?;
        Some(mapping::hvac_action(s.heating_enabled, s.heating))
    }

    pub fn preset(&self) -> Option<Preset> {
        let s = self.state.as_ref()?;
        mapping::preset(s.room_mode, s.calendar_number, &self.calendars)
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.state.as_ref()?.actual_temperature
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.state.as_ref()?.requested_temperature
    }

    fn room_mode(&self, mode: RoomMode) -> ControllerCall {
        ControllerCall::SetRoomMode { room: self.id.clone(), mode }
    }

    fn correction_mode(&self, mode: CorrectionMode) -> ControllerCall {
        ControllerCall::SetCorrectionMode { room: self.id.clone(), mode }
    }
}

fn text(value: &str) -> StateValue {
    StateValue::Text(value.to_string())
}

impl Entity for Climate {
    fn unique_id(&self) -> String {
        format!("{UNIQUE_ID_PREFIX}-{}", self.id)
    }

    fn name(&self) -> String {
        self.state.as_ref().map_or_else(|| self.id.clone(), |s| s.name.clone())
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Climate
    }

    fn device(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.id.clone(),
            name: self.state.as_ref().map(|s| s.name.clone()),
            manufacturer: MANUFACTURER,
        }
    }

    fn attributes(&self) -> Vec<Attribute> {
        let celsius = homie5::HOMIE_UNIT_DEGREE_CELSIUS;
        let names = |variants: &[&str]| -> Vec<String> {
            variants.iter().map(|v| v.to_string()).collect()
        };
        vec![
            Attribute::state(
                "current-temperature",
                "Current temperature",
                AttributeFormat::Float { min: None, max: None, step: None },
            )
            .unit(celsius),
            Attribute::state(
                "target-temperature",
                "Target temperature",
                AttributeFormat::Float { min: None, max: None, step: Some(TEMPERATURE_STEP) },
            )
            .unit(celsius)
            .settable(),
            Attribute::state(
                "hvac-mode",
                "HVAC mode",
                AttributeFormat::Enum(names(HvacMode::VARIANTS)),
            )
            .settable(),
            Attribute::state(
                "hvac-action",
                "HVAC action",
                AttributeFormat::Enum(names(HvacAction::VARIANTS)),
            ),
            Attribute::state(
                "preset",
                "Preset",
                AttributeFormat::Enum(self.calendars.preset_modes()),
            )
            .settable(),
        ]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "current-temperature" => self.current_temperature().map(StateValue::Float),
            "target-temperature" => self.target_temperature().map(StateValue::Float),
            "hvac-mode" => self.hvac_mode().map(|m| text(m.into())),
            "hvac-action" => self.hvac_action().map(|a| text(a.into())),
            "preset" => {
                let preset = self.preset()?;
                self.calendars.preset_name(&preset).map(text)
            }
            _ => None,
        }
    }

    fn extra_state_attributes(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.state.as_ref()?).ok()
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        match snapshot.rooms.get(&self.id) {
            Some(state) => self.state = Some(state.clone()),
            None => tracing::debug!(room = self.id, "room missing from snapshot"),
        }
        tracing::debug!(entity = self.id, "updating entity");
    }

    fn parse_set(&self, attribute: &str, value: &str) -> Result<Command, CommandError> {
        match attribute {
            "target-temperature" => match value.trim().parse::<f64>() {
                Ok(t) if t.is_finite() => Ok(Command::SetTemperature(t)),
                _ => Err(CommandError::invalid(attribute, value)),
            },
            "hvac-mode" => value
                .parse::<HvacMode>()
                .map(Command::SetHvacMode)
                .map_err(|_| CommandError::invalid(attribute, value)),
            "preset" => Ok(Command::SetPresetMode(value.to_string())),
            _ => Err(CommandError::UnknownAttribute {
                entity: self.unique_id(),
                attribute: attribute.to_string(),
            }),
        }
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        match command {
            Command::SetHvacMode(mode) => {
                let (room_mode, correction) = mapping::hvac_mode_request(mode);
                let mut calls = vec![self.room_mode(room_mode)];
                calls.extend(correction.map(|c| self.correction_mode(c)));
                Ok(calls)
            }
            Command::SetPresetMode(name) => match self.calendars.parse_preset(&name) {
                Some(Preset::Away) => Ok(vec![self.room_mode(RoomMode::Holiday)]),
                Some(Preset::AntiFreeze) => Ok(vec![self.room_mode(RoomMode::Antifreeze)]),
                Some(Preset::None) => Ok(vec![]),
                Some(Preset::Calendar(calendar)) => Ok(vec![
                    self.room_mode(RoomMode::Calendar),
                    ControllerCall::SetCalendar { room: self.id.clone(), calendar },
                ]),
                None => Err(CommandError::UnknownPreset(name)),
            },
            Command::SetTemperature(temperature) => Ok(vec![
                self.correction_mode(CorrectionMode::Manual),
                ControllerCall::SetCorrectionTemperature { room: self.id.clone(), temperature },
            ]),
            command => Err(CommandError::Unsupported { entity: self.unique_id(), command }),
        }
    }
}
