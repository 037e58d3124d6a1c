//! Translation between controller encodings and platform concepts.

use crate::controller::{CorrectionMode, RoomMode};
use std::collections::BTreeMap;

/// Controller marks raw point values it could not read with this character.
pub const UNKNOWN_MARKER: char = '!';

pub fn is_unknown(raw: &str) -> bool {
    raw.contains(UNKNOWN_MARKER)
}

/// Parse an `OnOff`/`bool` point. `None` if the value is unknown or not a number.
pub fn parse_bool(raw: &str) -> Option<bool> {
    if is_unknown(raw) {
        return None;
    }
    raw.trim().parse::<i64>().ok().map(|v| v != 0)
}

/// Parse a numeric point. `None` if the value is unknown or not a number.
pub fn parse_number(raw: &str) -> Option<f64> {
    if is_unknown(raw) {
        return None;
    }
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a raw blind position (`0` = open, `full` = closed) to an open percentage.
pub fn raw_to_percent(raw: u16, full: u16) -> u8 {
    let raw = f64::from(raw.min(full));
    let full = f64::from(full);
    ((full - raw) * 100.0 / full).round() as u8
}

/// Inverse of [`raw_to_percent`].
pub fn percent_to_raw(percent: u8, full: u16) -> u16 {
    let percent = f64::from(percent.min(100));
    ((100.0 - percent) * f64::from(full) / 100.0).round() as u16
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(strum::IntoStaticStr, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum HvacMode {
    Off,
    Heat,
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum HvacAction {
    Off,
    Heating,
    Idle,
}

pub fn hvac_mode(
    heating_enabled: bool,
    room_mode: RoomMode,
    correction: CorrectionMode,
) -> HvacMode {
    if !heating_enabled {
        return HvacMode::Off;
    }
    match (room_mode, correction) {
        (RoomMode::Off, _) => HvacMode::Off,
        (RoomMode::Calendar, CorrectionMode::Manual) => HvacMode::Heat,
        _ => HvacMode::Auto,
    }
}

pub fn hvac_action(heating_enabled: bool, heating: bool) -> HvacAction {
    match (heating_enabled, heating) {
        (false, _) => HvacAction::Off,
        (true, true) => HvacAction::Heating,
        (true, false) => HvacAction::Idle,
    }
}

/// Room mode and correction mode to request for an HVAC mode.
pub fn hvac_mode_request(mode: HvacMode) -> (RoomMode, Option<CorrectionMode>) {
    match mode {
        HvacMode::Off => (RoomMode::Off, None),
        HvacMode::Heat => (RoomMode::Calendar, Some(CorrectionMode::Manual)),
        HvacMode::Auto => (RoomMode::Calendar, Some(CorrectionMode::None)),
    }
}

pub const PRESET_ANTIFREEZE: &str = "Anti-Freeze";
pub const PRESET_AWAY: &str = "away";
pub const PRESET_NONE: &str = "none";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preset {
    AntiFreeze,
    Away,
    None,
    /// A calendar, carrying its number.
    Calendar(u8),
}

/// Calendar display names as shown to the user, in the `(<number>) <name>` format.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalendarTable(BTreeMap<u8, String>);

impl CalendarTable {
    /// Build the table out of `("_CALENDAR_<n>", name)` pairs. Entries with unparseable keys are
    /// skipped.
    pub fn from_raw(raw: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut table = BTreeMap::new();
        for (key, name) in raw {
            let Ok(number) = key.trim_start_matches("_CALENDAR_").parse::<u8>() else {
                tracing::debug!(key, "skipping calendar with unexpected key");
                continue;
            };
            table.insert(number, format!("({number}) {name}"));
        }
        Self(table)
    }

    pub fn display(&self, number: u8) -> Option<&str> {
        self.0.get(&number).map(String::as_str)
    }

    pub fn number(&self, display: &str) -> Option<u8> {
        self.0.iter().find(|(_, d)| *d == display).map(|(n, _)| *n)
    }

    pub fn displays(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn preset_name<'a>(&'a self, preset: &Preset) -> Option<&'a str> {
        match preset {
            Preset::AntiFreeze => Some(PRESET_ANTIFREEZE),
            Preset::Away => Some(PRESET_AWAY),
            Preset::None => Some(PRESET_NONE),
            Preset::Calendar(n) => self.display(*n),
        }
    }

    pub fn parse_preset(&self, name: &str) -> Option<Preset> {
        match name {
            PRESET_ANTIFREEZE => Some(Preset::AntiFreeze),
            PRESET_AWAY => Some(Preset::Away),
            PRESET_NONE => Some(Preset::None),
            other => self.number(other).map(Preset::Calendar),
        }
    }

    /// All preset names, calendars first.
    pub fn preset_modes(&self) -> Vec<String> {
        self.displays()
            .chain([PRESET_AWAY, PRESET_ANTIFREEZE, PRESET_NONE])
            .map(str::to_string)
            .collect()
    }
}

/// The preset the room is in, if it can be named.
pub fn preset(
    room_mode: RoomMode,
    calendar_number: u8,
    calendars: &CalendarTable,
) -> Option<Preset> {
    match room_mode {
        RoomMode::Antifreeze => Some(Preset::AntiFreeze),
        RoomMode::Holiday => Some(Preset::Away),
        _ => calendars.display(calendar_number).map(|_| Preset::Calendar(calendar_number)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(strum::IntoStaticStr, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum TriState {
    Auto,
    On,
    Off,
}

impl TriState {
    /// `None` for anything that is not a known raw encoding.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(Self::Off),
            "1" => Some(Self::On),
            "2" => Some(Self::Auto),
            _ => None,
        }
    }
}
