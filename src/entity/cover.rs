//! Sunblinds.
//!
//! The controller counts positions from fully open (`0`) to fully closed, while the platform
//! counts open percentage. Tilt is handled the same way with [`SUNBLIND_TILT_CLOSED`].

use super::{
    Attribute, AttributeFormat, Command, CommandError, DeviceInfo, Entity, EntityKind,
    StateValue, MANUFACTURER, UNIQUE_ID_PREFIX,
};
use crate::controller::{
    ControllerCall, Snapshot, SunblindCommand, SunblindState, SUNBLIND_EXTENDED,
    SUNBLIND_TILT_CLOSED,
};
use crate::mapping;
use strum::VariantNames as _;

/// Momentary cover operations exposed as a single action attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub enum CoverAction {
    Open,
    Close,
    Stop,
    OpenTilt,
    CloseTilt,
    StopTilt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr, strum::VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum CoverState {
    Open,
    Opening,
    Closed,
    Closing,
}

pub struct Cover {
    id: String,
    supports_tilt: bool,
    short_tilt: bool,
    state: Option<SunblindState>,
}

impl Cover {
    pub fn new(id: impl Into<String>, supports_tilt: bool, short_tilt: bool) -> Self {
        Self { id: id.into(), supports_tilt, short_tilt, state: None }
    }

    pub fn supports_tilt(&self) -> bool {
        self.supports_tilt
    }

    pub fn is_closed(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.position == SUNBLIND_EXTENDED)
    }

    pub fn is_opening(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.out_up_1 || s.out_up_2)
    }

    pub fn is_closing(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.out_dn_1 || s.out_dn_2)
    }

    pub fn position(&self) -> Option<u8> {
        let state = self.state.as_ref()?;
        Some(mapping::raw_to_percent(state.position, SUNBLIND_EXTENDED))
    }

    pub fn tilt_position(&self) -> Option<u8> {
        let state = self.state.as_ref()?;
        Some(mapping::raw_to_percent(state.rotation, SUNBLIND_TILT_CLOSED))
    }

    pub fn cover_state(&self) -> Option<CoverState> {
        Some(if self.is_opening()? {
            CoverState::Opening
        } else if self.is_closing()? {
            CoverState::Closing
        } else if self.is_closed()? {
            CoverState::Closed
        } else {
            CoverState::Open
        })
    }

    fn room_id(&self) -> &str {
        self.id.split('_').next().unwrap_or(&self.id)
    }

    fn sunblind_command(&self, command: SunblindCommand) -> ControllerCall {
        ControllerCall::SetSunblindCommand { sunblind: self.id.clone(), command }
    }

    fn parse_percent(attribute: &str, value: &str) -> Result<u8, CommandError> {
        match value.trim().parse::<u8>() {
            Ok(percent) if percent <= 100 => Ok(percent),
            _ => Err(CommandError::invalid(attribute, value)),
        }
    }
}

impl Entity for Cover {
    fn unique_id(&self) -> String {
        format!("{UNIQUE_ID_PREFIX}-{}", self.id)
    }

    fn name(&self) -> String {
        self.state.as_ref().map_or_else(|| self.id.clone(), |s| s.name.clone())
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Cover
    }

    fn device(&self) -> DeviceInfo {
        DeviceInfo {
            identifier: self.room_id().to_string(),
            name: None,
            manufacturer: MANUFACTURER,
        }
    }

    fn attributes(&self) -> Vec<Attribute> {
        let percent = || AttributeFormat::Integer { min: Some(0), max: Some(100) };
        let mut attributes = vec![
            Attribute::state("position", "Position", percent()).unit("%").settable(),
            Attribute::state(
                "state",
                "State",
                AttributeFormat::Enum(CoverState::VARIANTS.iter().map(|v| v.to_string()).collect()),
            ),
        ];
        if self.supports_tilt {
            attributes.push(Attribute::state("tilt", "Tilt", percent()).unit("%").settable());
        }
        let actions = CoverAction::VARIANTS
            .iter()
            .filter(|v| self.supports_tilt || !v.ends_with("-tilt"))
            .map(|v| v.to_string())
            .collect();
        let action = Attribute::state("action", "Action", AttributeFormat::Enum(actions));
        attributes.push(action.action());
        attributes
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "position" => self.position().map(|p| StateValue::Integer(p.into())),
            "tilt" if self.supports_tilt => {
                self.tilt_position().map(|p| StateValue::Integer(p.into()))
            }
            "state" => self.cover_state().map(|s| StateValue::Text(<&str>::from(s).to_string())),
            _ => None,
        }
    }

    fn extra_state_attributes(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.state.as_ref()?).ok()
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        match snapshot.sunblinds.get(&self.id) {
            Some(state) => self.state = Some(state.clone()),
            None => tracing::debug!(sunblind = self.id, "sunblind missing from snapshot"),
        }
        tracing::debug!(entity = self.id, "updating entity");
    }

    fn parse_set(&self, attribute: &str, value: &str) -> Result<Command, CommandError> {
        Ok(match attribute {
            "position" => Command::SetCoverPosition(Self::parse_percent(attribute, value)?),
            "tilt" if self.supports_tilt => {
                Command::SetCoverTiltPosition(Self::parse_percent(attribute, value)?)
            }
            "action" => match value.parse::<CoverAction>() {
                Ok(CoverAction::Open) => Command::OpenCover,
                Ok(CoverAction::Close) => Command::CloseCover,
                Ok(CoverAction::Stop) => Command::StopCover,
                Ok(CoverAction::OpenTilt) => Command::OpenCoverTilt,
                Ok(CoverAction::CloseTilt) => Command::CloseCoverTilt,
                Ok(CoverAction::StopTilt) => Command::StopCoverTilt,
                Err(_) => return Err(CommandError::invalid(attribute, value)),
            },
            _ => {
                return Err(CommandError::UnknownAttribute {
                    entity: self.unique_id(),
                    attribute: attribute.to_string(),
                });
            }
        })
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        let call = match command {
            Command::OpenCover => self.sunblind_command(SunblindCommand::Up),
            Command::CloseCover => self.sunblind_command(SunblindCommand::Down),
            Command::StopCover => self.sunblind_command(SunblindCommand::Stop),
            Command::SetCoverPosition(percent) => ControllerCall::SetSunblindPosition {
                sunblind: self.id.clone(),
                position: mapping::percent_to_raw(percent, SUNBLIND_EXTENDED),
            },
            Command::OpenCoverTilt if self.supports_tilt => {
                self.sunblind_command(if self.short_tilt {
                    SunblindCommand::TiltOpenShort
                } else {
                    SunblindCommand::TiltOpen
                })
            }
            Command::CloseCoverTilt if self.supports_tilt => {
                return self.command(Command::SetCoverTiltPosition(0));
            }
            Command::StopCoverTilt if self.supports_tilt => {
                self.sunblind_command(SunblindCommand::Stop)
            }
            Command::SetCoverTiltPosition(percent) if self.supports_tilt => {
                ControllerCall::SetSunblindRotation {
                    sunblind: self.id.clone(),
                    rotation: mapping::percent_to_raw(percent, SUNBLIND_TILT_CLOSED),
                }
            }
            command => {
                return Err(CommandError::Unsupported { entity: self.unique_id(), command });
            }
        };
        Ok(vec![call])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::snapshot;

    fn cover(id: &str, short_tilt: bool) -> Cover {
        let snapshot = snapshot();
        let tilt = snapshot.sunblinds[id].full_tilt_time > 0;
        let mut cover = Cover::new(id, tilt, short_tilt);
        cover.on_snapshot_update(&snapshot);
        cover
    }

    #[test]
    fn open_blind() {
        let cover = cover("r1_1", false);
        assert_eq!(cover.position(), Some(100));
        assert_eq!(cover.is_closed(), Some(false));
        assert_eq!(cover.tilt_position(), Some(0));
        assert_eq!(cover.state("state"), Some(StateValue::Text("open".into())));
        assert_eq!(cover.name(), "Window");
        assert_eq!(cover.device().identifier, "r1");
    }

    #[test]
    fn closed_blind() {
        let cover = cover("r1_2", false);
        assert_eq!(cover.position(), Some(0));
        assert_eq!(cover.is_closed(), Some(true));
        assert!(!cover.supports_tilt());
        assert_eq!(cover.state("tilt"), None);
        assert!(cover.attributes().iter().all(|a| a.id != "tilt"));
    }

    #[test]
    fn either_relay_reports_motion() {
        let mut snapshot = snapshot();
        let mut cover = Cover::new("r1_1", true, false);
        snapshot.sunblinds.get_mut("r1_1").unwrap().out_up_2 = true;
        cover.on_snapshot_update(&snapshot);
        assert_eq!(cover.is_opening(), Some(true));
        assert_eq!(cover.is_closing(), Some(false));
        assert_eq!(cover.cover_state(), Some(CoverState::Opening));
        let state = snapshot.sunblinds.get_mut("r1_1").unwrap();
        state.out_up_2 = false;
        state.out_dn_1 = true;
        cover.on_snapshot_update(&snapshot);
        assert_eq!(cover.cover_state(), Some(CoverState::Closing));
    }

    #[test]
    fn movement_commands() {
        let cover = cover("r1_1", false);
        let command = |c| cover.command(c).unwrap();
        assert_eq!(
            command(Command::OpenCover),
            vec![ControllerCall::SetSunblindCommand {
                sunblind: "r1_1".into(),
                command: SunblindCommand::Up
            }]
        );
        assert_eq!(
            command(Command::SetCoverPosition(0)),
            vec![ControllerCall::SetSunblindPosition {
                sunblind: "r1_1".into(),
                position: SUNBLIND_EXTENDED
            }]
        );
        assert_eq!(
            command(Command::CloseCoverTilt),
            vec![ControllerCall::SetSunblindRotation {
                sunblind: "r1_1".into(),
                rotation: SUNBLIND_TILT_CLOSED
            }]
        );
        assert_eq!(
            command(Command::OpenCoverTilt),
            vec![ControllerCall::SetSunblindCommand {
                sunblind: "r1_1".into(),
                command: SunblindCommand::TiltOpen
            }]
        );
    }

    #[test]
    fn short_tilt_pulse() {
        let cover = cover("r1_1", true);
        assert_eq!(
            cover.command(Command::OpenCoverTilt).unwrap(),
            vec![ControllerCall::SetSunblindCommand {
                sunblind: "r1_1".into(),
                command: SunblindCommand::TiltOpenShort
            }]
        );
    }

    #[test]
    fn tilt_is_rejected_without_tilt_support() {
        let cover = cover("r1_2", false);
        assert!(cover.command(Command::OpenCoverTilt).is_err());
        assert!(cover.parse_set("tilt", "50").is_err());
    }

    #[test]
    fn parses_platform_writes() {
        let cover = cover("r1_1", false);
        assert_eq!(cover.parse_set("position", "40").unwrap(), Command::SetCoverPosition(40));
        assert!(cover.parse_set("position", "140").is_err());
        assert_eq!(cover.parse_set("action", "stop-tilt").unwrap(), Command::StopCoverTilt);
        assert!(cover.parse_set("action", "dance").is_err());
        assert!(cover.extra_state_attributes().is_some());
    }
}
