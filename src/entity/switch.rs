use super::{
    Attribute, AttributeFormat, Command, CommandError, DeviceInfo, Entity, EntityKind, Point,
    StateValue,
};
use crate::controller::{ControllerCall, Snapshot};
use crate::mapping;

/// An `OnOff`/`bool` switch point.
pub struct Switch {
    point: Point,
    is_on: Option<bool>,
}

impl Switch {
    pub fn new(point: Point) -> Self {
        Self { point, is_on: None }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }
}

impl Entity for Switch {
    fn unique_id(&self) -> String {
        self.point.unique_id()
    }
    fn name(&self) -> String {
        self.point.id.clone()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Switch
    }
    fn device(&self) -> DeviceInfo {
        self.point.device_info()
    }
    fn hidden_by_default(&self) -> bool {
        true
    }

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::state("state", "State", AttributeFormat::Boolean).settable()]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "state" => self.is_on.map(StateValue::Bool),
            _ => None,
        }
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        let Some(raw) = snapshot.switch(&self.point.device, &self.point.id) else {
            tracing::debug!(point = self.point.id, "point missing from snapshot");
            return;
        };
        if let Some(is_on) = mapping::parse_bool(raw) {
            self.is_on = Some(is_on);
        }
        tracing::debug!(entity = self.point.id, "updating entity");
    }

    fn parse_set(&self, attribute: &str, value: &str) -> Result<Command, CommandError> {
        match (attribute, value) {
            ("state", "true") => Ok(Command::TurnOn),
            ("state", "false") => Ok(Command::TurnOff),
            ("state", _) => Err(CommandError::invalid(attribute, value)),
            _ => Err(CommandError::UnknownAttribute {
                entity: self.unique_id(),
                attribute: attribute.to_string(),
            }),
        }
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        match command {
            Command::TurnOn => Ok(vec![self.point.set("1")]),
            Command::TurnOff => Ok(vec![self.point.set("0")]),
            Command::Toggle if self.is_on == Some(true) => self.command(Command::TurnOff),
            Command::Toggle => self.command(Command::TurnOn),
            command => Err(CommandError::Unsupported { entity: self.unique_id(), command }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::snapshot;

    fn set(value: &str) -> Vec<ControllerCall> {
        vec![ControllerCall::SetPoint {
            device: "d1".into(),
            point: "d1.relay".into(),
            value: value.into(),
        }]
    }

    #[test]
    fn turn_on_and_off() {
        let switch = Switch::new(Point::new("d1", "d1.relay"));
        assert_eq!(switch.command(Command::TurnOn).unwrap(), set("1"));
        assert_eq!(switch.command(Command::TurnOff).unwrap(), set("0"));
        assert_eq!(switch.parse_set("state", "true").unwrap(), Command::TurnOn);
        assert!(switch.parse_set("state", "maybe").is_err());
        assert!(switch.parse_set("value", "true").is_err());
    }

    #[test]
    fn toggle_follows_last_known_state() {
        let mut switch = Switch::new(Point::new("d1", "d1.relay"));
        // Unknown state toggles on.
        assert_eq!(switch.command(Command::Toggle).unwrap(), set("1"));
        let mut snapshot = snapshot();
        switch.on_snapshot_update(&snapshot);
        assert_eq!(switch.is_on(), Some(false));
        assert_eq!(switch.command(Command::Toggle).unwrap(), set("1"));
        snapshot.devices.get_mut("d1").unwrap().switches.insert("d1.relay".into(), "1".into());
        switch.on_snapshot_update(&snapshot);
        assert_eq!(switch.command(Command::Toggle).unwrap(), set("0"));
    }

    #[test]
    fn unknown_marker_keeps_state() {
        let mut switch = Switch::new(Point::new("d1", "d1.relay"));
        let mut snapshot = snapshot();
        switch.on_snapshot_update(&snapshot);
        snapshot.devices.get_mut("d1").unwrap().switches.insert("d1.relay".into(), "!".into());
        switch.on_snapshot_update(&snapshot);
        assert_eq!(switch.state("state"), Some(StateValue::Bool(false)));
    }
}
