use super::{
    Attribute, AttributeFormat, Command, CommandError, DeviceInfo, Entity, EntityKind, Point,
    StateValue,
};
use crate::controller::{ControllerCall, Snapshot};
use crate::mapping::TriState;
use strum::VariantNames as _;

/// An `OnOffAuto` switch point.
pub struct Select {
    point: Point,
    option: Option<TriState>,
}

impl Select {
    pub fn new(point: Point) -> Self {
        Self { point, option: None }
    }

    pub fn option(&self) -> Option<TriState> {
        self.option
    }
}

impl Entity for Select {
    fn unique_id(&self) -> String {
        self.point.unique_id()
    }
    fn name(&self) -> String {
        self.point.id.clone()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Select
    }
    fn device(&self) -> DeviceInfo {
        self.point.device_info()
    }
    fn hidden_by_default(&self) -> bool {
        true
    }

    fn attributes(&self) -> Vec<Attribute> {
        let options = TriState::VARIANTS.iter().map(|v| v.to_string()).collect();
        vec![Attribute::state("option", "Option", AttributeFormat::Enum(options)).settable()]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "option" => self.option.map(|o| StateValue::Text(<&str>::from(o).to_string())),
            _ => None,
        }
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        let Some(raw) = snapshot.switch(&self.point.device, &self.point.id) else {
            tracing::debug!(point = self.point.id, "point missing from snapshot");
            return;
        };
        match TriState::from_raw(raw) {
            Some(option) => self.option = Some(option),
            None => tracing::debug!(point = self.point.id, raw, "unrecognized option value"),
        }
        tracing::debug!(entity = self.point.id, "updating entity");
    }

    fn parse_set(&self, attribute: &str, value: &str) -> Result<Command, CommandError> {
        if attribute != "option" {
            return Err(CommandError::UnknownAttribute {
                entity: self.unique_id(),
                attribute: attribute.to_string(),
            });
        }
        value
            .parse::<TriState>()
            .map(Command::SelectOption)
            .map_err(|_| CommandError::invalid(attribute, value))
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        match command {
            // The controller accepts option names for tri-state points.
            Command::SelectOption(option) => Ok(vec![self.point.set(<&str>::from(option))]),
            command => Err(CommandError::Unsupported { entity: self.unique_id(), command }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::snapshot;

    fn with_raw(raw: &str) -> Snapshot {
        let mut snapshot = snapshot();
        snapshot.devices.get_mut("d1").unwrap().switches.insert("d1.mode".into(), raw.into());
        snapshot
    }

    #[test]
    fn raw_values_map_to_options() {
        let mut select = Select::new(Point::new("d1", "d1.mode"));
        select.on_snapshot_update(&with_raw("2"));
        assert_eq!(select.state("option"), Some(StateValue::Text("auto".into())));
        select.on_snapshot_update(&with_raw("1"));
        assert_eq!(select.option(), Some(TriState::On));
        select.on_snapshot_update(&with_raw("0"));
        assert_eq!(select.option(), Some(TriState::Off));
    }

    #[test]
    fn unmapped_value_keeps_previous_option() {
        let mut select = Select::new(Point::new("d1", "d1.mode"));
        select.on_snapshot_update(&with_raw("5"));
        assert_eq!(select.option(), None);
        select.on_snapshot_update(&with_raw("1"));
        select.on_snapshot_update(&with_raw("!"));
        assert_eq!(select.option(), Some(TriState::On));
    }

    #[test]
    fn select_option_sends_option_name() {
        let select = Select::new(Point::new("d1", "d1.mode"));
        let command = select.parse_set("option", "auto").unwrap();
        assert_eq!(
            select.command(command).unwrap(),
            vec![ControllerCall::SetPoint {
                device: "d1".into(),
                point: "d1.mode".into(),
                value: "auto".into(),
            }]
        );
        assert!(select.parse_set("option", "sometimes").is_err());
        assert_eq!(
            select.attributes()[0].format,
            AttributeFormat::Enum(vec!["auto".into(), "on".into(), "off".into()])
        );
    }
}
