use super::{
    Attribute, AttributeFormat, Command, CommandError, DeviceInfo, Entity, EntityKind, Point,
    StateValue,
};
use crate::controller::{ControllerCall, Snapshot};
use crate::mapping;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NumberClass {
    Temperature,
    /// Whole numbers in `0..=255`.
    Byte,
    Float,
}

/// A settable numeric switch point.
pub struct Number {
    point: Point,
    class: NumberClass,
    value: Option<f64>,
}

impl Number {
    pub fn new(point: Point, class: NumberClass) -> Self {
        Self { point, class, value: None }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    fn accepts(&self, value: f64) -> bool {
        match self.class {
            NumberClass::Byte => (0.0..=255.0).contains(&value) && value.fract() == 0.0,
            NumberClass::Temperature | NumberClass::Float => value.is_finite(),
        }
    }
}

impl Entity for Number {
    fn unique_id(&self) -> String {
        self.point.unique_id()
    }
    fn name(&self) -> String {
        self.point.id.clone()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Number
    }
    fn device(&self) -> DeviceInfo {
        self.point.device_info()
    }
    fn hidden_by_default(&self) -> bool {
        true
    }

    fn attributes(&self) -> Vec<Attribute> {
        let attribute = match self.class {
            NumberClass::Temperature => Attribute::state(
                "value",
                "Temperature",
                AttributeFormat::Float { min: None, max: None, step: None },
            )
            .unit(homie5::HOMIE_UNIT_DEGREE_CELSIUS),
            NumberClass::Byte => Attribute::state(
                "value",
                "Value",
                AttributeFormat::Float { min: Some(0.0), max: Some(255.0), step: Some(1.0) },
            ),
            NumberClass::Float => Attribute::state(
                "value",
                "Value",
                AttributeFormat::Float { min: None, max: None, step: Some(0.001) },
            ),
        };
        vec![attribute.settable()]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "value" => self.value.map(StateValue::Float),
            _ => None,
        }
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        let Some(raw) = snapshot.switch(&self.point.device, &self.point.id) else {
            tracing::debug!(point = self.point.id, "point missing from snapshot");
            return;
        };
        if let Some(value) = mapping::parse_number(raw) {
            self.value = Some(value);
        }
        tracing::debug!(entity = self.point.id, "updating entity");
    }

    fn parse_set(&self, attribute: &str, value: &str) -> Result<Command, CommandError> {
        if attribute != "value" {
            return Err(CommandError::UnknownAttribute {
                entity: self.unique_id(),
                attribute: attribute.to_string(),
            });
        }
        match value.trim().parse::<f64>() {
            Ok(number) if self.accepts(number) => Ok(Command::SetValue(number)),
            _ => Err(CommandError::invalid(attribute, value)),
        }
    }

    fn command(&self, command: Command) -> Result<Vec<ControllerCall>, CommandError> {
        match command {
            Command::SetValue(value) if self.accepts(value) => {
                Ok(vec![self.point.set(value.to_string())])
            }
            Command::SetValue(value) => Err(CommandError::invalid("value", &value.to_string())),
            command => Err(CommandError::Unsupported { entity: self.unique_id(), command }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::snapshot;

    #[test]
    fn reads_and_writes_values() {
        let mut number = Number::new(Point::new("d1", "d1.setpoint"), NumberClass::Temperature);
        number.on_snapshot_update(&snapshot());
        assert_eq!(number.value(), Some(20.5));
        let command = number.parse_set("value", "21.5").unwrap();
        assert_eq!(command, Command::SetValue(21.5));
        assert_eq!(
            number.command(command).unwrap(),
            vec![ControllerCall::SetPoint {
                device: "d1".into(),
                point: "d1.setpoint".into(),
                value: "21.5".into(),
            }]
        );
    }

    #[test]
    fn byte_range_is_enforced() {
        let mut number = Number::new(Point::new("d1", "d1.level"), NumberClass::Byte);
        number.on_snapshot_update(&snapshot());
        assert_eq!(number.state("value"), Some(StateValue::Float(128.0)));
        assert!(number.parse_set("value", "256").is_err());
        assert!(number.parse_set("value", "1.5").is_err());
        assert!(number.parse_set("value", "nope").is_err());
        assert_eq!(number.parse_set("value", "255").unwrap(), Command::SetValue(255.0));
        assert!(number.command(Command::SetValue(-1.0)).is_err());
        assert!(number.command(Command::TurnOn).is_err());
    }
}
