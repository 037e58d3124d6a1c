use super::{Attribute, AttributeFormat, DeviceInfo, Entity, EntityKind, Point, StateValue};
use crate::controller::Snapshot;
use crate::mapping;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorClass {
    /// Degrees Celsius, shown with one decimal.
    Temperature,
    /// A plain measurement, shown without decimals.
    Plain,
}

/// A numeric sensor point.
pub struct Sensor {
    point: Point,
    class: SensorClass,
    value: Option<f64>,
}

impl Sensor {
    pub fn new(point: Point, class: SensorClass) -> Self {
        Self { point, class, value: None }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Entity for Sensor {
    fn unique_id(&self) -> String {
        self.point.unique_id()
    }
    fn name(&self) -> String {
        self.point.id.clone()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }
    fn device(&self) -> DeviceInfo {
        self.point.device_info()
    }
    fn hidden_by_default(&self) -> bool {
        true
    }

    fn attributes(&self) -> Vec<Attribute> {
        let attribute = match self.class {
            SensorClass::Temperature => Attribute::state(
                "value",
                "Temperature",
                AttributeFormat::Float { min: None, max: None, step: Some(0.1) },
            )
            .unit(homie5::HOMIE_UNIT_DEGREE_CELSIUS),
            SensorClass::Plain => Attribute::state(
                "value",
                "Value",
                AttributeFormat::Float { min: None, max: None, step: Some(1.0) },
            ),
        };
        vec![attribute]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "value" => self.value.map(StateValue::Float),
            _ => None,
        }
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        let Some(raw) = snapshot.sensor(&self.point.device, &self.point.id) else {
            tracing::debug!(point = self.point.id, "point missing from snapshot");
            return;
        };
        if let Some(value) = mapping::parse_number(raw) {
            self.value = Some(value);
        }
        tracing::debug!(entity = self.point.id, "updating entity");
    }
}
