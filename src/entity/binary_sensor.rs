use super::{Attribute, AttributeFormat, DeviceInfo, Entity, EntityKind, Point, StateValue};
use crate::controller::Snapshot;
use crate::mapping;

/// An `OnOff`/`bool` sensor point.
pub struct BinarySensor {
    point: Point,
    is_on: Option<bool>,
}

impl BinarySensor {
    pub fn new(point: Point) -> Self {
        Self { point, is_on: None }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }
}

impl Entity for BinarySensor {
    fn unique_id(&self) -> String {
        self.point.unique_id()
    }
    fn name(&self) -> String {
        self.point.id.clone()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::BinarySensor
    }
    fn device(&self) -> DeviceInfo {
        self.point.device_info()
    }
    fn hidden_by_default(&self) -> bool {
        true
    }

    fn attributes(&self) -> Vec<Attribute> {
        vec![Attribute::state("state", "State", AttributeFormat::Boolean)]
    }

    fn state(&self, attribute: &str) -> Option<StateValue> {
        match attribute {
            "state" => self.is_on.map(StateValue::Bool),
            _ => None,
        }
    }

    fn on_snapshot_update(&mut self, snapshot: &Snapshot) {
        let Some(raw) = snapshot.sensor(&self.point.device, &self.point.id) else {
            tracing::debug!(point = self.point.id, "point missing from snapshot");
            return;
        };
        if let Some(is_on) = mapping::parse_bool(raw) {
            self.is_on = Some(is_on);
        }
        tracing::debug!(entity = self.point.id, "updating entity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::tests::snapshot;

    #[test]
    fn keeps_last_value_on_unknown_marker() {
        let mut sensor = BinarySensor::new(Point::new("d1", "d1.contact"));
        let mut snapshot = snapshot();
        sensor.on_snapshot_update(&snapshot);
        assert_eq!(sensor.is_on(), Some(true));
        snapshot.devices.get_mut("d1").unwrap().sensors.insert("d1.contact".into(), "!".into());
        sensor.on_snapshot_update(&snapshot);
        assert_eq!(sensor.state("state"), Some(StateValue::Bool(true)));
        snapshot.devices.get_mut("d1").unwrap().sensors.insert("d1.contact".into(), "0".into());
        sensor.on_snapshot_update(&snapshot);
        assert_eq!(sensor.is_on(), Some(false));
    }

    #[test]
    fn unknown_until_first_valid_reading() {
        let mut sensor = BinarySensor::new(Point::new("d9", "d9.contact"));
        sensor.on_snapshot_update(&snapshot());
        assert_eq!(sensor.state("state"), None);
        assert!(sensor.parse_set("state", "true").is_err());
    }
}
