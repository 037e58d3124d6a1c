use crate::entity::{Attribute, AttributeFormat, Entity};
use homie5::device_description::{
    FloatRange, HomieNodeDescription, HomiePropertyDescription, HomiePropertyFormat,
    IntegerRange, PropertyDescriptionBuilder,
};
use homie5::{HomieDataType, HomieID};
use std::collections::BTreeMap;

/// Turn an arbitrary identifier into a valid Homie ID.
///
/// Uppercase letters are lowercased, anything else outside of `[a-z0-9-]` becomes `-`.
pub(crate) fn sanitize_id(id: &str) -> String {
    let id = id
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        })
        .collect::<String>();
    id.trim_matches('-').to_string()
}

pub(crate) fn node_id(entity: &dyn Entity) -> Result<HomieID, super::Error> {
    let unique_id = entity.unique_id();
    HomieID::try_from(sanitize_id(&unique_id))
        .map_err(|e| super::Error::NodeId(unique_id, Box::new(e)))
}

pub(crate) fn property_description(attribute: &Attribute) -> HomiePropertyDescription {
    let (datatype, format) = match &attribute.format {
        AttributeFormat::Boolean => (HomieDataType::Boolean, None),
        AttributeFormat::Integer { min, max } => (
            HomieDataType::Integer,
            Some(IntegerRange { min: *min, max: *max, step: None }.into()),
        ),
        AttributeFormat::Float { min, max, step } => (
            HomieDataType::Float,
            Some(FloatRange { min: *min, max: *max, step: *step }.into()),
        ),
        AttributeFormat::Enum(options) => {
            (HomieDataType::Enum, Some(HomiePropertyFormat::Enum(options.clone())))
        }
        AttributeFormat::Text => (HomieDataType::String, None),
    };
    let mut builder = PropertyDescriptionBuilder::new(datatype);
    if let Some(format) = format {
        builder = builder.format(format);
    }
    if let Some(unit) = attribute.unit {
        builder = builder.unit(unit);
    }
    let mut description = builder.build();
    description.name = Some(attribute.name.to_string());
    description.settable = attribute.settable;
    description.retained = attribute.retained;
    description
}

pub(crate) fn node_description(entity: &dyn Entity) -> HomieNodeDescription {
    let properties = entity
        .attributes()
        .iter()
        .map(|attribute| {
            (HomieID::new_const(attribute.id), property_description(attribute))
        })
        .collect::<BTreeMap<_, _>>();
    let kind: &'static str = entity.kind().into();
    HomieNodeDescription { name: Some(entity.name()), r#type: Some(kind.to_string()), properties }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::cover::Cover;
    use crate::entity::tests::snapshot;

    #[test]
    fn ids_are_sanitized() {
        assert_eq!(sanitize_id("iqtec-d1.relay"), "iqtec-d1-relay");
        assert_eq!(sanitize_id("iqtec-R1_1"), "iqtec-r1-1");
        assert_eq!(sanitize_id("iqtec-pump."), "iqtec-pump");
    }

    #[test]
    fn cover_node_description() {
        let mut cover = Cover::new("r1_1", true, false);
        cover.on_snapshot_update(&snapshot());
        assert_eq!(node_id(&cover).unwrap(), HomieID::new_const("iqtec-r1-1"));
        let description = node_description(&cover);
        assert_eq!(description.r#type.as_deref(), Some("cover"));
        assert_eq!(description.name.as_deref(), Some("Window"));
        let position = &description.properties[&HomieID::new_const("position")];
        assert_eq!(position.datatype, HomieDataType::Integer);
        assert!(position.settable && position.retained);
        assert_eq!(position.unit.as_deref(), Some("%"));
        let action = &description.properties[&HomieID::new_const("action")];
        assert!(action.settable && !action.retained);
        assert!(description.properties.contains_key(&HomieID::new_const("tilt")));
    }
}
