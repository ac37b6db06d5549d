/// Field mapping table and channel settings
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::{Field, FieldMapping, SensorType, FIELD_SLOTS};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("all {} channel fields are already mapped", FIELD_SLOTS)]
    Full,
    #[error("{0} is not mapped")]
    UnknownField(Field),
}

/// Ordered, user-editable list of field mappings
///
/// Holds at most one mapping per field slot, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldMapping>", into = "Vec<FieldMapping>")]
pub struct FieldMappings {
    entries: Vec<FieldMapping>,
}

impl FieldMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The layout the reference sensor board publishes
    pub fn standard() -> Self {
        let layout = [
            SensorType::Co,
            SensorType::Temperature,
            SensorType::Humidity,
            SensorType::AqiCo,
            SensorType::Voc,
            SensorType::Pm25,
            SensorType::Pm10,
        ];
        let mut mappings = FieldMappings::new();
        for sensor_type in layout {
            // Seven entries never exceed the eight slots
            let _ = mappings.add(sensor_type);
        }
        mappings
    }

    /// Build from an explicit list, rejecting duplicate slots and overflow
    pub fn from_entries(entries: Vec<FieldMapping>) -> Result<Self, ConfigError> {
        if entries.len() > FIELD_SLOTS as usize {
            return Err(ConfigError::TooManyMappings(entries.len()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.field == entry.field) {
                return Err(ConfigError::DuplicateField(entry.field));
            }
        }
        Ok(FieldMappings { entries })
    }

    /// Append a mapping on the first unused field slot
    pub fn add(&mut self, sensor_type: SensorType) -> Result<Field, MappingError> {
        let field = Field::all()
            .find(|f| self.get(*f).is_none())
            .ok_or(MappingError::Full)?;
        self.entries.push(FieldMapping::new(field, sensor_type));
        Ok(field)
    }

    pub fn remove(&mut self, field: Field) -> Result<FieldMapping, MappingError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.field == field)
            .ok_or(MappingError::UnknownField(field))?;
        Ok(self.entries.remove(index))
    }

    /// Change a mapping's type
    ///
    /// Any type other than `Custom` resets label and unit to that type's
    /// defaults, discarding manual edits.
    pub fn set_type(&mut self, field: Field, sensor_type: SensorType) -> Result<(), MappingError> {
        let entry = self.get_mut(field)?;
        entry.sensor_type = sensor_type;
        if let Some((label, unit)) = sensor_type.defaults() {
            entry.label = label.to_string();
            entry.unit = unit.to_string();
        }
        Ok(())
    }

    pub fn set_label(&mut self, field: Field, label: &str) -> Result<(), MappingError> {
        self.get_mut(field)?.label = label.to_string();
        Ok(())
    }

    pub fn set_unit(&mut self, field: Field, unit: &str) -> Result<(), MappingError> {
        self.get_mut(field)?.unit = unit.to_string();
        Ok(())
    }

    pub fn get(&self, field: Field) -> Option<&FieldMapping> {
        self.entries.iter().find(|e| e.field == field)
    }

    fn get_mut(&mut self, field: Field) -> Result<&mut FieldMapping, MappingError> {
        self.entries
            .iter_mut()
            .find(|e| e.field == field)
            .ok_or(MappingError::UnknownField(field))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<FieldMapping>> for FieldMappings {
    type Error = ConfigError;

    fn try_from(entries: Vec<FieldMapping>) -> Result<Self, Self::Error> {
        FieldMappings::from_entries(entries)
    }
}

impl From<FieldMappings> for Vec<FieldMapping> {
    fn from(mappings: FieldMappings) -> Self {
        mappings.entries
    }
}

/// Everything needed to poll one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub channel_id: String,
    pub api_key: String,
    pub mappings: FieldMappings,
}

impl ChannelSettings {
    /// Gate for the poller: id, key and at least one mapping must be present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_id.trim().is_empty() {
            return Err(ConfigError::MissingChannelId);
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.mappings.is_empty() {
            return Err(ConfigError::NoMappings);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(slot: u8) -> Field {
        Field::new(slot).unwrap()
    }

    #[test]
    fn test_add_uses_first_free_slot() {
        let mut mappings = FieldMappings::new();
        assert_eq!(mappings.add(SensorType::Co), Ok(field(1)));
        assert_eq!(mappings.add(SensorType::Pm25), Ok(field(2)));
        assert_eq!(mappings.add(SensorType::Pm10), Ok(field(3)));

        mappings.remove(field(2)).unwrap();
        assert_eq!(mappings.add(SensorType::Humidity), Ok(field(2)));

        // Insertion order is kept, not slot order
        let order: Vec<u8> = mappings.iter().map(|m| m.field.slot()).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn test_capped_at_eight() {
        let mut mappings = FieldMappings::new();
        for _ in 0..8 {
            mappings.add(SensorType::Custom).unwrap();
        }
        assert_eq!(mappings.add(SensorType::Co), Err(MappingError::Full));
        assert_eq!(mappings.len(), 8);
    }

    #[test]
    fn test_set_type_overwrites_label_and_unit() {
        let mut mappings = FieldMappings::new();
        let f = mappings.add(SensorType::Custom).unwrap();
        mappings.set_label(f, "Ozone").unwrap();
        mappings.set_unit(f, "ppb").unwrap();

        mappings.set_type(f, SensorType::Pm25).unwrap();
        let entry = mappings.get(f).unwrap();
        assert_eq!(entry.label, "PM 2.5");
        assert_eq!(entry.unit, "µg/m³");

        // Switching to custom keeps whatever is there
        mappings.set_label(f, "My PM").unwrap();
        mappings.set_type(f, SensorType::Custom).unwrap();
        assert_eq!(mappings.get(f).unwrap().label, "My PM");
        assert_eq!(mappings.get(f).unwrap().unit, "µg/m³");
    }

    #[test]
    fn test_unknown_field_edits_fail() {
        let mut mappings = FieldMappings::standard();
        assert_eq!(
            mappings.set_label(field(8), "x"),
            Err(MappingError::UnknownField(field(8)))
        );
        assert!(mappings.remove(field(8)).is_err());
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let entries = vec![
            FieldMapping::new(field(1), SensorType::Co),
            FieldMapping::new(field(1), SensorType::Pm25),
        ];
        assert!(matches!(
            FieldMappings::from_entries(entries),
            Err(ConfigError::DuplicateField(f)) if f == field(1)
        ));
    }

    #[test]
    fn test_validate() {
        let mut settings = ChannelSettings {
            channel_id: "123456".into(),
            api_key: "READKEY".into(),
            mappings: FieldMappings::standard(),
        };
        assert!(settings.validate().is_ok());

        settings.api_key = "  ".into();
        assert!(matches!(settings.validate(), Err(ConfigError::MissingApiKey)));

        settings.api_key = "READKEY".into();
        settings.mappings = FieldMappings::new();
        assert!(matches!(settings.validate(), Err(ConfigError::NoMappings)));

        settings.channel_id = String::new();
        assert!(matches!(settings.validate(), Err(ConfigError::MissingChannelId)));
    }
}
