use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::registry::SensorType;
use crate::simulator::SensorReading;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct StoredReading {
    pub timestamp_utc: String,
    pub equipment_id: u32,
    pub sensor: SensorType,
    pub value: f64,
    pub threshold_min: f64,
    pub threshold_max: f64,
}

impl StoredReading {
    pub(super) fn from_reading(reading: &SensorReading) -> Self {
        Self {
            timestamp_utc: reading.timestamp.to_rfc3339(),
            equipment_id: reading.equipment_id,
            sensor: reading.sensor,
            value: reading.value,
            threshold_min: reading.threshold_min,
            threshold_max: reading.threshold_max,
        }
    }

    pub(super) fn into_reading(self) -> Option<SensorReading> {
        let timestamp = chrono::DateTime::parse_from_rfc3339(&self.timestamp_utc)
            .ok()?
            .with_timezone(&Utc);
        Some(SensorReading {
            equipment_id: self.equipment_id,
            sensor: self.sensor,
            value: self.value,
            timestamp,
            threshold_min: self.threshold_min,
            threshold_max: self.threshold_max,
        })
    }
}
