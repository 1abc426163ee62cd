use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, EquipmentConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Vibration,
    Pressure,
    Rpm,
}

impl SensorType {
    pub const ALL: [SensorType; 4] = [
        SensorType::Temperature,
        SensorType::Vibration,
        SensorType::Pressure,
        SensorType::Rpm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Vibration => "vibration",
            SensorType::Pressure => "pressure",
            SensorType::Rpm => "rpm",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Vibration => "mm/s",
            SensorType::Pressure => "bar",
            SensorType::Rpm => "RPM",
        }
    }

    /// Physical clamp applied after noise and anomaly offsets; a reading can
    /// never leave this envelope regardless of configuration.
    pub fn physical_bounds(&self) -> (f64, f64) {
        match self {
            SensorType::Temperature => (20.0, 120.0),
            SensorType::Vibration => (0.1, 10.0),
            SensorType::Pressure => (5.0, 50.0),
            SensorType::Rpm => (500.0, 3000.0),
        }
    }

    pub fn noise_half_width(&self) -> f64 {
        match self {
            SensorType::Temperature => 2.0,
            SensorType::Vibration => 0.1,
            SensorType::Pressure => 0.5,
            SensorType::Rpm => 25.0,
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Equipment {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub installed: NaiveDate,
    pub degradation_factor: f64,
    baseline_temperature: f64,
    baseline_vibration: f64,
    baseline_pressure: f64,
    baseline_rpm: f64,
}

impl Equipment {
    fn from_config(config: &EquipmentConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            kind: config.kind.clone(),
            installed: config.installed,
            degradation_factor: config.degradation_factor,
            baseline_temperature: config.baseline.temperature,
            baseline_vibration: config.baseline.vibration,
            baseline_pressure: config.baseline.pressure,
            baseline_rpm: config.baseline.rpm,
        }
    }

    pub fn baseline(&self, sensor: SensorType) -> f64 {
        match sensor {
            SensorType::Temperature => self.baseline_temperature,
            SensorType::Vibration => self.baseline_vibration,
            SensorType::Pressure => self.baseline_pressure,
            SensorType::Rpm => self.baseline_rpm,
        }
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now.date_naive() - self.installed).num_days().max(0) as f64
    }
}

/// Built once from config at startup; equipment is immutable thereafter.
#[derive(Debug)]
pub struct EquipmentRegistry {
    items: Vec<Equipment>,
}

impl EquipmentRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            items: config.equipment.iter().map(Equipment::from_config).collect(),
        }
    }

    pub fn get(&self, id: u32) -> Option<&Equipment> {
        self.items.iter().find(|equipment| equipment.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Equipment> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::config::Config;

    use super::{EquipmentRegistry, SensorType};

    #[test]
    fn registry_resolves_configured_equipment() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);

        assert_eq!(registry.len(), 3);
        let pump = registry.get(1).expect("pump exists");
        assert_eq!(pump.name, "Pump-001");
        assert!((pump.baseline(SensorType::Temperature) - 65.0).abs() < f64::EPSILON);
        assert!(registry.get(99).is_none());
    }

    #[test]
    fn age_counts_whole_days_since_install() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let pump = registry.get(1).expect("pump exists");
        assert_eq!(pump.installed, NaiveDate::from_ymd_opt(2022, 6, 1).unwrap());

        let now = Utc.with_ymd_and_hms(2022, 6, 11, 12, 0, 0).unwrap();
        assert!((pump.age_days(now) - 10.0).abs() < f64::EPSILON);
    }
}
