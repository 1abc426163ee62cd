use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{FailureBands, HealthBands, Hysteresis, SensorBands};
use crate::registry::EquipmentRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Healthy,
    Warning,
    Critical,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Healthy => "healthy",
            EquipmentStatus::Warning => "warning",
            EquipmentStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandStatus {
    Normal,
    Warning,
    Critical,
}

/// Classify a raw reading against its configured bands. Both tails count:
/// a critically low pressure is as alertable as a critically high one.
pub fn classify_reading(bands: &SensorBands, value: f64) -> BandStatus {
    if value >= bands.critical_high || value <= bands.critical_low {
        BandStatus::Critical
    } else if value >= bands.warning_high || value <= bands.warning_low {
        BandStatus::Warning
    } else {
        BandStatus::Normal
    }
}

pub fn classify_health(bands: &HealthBands, value: f64) -> BandStatus {
    if value <= bands.critical_low {
        BandStatus::Critical
    } else if value <= bands.warning_low {
        BandStatus::Warning
    } else {
        BandStatus::Normal
    }
}

pub fn classify_failure_probability(bands: &FailureBands, value: f64) -> BandStatus {
    if value >= bands.critical_high {
        BandStatus::Critical
    } else if value >= bands.warning_high {
        BandStatus::Warning
    } else {
        BandStatus::Normal
    }
}

/// One hysteresis step. The threshold set is selected by the current state
/// and the rule is applied exactly once per health assessment, so Healthy
/// and Critical are never adjacent in any transition sequence.
fn next_status(current: EquipmentStatus, health_score: f64, hysteresis: &Hysteresis) -> EquipmentStatus {
    match current {
        EquipmentStatus::Healthy => {
            if health_score < hysteresis.healthy_to_warning {
                EquipmentStatus::Warning
            } else {
                EquipmentStatus::Healthy
            }
        }
        EquipmentStatus::Warning => {
            if health_score < hysteresis.warning_to_critical {
                EquipmentStatus::Critical
            } else if health_score > hysteresis.warning_to_healthy {
                EquipmentStatus::Healthy
            } else {
                EquipmentStatus::Warning
            }
        }
        EquipmentStatus::Critical => {
            if health_score > hysteresis.critical_to_warning {
                EquipmentStatus::Warning
            } else {
                EquipmentStatus::Critical
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusTransition {
    pub previous: EquipmentStatus,
    pub current: EquipmentStatus,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug)]
pub struct StatusMachine {
    hysteresis: Hysteresis,
    current: HashMap<u32, EquipmentStatus>,
}

impl StatusMachine {
    pub fn new(hysteresis: Hysteresis, registry: &EquipmentRegistry) -> Self {
        let current = registry
            .iter()
            .map(|equipment| (equipment.id, EquipmentStatus::Healthy))
            .collect();
        Self { hysteresis, current }
    }

    pub fn evaluate(&mut self, equipment_id: u32, health_score: f64) -> StatusTransition {
        let previous = self.current(equipment_id);
        let current = next_status(previous, health_score, &self.hysteresis);
        self.current.insert(equipment_id, current);
        StatusTransition { previous, current }
    }

    pub fn current(&self, equipment_id: u32) -> EquipmentStatus {
        self.current
            .get(&equipment_id)
            .copied()
            .unwrap_or(EquipmentStatus::Healthy)
    }
}
