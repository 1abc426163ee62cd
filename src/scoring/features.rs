use std::collections::BTreeMap;

use crate::history::EquipmentWindow;
use crate::registry::SensorType;

/// Feature order is a contract between training and inference; keep in sync
/// with `compose`.
pub const FEATURE_NAMES: [&str; 15] = [
    "temperature",
    "vibration",
    "pressure",
    "rpm",
    "temperature_mean",
    "temperature_std",
    "vibration_mean",
    "vibration_std",
    "pressure_mean",
    "pressure_std",
    "rpm_mean",
    "rpm_std",
    "temp_pressure_ratio",
    "vibration_rpm_ratio",
    "age_days",
];

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Latest value per sensor, rolling mean/std per sensor, two cross-sensor
/// ratios and the equipment age.
pub fn compose(
    latest: &BTreeMap<SensorType, f64>,
    series: &BTreeMap<SensorType, Vec<f64>>,
    age_days: f64,
) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_NAMES.len());
    for sensor in SensorType::ALL {
        features.push(latest.get(&sensor).copied().unwrap_or(0.0));
    }
    for sensor in SensorType::ALL {
        let (mean, std) = series
            .get(&sensor)
            .map(|values| mean_std(values))
            .unwrap_or((0.0, 0.0));
        features.push(mean);
        features.push(std);
    }

    let temperature = latest.get(&SensorType::Temperature).copied().unwrap_or(0.0);
    let vibration = latest.get(&SensorType::Vibration).copied().unwrap_or(0.0);
    let pressure = latest.get(&SensorType::Pressure).copied().unwrap_or(0.0);
    let rpm = latest.get(&SensorType::Rpm).copied().unwrap_or(0.0);
    features.push(temperature / (pressure + 1.0));
    features.push(vibration / (rpm + 1.0));
    features.push(age_days);
    features
}

pub fn from_window(window: &EquipmentWindow, age_days: f64) -> Option<Vec<f64>> {
    if !window.is_complete() {
        return None;
    }
    Some(compose(&window.latest_values(), &window.values, age_days))
}

pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values
        .iter()
        .map(|value| (value - mean) * (value - mean))
        .sum::<f64>()
        / count;
    (mean, variance.sqrt())
}
