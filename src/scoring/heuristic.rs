use std::collections::BTreeMap;

use crate::config::{SensorBands, Thresholds};
use crate::registry::SensorType;

/// Temperature and vibration dominate the composite: they are the leading
/// indicators of mechanical wear on rotating equipment.
const WEIGHTS: [(SensorType, f64); 4] = [
    (SensorType::Temperature, 0.30),
    (SensorType::Vibration, 0.30),
    (SensorType::Pressure, 0.20),
    (SensorType::Rpm, 0.20),
];

/// Score one reading by its proximity to the configured bands:
/// inside the normal range 90-100, drifting toward a warning bound 60-90,
/// inside the warning band 25-60, beyond a critical bound falling to 0.
pub fn band_proximity_score(bands: &SensorBands, value: f64) -> f64 {
    let midpoint = (bands.normal_min + bands.normal_max) / 2.0;

    if value >= bands.normal_min && value <= bands.normal_max {
        let half_range = ((bands.normal_max - bands.normal_min) / 2.0).max(f64::EPSILON);
        let drift = (value - midpoint).abs() / half_range;
        return 100.0 - drift * 10.0;
    }

    let (normal_edge, warning_edge, critical_edge) = if value > bands.normal_max {
        (bands.normal_max, bands.warning_high, bands.critical_high)
    } else {
        (bands.normal_min, bands.warning_low, bands.critical_low)
    };

    let distance = (value - normal_edge).abs();
    let to_warning = (warning_edge - normal_edge).abs().max(f64::EPSILON);
    let to_critical = (critical_edge - warning_edge).abs().max(f64::EPSILON);

    if distance <= to_warning {
        90.0 - (distance / to_warning) * 30.0
    } else if distance <= to_warning + to_critical {
        60.0 - ((distance - to_warning) / to_critical) * 35.0
    } else {
        let overshoot = (distance - to_warning - to_critical) / to_critical;
        (25.0 * (1.0 - overshoot)).max(0.0)
    }
}

/// Weighted composite over the latest reading per sensor; the fallback
/// health score when no trained model is available.
pub fn heuristic_health(thresholds: &Thresholds, latest: &BTreeMap<SensorType, f64>) -> f64 {
    let mut score = 0.0;
    for (sensor, weight) in WEIGHTS {
        let value = latest.get(&sensor).copied().unwrap_or(0.0);
        score += band_proximity_score(thresholds.sensor(sensor), value) * weight;
    }
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::config::Config;
    use crate::registry::SensorType;

    use super::{band_proximity_score, heuristic_health};

    fn thresholds() -> crate::config::Thresholds {
        let config: Config = toml::from_str("").expect("defaults");
        config.thresholds
    }

    #[test]
    fn centered_reading_scores_near_perfect() {
        let thresholds = thresholds();
        let score = band_proximity_score(&thresholds.temperature, 72.5);
        assert!(score >= 99.0, "score {}", score);
    }

    #[test]
    fn score_degrades_monotonically_toward_critical() {
        let thresholds = thresholds();
        let bands = &thresholds.temperature;

        let normal = band_proximity_score(bands, 80.0);
        let drifting = band_proximity_score(bands, 90.0);
        let warning = band_proximity_score(bands, 100.0);
        let critical = band_proximity_score(bands, 115.0);

        assert!(normal > drifting);
        assert!(drifting > warning);
        assert!(warning > critical);
        assert!(critical < 25.0);
    }

    #[test]
    fn low_side_breaches_are_scored_like_high_side() {
        let thresholds = thresholds();
        let bands = &thresholds.pressure;

        let low_warning = band_proximity_score(bands, 12.0);
        assert!((60.0..90.0).contains(&low_warning), "score {}", low_warning);
        let below_critical = band_proximity_score(bands, 3.0);
        assert!(below_critical <= 25.0, "score {}", below_critical);
    }

    #[test]
    fn healthy_equipment_scores_high_and_failed_scores_low() {
        let thresholds = thresholds();

        let mut nominal = BTreeMap::new();
        nominal.insert(SensorType::Temperature, 72.0);
        nominal.insert(SensorType::Vibration, 2.0);
        nominal.insert(SensorType::Pressure, 25.0);
        nominal.insert(SensorType::Rpm, 1700.0);
        assert!(heuristic_health(&thresholds, &nominal) >= 90.0);

        let mut failing = BTreeMap::new();
        failing.insert(SensorType::Temperature, 115.0);
        failing.insert(SensorType::Vibration, 9.0);
        failing.insert(SensorType::Pressure, 47.0);
        failing.insert(SensorType::Rpm, 2600.0);
        let score = heuristic_health(&thresholds, &failing);
        assert!(score <= 30.0, "score {}", score);
    }
}
