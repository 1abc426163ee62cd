use std::collections::HashSet;

use thiserror::Error;

use crate::registry::SensorType;

use super::schema::{Config, SensorBands};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulator.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "simulator.tick_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.equipment.is_empty() {
            return Err(ConfigError::Validation(
                "at least one equipment entry is required".to_string(),
            ));
        }
        let mut seen_ids = HashSet::new();
        for equipment in &self.equipment {
            if equipment.name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "equipment {} must have a non-empty name",
                    equipment.id
                )));
            }
            if !seen_ids.insert(equipment.id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate equipment id {}",
                    equipment.id
                )));
            }
            if equipment.degradation_factor < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "equipment {}: degradation_factor must be non-negative",
                    equipment.id
                )));
            }
        }

        for sensor in SensorType::ALL {
            validate_sensor_bands(sensor, self.thresholds.sensor(sensor))?;
        }

        let health = &self.thresholds.health;
        if !(0.0..=100.0).contains(&health.critical_low)
            || !(0.0..=100.0).contains(&health.warning_low)
            || health.critical_low >= health.warning_low
        {
            return Err(ConfigError::Validation(
                "thresholds.health: critical_low must be below warning_low, both within 0..=100"
                    .to_string(),
            ));
        }

        let failure = &self.thresholds.failure;
        if !(0.0..=100.0).contains(&failure.warning_high)
            || !(0.0..=100.0).contains(&failure.critical_high)
            || failure.warning_high >= failure.critical_high
        {
            return Err(ConfigError::Validation(
                "thresholds.failure: warning_high must be below critical_high, both within 0..=100"
                    .to_string(),
            ));
        }

        let h = &self.hysteresis;
        for (name, value) in [
            ("hysteresis.healthy_to_warning", h.healthy_to_warning),
            ("hysteresis.warning_to_critical", h.warning_to_critical),
            ("hysteresis.critical_to_warning", h.critical_to_warning),
            ("hysteresis.warning_to_healthy", h.warning_to_healthy),
        ] {
            if value.is_nan() || !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{} must be between 0 and 100",
                    name
                )));
            }
        }
        if h.warning_to_critical >= h.healthy_to_warning {
            return Err(ConfigError::Validation(
                "hysteresis: warning_to_critical must be below healthy_to_warning".to_string(),
            ));
        }
        if h.healthy_to_warning >= h.warning_to_healthy {
            return Err(ConfigError::Validation(
                "hysteresis: healthy_to_warning must be below warning_to_healthy".to_string(),
            ));
        }
        if h.warning_to_critical >= h.critical_to_warning {
            return Err(ConfigError::Validation(
                "hysteresis: warning_to_critical must be below critical_to_warning".to_string(),
            ));
        }
        if h.critical_to_warning >= h.warning_to_healthy {
            return Err(ConfigError::Validation(
                "hysteresis: critical_to_warning must be below warning_to_healthy".to_string(),
            ));
        }

        if self.alerts.throttle_minutes == 0 {
            return Err(ConfigError::Validation(
                "alerts.throttle_minutes must be greater than 0".to_string(),
            ));
        }
        if self.alerts.retention_days == 0 {
            return Err(ConfigError::Validation(
                "alerts.retention_days must be greater than 0".to_string(),
            ));
        }
        if self.alerts.sweep_every_ticks == 0 {
            return Err(ConfigError::Validation(
                "alerts.sweep_every_ticks must be greater than 0".to_string(),
            ));
        }

        if self.scoring.window_samples == 0 {
            return Err(ConfigError::Validation(
                "scoring.window_samples must be greater than 0".to_string(),
            ));
        }
        if self.scoring.predict_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scoring.predict_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.scoring.training_days_back == 0 {
            return Err(ConfigError::Validation(
                "scoring.training_days_back must be greater than 0".to_string(),
            ));
        }
        if self.scoring.min_training_samples == 0 {
            return Err(ConfigError::Validation(
                "scoring.min_training_samples must be greater than 0".to_string(),
            ));
        }
        if self.scoring.cv_folds < 2 {
            return Err(ConfigError::Validation(
                "scoring.cv_folds must be at least 2".to_string(),
            ));
        }

        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }
        if self.store.history_retention_days == 0 {
            return Err(ConfigError::Validation(
                "store.history_retention_days must be greater than 0".to_string(),
            ));
        }

        if self.anomaly.journal_enabled && self.anomaly.journal_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "anomaly.journal_dir must not be empty when the journal is enabled".to_string(),
            ));
        }
        if self.anomaly.journal_max_file_size_bytes == 0 {
            return Err(ConfigError::Validation(
                "anomaly.journal_max_file_size_bytes must be greater than 0".to_string(),
            ));
        }
        if self.anomaly.journal_retention_days == 0 {
            return Err(ConfigError::Validation(
                "anomaly.journal_retention_days must be greater than 0".to_string(),
            ));
        }

        let mut seen_patterns = HashSet::new();
        for pattern in &self.anomaly.patterns {
            if pattern.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "anomaly pattern names must not be empty".to_string(),
                ));
            }
            if !seen_patterns.insert(pattern.name.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate anomaly pattern {}",
                    pattern.name
                )));
            }
            if pattern.probability.is_nan() || !(0.0..=1.0).contains(&pattern.probability) {
                return Err(ConfigError::Validation(format!(
                    "anomaly pattern {}: probability must be between 0 and 1",
                    pattern.name
                )));
            }
            if pattern.magnitude[0] > pattern.magnitude[1] || pattern.magnitude[0] < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "anomaly pattern {}: magnitude range must be non-negative and ordered low..high",
                    pattern.name
                )));
            }
            if pattern.duration_ticks[0] == 0 || pattern.duration_ticks[0] > pattern.duration_ticks[1]
            {
                return Err(ConfigError::Validation(format!(
                    "anomaly pattern {}: duration range must be at least 1 tick and ordered low..high",
                    pattern.name
                )));
            }
            if pattern.sensors.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "anomaly pattern {}: at least one affected sensor is required",
                    pattern.name
                )));
            }
        }

        Ok(())
    }
}

fn validate_sensor_bands(sensor: SensorType, bands: &SensorBands) -> Result<(), ConfigError> {
    let ordered = [
        bands.critical_low,
        bands.warning_low,
        bands.normal_min,
        bands.normal_max,
        bands.warning_high,
        bands.critical_high,
    ];
    if ordered.iter().any(|value| value.is_nan()) {
        return Err(ConfigError::Validation(format!(
            "thresholds.{}: bands must not contain NaN",
            sensor.as_str()
        )));
    }
    if ordered.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ConfigError::Validation(format!(
            "thresholds.{}: bands must satisfy critical_low < warning_low < normal_min < normal_max < warning_high < critical_high",
            sensor.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::schema::Config;

    fn default_config() -> Config {
        toml::from_str("").expect("empty config should deserialize via defaults")
    }

    #[test]
    fn default_config_is_valid() {
        let config = default_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unordered_sensor_bands() {
        let mut config = default_config();
        config.thresholds.temperature.warning_high = config.thresholds.temperature.normal_max - 1.0;
        let error = config.validate().expect_err("bands out of order");
        assert!(error.to_string().contains("thresholds.temperature"));
    }

    #[test]
    fn rejects_out_of_range_pattern_probability() {
        let mut config = default_config();
        config.anomaly.patterns[0].probability = 1.5;
        assert!(config.validate().is_err());

        config.anomaly.patterns[0].probability = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_throttle_window() {
        let mut config = default_config();
        config.alerts.throttle_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_hysteresis() {
        let mut config = default_config();
        config.hysteresis.warning_to_critical = config.hysteresis.healthy_to_warning + 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_equipment_ids() {
        let mut config = default_config();
        let clone = config.equipment[0].clone();
        config.equipment.push(clone);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_duration_pattern() {
        let mut config = default_config();
        config.anomaly.patterns[0].duration_ticks = [0, 4];
        assert!(config.validate().is_err());
    }
}
