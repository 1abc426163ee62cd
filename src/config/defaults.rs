use chrono::NaiveDate;

use crate::registry::SensorType;

use super::schema::{
    AlertsConfig, AnomalyConfig, AnomalyEffect, AnomalyPatternConfig, BaselineConfig,
    EquipmentConfig, FailureBands, HealthBands, Hysteresis, ScoringConfig, SensorBands,
    SimulatorConfig, StoreConfig, Thresholds,
};

pub(super) fn default_tick_interval_secs() -> u64 {
    1
}

pub(super) fn default_degradation_factor() -> f64 {
    0.001
}

pub(super) fn default_temperature_bands() -> SensorBands {
    SensorBands {
        critical_low: 40.0,
        warning_low: 50.0,
        normal_min: 60.0,
        normal_max: 85.0,
        warning_high: 95.0,
        critical_high: 110.0,
    }
}

pub(super) fn default_vibration_bands() -> SensorBands {
    SensorBands {
        critical_low: 0.1,
        warning_low: 0.2,
        normal_min: 0.5,
        normal_max: 4.0,
        warning_high: 6.0,
        critical_high: 8.0,
    }
}

pub(super) fn default_pressure_bands() -> SensorBands {
    SensorBands {
        critical_low: 5.0,
        warning_low: 10.0,
        normal_min: 15.0,
        normal_max: 35.0,
        warning_high: 40.0,
        critical_high: 45.0,
    }
}

pub(super) fn default_rpm_bands() -> SensorBands {
    SensorBands {
        critical_low: 800.0,
        warning_low: 1000.0,
        normal_min: 1200.0,
        normal_max: 2200.0,
        warning_high: 2300.0,
        critical_high: 2500.0,
    }
}

pub(super) fn default_health_critical_low() -> f64 {
    20.0
}

pub(super) fn default_health_warning_low() -> f64 {
    40.0
}

pub(super) fn default_failure_warning_high() -> f64 {
    50.0
}

pub(super) fn default_failure_critical_high() -> f64 {
    70.0
}

pub(super) fn default_healthy_to_warning() -> f64 {
    30.0
}

pub(super) fn default_warning_to_critical() -> f64 {
    15.0
}

pub(super) fn default_critical_to_warning() -> f64 {
    40.0
}

pub(super) fn default_warning_to_healthy() -> f64 {
    50.0
}

pub(super) fn default_throttle_minutes() -> u64 {
    30
}

pub(super) fn default_alert_retention_days() -> u16 {
    7
}

pub(super) fn default_sweep_every_ticks() -> u64 {
    100
}

pub(super) fn default_window_samples() -> usize {
    60
}

pub(super) fn default_predict_interval_secs() -> u64 {
    30
}

pub(super) fn default_training_days_back() -> u16 {
    7
}

pub(super) fn default_min_training_samples() -> usize {
    100
}

pub(super) fn default_retrain_after_days() -> u16 {
    3
}

pub(super) fn default_retrain_check_hours() -> u64 {
    6
}

pub(super) fn default_cv_folds() -> usize {
    5
}

pub(super) fn default_store_path() -> String {
    "data/plantwatch".to_string()
}

pub(super) fn default_history_retention_days() -> u16 {
    30
}

pub(super) fn default_journal_enabled() -> bool {
    true
}

pub(super) fn default_journal_dir() -> String {
    "logs/anomalies".to_string()
}

pub(super) fn default_journal_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

pub(super) fn default_journal_retention_days() -> u16 {
    7
}

pub(super) fn default_equipment() -> Vec<EquipmentConfig> {
    vec![
        EquipmentConfig {
            id: 1,
            name: "Pump-001".to_string(),
            kind: "Centrifugal Pump".to_string(),
            installed: NaiveDate::from_ymd_opt(2022, 6, 1).unwrap_or_default(),
            degradation_factor: 0.001,
            baseline: BaselineConfig {
                temperature: 65.0,
                vibration: 1.2,
                pressure: 20.0,
                rpm: 1800.0,
            },
        },
        EquipmentConfig {
            id: 2,
            name: "Compressor-002".to_string(),
            kind: "Air Compressor".to_string(),
            installed: NaiveDate::from_ymd_opt(2021, 11, 15).unwrap_or_default(),
            degradation_factor: 0.0015,
            baseline: BaselineConfig {
                temperature: 75.0,
                vibration: 1.8,
                pressure: 25.0,
                rpm: 2200.0,
            },
        },
        EquipmentConfig {
            id: 3,
            name: "Motor-003".to_string(),
            kind: "Electric Motor".to_string(),
            installed: NaiveDate::from_ymd_opt(2023, 2, 20).unwrap_or_default(),
            degradation_factor: 0.0008,
            baseline: BaselineConfig {
                temperature: 70.0,
                vibration: 1.5,
                pressure: 15.0,
                rpm: 1500.0,
            },
        },
    ]
}

pub(super) fn default_anomaly_patterns() -> Vec<AnomalyPatternConfig> {
    vec![
        AnomalyPatternConfig {
            name: "temperature_spike".to_string(),
            probability: 0.03,
            magnitude: [20.0, 50.0],
            duration_ticks: [5, 15],
            effect: AnomalyEffect::StepUp,
            sensors: vec![SensorType::Temperature],
        },
        AnomalyPatternConfig {
            name: "vibration_increase".to_string(),
            probability: 0.025,
            magnitude: [2.0, 8.0],
            duration_ticks: [8, 20],
            effect: AnomalyEffect::StepUp,
            sensors: vec![SensorType::Vibration],
        },
        AnomalyPatternConfig {
            name: "pressure_drop".to_string(),
            probability: 0.02,
            magnitude: [5.0, 15.0],
            duration_ticks: [6, 18],
            effect: AnomalyEffect::StepDown,
            sensors: vec![SensorType::Pressure],
        },
        AnomalyPatternConfig {
            name: "rpm_fluctuation".to_string(),
            probability: 0.015,
            magnitude: [100.0, 300.0],
            duration_ticks: [10, 25],
            effect: AnomalyEffect::Jitter,
            sensors: vec![SensorType::Rpm],
        },
        AnomalyPatternConfig {
            name: "gradual_degradation".to_string(),
            probability: 0.01,
            magnitude: [0.5, 2.0],
            duration_ticks: [30, 60],
            effect: AnomalyEffect::Ramp,
            sensors: vec![
                SensorType::Temperature,
                SensorType::Vibration,
                SensorType::Pressure,
                SensorType::Rpm,
            ],
        },
        AnomalyPatternConfig {
            name: "sudden_failure".to_string(),
            probability: 0.005,
            magnitude: [50.0, 100.0],
            duration_ticks: [1, 3],
            effect: AnomalyEffect::StepUp,
            sensors: vec![
                SensorType::Temperature,
                SensorType::Vibration,
                SensorType::Pressure,
                SensorType::Rpm,
            ],
        },
    ]
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            seed: None,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: default_temperature_bands(),
            vibration: default_vibration_bands(),
            pressure: default_pressure_bands(),
            rpm: default_rpm_bands(),
            health: HealthBands::default(),
            failure: FailureBands::default(),
        }
    }
}

impl Default for HealthBands {
    fn default() -> Self {
        Self {
            critical_low: default_health_critical_low(),
            warning_low: default_health_warning_low(),
        }
    }
}

impl Default for FailureBands {
    fn default() -> Self {
        Self {
            warning_high: default_failure_warning_high(),
            critical_high: default_failure_critical_high(),
        }
    }
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            healthy_to_warning: default_healthy_to_warning(),
            warning_to_critical: default_warning_to_critical(),
            critical_to_warning: default_critical_to_warning(),
            warning_to_healthy: default_warning_to_healthy(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            throttle_minutes: default_throttle_minutes(),
            retention_days: default_alert_retention_days(),
            sweep_every_ticks: default_sweep_every_ticks(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            window_samples: default_window_samples(),
            predict_interval_secs: default_predict_interval_secs(),
            training_days_back: default_training_days_back(),
            min_training_samples: default_min_training_samples(),
            retrain_after_days: default_retrain_after_days(),
            retrain_check_hours: default_retrain_check_hours(),
            cv_folds: default_cv_folds(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            history_retention_days: default_history_retention_days(),
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            journal_enabled: default_journal_enabled(),
            journal_dir: default_journal_dir(),
            journal_max_file_size_bytes: default_journal_max_file_size_bytes(),
            journal_retention_days: default_journal_retention_days(),
            patterns: default_anomaly_patterns(),
        }
    }
}
