use chrono::NaiveDate;
use serde::Deserialize;

use crate::registry::SensorType;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default = "default_equipment")]
    pub equipment: Vec<EquipmentConfig>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub hysteresis: Hysteresis,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Fixed seed makes every run reproducible; omit for entropy seeding.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentConfig {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub installed: NaiveDate,
    #[serde(default = "default_degradation_factor")]
    pub degradation_factor: f64,
    pub baseline: BaselineConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BaselineConfig {
    pub temperature: f64,
    pub vibration: f64,
    pub pressure: f64,
    pub rpm: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_temperature_bands")]
    pub temperature: SensorBands,
    #[serde(default = "default_vibration_bands")]
    pub vibration: SensorBands,
    #[serde(default = "default_pressure_bands")]
    pub pressure: SensorBands,
    #[serde(default = "default_rpm_bands")]
    pub rpm: SensorBands,
    #[serde(default)]
    pub health: HealthBands,
    #[serde(default)]
    pub failure: FailureBands,
}

impl Thresholds {
    pub fn sensor(&self, sensor: SensorType) -> &SensorBands {
        match sensor {
            SensorType::Temperature => &self.temperature,
            SensorType::Vibration => &self.vibration,
            SensorType::Pressure => &self.pressure,
            SensorType::Rpm => &self.rpm,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SensorBands {
    pub critical_low: f64,
    pub warning_low: f64,
    pub normal_min: f64,
    pub normal_max: f64,
    pub warning_high: f64,
    pub critical_high: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HealthBands {
    #[serde(default = "default_health_critical_low")]
    pub critical_low: f64,
    #[serde(default = "default_health_warning_low")]
    pub warning_low: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FailureBands {
    #[serde(default = "default_failure_warning_high")]
    pub warning_high: f64,
    #[serde(default = "default_failure_critical_high")]
    pub critical_high: f64,
}

/// Status machine thresholds. Degrading crosses a lower bound than the one
/// that recovers, so a noisy score cannot flap between adjacent statuses.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Hysteresis {
    #[serde(default = "default_healthy_to_warning")]
    pub healthy_to_warning: f64,
    #[serde(default = "default_warning_to_critical")]
    pub warning_to_critical: f64,
    #[serde(default = "default_critical_to_warning")]
    pub critical_to_warning: f64,
    #[serde(default = "default_warning_to_healthy")]
    pub warning_to_healthy: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_throttle_minutes")]
    pub throttle_minutes: u64,
    #[serde(default = "default_alert_retention_days")]
    pub retention_days: u16,
    #[serde(default = "default_sweep_every_ticks")]
    pub sweep_every_ticks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_window_samples")]
    pub window_samples: usize,
    #[serde(default = "default_predict_interval_secs")]
    pub predict_interval_secs: u64,
    #[serde(default = "default_training_days_back")]
    pub training_days_back: u16,
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,
    #[serde(default = "default_retrain_after_days")]
    pub retrain_after_days: u16,
    #[serde(default = "default_retrain_check_hours")]
    pub retrain_check_hours: u64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_journal_enabled")]
    pub journal_enabled: bool,
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,
    #[serde(default = "default_journal_max_file_size_bytes")]
    pub journal_max_file_size_bytes: u64,
    #[serde(default = "default_journal_retention_days")]
    pub journal_retention_days: u16,
    #[serde(default = "default_anomaly_patterns", rename = "pattern")]
    pub patterns: Vec<AnomalyPatternConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyPatternConfig {
    pub name: String,
    pub probability: f64,
    pub magnitude: [f64; 2],
    pub duration_ticks: [u32; 2],
    pub effect: AnomalyEffect,
    pub sensors: Vec<SensorType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyEffect {
    /// Add the sampled magnitude to every affected sensor.
    StepUp,
    /// Subtract the sampled magnitude from every affected sensor.
    StepDown,
    /// Add a fresh uniform draw from (-magnitude, +magnitude) each tick.
    Jitter,
    /// Add magnitude multiplied by elapsed ticks (gradual degradation).
    Ramp,
}
