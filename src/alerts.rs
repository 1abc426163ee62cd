use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{AlertsConfig, Thresholds};
use crate::registry::{Equipment, SensorType};
use crate::scoring::HealthAssessment;
use crate::simulator::{AnomalyInstance, SensorReading};
use crate::status::{classify_failure_probability, classify_reading, BandStatus, EquipmentStatus};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTrigger {
    HealthThreshold,
    FailureProbabilityHigh,
    TemperatureAnomaly,
    VibrationAnomaly,
    PressureAnomaly,
    RpmAnomaly,
    AnomalyDetected,
}

impl AlertTrigger {
    pub fn from_sensor(sensor: SensorType) -> Self {
        match sensor {
            SensorType::Temperature => AlertTrigger::TemperatureAnomaly,
            SensorType::Vibration => AlertTrigger::VibrationAnomaly,
            SensorType::Pressure => AlertTrigger::PressureAnomaly,
            SensorType::Rpm => AlertTrigger::RpmAnomaly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertTrigger::HealthThreshold => "health_threshold",
            AlertTrigger::FailureProbabilityHigh => "failure_probability_high",
            AlertTrigger::TemperatureAnomaly => "temperature_anomaly",
            AlertTrigger::VibrationAnomaly => "vibration_anomaly",
            AlertTrigger::PressureAnomaly => "pressure_anomaly",
            AlertTrigger::RpmAnomaly => "rpm_anomaly",
            AlertTrigger::AnomalyDetected => "anomaly_detected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub equipment_id: u32,
    pub equipment_name: String,
    pub severity: AlertSeverity,
    pub trigger: AlertTrigger,
    pub failure_probability: f64,
    pub description: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<AlertSeverity>,
    pub equipment_id: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(u64),
    #[error("alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: &'static str,
        to: &'static str,
    },
    #[error("alert storage error: {0}")]
    Store(#[from] sled::Error),
}

/// Turns breaches into deduplicated, lifecycle-managed alerts. The throttle
/// check and the insert for a given (equipment, trigger) key run under one
/// lock, so two concurrent breach evaluations cannot both create an alert
/// for the same key inside the window. The sweep takes the same lock.
pub struct AlertManager {
    store: Store,
    thresholds: Thresholds,
    throttle_window: ChronoDuration,
    retention: ChronoDuration,
    last_created: Mutex<HashMap<(u32, AlertTrigger), DateTime<Utc>>>,
}

impl AlertManager {
    pub fn new(
        store: Store,
        thresholds: Thresholds,
        config: &AlertsConfig,
    ) -> Result<Self, sled::Error> {
        // Rebuild the throttle map from the persisted table so a restart
        // does not re-raise alerts that are still inside their window.
        let mut last_created: HashMap<(u32, AlertTrigger), DateTime<Utc>> = HashMap::new();
        for alert in store.alerts() {
            let key = (alert.equipment_id, alert.trigger);
            let entry = last_created.entry(key).or_insert(alert.created_at);
            if alert.created_at > *entry {
                *entry = alert.created_at;
            }
        }

        Ok(Self {
            store,
            thresholds,
            throttle_window: ChronoDuration::minutes(config.throttle_minutes as i64),
            retention: ChronoDuration::days(config.retention_days as i64),
            last_created: Mutex::new(last_created),
        })
    }

    /// Evaluate a fresh status decision against the alertable conditions:
    /// degraded status, and a failure probability inside its warning or
    /// critical band.
    pub async fn on_status_evaluated(
        &self,
        equipment: &Equipment,
        status: EquipmentStatus,
        assessment: &HealthAssessment,
        now: DateTime<Utc>,
    ) -> usize {
        let mut raised = 0;

        let severity = match status {
            EquipmentStatus::Critical => Some(AlertSeverity::Critical),
            EquipmentStatus::Warning => Some(AlertSeverity::Warning),
            EquipmentStatus::Healthy => None,
        };
        if let Some(severity) = severity {
            let description = format!(
                "Health score {}: {:.1}%",
                status.as_str(),
                assessment.health_score
            );
            if self
                .raise(
                    equipment,
                    AlertTrigger::HealthThreshold,
                    severity,
                    description,
                    assessment.failure_probability,
                    now,
                )
                .await
            {
                raised += 1;
            }
        }

        let probability = assessment.failure_probability;
        let band = classify_failure_probability(&self.thresholds.failure, probability);
        if let Some(severity) = breach_severity(band) {
            let adjective = match severity {
                AlertSeverity::Critical => "High",
                _ => "Elevated",
            };
            let description = format!("{} failure probability: {:.1}%", adjective, probability);
            if self
                .raise(
                    equipment,
                    AlertTrigger::FailureProbabilityHigh,
                    severity,
                    description,
                    probability,
                    now,
                )
                .await
            {
                raised += 1;
            }
        }

        raised
    }

    /// Hard-threshold crossings on raw readings, checked every tick.
    pub async fn on_readings(
        &self,
        equipment: &Equipment,
        readings: &BTreeMap<SensorType, SensorReading>,
        failure_probability: f64,
        now: DateTime<Utc>,
    ) -> usize {
        let mut raised = 0;
        for (sensor, reading) in readings {
            let bands = self.thresholds.sensor(*sensor);
            let band = classify_reading(bands, reading.value);
            let Some(severity) = breach_severity(band) else {
                continue;
            };

            let direction = if reading.value > bands.normal_max {
                match severity {
                    AlertSeverity::Critical => "critically high",
                    _ => "elevated",
                }
            } else {
                match severity {
                    AlertSeverity::Critical => "critically low",
                    _ => "low",
                }
            };
            let description = format!(
                "{} {}: {:.1} {}",
                capitalize(sensor.as_str()),
                direction,
                reading.value,
                sensor.unit()
            );
            if self
                .raise(
                    equipment,
                    AlertTrigger::from_sensor(*sensor),
                    severity,
                    description,
                    failure_probability,
                    now,
                )
                .await
            {
                raised += 1;
            }
        }
        raised
    }

    /// Informational notice when an anomaly pattern activates.
    pub async fn on_anomaly_activated(
        &self,
        equipment: &Equipment,
        instance: &AnomalyInstance,
        failure_probability: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let description = format!("Anomaly detected: {}", instance.pattern);
        self.raise(
            equipment,
            AlertTrigger::AnomalyDetected,
            AlertSeverity::Info,
            description,
            failure_probability,
            now,
        )
        .await
    }

    /// Atomic throttle-check-then-insert. Returns whether an alert was
    /// created; a suppressed duplicate or a failed insert returns false.
    async fn raise(
        &self,
        equipment: &Equipment,
        trigger: AlertTrigger,
        severity: AlertSeverity,
        description: String,
        failure_probability: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (equipment.id, trigger);
        let mut last_created = self.last_created.lock().await;

        if let Some(previous) = last_created.get(&key) {
            if now.signed_duration_since(*previous) < self.throttle_window {
                return false;
            }
        }

        let id = match self.store.next_alert_id() {
            Ok(id) => id,
            Err(error) => {
                log::error!("failed to allocate alert id: {}", error);
                return false;
            }
        };
        let alert = Alert {
            id,
            equipment_id: equipment.id,
            equipment_name: equipment.name.clone(),
            severity,
            trigger,
            failure_probability,
            description,
            status: AlertStatus::Active,
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
        };

        // One retry on a failed insert; after that the breach is logged and
        // evaluation moves on.
        if let Err(first) = self.store.put_alert(&alert) {
            log::warn!("alert insert failed, retrying once: {}", first);
            if let Err(second) = self.store.put_alert(&alert) {
                log::error!(
                    "alert insert failed for equipment {} trigger {}: {}",
                    equipment.id,
                    trigger.as_str(),
                    second
                );
                return false;
            }
        }

        last_created.insert(key, now);
        tracing::info!(
            target: "alerts",
            alert_id = alert.id,
            equipment_id = equipment.id,
            trigger = trigger.as_str(),
            severity = severity.as_str(),
            "alert_created"
        );
        true
    }

    pub async fn acknowledge(&self, id: u64, now: DateTime<Utc>) -> Result<Alert, AlertError> {
        let _guard = self.last_created.lock().await;
        let mut alert = self.store.alert(id)?.ok_or(AlertError::NotFound(id))?;
        if alert.status != AlertStatus::Active {
            return Err(AlertError::InvalidTransition {
                id,
                from: alert.status.as_str(),
                to: AlertStatus::Acknowledged.as_str(),
            });
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(now);
        self.store.put_alert(&alert)?;
        Ok(alert)
    }

    pub async fn resolve(&self, id: u64, now: DateTime<Utc>) -> Result<Alert, AlertError> {
        let _guard = self.last_created.lock().await;
        let mut alert = self.store.alert(id)?.ok_or(AlertError::NotFound(id))?;
        if alert.status == AlertStatus::Resolved {
            return Err(AlertError::InvalidTransition {
                id,
                from: alert.status.as_str(),
                to: AlertStatus::Resolved.as_str(),
            });
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        self.store.put_alert(&alert)?;
        Ok(alert)
    }

    /// Delete resolved alerts older than the retention window. Runs under
    /// the same lock as inserts so it never races a concurrent raise.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let _guard = self.last_created.lock().await;
        let cutoff = now - self.retention;

        let mut removed = 0;
        for alert in self.store.alerts() {
            if alert.status != AlertStatus::Resolved || alert.created_at >= cutoff {
                continue;
            }
            match self.store.remove_alert(alert.id) {
                Ok(()) => removed += 1,
                Err(error) => log::warn!("failed to remove resolved alert {}: {}", alert.id, error),
            }
        }
        if removed > 0 {
            log::info!("alert sweep removed {} resolved alerts", removed);
        }
        removed
    }

    pub async fn query(&self, filter: &AlertFilter) -> Vec<Alert> {
        let search = filter
            .search
            .as_ref()
            .map(|needle| needle.to_lowercase())
            .filter(|needle| !needle.is_empty());

        self.store
            .alerts()
            .into_iter()
            .filter(|alert| filter.status.map_or(true, |status| alert.status == status))
            .filter(|alert| {
                filter
                    .severity
                    .map_or(true, |severity| alert.severity == severity)
            })
            .filter(|alert| {
                filter
                    .equipment_id
                    .map_or(true, |equipment_id| alert.equipment_id == equipment_id)
            })
            .filter(|alert| {
                search.as_ref().map_or(true, |needle| {
                    alert.description.to_lowercase().contains(needle)
                        || alert.equipment_name.to_lowercase().contains(needle)
                        || alert.trigger.as_str().contains(needle.as_str())
                })
            })
            .collect()
    }

    /// (active, resolved) counts for the dashboard metrics block.
    pub async fn counts(&self) -> (usize, usize) {
        let mut active = 0;
        let mut resolved = 0;
        for alert in self.store.alerts() {
            match alert.status {
                AlertStatus::Active => active += 1,
                AlertStatus::Resolved => resolved += 1,
                AlertStatus::Acknowledged => {}
            }
        }
        (active, resolved)
    }
}

fn breach_severity(band: BandStatus) -> Option<AlertSeverity> {
    match band {
        BandStatus::Critical => Some(AlertSeverity::Critical),
        BandStatus::Warning => Some(AlertSeverity::Warning),
        BandStatus::Normal => None,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
