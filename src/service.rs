use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::alerts::{Alert, AlertError, AlertFilter};
use crate::anomaly_journal;
use crate::app_context::AppContext;
use crate::registry::SensorType;
use crate::scoring::{HealthAssessment, ModelSnapshot, Prediction, TrainingError, Urgency};
use crate::simulator::AnomalyInstance;
use crate::status::EquipmentStatus;

const DETAIL_READINGS_PER_SENSOR: usize = 50;
const DETAIL_RECENT_ALERTS: usize = 20;

// The operations below are the surface consumed by the external
// dashboard/API layer.

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub equipment: Vec<EquipmentOverview>,
    pub metrics: DashboardMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquipmentOverview {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub status: EquipmentStatus,
    pub health_score: Option<f64>,
    pub failure_probability: Option<f64>,
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetrics {
    pub active_alerts: usize,
    pub resolved_alerts: usize,
    /// Share of equipment currently healthy, in percent.
    pub uptime_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquipmentDetail {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub installed: NaiveDate,
    pub status: EquipmentStatus,
    pub recent_readings_by_sensor: BTreeMap<SensorType, Vec<ReadingPoint>>,
    pub assessment: Option<HealthAssessment>,
    pub recent_alerts: Vec<Alert>,
    pub active_anomalies: Vec<AnomalyInstance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub threshold_min: f64,
    pub threshold_max: f64,
}

pub async fn dashboard(ctx: &AppContext) -> DashboardView {
    let status = ctx.status.lock().await;

    let mut equipment = Vec::with_capacity(ctx.registry.len());
    let mut healthy = 0usize;
    for item in ctx.registry.iter() {
        let current = status.current(item.id);
        if current == EquipmentStatus::Healthy {
            healthy += 1;
        }
        let assessment = ctx.scoring.latest(item.id);
        equipment.push(EquipmentOverview {
            id: item.id,
            name: item.name.clone(),
            kind: item.kind.clone(),
            status: current,
            health_score: assessment.as_ref().map(|a| a.health_score),
            failure_probability: assessment.as_ref().map(|a| a.failure_probability),
            urgency: assessment.as_ref().map(|a| a.urgency),
        });
    }
    drop(status);

    let (active_alerts, resolved_alerts) = ctx.alerts.counts().await;
    let uptime_pct = if ctx.registry.is_empty() {
        0.0
    } else {
        healthy as f64 / ctx.registry.len() as f64 * 100.0
    };

    DashboardView {
        equipment,
        metrics: DashboardMetrics {
            active_alerts,
            resolved_alerts,
            uptime_pct,
        },
    }
}

pub async fn equipment_detail(ctx: &AppContext, equipment_id: u32) -> Option<EquipmentDetail> {
    let equipment = ctx.registry.get(equipment_id)?;

    let mut recent_readings_by_sensor = BTreeMap::new();
    {
        let history = ctx.history.read().await;
        for sensor in SensorType::ALL {
            let points: Vec<ReadingPoint> = history
                .recent(equipment_id, sensor, DETAIL_READINGS_PER_SENSOR)
                .into_iter()
                .map(|reading| ReadingPoint {
                    timestamp: reading.timestamp,
                    value: reading.value,
                    threshold_min: reading.threshold_min,
                    threshold_max: reading.threshold_max,
                })
                .collect();
            recent_readings_by_sensor.insert(sensor, points);
        }
    }

    let status = ctx.status.lock().await.current(equipment_id);
    let mut recent_alerts = ctx
        .alerts
        .query(&AlertFilter {
            equipment_id: Some(equipment_id),
            ..AlertFilter::default()
        })
        .await;
    recent_alerts.truncate(DETAIL_RECENT_ALERTS);

    let active_anomalies = ctx.simulator.lock().await.active_anomalies(equipment_id);

    Some(EquipmentDetail {
        id: equipment.id,
        name: equipment.name.clone(),
        kind: equipment.kind.clone(),
        installed: equipment.installed,
        status,
        recent_readings_by_sensor,
        assessment: ctx.scoring.latest(equipment_id),
        recent_alerts,
        active_anomalies,
    })
}

pub async fn alerts(ctx: &AppContext, filter: &AlertFilter) -> Vec<Alert> {
    ctx.alerts.query(filter).await
}

/// Newest injector activity for the operations view.
pub async fn recent_anomaly_events(
    ctx: &AppContext,
    limit: usize,
) -> Vec<anomaly_journal::AnomalyJournalEntry> {
    anomaly_journal::recent_events(&ctx.config.anomaly, limit)
}

/// Recompute every equipment's assessment from the current window, run the
/// hysteresis machine on the new scores and hand the results to the alert
/// manager. Returns how many assessments were produced; equipment without a
/// complete reading set stays pending.
pub async fn predict_all(ctx: &AppContext) -> usize {
    let now = Utc::now();
    let mut computed = 0;

    for equipment in ctx.registry.iter() {
        let window = {
            let history = ctx.history.read().await;
            history.snapshot(equipment.id)
        };

        let Prediction::Ready(assessment) = ctx.scoring.predict(equipment, &window, now) else {
            continue;
        };
        computed += 1;

        let transition = {
            let mut status = ctx.status.lock().await;
            status.evaluate(equipment.id, assessment.health_score)
        };
        if transition.changed() {
            tracing::info!(
                target: "status",
                equipment_id = equipment.id,
                from = transition.previous.as_str(),
                to = transition.current.as_str(),
                health_score = assessment.health_score,
                "status_changed"
            );
        }

        ctx.alerts
            .on_status_evaluated(equipment, transition.current, &assessment, now)
            .await;
    }
    computed
}

/// Fit a fresh model generation off the async path.
pub async fn train(ctx: &AppContext, days_back: u16) -> Result<ModelSnapshot, TrainingError> {
    let scoring = ctx.scoring.clone();
    let registry = ctx.registry.clone();
    let handle =
        tokio::task::spawn_blocking(move || scoring.train(days_back, &registry, Utc::now()));
    match handle.await {
        Ok(result) => result,
        Err(join_error) => Err(TrainingError::Fit(format!(
            "training task aborted: {}",
            join_error
        ))),
    }
}

pub async fn retrain_if_stale(ctx: &AppContext) -> Result<bool, TrainingError> {
    let scoring = ctx.scoring.clone();
    let registry = ctx.registry.clone();
    let days_threshold = ctx.config.scoring.retrain_after_days;
    let handle = tokio::task::spawn_blocking(move || {
        scoring.retrain_if_stale(days_threshold, &registry, Utc::now())
    });
    match handle.await {
        Ok(result) => result,
        Err(join_error) => Err(TrainingError::Fit(format!(
            "training task aborted: {}",
            join_error
        ))),
    }
}

pub async fn acknowledge_alert(ctx: &AppContext, alert_id: u64) -> Result<Alert, AlertError> {
    ctx.alerts.acknowledge(alert_id, Utc::now()).await
}

pub async fn resolve_alert(ctx: &AppContext, alert_id: u64) -> Result<Alert, AlertError> {
    ctx.alerts.resolve(alert_id, Utc::now()).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::app_context::AppContext;
    use crate::config::Config;
    use crate::registry::SensorType;
    use crate::simulator::SensorReading;
    use crate::status::EquipmentStatus;
    use crate::store::Store;

    use super::{dashboard, equipment_detail, predict_all};

    async fn context() -> (AppContext, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let mut config: Config = toml::from_str("").expect("defaults");
        config.store.path = dir.path().join("store").display().to_string();
        config.anomaly.journal_dir = dir.path().join("anomalies").display().to_string();
        config.simulator.seed = Some(7);

        let store = Store::open_from_config(&config.store).expect("store opens");
        let ctx = AppContext::new(config, store).expect("context builds");
        (ctx, dir)
    }

    async fn push_nominal_tick(ctx: &AppContext, equipment_id: u32) {
        let values = [
            (SensorType::Temperature, 72.0),
            (SensorType::Vibration, 2.0),
            (SensorType::Pressure, 24.0),
            (SensorType::Rpm, 1750.0),
        ];
        let mut history = ctx.history.write().await;
        for (sensor, value) in values {
            history.push(SensorReading {
                equipment_id,
                sensor,
                value,
                timestamp: Utc::now(),
                threshold_min: 0.0,
                threshold_max: 0.0,
            });
        }
    }

    #[tokio::test]
    async fn dashboard_starts_healthy_and_pending() {
        let (ctx, _dir) = context().await;
        let view = dashboard(&ctx).await;

        assert_eq!(view.equipment.len(), 3);
        assert!(view
            .equipment
            .iter()
            .all(|item| item.status == EquipmentStatus::Healthy));
        assert!(view.equipment.iter().all(|item| item.health_score.is_none()));
        assert!((view.metrics.uptime_pct - 100.0).abs() < f64::EPSILON);
        assert_eq!(view.metrics.active_alerts, 0);
    }

    #[tokio::test]
    async fn predict_all_fills_the_dashboard() {
        let (ctx, _dir) = context().await;
        for equipment_id in [1, 2, 3] {
            push_nominal_tick(&ctx, equipment_id).await;
        }

        let computed = predict_all(&ctx).await;
        assert_eq!(computed, 3);

        let view = dashboard(&ctx).await;
        for item in &view.equipment {
            let health = item.health_score.expect("assessment present");
            assert!((0.0..=100.0).contains(&health));
            assert!(item.urgency.is_some());
        }
    }

    #[tokio::test]
    async fn predict_all_skips_equipment_without_readings() {
        let (ctx, _dir) = context().await;
        push_nominal_tick(&ctx, 1).await;

        let computed = predict_all(&ctx).await;
        assert_eq!(computed, 1);

        let view = dashboard(&ctx).await;
        let pending = view
            .equipment
            .iter()
            .filter(|item| item.health_score.is_none())
            .count();
        assert_eq!(pending, 2);
    }

    #[tokio::test]
    async fn equipment_detail_returns_window_and_status() {
        let (ctx, _dir) = context().await;
        push_nominal_tick(&ctx, 1).await;
        predict_all(&ctx).await;

        let detail = equipment_detail(&ctx, 1).await.expect("detail exists");
        assert_eq!(detail.name, "Pump-001");
        assert_eq!(detail.status, EquipmentStatus::Healthy);
        assert_eq!(
            detail.recent_readings_by_sensor[&SensorType::Temperature].len(),
            1
        );
        assert!(detail.assessment.is_some());
        assert!(detail.active_anomalies.is_empty());

        assert!(equipment_detail(&ctx, 99).await.is_none());
    }
}
