use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, Thresholds};
use crate::history::EquipmentWindow;
use crate::registry::{Equipment, EquipmentRegistry};
use crate::store::Store;

mod features;
mod heuristic;
mod trainer;

pub use heuristic::{band_proximity_score, heuristic_health};
pub use trainer::{CriticalSpan, ModelSnapshot, ModelTrainer, TrainedModel, TrainingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Immediate,
    Urgent,
    Schedule,
    Monitor,
    Safe,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediate => "IMMEDIATE",
            Urgency::Urgent => "URGENT",
            Urgency::Schedule => "SCHEDULE",
            Urgency::Monitor => "MONITOR",
            Urgency::Safe => "SAFE",
        }
    }
}

/// Replaced wholesale on every prediction; immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAssessment {
    pub equipment_id: u32,
    pub health_score: f64,
    pub failure_probability: f64,
    pub confidence: Confidence,
    pub urgency: Urgency,
    pub message: String,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Prediction {
    Ready(HealthAssessment),
    /// The equipment has not produced a complete reading set yet; callers
    /// render "pending" instead of failing.
    NotReady,
}

/// Health and failure scoring over the rolling window. Runs the trained
/// forests when a model generation is loaded and falls back to the band
/// proximity heuristic otherwise. Inference is on demand, never per tick:
/// assessments stay constant between explicit recomputations so the numbers
/// shown downstream do not flicker.
pub struct ScoringEngine {
    thresholds: Thresholds,
    trainer: ModelTrainer,
    store: Store,
    training_days_back: u16,
    model: RwLock<Option<TrainedModel>>,
    snapshot: RwLock<Option<ModelSnapshot>>,
    assessments: RwLock<HashMap<u32, HealthAssessment>>,
}

impl ScoringEngine {
    pub fn new(thresholds: Thresholds, config: &ScoringConfig, store: Store) -> Self {
        // Snapshot metadata survives restarts for version continuity; the
        // fitted forests do not, so scoring stays in fallback mode until the
        // next train completes.
        let snapshot = store.load_model_snapshot();
        Self {
            thresholds,
            trainer: ModelTrainer::new(config),
            store,
            training_days_back: config.training_days_back,
            model: RwLock::new(None),
            snapshot: RwLock::new(snapshot),
            assessments: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub fn model_snapshot(&self) -> Option<ModelSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn latest(&self, equipment_id: u32) -> Option<HealthAssessment> {
        self.assessments
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&equipment_id)
            .cloned()
    }

    pub fn predict(
        &self,
        equipment: &Equipment,
        window: &EquipmentWindow,
        now: DateTime<Utc>,
    ) -> Prediction {
        let Some(feature_vector) = features::from_window(window, equipment.age_days(now)) else {
            return Prediction::NotReady;
        };

        let scores = {
            let model = self
                .model
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match model.as_ref() {
                Some(model) => match self.model_scores(model, &feature_vector) {
                    Ok(scores) => Some(scores),
                    Err(error) => {
                        log::warn!(
                            "model inference failed for equipment {}, using fallback: {}",
                            equipment.id,
                            error
                        );
                        None
                    }
                },
                None => None,
            }
        };
        let (health, probability) =
            scores.unwrap_or_else(|| self.fallback_scores(window));

        let assessment = self.build_assessment(equipment.id, health, probability, now);
        self.assessments
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(equipment.id, assessment.clone());
        Prediction::Ready(assessment)
    }

    fn model_scores(
        &self,
        model: &TrainedModel,
        feature_vector: &[f64],
    ) -> Result<(f64, f64), TrainingError> {
        let health = model.predict_health(feature_vector)?.clamp(0.0, 100.0);
        let probability = model.predict_risk(feature_vector)?.clamp(0.0, 100.0);
        Ok((health, probability))
    }

    fn fallback_scores(&self, window: &EquipmentWindow) -> (f64, f64) {
        let health = heuristic_health(&self.thresholds, &window.latest_values());
        let probability = (100.0 - health).clamp(0.0, 100.0);
        (health, probability)
    }

    fn build_assessment(
        &self,
        equipment_id: u32,
        health: f64,
        probability: f64,
        now: DateTime<Utc>,
    ) -> HealthAssessment {
        let health_score = truncate_score(health);
        let failure_probability = stabilize_probability(probability);
        let (confidence, urgency, time_range) =
            confidence_and_urgency(failure_probability, health_score);
        HealthAssessment {
            equipment_id,
            health_score,
            failure_probability,
            confidence,
            urgency,
            message: format!("Failure predicted in {}", time_range),
            computed_at: now,
        }
    }

    /// Fit a fresh model generation from the recent history window. CPU
    /// bound; callers run it off the tick path.
    pub fn train(
        &self,
        days_back: u16,
        registry: &EquipmentRegistry,
        now: DateTime<Utc>,
    ) -> Result<ModelSnapshot, TrainingError> {
        let cutoff = now - ChronoDuration::days(days_back.max(1) as i64);
        let readings = self.store.readings_since(cutoff);
        let critical_spans = critical_spans(&self.store.alerts());

        let data = self
            .trainer
            .assemble(readings, &critical_spans, &self.thresholds, registry);

        let version = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|snapshot| snapshot.version + 1)
            .unwrap_or(1);
        let (model, snapshot) = self.trainer.fit(&data, version, now)?;

        if let Err(error) = self.store.save_model_snapshot(&snapshot) {
            log::warn!("failed to persist model snapshot metadata: {}", error);
        }

        *self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(model);
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());

        tracing::info!(
            target: "scoring",
            version = snapshot.version,
            samples = snapshot.training_samples,
            health_r2 = snapshot.health_r2,
            failure_accuracy = snapshot.failure_accuracy,
            warnings = snapshot.warnings.len(),
            "model_trained"
        );
        Ok(snapshot)
    }

    /// Train only when the current snapshot is older than the threshold.
    /// Returns whether a retrain actually ran.
    pub fn retrain_if_stale(
        &self,
        days_threshold: u16,
        registry: &EquipmentRegistry,
        now: DateTime<Utc>,
    ) -> Result<bool, TrainingError> {
        let stale = {
            let snapshot = self
                .snapshot
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            self.trainer
                .should_retrain(snapshot.as_ref(), days_threshold, now)
        };
        if !stale {
            return Ok(false);
        }
        self.train(self.training_days_back, registry, now)?;
        Ok(true)
    }
}

fn critical_spans(alerts: &[crate::alerts::Alert]) -> Vec<CriticalSpan> {
    alerts
        .iter()
        .filter(|alert| alert.severity == crate::alerts::AlertSeverity::Critical)
        .map(|alert| CriticalSpan {
            equipment_id: alert.equipment_id,
            from: alert.created_at,
            until: alert
                .resolved_at
                .unwrap_or(alert.created_at + ChronoDuration::hours(1)),
        })
        .collect()
}

/// Round to the nearest 5% so the displayed probability only moves when the
/// underlying risk materially changes.
pub fn stabilize_probability(probability: f64) -> f64 {
    ((probability / 5.0).round() * 5.0).clamp(0.0, 100.0)
}

/// One decimal, truncated.
pub fn truncate_score(score: f64) -> f64 {
    (score.clamp(0.0, 100.0) * 10.0).trunc() / 10.0
}

fn confidence_and_urgency(
    stabilized_probability: f64,
    health_score: f64,
) -> (Confidence, Urgency, &'static str) {
    if stabilized_probability >= 80.0 || health_score < 20.0 {
        (Confidence::High, Urgency::Immediate, "2-4 hours")
    } else if stabilized_probability >= 60.0 || health_score < 40.0 {
        (Confidence::High, Urgency::Urgent, "6-12 hours")
    } else if stabilized_probability >= 40.0 || health_score < 60.0 {
        (Confidence::Medium, Urgency::Schedule, "1-2 days")
    } else if stabilized_probability >= 20.0 || health_score < 80.0 {
        (Confidence::Medium, Urgency::Monitor, "3-7 days")
    } else {
        (Confidence::Low, Urgency::Safe, "7+ days")
    }
}
