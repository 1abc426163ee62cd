use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use thiserror::Error;

use crate::config::{ScoringConfig, Thresholds};
use crate::registry::{EquipmentRegistry, SensorType};
use crate::simulator::SensorReading;

use super::features;
use super::heuristic::heuristic_health;

/// Risk above this marks a sample as a failure event for classification
/// metrics, mirroring the health/failure label split of the scoring engine.
const FAILURE_RISK_THRESHOLD: f64 = 60.0;
/// Decision threshold applied to the risk model output when reporting
/// classification metrics.
const EVENT_DECISION_THRESHOLD: f64 = 50.0;
const FOREST_SEED: u64 = 42;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("insufficient training data: {got} samples (minimum {min} required)")]
    InsufficientSamples { got: usize, min: usize },
    #[error("failed to load training history: {0}")]
    Store(#[from] sled::Error),
    #[error("model fitting failed: {0}")]
    Fit(String),
}

/// Metadata of one trained model generation. The fitted forests live in
/// memory; only this record is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub health_mse: f64,
    pub health_r2: f64,
    pub health_cv_mse_mean: f64,
    pub health_cv_mse_std: f64,
    pub failure_accuracy: f64,
    pub failure_precision: f64,
    pub failure_recall: f64,
    pub failure_f1: f64,
    pub failure_cv_accuracy_mean: f64,
    pub failure_cv_accuracy_std: f64,
    pub training_samples: usize,
    pub validation_samples: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct TrainedModel {
    health: Forest,
    risk: Forest,
}

impl TrainedModel {
    pub fn predict_health(&self, features: &[f64]) -> Result<f64, TrainingError> {
        predict_one(&self.health, features)
    }

    pub fn predict_risk(&self, features: &[f64]) -> Result<f64, TrainingError> {
        predict_one(&self.risk, features)
    }
}

fn predict_one(forest: &Forest, features: &[f64]) -> Result<f64, TrainingError> {
    let matrix = DenseMatrix::from_2d_vec(&vec![features.to_vec()])
        .map_err(|error| TrainingError::Fit(error.to_string()))?;
    let predictions = forest
        .predict(&matrix)
        .map_err(|error| TrainingError::Fit(error.to_string()))?;
    predictions
        .first()
        .copied()
        .ok_or_else(|| TrainingError::Fit("empty prediction output".to_string()))
}

#[derive(Debug, Default)]
pub struct TrainingData {
    pub features: Vec<Vec<f64>>,
    pub health: Vec<f64>,
    pub risk: Vec<f64>,
    pub failure: Vec<bool>,
}

impl TrainingData {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Time span during which a critical alert was live; samples inside it are
/// labeled as failure events regardless of their proximity-derived risk.
#[derive(Debug, Clone, Copy)]
pub struct CriticalSpan {
    pub equipment_id: u32,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl CriticalSpan {
    fn contains(&self, equipment_id: u32, at: DateTime<Utc>) -> bool {
        self.equipment_id == equipment_id && at >= self.from && at <= self.until
    }
}

/// Offline batch fit over a bounded recent window of readings. Labels are
/// derived, not hand-annotated: the band-proximity heuristic provides the
/// health proxy and, together with critical alert spans, the failure events.
pub struct ModelTrainer {
    min_samples: usize,
    cv_folds: usize,
    window_samples: usize,
}

impl ModelTrainer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            min_samples: config.min_training_samples,
            cv_folds: config.cv_folds.max(2),
            window_samples: config.window_samples.max(1),
        }
    }

    /// Pure age check; callers decide whether to act on it.
    pub fn should_retrain(
        &self,
        snapshot: Option<&ModelSnapshot>,
        days_threshold: u16,
        now: DateTime<Utc>,
    ) -> bool {
        match snapshot {
            None => true,
            Some(snapshot) => {
                now.signed_duration_since(snapshot.trained_at)
                    >= ChronoDuration::days(days_threshold as i64)
            }
        }
    }

    /// Rebuild the per-tick feature rows from raw history. Readings are
    /// grouped by (equipment, timestamp); rows are emitted once every sensor
    /// series has data, replaying the same rolling window inference uses.
    pub fn assemble(
        &self,
        readings: Vec<SensorReading>,
        critical_spans: &[CriticalSpan],
        thresholds: &Thresholds,
        registry: &EquipmentRegistry,
    ) -> TrainingData {
        let mut grouped: BTreeMap<u32, BTreeMap<i64, BTreeMap<SensorType, f64>>> = BTreeMap::new();
        for reading in readings {
            grouped
                .entry(reading.equipment_id)
                .or_default()
                .entry(reading.timestamp.timestamp_millis())
                .or_default()
                .insert(reading.sensor, reading.value);
        }

        let mut data = TrainingData::default();
        for (equipment_id, by_time) in grouped {
            let Some(equipment) = registry.get(equipment_id) else {
                continue;
            };

            let mut rolling: BTreeMap<SensorType, VecDeque<f64>> = BTreeMap::new();
            for (millis, sensors) in by_time {
                for (sensor, value) in &sensors {
                    let buffer = rolling.entry(*sensor).or_default();
                    if buffer.len() == self.window_samples {
                        buffer.pop_front();
                    }
                    buffer.push_back(*value);
                }

                let mut latest = BTreeMap::new();
                let mut series = BTreeMap::new();
                for sensor in SensorType::ALL {
                    let Some(buffer) = rolling.get(&sensor) else {
                        continue;
                    };
                    if let Some(value) = buffer.back() {
                        latest.insert(sensor, *value);
                    }
                    series.insert(sensor, buffer.iter().copied().collect::<Vec<f64>>());
                }
                if latest.len() < SensorType::ALL.len() {
                    continue;
                }

                let at = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_else(Utc::now);
                let health = heuristic_health(thresholds, &latest);
                let risk = (100.0 - health).clamp(0.0, 100.0);
                let failure = risk > FAILURE_RISK_THRESHOLD
                    || critical_spans
                        .iter()
                        .any(|span| span.contains(equipment_id, at));

                data.features
                    .push(features::compose(&latest, &series, equipment.age_days(at)));
                data.health.push(health);
                data.risk.push(risk);
                data.failure.push(failure);
            }
        }
        data
    }

    /// Cross-validated fit of both forests plus a time-ordered holdout for
    /// the headline metrics.
    pub fn fit(
        &self,
        data: &TrainingData,
        version: u32,
        now: DateTime<Utc>,
    ) -> Result<(TrainedModel, ModelSnapshot), TrainingError> {
        let total = data.len();
        if total < self.min_samples {
            return Err(TrainingError::InsufficientSamples {
                got: total,
                min: self.min_samples,
            });
        }

        // Last fifth is the validation holdout; the split is time-ordered so
        // the model is always judged on data newer than what it saw.
        let validation_len = (total / 5).max(1);
        let train_len = total - validation_len;

        let train_features = &data.features[..train_len];
        let validation_features = &data.features[train_len..];

        let (health_cv_mse_mean, health_cv_mse_std) =
            self.cross_validate(train_features, &data.health[..train_len], CvMetric::Mse)?;
        let (failure_cv_accuracy_mean, failure_cv_accuracy_std) = self.cross_validate(
            train_features,
            &data.risk[..train_len],
            CvMetric::EventAccuracy {
                labels: &data.failure[..train_len],
            },
        )?;

        let health = fit_forest(train_features, &data.health[..train_len])?;
        let risk = fit_forest(train_features, &data.risk[..train_len])?;

        let health_predictions = predict_many(&health, validation_features)?;
        let (health_mse, health_r2) =
            regression_metrics(&data.health[train_len..], &health_predictions);

        let risk_predictions = predict_many(&risk, validation_features)?;
        let predicted_events: Vec<bool> = risk_predictions
            .iter()
            .map(|risk| *risk >= EVENT_DECISION_THRESHOLD)
            .collect();
        let (failure_accuracy, failure_precision, failure_recall, failure_f1) =
            classification_metrics(&data.failure[train_len..], &predicted_events);

        let mut warnings = Vec::new();
        if health_r2 > 0.95 {
            warnings.push(format!(
                "health model R² {:.3} above 0.95 - likely overfitting",
                health_r2
            ));
        }
        if failure_accuracy > 0.95 {
            warnings.push(format!(
                "failure model accuracy {:.3} above 0.95 - likely overfitting",
                failure_accuracy
            ));
        }
        if failure_cv_accuracy_std > 0.1 {
            warnings.push(
                "high cross-validation variance - model may be unstable".to_string(),
            );
        }

        let snapshot = ModelSnapshot {
            version,
            trained_at: now,
            features: features::feature_names(),
            health_mse,
            health_r2,
            health_cv_mse_mean,
            health_cv_mse_std,
            failure_accuracy,
            failure_precision,
            failure_recall,
            failure_f1,
            failure_cv_accuracy_mean,
            failure_cv_accuracy_std,
            training_samples: train_len,
            validation_samples: validation_len,
            warnings,
        };

        Ok((TrainedModel { health, risk }, snapshot))
    }

    fn cross_validate(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        metric: CvMetric<'_>,
    ) -> Result<(f64, f64), TrainingError> {
        let folds = self.cv_folds.min(features.len());
        let fold_size = features.len() / folds;
        if fold_size == 0 {
            return Ok((0.0, 0.0));
        }

        let mut scores = Vec::with_capacity(folds);
        for fold in 0..folds {
            let start = fold * fold_size;
            let end = if fold == folds - 1 {
                features.len()
            } else {
                start + fold_size
            };

            let mut train_features = Vec::with_capacity(features.len() - (end - start));
            let mut train_targets = Vec::with_capacity(train_features.capacity());
            for index in (0..features.len()).filter(|index| *index < start || *index >= end) {
                train_features.push(features[index].clone());
                train_targets.push(targets[index]);
            }

            let forest = fit_forest(&train_features, &train_targets)?;
            let predictions = predict_many(&forest, &features[start..end])?;

            let score = match metric {
                CvMetric::Mse => {
                    let (mse, _) = regression_metrics(&targets[start..end], &predictions);
                    mse
                }
                CvMetric::EventAccuracy { labels } => {
                    let predicted: Vec<bool> = predictions
                        .iter()
                        .map(|risk| *risk >= EVENT_DECISION_THRESHOLD)
                        .collect();
                    let (accuracy, _, _, _) =
                        classification_metrics(&labels[start..end], &predicted);
                    accuracy
                }
            };
            scores.push(score);
        }

        Ok(features::mean_std(&scores))
    }
}

#[derive(Clone, Copy)]
enum CvMetric<'a> {
    Mse,
    EventAccuracy { labels: &'a [bool] },
}

fn fit_forest(features: &[Vec<f64>], targets: &[f64]) -> Result<Forest, TrainingError> {
    let matrix = DenseMatrix::from_2d_vec(&features.to_vec())
        .map_err(|error| TrainingError::Fit(error.to_string()))?;
    let parameters = RandomForestRegressorParameters::default()
        .with_n_trees(50)
        .with_max_depth(8)
        .with_min_samples_split(10)
        .with_min_samples_leaf(5)
        .with_seed(FOREST_SEED);
    RandomForestRegressor::fit(&matrix, &targets.to_vec(), parameters)
        .map_err(|error| TrainingError::Fit(error.to_string()))
}

fn predict_many(forest: &Forest, features: &[Vec<f64>]) -> Result<Vec<f64>, TrainingError> {
    if features.is_empty() {
        return Ok(Vec::new());
    }
    let matrix = DenseMatrix::from_2d_vec(&features.to_vec())
        .map_err(|error| TrainingError::Fit(error.to_string()))?;
    forest
        .predict(&matrix)
        .map_err(|error| TrainingError::Fit(error.to_string()))
}

fn regression_metrics(actual: &[f64], predicted: &[f64]) -> (f64, f64) {
    if actual.is_empty() || actual.len() != predicted.len() {
        return (0.0, 0.0);
    }
    let count = actual.len() as f64;
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>()
        / count;

    let mean = actual.iter().sum::<f64>() / count;
    let ss_total = actual.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>();
    let ss_residual = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum::<f64>();
    let r2 = if ss_total <= f64::EPSILON {
        0.0
    } else {
        1.0 - ss_residual / ss_total
    };
    (mse, r2)
}

fn classification_metrics(actual: &[bool], predicted: &[bool]) -> (f64, f64, f64, f64) {
    if actual.is_empty() || actual.len() != predicted.len() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let mut true_positive = 0.0;
    let mut true_negative = 0.0;
    let mut false_positive = 0.0;
    let mut false_negative = 0.0;
    for (a, p) in actual.iter().zip(predicted) {
        match (a, p) {
            (true, true) => true_positive += 1.0,
            (false, false) => true_negative += 1.0,
            (false, true) => false_positive += 1.0,
            (true, false) => false_negative += 1.0,
        }
    }

    let accuracy = (true_positive + true_negative) / actual.len() as f64;
    let precision = if true_positive + false_positive > 0.0 {
        true_positive / (true_positive + false_positive)
    } else {
        0.0
    };
    let recall = if true_positive + false_negative > 0.0 {
        true_positive / (true_positive + false_negative)
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (accuracy, precision, recall, f1)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::config::{Config, ScoringConfig};
    use crate::registry::{EquipmentRegistry, SensorType};
    use crate::simulator::SensorReading;

    use super::{
        classification_metrics, regression_metrics, CriticalSpan, ModelTrainer, TrainingError,
    };

    fn scoring_config(min_samples: usize) -> ScoringConfig {
        ScoringConfig {
            min_training_samples: min_samples,
            ..toml::from_str::<Config>("").expect("defaults").scoring
        }
    }

    /// Synthetic history: temperature sweeps from nominal into the critical
    /// band and back, the other sensors stay put. ~`ticks` usable samples.
    fn synthetic_readings(equipment_id: u32, ticks: usize) -> Vec<SensorReading> {
        let start = Utc::now() - ChronoDuration::seconds(ticks as i64);
        let mut readings = Vec::new();
        for tick in 0..ticks {
            let timestamp = start + ChronoDuration::seconds(tick as i64);
            let phase = tick as f64 / ticks as f64;
            let temperature = 70.0 + (phase * std::f64::consts::PI).sin() * 45.0;
            let values = [
                (SensorType::Temperature, temperature),
                (SensorType::Vibration, 1.5 + phase),
                (SensorType::Pressure, 20.0),
                (SensorType::Rpm, 1800.0),
            ];
            for (sensor, value) in values {
                readings.push(SensorReading {
                    equipment_id,
                    sensor,
                    value,
                    timestamp,
                    threshold_min: 0.0,
                    threshold_max: 0.0,
                });
            }
        }
        readings
    }

    #[test]
    fn assemble_builds_one_row_per_complete_tick() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(10));

        let data = trainer.assemble(
            synthetic_readings(1, 40),
            &[],
            &config.thresholds,
            &registry,
        );
        assert_eq!(data.len(), 40);
        assert_eq!(data.features[0].len(), super::features::FEATURE_NAMES.len());
        assert!(data.health.iter().all(|h| (0.0..=100.0).contains(h)));
        assert!(data.risk.iter().all(|r| (0.0..=100.0).contains(r)));
    }

    #[test]
    fn readings_for_unknown_equipment_are_skipped() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(10));

        let data = trainer.assemble(
            synthetic_readings(99, 20),
            &[],
            &config.thresholds,
            &registry,
        );
        assert!(data.is_empty());
    }

    #[test]
    fn critical_alert_spans_force_failure_labels() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(10));

        let readings = synthetic_readings(1, 20);
        let span = CriticalSpan {
            equipment_id: 1,
            from: readings[0].timestamp,
            until: readings.last().expect("non-empty").timestamp,
        };
        let data = trainer.assemble(readings, &[span], &config.thresholds, &registry);
        assert!(data.failure.iter().all(|f| *f));
    }

    #[test]
    fn fit_rejects_small_datasets_by_naming_the_minimum() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(100));

        let data = trainer.assemble(
            synthetic_readings(1, 30),
            &[],
            &config.thresholds,
            &registry,
        );
        let error = trainer
            .fit(&data, 1, Utc::now())
            .expect_err("too few samples");
        match error {
            TrainingError::InsufficientSamples { got, min } => {
                assert_eq!(got, 30);
                assert_eq!(min, 100);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn fit_produces_a_snapshot_with_cross_validated_metrics() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(100));

        let data = trainer.assemble(
            synthetic_readings(1, 150),
            &[],
            &config.thresholds,
            &registry,
        );
        let (model, snapshot) = trainer.fit(&data, 3, Utc::now()).expect("fit succeeds");

        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.training_samples + snapshot.validation_samples, 150);
        assert!(snapshot.health_mse >= 0.0);
        assert!(snapshot.health_cv_mse_mean >= 0.0);
        assert!((0.0..=1.0).contains(&snapshot.failure_accuracy));
        assert!((0.0..=1.0).contains(&snapshot.failure_cv_accuracy_mean));
        assert_eq!(snapshot.features.len(), super::features::FEATURE_NAMES.len());

        // Fixed forest seed: the same features always score identically.
        let first = model.predict_health(&data.features[0]).expect("predict");
        let second = model.predict_health(&data.features[0]).expect("predict");
        assert_eq!(first, second);
        assert!((0.0..=110.0).contains(&first));
    }

    #[test]
    fn should_retrain_is_a_pure_age_check() {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        let trainer = ModelTrainer::new(&scoring_config(50));
        let now = Utc::now();

        assert!(trainer.should_retrain(None, 3, now));

        let data = trainer.assemble(
            synthetic_readings(1, 80),
            &[],
            &config.thresholds,
            &registry,
        );
        let (_, snapshot) = trainer.fit(&data, 1, now).expect("fit succeeds");
        assert!(!trainer.should_retrain(Some(&snapshot), 3, now));
        assert!(trainer.should_retrain(Some(&snapshot), 3, now + ChronoDuration::days(4)));
    }

    #[test]
    fn metric_helpers_match_hand_computed_values() {
        let (mse, r2) = regression_metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!(mse.abs() < f64::EPSILON);
        assert!((r2 - 1.0).abs() < f64::EPSILON);

        let (accuracy, precision, recall, f1) = classification_metrics(
            &[true, true, false, false],
            &[true, false, true, false],
        );
        assert!((accuracy - 0.5).abs() < f64::EPSILON);
        assert!((precision - 0.5).abs() < f64::EPSILON);
        assert!((recall - 0.5).abs() < f64::EPSILON);
        assert!((f1 - 0.5).abs() < f64::EPSILON);
    }
}
