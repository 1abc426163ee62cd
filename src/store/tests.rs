use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use crate::alerts::{Alert, AlertSeverity, AlertStatus, AlertTrigger};
use crate::config::StoreConfig;
use crate::registry::SensorType;
use crate::simulator::SensorReading;

use super::Store;

fn open_store(dir: &TempDir) -> Store {
    let config = StoreConfig {
        path: dir.path().join("store").display().to_string(),
        history_retention_days: 30,
    };
    Store::open_from_config(&config).expect("store opens")
}

fn reading(equipment_id: u32, value: f64, age: ChronoDuration) -> SensorReading {
    SensorReading {
        equipment_id,
        sensor: SensorType::Temperature,
        value,
        timestamp: Utc::now() - age,
        threshold_min: 50.0,
        threshold_max: 95.0,
    }
}

fn alert(id: u64, equipment_id: u32) -> Alert {
    Alert {
        id,
        equipment_id,
        equipment_name: "Pump-001".to_string(),
        severity: AlertSeverity::Warning,
        trigger: AlertTrigger::TemperatureAnomaly,
        failure_probability: 35.0,
        description: "Temperature elevated: 96.2°C".to_string(),
        status: AlertStatus::Active,
        created_at: Utc::now(),
        acknowledged_at: None,
        resolved_at: None,
    }
}

#[test]
fn readings_round_trip_in_time_order() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);

    store
        .record_reading(&reading(1, 70.0, ChronoDuration::minutes(10)))
        .expect("write");
    store
        .record_reading(&reading(1, 72.0, ChronoDuration::minutes(5)))
        .expect("write");
    store
        .record_reading(&reading(1, 74.0, ChronoDuration::minutes(1)))
        .expect("write");

    let since = store.readings_since(Utc::now() - ChronoDuration::minutes(7));
    let values: Vec<f64> = since.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![72.0, 74.0]);
    assert_eq!(since[0].equipment_id, 1);
    assert!((since[0].threshold_max - 95.0).abs() < f64::EPSILON);
}

#[test]
fn prune_removes_readings_past_retention() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);

    store
        .record_reading(&reading(1, 60.0, ChronoDuration::days(40)))
        .expect("write");
    store
        .record_reading(&reading(1, 61.0, ChronoDuration::minutes(1)))
        .expect("write");

    let removed = store.prune_old_readings().expect("prune");
    assert_eq!(removed, 1);

    let remaining = store.readings_since(Utc::now() - ChronoDuration::days(60));
    assert_eq!(remaining.len(), 1);
    assert!((remaining[0].value - 61.0).abs() < f64::EPSILON);
}

#[test]
fn alert_table_round_trips_and_removes() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);

    let id = store.next_alert_id().expect("id");
    let stored = alert(id, 1);
    store.put_alert(&stored).expect("put");

    let loaded = store.alert(id).expect("get").expect("exists");
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.status, AlertStatus::Active);
    assert_eq!(loaded.trigger, AlertTrigger::TemperatureAnomaly);

    assert_eq!(store.alerts().len(), 1);
    store.remove_alert(id).expect("remove");
    assert!(store.alert(id).expect("get").is_none());
}

#[test]
fn model_snapshot_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    assert!(store.load_model_snapshot().is_none());

    let snapshot = crate::scoring::ModelSnapshot {
        version: 2,
        trained_at: Utc::now(),
        features: vec!["temperature".to_string()],
        health_mse: 12.5,
        health_r2: 0.82,
        health_cv_mse_mean: 13.1,
        health_cv_mse_std: 1.4,
        failure_accuracy: 0.88,
        failure_precision: 0.8,
        failure_recall: 0.75,
        failure_f1: 0.77,
        failure_cv_accuracy_mean: 0.85,
        failure_cv_accuracy_std: 0.04,
        training_samples: 400,
        validation_samples: 100,
        warnings: Vec::new(),
    };
    store.save_model_snapshot(&snapshot).expect("save");

    let loaded = store.load_model_snapshot().expect("snapshot");
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.training_samples, 400);
    assert!((loaded.health_r2 - 0.82).abs() < f64::EPSILON);
}
