use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::alerts::Alert;
use crate::config::StoreConfig;
use crate::scoring::ModelSnapshot;
use crate::simulator::SensorReading;

mod model;

use model::StoredReading;

const MODEL_SNAPSHOT_KEY: &[u8] = b"model_snapshot";
const PRUNE_EVERY_WRITES: u32 = 120;

/// Durable state: sensor history for training, the alert table, and the
/// current model snapshot metadata. Readings are keyed by big-endian
/// timestamp plus an insertion sequence so range scans come back in time
/// order even when two samples share a millisecond.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    readings: sled::Tree,
    alerts: sled::Tree,
    meta: sled::Tree,
    sequence: Arc<AtomicU32>,
    history_retention_days: u16,
}

impl Store {
    pub fn open_from_config(config: &StoreConfig) -> Result<Self, sled::Error> {
        let db = sled::open(&config.path)?;
        let readings = db.open_tree("readings")?;
        let alerts = db.open_tree("alerts")?;
        let meta = db.open_tree("meta")?;
        Ok(Self {
            db,
            readings,
            alerts,
            meta,
            sequence: Arc::new(AtomicU32::new(0)),
            history_retention_days: config.history_retention_days,
        })
    }

    pub fn record_reading(&self, reading: &SensorReading) -> Result<(), sled::Error> {
        let mut key = Vec::with_capacity(12);
        key.extend_from_slice(&reading.timestamp.timestamp_millis().to_be_bytes());
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        key.extend_from_slice(&seq.to_be_bytes());

        let payload = StoredReading::from_reading(reading);
        if let Ok(value) = serde_json::to_vec(&payload) {
            self.readings.insert(key, value)?;
        }

        if seq % PRUNE_EVERY_WRITES == 0 {
            self.prune_old_readings()?;
        }

        Ok(())
    }

    /// All readings at or after the cutoff, oldest first.
    pub fn readings_since(&self, cutoff: DateTime<Utc>) -> Vec<SensorReading> {
        let mut start_key = Vec::with_capacity(12);
        start_key.extend_from_slice(&cutoff.timestamp_millis().to_be_bytes());
        start_key.extend_from_slice(&0u32.to_be_bytes());

        self.readings
            .range(start_key..)
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice::<StoredReading>(&value).ok())
            .filter_map(StoredReading::into_reading)
            .collect()
    }

    pub fn next_alert_id(&self) -> Result<u64, sled::Error> {
        self.db.generate_id()
    }

    pub fn put_alert(&self, alert: &Alert) -> Result<(), sled::Error> {
        let value = serde_json::to_vec(alert).map_err(std::io::Error::other)?;
        self.alerts.insert(alert.id.to_be_bytes(), value)?;
        Ok(())
    }

    pub fn alert(&self, id: u64) -> Result<Option<Alert>, sled::Error> {
        let Some(value) = self.alerts.get(id.to_be_bytes())? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(&value).ok())
    }

    pub fn remove_alert(&self, id: u64) -> Result<(), sled::Error> {
        self.alerts.remove(id.to_be_bytes())?;
        Ok(())
    }

    /// Full alert table, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .collect();
        alerts.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        alerts
    }

    pub fn save_model_snapshot(&self, snapshot: &ModelSnapshot) -> Result<(), sled::Error> {
        let value = serde_json::to_vec(snapshot).map_err(std::io::Error::other)?;
        self.meta.insert(MODEL_SNAPSHOT_KEY, value)?;
        Ok(())
    }

    pub fn load_model_snapshot(&self) -> Option<ModelSnapshot> {
        self.meta
            .get(MODEL_SNAPSHOT_KEY)
            .ok()
            .flatten()
            .and_then(|value| serde_json::from_slice(&value).ok())
    }

    pub fn prune_old_readings(&self) -> Result<usize, sled::Error> {
        let cutoff = Utc::now() - ChronoDuration::days(self.history_retention_days as i64);
        let cutoff_key = cutoff.timestamp_millis().to_be_bytes();

        let keys_to_remove = self
            .readings
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .take_while(|key| key.as_ref().len() >= 8 && &key.as_ref()[0..8] < cutoff_key.as_slice())
            .collect::<Vec<_>>();

        let removed = keys_to_remove.len();
        for key in keys_to_remove {
            self.readings.remove(key)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests;
