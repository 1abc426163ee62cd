use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::registry::SensorType;
use crate::simulator::SensorReading;

/// Bounded in-memory rolling window of recent readings, one series per
/// (equipment, sensor). The simulator pushes, scoring and the detail view
/// read immutable snapshots; long-term history lives in the store.
#[derive(Debug)]
pub struct ReadingHistory {
    capacity: usize,
    series: HashMap<(u32, SensorType), VecDeque<SensorReading>>,
}

impl ReadingHistory {
    pub fn with_capacity(window_samples: usize) -> Self {
        Self {
            capacity: window_samples.max(1),
            series: HashMap::new(),
        }
    }

    pub fn push(&mut self, reading: SensorReading) {
        let key = (reading.equipment_id, reading.sensor);
        let buffer = self
            .series
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(reading);
    }

    /// Consistent point-in-time copy of one equipment's window.
    pub fn snapshot(&self, equipment_id: u32) -> EquipmentWindow {
        let mut window = EquipmentWindow::default();
        for sensor in SensorType::ALL {
            let Some(buffer) = self.series.get(&(equipment_id, sensor)) else {
                continue;
            };
            if let Some(latest) = buffer.back() {
                window.latest.insert(sensor, latest.clone());
            }
            window
                .values
                .insert(sensor, buffer.iter().map(|reading| reading.value).collect());
        }
        window
    }

    /// Newest-last slice of the rolling window for one sensor series.
    pub fn recent(&self, equipment_id: u32, sensor: SensorType, limit: usize) -> Vec<SensorReading> {
        let Some(buffer) = self.series.get(&(equipment_id, sensor)) else {
            return Vec::new();
        };
        buffer
            .iter()
            .skip(buffer.len().saturating_sub(limit))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EquipmentWindow {
    pub values: BTreeMap<SensorType, Vec<f64>>,
    pub latest: BTreeMap<SensorType, SensorReading>,
}

impl EquipmentWindow {
    /// True once every sensor type has produced at least one sample.
    pub fn is_complete(&self) -> bool {
        SensorType::ALL
            .iter()
            .all(|sensor| self.latest.contains_key(sensor))
    }

    pub fn latest_values(&self) -> BTreeMap<SensorType, f64> {
        self.latest
            .iter()
            .map(|(sensor, reading)| (*sensor, reading.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::registry::SensorType;
    use crate::simulator::SensorReading;

    use super::ReadingHistory;

    fn reading(equipment_id: u32, sensor: SensorType, value: f64) -> SensorReading {
        SensorReading {
            equipment_id,
            sensor,
            value,
            timestamp: Utc::now(),
            threshold_min: 0.0,
            threshold_max: 100.0,
        }
    }

    #[test]
    fn keeps_capacity_by_overwriting_oldest() {
        let mut history = ReadingHistory::with_capacity(3);
        for value in [1.0, 2.0, 3.0, 4.0] {
            history.push(reading(1, SensorType::Temperature, value));
        }

        let snapshot = history.snapshot(1);
        assert_eq!(
            snapshot.values[&SensorType::Temperature],
            vec![2.0, 3.0, 4.0]
        );
        assert!((snapshot.latest[&SensorType::Temperature].value - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_is_incomplete_until_every_sensor_reports() {
        let mut history = ReadingHistory::with_capacity(8);
        history.push(reading(1, SensorType::Temperature, 70.0));
        history.push(reading(1, SensorType::Vibration, 1.4));
        assert!(!history.snapshot(1).is_complete());

        history.push(reading(1, SensorType::Pressure, 20.0));
        history.push(reading(1, SensorType::Rpm, 1800.0));
        assert!(history.snapshot(1).is_complete());
    }

    #[test]
    fn series_are_isolated_per_equipment() {
        let mut history = ReadingHistory::with_capacity(4);
        history.push(reading(1, SensorType::Temperature, 70.0));
        history.push(reading(2, SensorType::Temperature, 80.0));

        assert_eq!(history.snapshot(1).values[&SensorType::Temperature], vec![70.0]);
        assert_eq!(history.snapshot(2).values[&SensorType::Temperature], vec![80.0]);
        assert!(history.snapshot(3).values.is_empty());
    }

    #[test]
    fn recent_returns_newest_last() {
        let mut history = ReadingHistory::with_capacity(10);
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            history.push(reading(1, SensorType::Rpm, value));
        }

        let recent = history.recent(1, SensorType::Rpm, 3);
        let values: Vec<f64> = recent.iter().map(|reading| reading.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
    }
}
