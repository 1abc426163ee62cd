use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AnomalyPatternConfig, Thresholds};
use crate::registry::{Equipment, SensorType};

mod anomaly;

pub use anomaly::{AnomalyInjector, AnomalyInstance};

#[derive(Debug, Clone)]
pub struct SensorReading {
    pub equipment_id: u32,
    pub sensor: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Warning bounds active at generation time, recorded with the sample.
    pub threshold_min: f64,
    pub threshold_max: f64,
}

#[derive(Debug)]
pub struct TickOutput {
    pub readings: BTreeMap<SensorType, SensorReading>,
    pub activated: Vec<AnomalyInstance>,
    pub expired: Vec<String>,
}

/// Generates one sample per sensor per equipment per tick. Baseline value
/// plus slow degradation drift and bounded noise, unless an active anomaly
/// instance shifts the output. Deterministic for a fixed seed.
#[derive(Debug)]
pub struct EquipmentSimulator {
    injector: AnomalyInjector,
    rng: StdRng,
    tick_count: u64,
}

impl EquipmentSimulator {
    pub fn new(patterns: Vec<AnomalyPatternConfig>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            injector: AnomalyInjector::new(patterns),
            rng,
            tick_count: 0,
        }
    }

    /// Advance the global cycle counter. Call once per tick interval, before
    /// ticking the individual equipment.
    pub fn advance(&mut self) -> u64 {
        self.tick_count = self.tick_count.saturating_add(1);
        self.tick_count
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick(
        &mut self,
        equipment: &Equipment,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> TickOutput {
        let activated = self.injector.begin_tick(equipment.id, &mut self.rng);

        let degradation = self.tick_count as f64 * equipment.degradation_factor;
        let mut readings = BTreeMap::new();
        for sensor in SensorType::ALL {
            let base = match sensor {
                SensorType::Temperature | SensorType::Vibration => {
                    equipment.baseline(sensor) + degradation
                }
                SensorType::Pressure => equipment.baseline(sensor) - degradation * 0.5,
                SensorType::Rpm => equipment.baseline(sensor) + self.rng.gen_range(-50.0..=50.0),
            };

            let offset = self.injector.offset(equipment.id, sensor, &mut self.rng);
            let half_width = sensor.noise_half_width();
            let noise = self.rng.gen_range(-half_width..=half_width);

            let (min_bound, max_bound) = sensor.physical_bounds();
            let value = (base + offset + noise).clamp(min_bound, max_bound);

            let bands = thresholds.sensor(sensor);
            readings.insert(
                sensor,
                SensorReading {
                    equipment_id: equipment.id,
                    sensor,
                    value,
                    timestamp: now,
                    threshold_min: bands.warning_low,
                    threshold_max: bands.warning_high,
                },
            );
        }

        let expired = self.injector.finish_tick(equipment.id);
        TickOutput {
            readings,
            activated,
            expired,
        }
    }

    /// Direct activation for scripted scenarios; skips the Bernoulli trial.
    pub fn inject(&mut self, equipment_id: u32, instance: AnomalyInstance) {
        self.injector.activate(equipment_id, instance);
    }

    pub fn active_anomalies(&self, equipment_id: u32) -> Vec<AnomalyInstance> {
        self.injector.active(equipment_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::config::{AnomalyEffect, Config};
    use crate::registry::{EquipmentRegistry, SensorType};

    use super::{AnomalyInstance, EquipmentSimulator};

    fn setup() -> (Config, EquipmentRegistry) {
        let config: Config = toml::from_str("").expect("defaults");
        let registry = EquipmentRegistry::from_config(&config);
        (config, registry)
    }

    #[test]
    fn produces_one_reading_per_sensor_within_physical_bounds() {
        let (config, registry) = setup();
        let mut simulator = EquipmentSimulator::new(Vec::new(), Some(42));
        let pump = registry.get(1).expect("pump");

        simulator.advance();
        let output = simulator.tick(pump, &config.thresholds, Utc::now());

        assert_eq!(output.readings.len(), 4);
        for (sensor, reading) in &output.readings {
            let (min_bound, max_bound) = sensor.physical_bounds();
            assert!(reading.value >= min_bound && reading.value <= max_bound);
            assert_eq!(reading.equipment_id, 1);
        }
        let temperature = &output.readings[&SensorType::Temperature];
        assert!((temperature.value - 65.0).abs() <= 2.5);
        assert!((temperature.threshold_min - 50.0).abs() < f64::EPSILON);
        assert!((temperature.threshold_max - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_seeds_produce_identical_runs() {
        let (config, registry) = setup();
        let pump = registry.get(1).expect("pump");
        let now = Utc::now();

        let mut left = EquipmentSimulator::new(config.anomaly.patterns.clone(), Some(99));
        let mut right = EquipmentSimulator::new(config.anomaly.patterns.clone(), Some(99));

        for _ in 0..50 {
            left.advance();
            right.advance();
            let left_output = left.tick(pump, &config.thresholds, now);
            let right_output = right.tick(pump, &config.thresholds, now);
            for sensor in SensorType::ALL {
                assert_eq!(
                    left_output.readings[&sensor].value,
                    right_output.readings[&sensor].value
                );
            }
        }
    }

    #[test]
    fn injected_temperature_spike_runs_its_course_then_reverts() {
        let (config, registry) = setup();
        let motor = registry.get(3).expect("motor");
        let mut simulator = EquipmentSimulator::new(Vec::new(), Some(11));

        simulator.inject(
            motor.id,
            AnomalyInstance {
                pattern: "temperature_spike".to_string(),
                effect: AnomalyEffect::StepUp,
                sensors: vec![SensorType::Temperature],
                magnitude: 40.0,
                duration_ticks: 5,
                remaining_ticks: 5,
            },
        );

        // Baseline 70°C, magnitude 40, noise ±2: ticks 0-4 read near 110°C.
        for tick in 0..5 {
            simulator.advance();
            let output = simulator.tick(motor, &config.thresholds, Utc::now());
            let value = output.readings[&SensorType::Temperature].value;
            assert!(
                (108.0..=112.1).contains(&value),
                "tick {} value {}",
                tick,
                value
            );
            if tick == 4 {
                assert_eq!(output.expired, vec!["temperature_spike".to_string()]);
            }
        }

        // From tick 5 onward the sensor is back in the baseline band.
        for _ in 5..10 {
            simulator.advance();
            let output = simulator.tick(motor, &config.thresholds, Utc::now());
            let value = output.readings[&SensorType::Temperature].value;
            assert!((67.0..=73.1).contains(&value), "value {}", value);
        }
    }

    #[test]
    fn degradation_drift_raises_temperature_over_time() {
        let (config, registry) = setup();
        let pump = registry.get(1).expect("pump");
        let mut simulator = EquipmentSimulator::new(Vec::new(), Some(5));
        let now = Utc::now();

        for _ in 0..10_000 {
            simulator.advance();
        }
        let output = simulator.tick(pump, &config.thresholds, now);
        // 10k ticks at 0.001 drift add ~10°C to the 65°C baseline.
        let value = output.readings[&SensorType::Temperature].value;
        assert!((72.5..=77.5).contains(&value), "value {}", value);
    }
}
