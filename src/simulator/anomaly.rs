use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;

use crate::config::{AnomalyEffect, AnomalyPatternConfig};
use crate::registry::SensorType;

/// A live occurrence of a configured pattern on one piece of equipment.
/// Activated by a Bernoulli trial, decremented every tick, removed at zero.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyInstance {
    pub pattern: String,
    pub effect: AnomalyEffect,
    pub sensors: Vec<SensorType>,
    pub magnitude: f64,
    pub duration_ticks: u32,
    pub remaining_ticks: u32,
}

impl AnomalyInstance {
    fn affects(&self, sensor: SensorType) -> bool {
        self.sensors.contains(&sensor)
    }

    fn elapsed_ticks(&self) -> u32 {
        self.duration_ticks.saturating_sub(self.remaining_ticks)
    }
}

#[derive(Debug)]
pub struct AnomalyInjector {
    patterns: Vec<AnomalyPatternConfig>,
    active: HashMap<u32, Vec<AnomalyInstance>>,
}

impl AnomalyInjector {
    pub fn new(patterns: Vec<AnomalyPatternConfig>) -> Self {
        Self {
            patterns,
            active: HashMap::new(),
        }
    }

    /// Run the activation trials for one equipment. At most one instance of
    /// a given pattern is live per equipment at any time. Returns the
    /// instances activated on this tick; their offsets already apply.
    pub fn begin_tick<R: Rng>(&mut self, equipment_id: u32, rng: &mut R) -> Vec<AnomalyInstance> {
        let mut activated = Vec::new();
        for pattern in &self.patterns {
            let already_active = self
                .active
                .get(&equipment_id)
                .map(|instances| instances.iter().any(|i| i.pattern == pattern.name))
                .unwrap_or(false);
            if already_active || !rng.gen_bool(pattern.probability) {
                continue;
            }

            let magnitude = rng.gen_range(pattern.magnitude[0]..=pattern.magnitude[1]);
            let duration = rng.gen_range(pattern.duration_ticks[0]..=pattern.duration_ticks[1]);
            let instance = AnomalyInstance {
                pattern: pattern.name.clone(),
                effect: pattern.effect,
                sensors: pattern.sensors.clone(),
                magnitude,
                duration_ticks: duration,
                remaining_ticks: duration,
            };
            activated.push(instance.clone());
            self.active.entry(equipment_id).or_default().push(instance);
        }
        activated
    }

    /// Activate an instance directly, bypassing the Bernoulli trial. Used for
    /// scripted demo scenarios and deterministic tests.
    pub fn activate(&mut self, equipment_id: u32, instance: AnomalyInstance) {
        let instances = self.active.entry(equipment_id).or_default();
        instances.retain(|existing| existing.pattern != instance.pattern);
        instances.push(instance);
    }

    /// Total offset the active instances contribute to one sensor this tick.
    pub fn offset<R: Rng>(&self, equipment_id: u32, sensor: SensorType, rng: &mut R) -> f64 {
        let Some(instances) = self.active.get(&equipment_id) else {
            return 0.0;
        };

        let mut offset = 0.0;
        for instance in instances {
            if !instance.affects(sensor) {
                continue;
            }
            offset += match instance.effect {
                AnomalyEffect::StepUp => instance.magnitude,
                AnomalyEffect::StepDown => -instance.magnitude,
                AnomalyEffect::Jitter => rng.gen_range(-instance.magnitude..=instance.magnitude),
                AnomalyEffect::Ramp => instance.magnitude * instance.elapsed_ticks() as f64,
            };
        }
        offset
    }

    /// Decrement remaining durations and drop expired instances. The
    /// equipment reverts to baseline generation on the next tick. Returns
    /// the names of the patterns that expired.
    pub fn finish_tick(&mut self, equipment_id: u32) -> Vec<String> {
        let Some(instances) = self.active.get_mut(&equipment_id) else {
            return Vec::new();
        };

        let mut expired = Vec::new();
        instances.retain_mut(|instance| {
            instance.remaining_ticks = instance.remaining_ticks.saturating_sub(1);
            if instance.remaining_ticks == 0 {
                expired.push(instance.pattern.clone());
                false
            } else {
                true
            }
        });
        if instances.is_empty() {
            self.active.remove(&equipment_id);
        }
        expired
    }

    pub fn active(&self, equipment_id: u32) -> Vec<AnomalyInstance> {
        self.active.get(&equipment_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::{AnomalyEffect, AnomalyPatternConfig};
    use crate::registry::SensorType;

    use super::{AnomalyInjector, AnomalyInstance};

    fn certain_pattern() -> AnomalyPatternConfig {
        AnomalyPatternConfig {
            name: "temperature_spike".to_string(),
            probability: 1.0,
            magnitude: [40.0, 40.0],
            duration_ticks: [5, 5],
            effect: AnomalyEffect::StepUp,
            sensors: vec![SensorType::Temperature],
        }
    }

    #[test]
    fn at_most_one_instance_per_pattern_per_equipment() {
        let mut injector = AnomalyInjector::new(vec![certain_pattern()]);
        let mut rng = StdRng::seed_from_u64(7);

        let first = injector.begin_tick(1, &mut rng);
        assert_eq!(first.len(), 1);

        let second = injector.begin_tick(1, &mut rng);
        assert!(second.is_empty());
        assert_eq!(injector.active(1).len(), 1);
    }

    #[test]
    fn offsets_apply_for_the_full_duration_then_expire() {
        let mut injector = AnomalyInjector::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(7);

        injector.activate(
            1,
            AnomalyInstance {
                pattern: "temperature_spike".to_string(),
                effect: AnomalyEffect::StepUp,
                sensors: vec![SensorType::Temperature],
                magnitude: 40.0,
                duration_ticks: 5,
                remaining_ticks: 5,
            },
        );

        for tick in 0..5 {
            let offset = injector.offset(1, SensorType::Temperature, &mut rng);
            assert!((offset - 40.0).abs() < f64::EPSILON, "tick {}", tick);
            let expired = injector.finish_tick(1);
            if tick < 4 {
                assert!(expired.is_empty());
            } else {
                assert_eq!(expired, vec!["temperature_spike".to_string()]);
            }
        }

        let offset = injector.offset(1, SensorType::Temperature, &mut rng);
        assert!(offset.abs() < f64::EPSILON);
        assert!(injector.active(1).is_empty());
    }

    #[test]
    fn multi_sensor_pattern_hits_every_listed_sensor() {
        let mut injector = AnomalyInjector::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(7);

        injector.activate(
            2,
            AnomalyInstance {
                pattern: "sudden_failure".to_string(),
                effect: AnomalyEffect::StepUp,
                sensors: SensorType::ALL.to_vec(),
                magnitude: 60.0,
                duration_ticks: 2,
                remaining_ticks: 2,
            },
        );

        for sensor in SensorType::ALL {
            let offset = injector.offset(2, sensor, &mut rng);
            assert!((offset - 60.0).abs() < f64::EPSILON, "{}", sensor);
        }
    }

    #[test]
    fn ramp_effect_grows_with_elapsed_ticks() {
        let mut injector = AnomalyInjector::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(7);

        injector.activate(
            3,
            AnomalyInstance {
                pattern: "gradual_degradation".to_string(),
                effect: AnomalyEffect::Ramp,
                sensors: vec![SensorType::Vibration],
                magnitude: 0.5,
                duration_ticks: 4,
                remaining_ticks: 4,
            },
        );

        let mut offsets = Vec::new();
        for _ in 0..4 {
            offsets.push(injector.offset(3, SensorType::Vibration, &mut rng));
            injector.finish_tick(3);
        }
        assert_eq!(offsets, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn other_equipment_is_unaffected() {
        let mut injector = AnomalyInjector::new(vec![certain_pattern()]);
        let mut rng = StdRng::seed_from_u64(7);

        injector.begin_tick(1, &mut rng);
        assert!(injector.active(2).is_empty());
        let offset = injector.offset(2, SensorType::Temperature, &mut rng);
        assert!(offset.abs() < f64::EPSILON);
    }
}
