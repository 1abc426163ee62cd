mod defaults;
mod io;
mod schema;
mod validate;

pub use io::load_config;
pub use schema::{
    AlertsConfig, AnomalyConfig, AnomalyEffect, AnomalyPatternConfig, Config, EquipmentConfig,
    FailureBands, HealthBands, Hysteresis, ScoringConfig, SensorBands, SimulatorConfig,
    StoreConfig, Thresholds,
};
pub use validate::ConfigError;
