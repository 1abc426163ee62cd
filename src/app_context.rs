use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::alerts::AlertManager;
use crate::config::Config;
use crate::history::ReadingHistory;
use crate::registry::EquipmentRegistry;
use crate::scoring::ScoringEngine;
use crate::simulator::EquipmentSimulator;
use crate::status::StatusMachine;
use crate::store::Store;

/// Shared state handed to the background jobs and the service facade.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub registry: Arc<EquipmentRegistry>,
    pub simulator: Arc<Mutex<EquipmentSimulator>>,
    pub history: Arc<RwLock<ReadingHistory>>,
    pub scoring: Arc<ScoringEngine>,
    pub status: Arc<Mutex<StatusMachine>>,
    pub alerts: Arc<AlertManager>,
    pub store: Store,
}

impl AppContext {
    pub fn new(config: Config, store: Store) -> Result<Self, sled::Error> {
        let registry = Arc::new(EquipmentRegistry::from_config(&config));
        let simulator = EquipmentSimulator::new(
            config.anomaly.patterns.clone(),
            config.simulator.seed,
        );
        let history = ReadingHistory::with_capacity(config.scoring.window_samples);
        let scoring = ScoringEngine::new(
            config.thresholds.clone(),
            &config.scoring,
            store.clone(),
        );
        let status = StatusMachine::new(config.hysteresis, &registry);
        let alerts = AlertManager::new(store.clone(), config.thresholds.clone(), &config.alerts)?;

        Ok(Self {
            config: Arc::new(config),
            registry,
            simulator: Arc::new(Mutex::new(simulator)),
            history: Arc::new(RwLock::new(history)),
            scoring: Arc::new(scoring),
            status: Arc::new(Mutex::new(status)),
            alerts: Arc::new(alerts),
            store,
        })
    }
}
