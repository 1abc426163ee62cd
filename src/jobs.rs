use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};

use crate::anomaly_journal;
use crate::app_context::AppContext;
use crate::service;
use crate::simulator::SensorReading;
use crate::store::Store;

const READING_RETRY_BACKOFF_MS: u64 = 50;
const JOURNAL_MAINTENANCE_SECS: u64 = 3600;

/// Handles for the periodic tasks. `shutdown` flips the watch flag and
/// waits for every loop to finish its in-flight tick before returning.
pub struct JobHandles {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobHandles {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

pub fn start_background_jobs(ctx: AppContext) -> JobHandles {
    let (shutdown, _) = watch::channel(false);

    let mut handles = vec![
        start_simulator_job(ctx.clone(), shutdown.subscribe()),
        start_predict_job(ctx.clone(), shutdown.subscribe()),
        start_sweep_job(ctx.clone(), shutdown.subscribe()),
        start_retrain_job(ctx.clone(), shutdown.subscribe()),
    ];
    if ctx.config.anomaly.journal_enabled {
        handles.push(start_journal_maintenance_job(ctx, shutdown.subscribe()));
    }

    JobHandles { shutdown, handles }
}

fn start_simulator_job(ctx: AppContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(ctx.config.simulator.tick_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => run_tick(&ctx).await,
                _ = shutdown.changed() => break,
            }
        }
        log::info!("simulator job stopped");
    })
}

/// One generation cycle over every equipment: sample, journal anomaly
/// activity, feed the rolling window, persist, check raw hard thresholds.
async fn run_tick(ctx: &AppContext) {
    let now = Utc::now();
    let tick = {
        let mut simulator = ctx.simulator.lock().await;
        simulator.advance()
    };

    for equipment in ctx.registry.iter() {
        let output = {
            let mut simulator = ctx.simulator.lock().await;
            simulator.tick(equipment, &ctx.config.thresholds, now)
        };

        let failure_probability = ctx
            .scoring
            .latest(equipment.id)
            .map(|assessment| assessment.failure_probability)
            .unwrap_or(0.0);

        for instance in &output.activated {
            anomaly_journal::record_activation(&ctx.config.anomaly, equipment.id, instance, now);
            ctx.alerts
                .on_anomaly_activated(equipment, instance, failure_probability, now)
                .await;
        }
        for pattern in &output.expired {
            anomaly_journal::record_expiry(&ctx.config.anomaly, equipment.id, pattern, now);
        }

        {
            let mut history = ctx.history.write().await;
            for reading in output.readings.values() {
                history.push(reading.clone());
            }
        }
        for reading in output.readings.values() {
            persist_reading_with_retry(&ctx.store, reading).await;
        }

        ctx.alerts
            .on_readings(equipment, &output.readings, failure_probability, now)
            .await;
    }

    if tick % 10 == 0 {
        tracing::info!(
            target: "simulator",
            tick,
            equipment = ctx.registry.len(),
            "tick_complete"
        );
    }
}

/// One bounded retry with backoff; a dropped synthetic sample is logged and
/// tolerated, the tick never stalls on storage.
async fn persist_reading_with_retry(store: &Store, reading: &SensorReading) {
    if store.record_reading(reading).is_ok() {
        return;
    }
    sleep(Duration::from_millis(READING_RETRY_BACKOFF_MS)).await;
    if let Err(error) = store.record_reading(reading) {
        log::warn!(
            "dropping sensor sample for equipment {} ({}): {}",
            reading.equipment_id,
            reading.sensor,
            error
        );
    }
}

fn start_predict_job(ctx: AppContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(ctx.config.scoring.predict_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let computed = service::predict_all(&ctx).await;
                    tracing::debug!(target: "scoring", computed, "predict_batch_complete");
                }
                _ = shutdown.changed() => break,
            }
        }
        log::info!("predict job stopped");
    })
}

fn start_sweep_job(ctx: AppContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sweep_interval = ctx.config.simulator.tick_interval_secs
            * ctx.config.alerts.sweep_every_ticks;
        let mut ticker = interval(Duration::from_secs(sweep_interval.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ctx.alerts.sweep(Utc::now()).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        log::info!("sweep job stopped");
    })
}

fn start_retrain_job(ctx: AppContext, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(
            ctx.config.scoring.retrain_check_hours * 3600,
        ));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service::retrain_if_stale(&ctx).await {
                        Ok(true) => log::info!("scheduled retrain completed"),
                        Ok(false) => {}
                        Err(error) => log::info!(
                            "scheduled retrain skipped, staying in current mode: {}",
                            error
                        ),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        log::info!("retrain job stopped");
    })
}

fn start_journal_maintenance_job(
    ctx: AppContext,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(JOURNAL_MAINTENANCE_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => anomaly_journal::run_maintenance(&ctx.config.anomaly),
                _ = shutdown.changed() => break,
            }
        }
        log::info!("journal maintenance job stopped");
    })
}
