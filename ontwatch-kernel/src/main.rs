/**
 * ONTWATCH - Point d'entrée du moniteur d'ONT
 *
 * RÔLE : Bootstrap : .env, logs, config, MQTT (optionnel), notifier, source GenieACS,
 * état persistant, puis planification des cycles de polling jusqu'à Ctrl-C.
 *
 * PLANIFICATION : premier cycle après un court délai, puis un cycle par intervalle.
 * Un tick qui tombe pendant un cycle en cours est ignoré par le moniteur.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ontwatch_kernel::config::load_config;
use ontwatch_kernel::genieacs::GenieAcsSource;
use ontwatch_kernel::health::spawn_health_publisher;
use ontwatch_kernel::monitor::{CycleOutcome, MonitorCycle};
use ontwatch_kernel::store::StateStore;
use ontwatch_kernel::{mqtt, notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Ok si .env n'existe pas
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ontwatch_kernel=info,ontwatch=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = load_config().await;
    info!(
        url = %cfg.genieacs.url,
        interval_min = cfg.monitor.poll_interval_minutes,
        threshold = cfg.monitor.rx_warning_threshold,
        recipients = cfg.notify.recipients.len(),
        "ontwatch starting"
    );
    if cfg.notify.recipients.is_empty() {
        warn!("no alert recipients configured, alerts will only be logged");
    }

    // client MQTT partagé (alertes + health), seulement si un broker est configuré
    let mqtt_client = cfg.mqtt.as_ref().map(|conf| mqtt::connect(conf, "ontwatch"));

    let notifier = notifier::from_config(&cfg.notify, mqtt_client.clone()).context("failed to build notifier")?;

    let source = GenieAcsSource::builder()
        .endpoint(cfg.genieacs.url.clone())
        .credentials(cfg.genieacs.username.clone(), cfg.genieacs.password.clone())
        .timeout(Duration::from_secs(cfg.genieacs.timeout_secs))
        .build()
        .context("invalid GenieACS configuration")?;

    let store = StateStore::new(cfg.monitor.state_file.clone());
    let monitor = Arc::new(MonitorCycle::start(Arc::new(source), notifier, store, cfg.monitor_settings()).await);
    info!(tracked = monitor.device_states().len(), "device state loaded");

    if cfg.health.publish {
        match mqtt_client {
            Some(client) => spawn_health_publisher(
                monitor.clone(),
                client,
                cfg.health.topic.clone(),
                Duration::from_secs(cfg.health.interval_secs.max(1)),
            ),
            None => warn!("health publishing enabled but no MQTT broker configured"),
        }
    }

    let initial_delay = cfg.initial_delay();
    let every = cfg.poll_interval();
    let scheduler = monitor.clone();
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let monitor = scheduler.clone();
            // un cycle par tâche, le moniteur ignore les ticks concurrents
            tokio::spawn(async move {
                if let CycleOutcome::Skipped = monitor.run_cycle().await {
                    info!("tick ignored, a cycle is still running");
                }
            });
        }
    });

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutting down");
    Ok(())
}
