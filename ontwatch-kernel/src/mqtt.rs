use crate::config::MqttConf;
use rumqttc::{AsyncClient, MqttOptions};
use std::time::Duration;
use tokio::task;
use tracing::warn;

/// Crée le client MQTT partagé et fait tourner sa boucle d'événements en tâche de fond.
/// Le client ne fait que publier (alertes, health) : les événements entrants sont ignorés.
pub fn connect(conf: &MqttConf, client_id: &str) -> AsyncClient {
    let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);

    task::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!("[mqtt] connection error: {e:?}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    client
}
