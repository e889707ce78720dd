use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{info, warn};

use ir_climate_common::{sensor_state_topic, STATE_UNKNOWN};

const DEFAULT_ENTITY_ID: &str = "sensor.living_room_temperature";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let entity_id =
        std::env::var("SENSOR_ENTITY_ID").unwrap_or_else(|_| DEFAULT_ENTITY_ID.to_string());
    let interval_secs = std::env::var("SENSOR_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(30);

    let mut mqtt_options = MqttOptions::new("ir-climate-sensor", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);
    let topic = sensor_state_topic(&entity_id);

    // The first reading is not available until the sensor has warmed up.
    mqtt.publish(topic.as_str(), QoS::AtLeastOnce, true, STATE_UNKNOWN)
        .await
        .context("failed to publish initial sensor state")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("sensor feed for {entity_id} publishing to {topic}");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        mqtt.publish(topic.as_str(), QoS::AtLeastOnce, true, simulated_reading(tick))
            .await
            .context("failed to publish sensor temperature")?;
    }
}

/// Slow sawtooth between 21.0 and 22.4 degrees.
fn simulated_reading(tick: u64) -> String {
    let temperature = 21.0 + ((tick % 8) as f64 * 0.2);
    format!("{temperature:.1}")
}
