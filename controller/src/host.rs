use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch, Mutex},
};
use tracing::{error, info, warn};

use ir_climate_common::{
    sensor_state_topic, ClimateDevice, ClimateError, ClimateStatus, HvacMode,
    PersistedClimateState, RuntimeConfig, SensorEvent, TOPIC_CLIMATE_STATE, TOPIC_CMD_FAN_MODE,
    TOPIC_CMD_HVAC_MODE, TOPIC_CMD_POWER, TOPIC_CMD_TEMPERATURE,
};

use crate::remote::RemoteDispatcher;

type Device = ClimateDevice<RemoteDispatcher>;

#[derive(Clone)]
struct AppState {
    device: Arc<Mutex<Device>>,
    mqtt: AsyncClient,
    store: AppStore,
    sensor: Option<SensorFeed>,
    debug_mode: bool,
}

#[derive(Clone)]
struct SensorFeed {
    entity_id: Arc<String>,
    topic: Arc<String>,
    last_state: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    climate_state_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct TemperatureRequest {
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    hvac_mode: Option<String>,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const MQTT_MESSAGE_QUEUE: usize = 64;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.climate.sanitize();

    if runtime.climate.remote_entity.trim().is_empty() || runtime.climate.device_id.trim().is_empty()
    {
        anyhow::bail!(
            "climate.remote_entity and climate.device_id must be set in {}",
            store.runtime_path.display()
        );
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("ir-climate-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let mut device = ClimateDevice::new(&runtime.climate, RemoteDispatcher::new(mqtt.clone()))
        .context("invalid climate configuration")?;

    match store.load_climate_state().await {
        Ok(Some(persisted)) => {
            info!(
                "restoring climate state: mode={} fan={:?} temperature={}",
                persisted.hvac_mode, persisted.fan_mode, persisted.temperature
            );
            device.restore(&persisted);
        }
        Ok(None) => {}
        Err(err) => warn!("failed to load climate state from store: {err:#}"),
    }

    let status_rx = device.subscribe();
    let sensor = device.temp_sensor().map(|entity_id| SensorFeed {
        entity_id: Arc::new(entity_id.to_string()),
        topic: Arc::new(sensor_state_topic(entity_id)),
        last_state: Arc::new(Mutex::new(None)),
    });

    let app_state = AppState {
        device: Arc::new(Mutex::new(device)),
        mqtt,
        store,
        sensor,
        debug_mode: runtime.climate.debug_mode,
    };

    subscribe_topics(&app_state).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_state_publish_loop(app_state.clone(), status_rx);

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/temperature", post(handle_set_temperature))
        .route("/api/hvac_mode", post(handle_set_hvac_mode))
        .route("/api/fan_mode", post(handle_set_fan_mode))
        .route("/api/turn_on", post(handle_turn_on))
        .route("/api/turn_off", post(handle_turn_off))
        .route("/api/remote/diagnostics", get(handle_get_remote_diagnostics))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(app_state: &AppState) -> anyhow::Result<()> {
    let topics = [
        TOPIC_CMD_TEMPERATURE,
        TOPIC_CMD_HVAC_MODE,
        TOPIC_CMD_FAN_MODE,
        TOPIC_CMD_POWER,
    ];

    for topic in topics {
        app_state.mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }

    if let Some(sensor) = &app_state.sensor {
        app_state
            .mqtt
            .subscribe(sensor.topic.as_str(), QoS::AtLeastOnce)
            .await?;
        info!("tracking temperature sensor {}", sensor.entity_id);
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    let (message_tx, mut message_rx) = mpsc::channel::<(String, Vec<u8>)>(MQTT_MESSAGE_QUEUE);

    // Handlers publish through the client; keep them off the polling task.
    tokio::spawn(async move {
        while let Some((topic, payload)) = message_rx.recv().await {
            if let Err(err) = handle_mqtt_message(&app_state, topic, payload).await {
                warn!("mqtt message handling error: {err:#}");
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let topic = message.topic.clone();
                    let payload = message.payload.to_vec();
                    if let Err(err) = message_tx.try_send((message.topic, payload)) {
                        warn!("dropping mqtt message on {topic}: {err}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, mut status_rx: watch::Receiver<ClimateStatus>) {
    tokio::spawn(async move {
        loop {
            let status = status_rx.borrow_and_update().clone();

            match serde_json::to_vec(&status) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CLIMATE_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("climate state publish failed: {err}");
                    }
                }
                Err(err) => warn!("climate state serialization failed: {err}"),
            }

            if let Err(err) = persist_climate_state(&app_state).await {
                warn!("failed to persist climate state: {err:#}");
            }

            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    if let Some(sensor) = app_state
        .sensor
        .as_ref()
        .filter(|sensor| sensor.topic.as_str() == topic)
    {
        let event = {
            let mut last_state = sensor.last_state.lock().await;
            let new_state = sensor_payload_state(&message);
            SensorEvent {
                entity_id: sensor.entity_id.to_string(),
                old_state: std::mem::replace(&mut *last_state, new_state.clone()),
                new_state,
            }
        };
        app_state.device.lock().await.handle_sensor_event(&event);
        return Ok(());
    }

    match topic.as_str() {
        TOPIC_CMD_TEMPERATURE => {
            let Some(request) = parse_temperature_request(&message) else {
                warn!("ignoring malformed temperature command {message:?}");
                return Ok(());
            };
            let hvac_mode = match request.hvac_mode.as_deref() {
                Some(value) => match HvacMode::parse(value) {
                    Some(mode) => Some(mode),
                    None => {
                        warn!("ignoring temperature command with unknown HVAC mode {value:?}");
                        return Ok(());
                    }
                },
                None => None,
            };
            let mut device = app_state.device.lock().await;
            device.set_temperature(request.temperature, hvac_mode).await?;
        }
        TOPIC_CMD_HVAC_MODE => {
            let Some(mode) = HvacMode::parse(&message) else {
                warn!("ignoring unknown HVAC mode {message:?}");
                return Ok(());
            };
            let mut device = app_state.device.lock().await;
            device.set_hvac_mode(mode).await?;
        }
        TOPIC_CMD_FAN_MODE => {
            let mut device = app_state.device.lock().await;
            device.set_fan_mode(message.trim()).await?;
        }
        TOPIC_CMD_POWER => {
            let mut device = app_state.device.lock().await;
            match parse_power(&message) {
                Some(true) => device.turn_on().await?,
                Some(false) => device.turn_off().await?,
                None => warn!("ignoring unknown power command {message:?}"),
            }
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.device.lock().await.status();
    Json(status)
}

async fn handle_set_temperature(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let temperature = match params.get("value") {
        Some(value) => match value.parse::<f64>() {
            Ok(temperature) => Some(temperature),
            Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value"),
        },
        None => None,
    };

    let hvac_mode = match params.get("hvac_mode") {
        Some(value) => match parse_supported_mode(&state, value).await {
            Some(mode) => Some(mode),
            None => return error_response(StatusCode::BAD_REQUEST, "Unsupported HVAC mode"),
        },
        None => None,
    };

    if temperature.is_none() && hvac_mode.is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing 'value' or 'hvac_mode' parameter",
        );
    }

    let result = {
        let mut device = state.device.lock().await;
        device.set_temperature(temperature, hvac_mode).await
    };
    operation_response(state, result).await
}

async fn handle_set_hvac_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = parse_supported_mode(&state, value).await else {
        return error_response(StatusCode::BAD_REQUEST, "Unsupported HVAC mode");
    };

    let result = {
        let mut device = state.device.lock().await;
        device.set_hvac_mode(mode).await
    };
    operation_response(state, result).await
}

async fn handle_set_fan_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let result = {
        let mut device = state.device.lock().await;
        if !device.session().registry().supports_fan_mode(value) {
            return error_response(StatusCode::BAD_REQUEST, "Unsupported fan mode");
        }
        device.set_fan_mode(value).await
    };
    operation_response(state, result).await
}

async fn handle_turn_on(State(state): State<AppState>) -> impl IntoResponse {
    let result = {
        let mut device = state.device.lock().await;
        device.turn_on().await
    };
    operation_response(state, result).await
}

async fn handle_turn_off(State(state): State<AppState>) -> impl IntoResponse {
    let result = {
        let mut device = state.device.lock().await;
        device.turn_off().await
    };
    operation_response(state, result).await
}

async fn handle_get_remote_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let diagnostics = state
        .device
        .lock()
        .await
        .dispatcher()
        .diagnostics(state.debug_mode);
    Json(diagnostics)
}

async fn parse_supported_mode(state: &AppState, value: &str) -> Option<HvacMode> {
    let mode = HvacMode::parse(value)?;
    let device = state.device.lock().await;
    device
        .session()
        .registry()
        .supports_hvac_mode(mode)
        .then_some(mode)
}

async fn operation_response(
    state: AppState,
    result: Result<(), ClimateError>,
) -> axum::response::Response {
    match result {
        Ok(()) => handle_get_status(State(state)).await.into_response(),
        Err(err) => {
            error!("climate operation failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, &err.to_string())
        }
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.ir-climate"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            climate_state_path: Arc::new(data_dir.join("climate_state.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_climate_state(&self) -> anyhow::Result<Option<PersistedClimateState>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.climate_state_path.as_ref()).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<PersistedClimateState>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_climate_state(&self, state: &PersistedClimateState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.climate_state_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

async fn persist_climate_state(state: &AppState) -> anyhow::Result<()> {
    let mut persisted = state.device.lock().await.session().persisted();
    persisted.saved_at = Some(Utc::now().timestamp());
    state.store.save_climate_state(&persisted).await
}

fn parse_temperature_request(message: &str) -> Option<TemperatureRequest> {
    let trimmed = message.trim();
    if let Ok(temperature) = trimmed.parse::<f64>() {
        return Some(TemperatureRequest {
            temperature: Some(temperature),
            hvac_mode: None,
        });
    }

    serde_json::from_str::<TemperatureRequest>(trimmed)
        .ok()
        .filter(|request| request.temperature.is_some() || request.hvac_mode.is_some())
}

fn parse_power(message: &str) -> Option<bool> {
    match message.trim().to_ascii_lowercase().as_str() {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

fn sensor_payload_state(message: &str) -> Option<String> {
    let trimmed = message.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn temperature_command_accepts_number_or_json() {
        assert_eq!(
            parse_temperature_request(" 23.5 "),
            Some(TemperatureRequest {
                temperature: Some(23.5),
                hvac_mode: None,
            })
        );
        assert_eq!(
            parse_temperature_request(r#"{"temperature": 21, "hvac_mode": "cool"}"#),
            Some(TemperatureRequest {
                temperature: Some(21.0),
                hvac_mode: Some("cool".to_string()),
            })
        );
        assert_eq!(parse_temperature_request("{}"), None);
        assert_eq!(parse_temperature_request("warm"), None);
    }

    #[test]
    fn power_command_is_case_insensitive() {
        assert_eq!(parse_power("ON"), Some(true));
        assert_eq!(parse_power(" off\n"), Some(false));
        assert_eq!(parse_power("toggle"), None);
    }

    #[test]
    fn empty_sensor_payload_means_no_state() {
        assert_eq!(sensor_payload_state(""), None);
        assert_eq!(sensor_payload_state("  "), None);
        assert_eq!(sensor_payload_state("unknown"), Some("unknown".to_string()));
        assert_eq!(sensor_payload_state("21.0\n"), Some("21.0".to_string()));
    }
}
