use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{template::DEFAULT_TEMPERATURE_TEMPLATE, types::HvacMode};

pub const DEFAULT_NAME: &str = "IR Climate Controller";
pub const DEFAULT_MIN_TEMP: f64 = 16.0;
pub const DEFAULT_MAX_TEMP: f64 = 30.0;
pub const DEFAULT_TARGET_TEMP: f64 = 20.0;
pub const DEFAULT_TARGET_TEMP_STEP: f64 = 1.0;

/// Everything needed to build one climate session and reach its remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub name: String,
    pub remote_entity: String,
    pub device_id: String,
    pub min_temp: f64,
    pub max_temp: f64,
    pub target_temp: f64,
    pub target_temp_step: f64,
    pub temp_sensor: Option<String>,
    pub hvac_modes: BTreeMap<String, String>,
    pub fan_modes: BTreeMap<String, String>,
    pub no_temp_hvac_modes: Vec<String>,
    pub combine_commands: bool,
    pub command_set_temp: String,
    pub debug_mode: bool,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            remote_entity: String::new(),
            device_id: String::new(),
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
            target_temp: DEFAULT_TARGET_TEMP,
            target_temp_step: DEFAULT_TARGET_TEMP_STEP,
            temp_sensor: None,
            hvac_modes: default_hvac_modes(),
            fan_modes: default_fan_modes(),
            no_temp_hvac_modes: Vec::new(),
            combine_commands: true,
            command_set_temp: DEFAULT_TEMPERATURE_TEMPLATE.to_string(),
            debug_mode: false,
        }
    }
}

impl ClimateConfig {
    pub fn sanitize(&mut self) {
        if self.min_temp > self.max_temp {
            std::mem::swap(&mut self.min_temp, &mut self.max_temp);
        }

        if !self.target_temp_step.is_finite() || self.target_temp_step <= 0.0 {
            self.target_temp_step = DEFAULT_TARGET_TEMP_STEP;
        }

        if !self.target_temp.is_finite() {
            self.target_temp = DEFAULT_TARGET_TEMP;
        }
        self.target_temp = self.target_temp.clamp(self.min_temp, self.max_temp);

        self.temp_sensor = self
            .temp_sensor
            .take()
            .map(|sensor| sensor.trim().to_string())
            .filter(|sensor| !sensor.is_empty());
    }
}

fn default_hvac_modes() -> BTreeMap<String, String> {
    [
        (HvacMode::Off, "off"),
        (HvacMode::Heat, "heat"),
        (HvacMode::Cool, "cool"),
        (HvacMode::Auto, "auto"),
    ]
    .into_iter()
    .map(|(mode, command)| (mode.as_str().to_string(), command.to_string()))
    .collect()
}

fn default_fan_modes() -> BTreeMap<String, String> {
    [
        ("auto", "FanAuto"),
        ("high", "FanHigh"),
        ("medium", "FanMedium"),
        ("low", "FanLow"),
    ]
    .into_iter()
    .map(|(mode, command)| (mode.to_string(), command.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            climate: ClimateConfig::default(),
            network: NetworkConfig::default(),
            http_port: default_http_port(),
        }
    }
}

/// Snapshot of the session written after every change and fed back on startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedClimateState {
    pub hvac_mode: HvacMode,
    pub fan_mode: Option<String>,
    pub temperature: f64,
    #[serde(default)]
    pub last_on_operation: Option<HvacMode>,
    #[serde(default)]
    pub saved_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{
            "climate": {
                "remote_entity": "remote.living_room",
                "device_id": "Daikin AC",
                "combine_commands": false
            }
        }"#;

        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.climate.remote_entity, "remote.living_room");
        assert!(!runtime.climate.combine_commands);
        assert_eq!(runtime.climate.min_temp, DEFAULT_MIN_TEMP);
        assert_eq!(runtime.climate.command_set_temp, "{temp:.0f}");
        assert_eq!(runtime.climate.hvac_modes.get("off").map(String::as_str), Some("off"));
        assert_eq!(runtime.network.mqtt_port, 1883);
        assert_eq!(runtime.http_port, 8080);
    }

    #[test]
    fn sanitize_repairs_bounds_and_step() {
        let mut config = ClimateConfig {
            min_temp: 32.0,
            max_temp: 18.0,
            target_temp: 40.0,
            target_temp_step: 0.0,
            temp_sensor: Some("  ".to_string()),
            ..ClimateConfig::default()
        };

        config.sanitize();

        assert_eq!(config.min_temp, 18.0);
        assert_eq!(config.max_temp, 32.0);
        assert_eq!(config.target_temp, 32.0);
        assert_eq!(config.target_temp_step, 1.0);
        assert_eq!(config.temp_sensor, None);
    }

    #[test]
    fn snapshot_without_last_on_operation_deserializes() {
        let raw = r#"{"hvac_mode":"cool","fan_mode":"low","temperature":21.0}"#;
        let state: PersistedClimateState = serde_json::from_str(raw).unwrap();

        assert_eq!(state.hvac_mode, HvacMode::Cool);
        assert_eq!(state.last_on_operation, None);
        assert_eq!(state.saved_at, None);
    }
}
