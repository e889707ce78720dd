use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::{
    config::ClimateConfig, error::ClimateError, template::TemperatureTemplate, types::HvacMode,
};

const DEFAULT_NO_TEMP_HVAC_MODES: [HvacMode; 2] = [HvacMode::Dry, HvacMode::FanOnly];

/// Validated lookup tables from logical modes to remote command strings.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    hvac_commands: BTreeMap<HvacMode, String>,
    fan_commands: BTreeMap<String, String>,
    no_temp_modes: BTreeSet<HvacMode>,
    temperature_template: TemperatureTemplate,
}

impl CommandRegistry {
    pub fn from_config(config: &ClimateConfig) -> Result<Self, ClimateError> {
        let mut hvac_commands = BTreeMap::new();
        for (mode, command) in &config.hvac_modes {
            debug!("processing HVAC mode {mode} with command {command}");
            match HvacMode::from_key(mode) {
                Some(parsed) => {
                    hvac_commands.insert(parsed, command.clone());
                }
                None => warn!("invalid HVAC mode {mode}"),
            }
        }

        if !hvac_commands.contains_key(&HvacMode::Off) {
            return Err(ClimateError::MissingOffCommand);
        }

        let requested: Vec<HvacMode> = if config.no_temp_hvac_modes.is_empty() {
            DEFAULT_NO_TEMP_HVAC_MODES.to_vec()
        } else {
            config
                .no_temp_hvac_modes
                .iter()
                .filter_map(|mode| HvacMode::from_key(mode))
                .collect()
        };
        let no_temp_modes = requested
            .into_iter()
            .filter(|mode| hvac_commands.contains_key(mode))
            .collect();

        Ok(Self {
            hvac_commands,
            fan_commands: config.fan_modes.clone(),
            no_temp_modes,
            temperature_template: TemperatureTemplate::or_default(&config.command_set_temp),
        })
    }

    pub fn hvac_command(&self, mode: HvacMode) -> Option<&str> {
        self.hvac_commands.get(&mode).map(String::as_str)
    }

    pub fn fan_command(&self, fan_mode: &str) -> Option<&str> {
        self.fan_commands.get(fan_mode).map(String::as_str)
    }

    pub fn is_no_temp_mode(&self, mode: HvacMode) -> bool {
        self.no_temp_modes.contains(&mode)
    }

    pub fn supports_hvac_mode(&self, mode: HvacMode) -> bool {
        self.hvac_commands.contains_key(&mode)
    }

    pub fn supports_fan_mode(&self, fan_mode: &str) -> bool {
        self.fan_commands.contains_key(fan_mode)
    }

    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        self.hvac_commands.keys().copied().collect()
    }

    pub fn fan_modes(&self) -> Vec<String> {
        self.fan_commands.keys().cloned().collect()
    }

    pub fn temperature_command(&self, temperature: f64) -> String {
        self.temperature_template.format(temperature)
    }
}
