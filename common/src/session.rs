use tracing::{error, warn};

use crate::{
    config::{ClimateConfig, PersistedClimateState},
    error::ClimateError,
    registry::CommandRegistry,
    types::{ClimateStatus, HvacMode, SensorEvent, STATE_UNKNOWN, SUPPORT_FLAGS},
};

const PRECISION_WHOLE: f64 = 1.0;

/// In-memory climate state plus the rules that turn state changes into
/// remote command strings.
///
/// Every mutating operation returns the commands to send, in order. Sending
/// them is left to the caller.
#[derive(Debug, Clone)]
pub struct ClimateSession {
    registry: CommandRegistry,
    min_temp: f64,
    max_temp: f64,
    target_temp_step: f64,
    combine_commands: bool,

    hvac_mode: HvacMode,
    fan_mode: Option<String>,
    target_temperature: f64,
    last_on_operation: Option<HvacMode>,
    current_temperature: Option<f64>,
}

impl ClimateSession {
    pub fn new(config: &ClimateConfig) -> Result<Self, ClimateError> {
        let mut config = config.clone();
        config.sanitize();

        Ok(Self {
            registry: CommandRegistry::from_config(&config)?,
            min_temp: config.min_temp,
            max_temp: config.max_temp,
            target_temp_step: config.target_temp_step,
            combine_commands: config.combine_commands,
            hvac_mode: HvacMode::Off,
            fan_mode: None,
            target_temperature: config.target_temp,
            last_on_operation: None,
            current_temperature: None,
        })
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn hvac_mode(&self) -> HvacMode {
        self.hvac_mode
    }

    pub fn fan_mode(&self) -> Option<&str> {
        self.fan_mode.as_deref()
    }

    pub fn target_temperature(&self) -> f64 {
        self.target_temperature
    }

    pub fn last_on_operation(&self) -> Option<HvacMode> {
        self.last_on_operation
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    /// Seeds the session from a snapshot taken by a previous run. Fields that
    /// no longer fit the configuration are skipped.
    pub fn restore(&mut self, persisted: &PersistedClimateState) {
        if self.registry.supports_hvac_mode(persisted.hvac_mode) {
            self.hvac_mode = persisted.hvac_mode;
        } else {
            warn!(
                "ignoring restored HVAC mode {} that is not configured",
                persisted.hvac_mode
            );
        }

        self.fan_mode = match &persisted.fan_mode {
            Some(fan_mode) if self.registry.supports_fan_mode(fan_mode) => Some(fan_mode.clone()),
            Some(fan_mode) => {
                warn!("ignoring restored fan mode {fan_mode} that is not configured");
                None
            }
            None => None,
        };

        if self.in_range(persisted.temperature) {
            self.target_temperature = persisted.temperature;
        } else {
            warn!(
                "ignoring restored temperature {} outside [{}, {}]",
                persisted.temperature, self.min_temp, self.max_temp
            );
        }

        self.last_on_operation = persisted
            .last_on_operation
            .filter(|mode| !mode.is_off() && self.registry.supports_hvac_mode(*mode));
    }

    pub fn persisted(&self) -> PersistedClimateState {
        PersistedClimateState {
            hvac_mode: self.hvac_mode,
            fan_mode: self.fan_mode.clone(),
            temperature: self.target_temperature,
            last_on_operation: self.last_on_operation,
            saved_at: None,
        }
    }

    pub fn set_temperature(
        &mut self,
        temperature: Option<f64>,
        hvac_mode: Option<HvacMode>,
    ) -> Vec<String> {
        let mut commands = Vec::new();
        self.apply_temperature(temperature, hvac_mode, &mut commands);
        commands
    }

    pub fn set_hvac_mode(&mut self, hvac_mode: HvacMode) -> Vec<String> {
        let mut commands = Vec::new();
        self.apply_hvac_mode(hvac_mode, &mut commands);
        commands
    }

    pub fn set_fan_mode(&mut self, fan_mode: &str) -> Vec<String> {
        let mut commands = Vec::new();
        self.apply_fan_mode(fan_mode, &mut commands);
        commands
    }

    pub fn turn_off(&mut self) -> Vec<String> {
        self.set_hvac_mode(HvacMode::Off)
    }

    /// Resumes the last non-off mode. Without one the mode stays as it is;
    /// separate-command remotes still get fan and temperature re-sent, which
    /// emits nothing while the mode is off.
    pub fn turn_on(&mut self) -> Vec<String> {
        let mut commands = Vec::new();

        if let Some(mode) = self.last_on_operation {
            self.apply_hvac_mode(mode, &mut commands);
        }

        if !self.combine_commands {
            if let Some(fan_mode) = self.fan_mode.clone() {
                self.apply_fan_mode(&fan_mode, &mut commands);
            }
            self.apply_temperature(None, None, &mut commands);
        }

        commands
    }

    /// Returns whether the displayed state should be refreshed.
    pub fn handle_sensor_event(&mut self, event: &SensorEvent) -> bool {
        let Some(reading) = event.new_state.as_deref() else {
            return false;
        };

        self.update_current_temperature(reading);
        true
    }

    pub fn update_current_temperature(&mut self, reading: &str) -> bool {
        if reading == STATE_UNKNOWN {
            return false;
        }

        match reading.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                self.current_temperature = Some(value);
                true
            }
            Ok(value) => {
                error!("unable to update from temperature sensor: non-finite reading {value}");
                false
            }
            Err(err) => {
                error!("unable to update from temperature sensor: {err} ({reading:?})");
                false
            }
        }
    }

    pub fn status(&self, name: &str) -> ClimateStatus {
        ClimateStatus {
            name: name.to_string(),
            state: self.hvac_mode,
            hvac_mode: self.hvac_mode,
            hvac_modes: self.registry.hvac_modes(),
            fan_mode: self.fan_mode.clone(),
            fan_modes: self.registry.fan_modes(),
            temperature: self.target_temperature,
            current_temperature: self.current_temperature,
            last_on_operation: self.last_on_operation,
            supported_features: SUPPORT_FLAGS,
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            target_temp_step: self.target_temp_step,
        }
    }

    fn apply_temperature(
        &mut self,
        temperature: Option<f64>,
        hvac_mode: Option<HvacMode>,
        commands: &mut Vec<String>,
    ) {
        if let Some(temperature) = temperature {
            if !self.in_range(temperature) {
                warn!(
                    "temperature {temperature} is out of min/max range [{}, {}]",
                    self.min_temp, self.max_temp
                );
                return;
            }
            self.target_temperature = self
                .round_to_step(temperature)
                .clamp(self.min_temp, self.max_temp);
        }

        if let Some(mode) = hvac_mode {
            self.apply_hvac_mode(mode, commands);
        }

        if self.hvac_mode.is_off() {
            return;
        }

        if self.combine_commands {
            commands.push(self.combined_command());
        } else if !self.registry.is_no_temp_mode(self.hvac_mode) {
            commands.push(self.registry.temperature_command(self.target_temperature));
        }
    }

    fn apply_hvac_mode(&mut self, hvac_mode: HvacMode, commands: &mut Vec<String>) {
        let Some(command) = self.registry.hvac_command(hvac_mode).map(str::to_string) else {
            warn!("HVAC mode {hvac_mode} is not configured");
            return;
        };

        self.hvac_mode = hvac_mode;

        if hvac_mode.is_off() {
            commands.push(command);
            return;
        }

        self.last_on_operation = Some(hvac_mode);
        if self.combine_commands {
            commands.push(self.combined_command());
        } else {
            commands.push(command);
            self.apply_temperature(None, None, commands);
        }
    }

    fn apply_fan_mode(&mut self, fan_mode: &str, commands: &mut Vec<String>) {
        let Some(command) = self.registry.fan_command(fan_mode).map(str::to_string) else {
            warn!("fan mode {fan_mode} is not configured");
            return;
        };

        self.fan_mode = Some(fan_mode.to_string());

        if self.hvac_mode.is_off() {
            return;
        }

        if self.combine_commands {
            commands.push(self.combined_command());
        } else {
            commands.push(command);
        }
    }

    /// Mode segment, then fan segment, then the temperature segment unless the
    /// mode carries no temperature.
    fn combined_command(&self) -> String {
        let mut command = self
            .registry
            .hvac_command(self.hvac_mode)
            .unwrap_or_default()
            .to_string();

        if let Some(fan_command) = self
            .fan_mode
            .as_deref()
            .and_then(|fan_mode| self.registry.fan_command(fan_mode))
        {
            command.push_str(fan_command);
        }

        if !self.registry.is_no_temp_mode(self.hvac_mode) {
            command.push_str(&self.registry.temperature_command(self.target_temperature));
        }

        command
    }

    fn in_range(&self, temperature: f64) -> bool {
        (self.min_temp..=self.max_temp).contains(&temperature)
    }

    fn round_to_step(&self, temperature: f64) -> f64 {
        if self.target_temp_step == PRECISION_WHOLE {
            temperature.round_ties_even()
        } else {
            (temperature * 10.0).round_ties_even() / 10.0
        }
    }
}
