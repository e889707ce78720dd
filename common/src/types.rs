use serde::{Deserialize, Serialize};

pub const SUPPORT_TARGET_TEMPERATURE: u32 = 1;
pub const SUPPORT_FAN_MODE: u32 = 8;
pub const SUPPORT_FLAGS: u32 = SUPPORT_TARGET_TEMPERATURE | SUPPORT_FAN_MODE;

/// Sensor state value meaning "no reading available yet".
pub const STATE_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    Dry,
    FanOnly,
    Auto,
}

impl HvacMode {
    pub const ALL: [HvacMode; 6] = [
        Self::Off,
        Self::Heat,
        Self::Cool,
        Self::Dry,
        Self::FanOnly,
        Self::Auto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
            Self::Auto => "auto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
    }

    /// Exact match on the canonical name, for keys read from configuration.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == key)
    }

    pub fn is_off(self) -> bool {
        self == Self::Off
    }
}

impl std::fmt::Display for HvacMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One update pushed by the temperature sensor feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEvent {
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
}

/// Externally observable climate properties, re-published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateStatus {
    pub name: String,
    pub state: HvacMode,
    pub hvac_mode: HvacMode,
    pub hvac_modes: Vec<HvacMode>,
    pub fan_mode: Option<String>,
    pub fan_modes: Vec<String>,
    pub temperature: f64,
    pub current_temperature: Option<f64>,
    pub last_on_operation: Option<HvacMode>,
    pub supported_features: u32,
    pub min_temp: f64,
    pub max_temp: f64,
    pub target_temp_step: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes_case_insensitively() {
        assert_eq!(HvacMode::parse("fan_only"), Some(HvacMode::FanOnly));
        assert_eq!(HvacMode::parse(" HEAT "), Some(HvacMode::Heat));
        assert_eq!(HvacMode::parse("heat_cool"), None);
        assert_eq!(HvacMode::parse(""), None);
    }

    #[test]
    fn config_keys_must_match_exactly() {
        assert_eq!(HvacMode::from_key("fan_only"), Some(HvacMode::FanOnly));
        assert_eq!(HvacMode::from_key("HEAT"), None);
        assert_eq!(HvacMode::from_key(" heat "), None);
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&HvacMode::FanOnly).unwrap(),
            "\"fan_only\""
        );
        let mode: HvacMode = serde_json::from_str("\"dry\"").unwrap();
        assert_eq!(mode, HvacMode::Dry);
    }
}
