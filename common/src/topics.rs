pub const TOPIC_REMOTE_SEND_COMMAND: &str = "climate/remote/send_command";

pub const TOPIC_CLIMATE_STATE: &str = "climate/controller/state";

pub const TOPIC_CMD_TEMPERATURE: &str = "climate/cmnd/temperature";
pub const TOPIC_CMD_HVAC_MODE: &str = "climate/cmnd/hvac_mode";
pub const TOPIC_CMD_FAN_MODE: &str = "climate/cmnd/fan_mode";
pub const TOPIC_CMD_POWER: &str = "climate/cmnd/power";

pub fn sensor_state_topic(entity_id: &str) -> String {
    format!("climate/sensor/{entity_id}/state")
}
