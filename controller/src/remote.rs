use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::warn;

use ir_climate_common::{CommandDispatcher, DispatchError, TOPIC_REMOTE_SEND_COMMAND};

#[derive(Debug, Serialize)]
struct SendCommandPayload<'a> {
    entity_id: &'a str,
    device: &'a str,
    command: &'a str,
}

/// Forwards remote commands to the IR/RF bridge over MQTT.
pub struct RemoteDispatcher {
    mqtt: AsyncClient,
    topic: String,
    sent_commands: u64,
    failed_commands: u64,
    last_command: Option<String>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteDiagnostics {
    pub topic: String,
    #[serde(rename = "debugMode")]
    pub debug_mode: bool,
    #[serde(rename = "sentCommands")]
    pub sent_commands: u64,
    #[serde(rename = "failedCommands")]
    pub failed_commands: u64,
    #[serde(rename = "lastCommand")]
    pub last_command: Option<String>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl RemoteDispatcher {
    pub fn new(mqtt: AsyncClient) -> Self {
        Self {
            mqtt,
            topic: TOPIC_REMOTE_SEND_COMMAND.to_string(),
            sent_commands: 0,
            failed_commands: 0,
            last_command: None,
            last_error: None,
        }
    }

    pub fn diagnostics(&self, debug_mode: bool) -> RemoteDiagnostics {
        RemoteDiagnostics {
            topic: self.topic.clone(),
            debug_mode,
            sent_commands: self.sent_commands,
            failed_commands: self.failed_commands,
            last_command: self.last_command.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(
        &self,
        remote_entity: &str,
        device: &str,
        command: &str,
    ) -> Result<(), DispatchError> {
        let body = encode_payload(remote_entity, device, command)
            .map_err(|err| DispatchError::new(remote_entity, command, err.to_string()))?;

        // A full request queue fails the command instead of waiting for room.
        self.mqtt
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, false, body)
            .map_err(|err| DispatchError::new(remote_entity, command, err.to_string()))
    }
}

#[async_trait]
impl CommandDispatcher for RemoteDispatcher {
    async fn send_command(
        &mut self,
        remote_entity: &str,
        device: &str,
        command: &str,
    ) -> Result<(), DispatchError> {
        let result = self.publish(remote_entity, device, command);
        self.last_command = Some(command.to_string());

        match &result {
            Ok(()) => {
                self.sent_commands = self.sent_commands.saturating_add(1);
                self.last_error = None;
            }
            Err(err) => {
                warn!("remote command failed: {err}");
                self.failed_commands = self.failed_commands.saturating_add(1);
                self.last_error = Some(err.to_string());
            }
        }

        result
    }
}

fn encode_payload(
    remote_entity: &str,
    device: &str,
    command: &str,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SendCommandPayload {
        entity_id: remote_entity,
        device,
        command,
    })
}
