use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to send {command:?} to {remote_entity}: {reason}")]
pub struct DispatchError {
    pub remote_entity: String,
    pub command: String,
    pub reason: String,
}

impl DispatchError {
    pub fn new(remote_entity: &str, command: &str, reason: impl Into<String>) -> Self {
        Self {
            remote_entity: remote_entity.to_string(),
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

/// Delivers one symbolic command to a device behind a remote (IR/RF blaster).
#[async_trait]
pub trait CommandDispatcher: Send {
    async fn send_command(
        &mut self,
        remote_entity: &str,
        device: &str,
        command: &str,
    ) -> Result<(), DispatchError>;
}
