use tokio::sync::watch;
use tracing::debug;

use crate::{
    config::{ClimateConfig, PersistedClimateState},
    dispatch::CommandDispatcher,
    error::ClimateError,
    session::ClimateSession,
    types::{ClimateStatus, HvacMode, SensorEvent},
};

/// A climate session bound to its remote.
///
/// Operations run the session transition, send the resulting commands one
/// at a time and then publish the new [`ClimateStatus`]. The first failed
/// send aborts the rest and is returned; the status is published either way.
pub struct ClimateDevice<D> {
    name: String,
    remote_entity: String,
    device_id: String,
    temp_sensor: Option<String>,
    debug_mode: bool,
    session: ClimateSession,
    dispatcher: D,
    status_tx: watch::Sender<ClimateStatus>,
}

impl<D: CommandDispatcher> ClimateDevice<D> {
    pub fn new(config: &ClimateConfig, dispatcher: D) -> Result<Self, ClimateError> {
        let session = ClimateSession::new(config)?;
        let (status_tx, _) = watch::channel(session.status(&config.name));

        Ok(Self {
            name: config.name.clone(),
            remote_entity: config.remote_entity.clone(),
            device_id: config.device_id.clone(),
            temp_sensor: config.temp_sensor.clone(),
            debug_mode: config.debug_mode,
            session,
            dispatcher,
            status_tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ClimateStatus> {
        self.status_tx.subscribe()
    }

    pub fn session(&self) -> &ClimateSession {
        &self.session
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn temp_sensor(&self) -> Option<&str> {
        self.temp_sensor.as_deref()
    }

    pub fn status(&self) -> ClimateStatus {
        self.session.status(&self.name)
    }

    pub fn restore(&mut self, persisted: &PersistedClimateState) {
        self.session.restore(persisted);
        self.notify();
    }

    pub async fn set_temperature(
        &mut self,
        temperature: Option<f64>,
        hvac_mode: Option<HvacMode>,
    ) -> Result<(), ClimateError> {
        let commands = self.session.set_temperature(temperature, hvac_mode);
        self.finish(commands).await
    }

    pub async fn set_hvac_mode(&mut self, hvac_mode: HvacMode) -> Result<(), ClimateError> {
        let commands = self.session.set_hvac_mode(hvac_mode);
        self.finish(commands).await
    }

    pub async fn set_fan_mode(&mut self, fan_mode: &str) -> Result<(), ClimateError> {
        let commands = self.session.set_fan_mode(fan_mode);
        self.finish(commands).await
    }

    pub async fn turn_on(&mut self) -> Result<(), ClimateError> {
        let commands = self.session.turn_on();
        self.finish(commands).await
    }

    pub async fn turn_off(&mut self) -> Result<(), ClimateError> {
        let commands = self.session.turn_off();
        self.finish(commands).await
    }

    pub fn handle_sensor_event(&mut self, event: &SensorEvent) {
        if self
            .temp_sensor
            .as_deref()
            .is_some_and(|sensor| sensor != event.entity_id)
        {
            debug!("ignoring update from unrelated sensor {}", event.entity_id);
            return;
        }

        if self.session.handle_sensor_event(event) {
            self.notify();
        }
    }

    async fn finish(&mut self, commands: Vec<String>) -> Result<(), ClimateError> {
        let result = self.send_commands(&commands).await;
        self.notify();
        result
    }

    async fn send_commands(&mut self, commands: &[String]) -> Result<(), ClimateError> {
        for command in commands {
            debug!(
                "remote.send_command entity_id={} device={} command={command}",
                self.remote_entity, self.device_id
            );

            if self.debug_mode {
                continue;
            }

            self.dispatcher
                .send_command(&self.remote_entity, &self.device_id, command)
                .await?;
        }
        Ok(())
    }

    fn notify(&self) {
        self.status_tx.send_replace(self.status());
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dispatch::DispatchError;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Vec<(String, String, String)>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl CommandDispatcher for RecordingDispatcher {
        async fn send_command(
            &mut self,
            remote_entity: &str,
            device: &str,
            command: &str,
        ) -> Result<(), DispatchError> {
            if self.fail_on.as_deref() == Some(command) {
                return Err(DispatchError::new(remote_entity, command, "remote offline"));
            }
            self.sent
                .push((remote_entity.to_string(), device.to_string(), command.to_string()));
            Ok(())
        }
    }

    fn config(combine_commands: bool) -> ClimateConfig {
        ClimateConfig {
            name: "Office AC".to_string(),
            remote_entity: "remote.office".to_string(),
            device_id: "Fujitsu".to_string(),
            target_temp: 22.0,
            temp_sensor: Some("sensor.office_temperature".to_string()),
            hvac_modes: [("off", "Off"), ("heat", "Heat"), ("cool", "Cool")]
                .into_iter()
                .map(|(mode, command)| (mode.to_string(), command.to_string()))
                .collect(),
            fan_modes: [("low", "FanLow")]
                .into_iter()
                .map(|(mode, command)| (mode.to_string(), command.to_string()))
                .collect(),
            combine_commands,
            ..ClimateConfig::default()
        }
    }

    fn device(combine_commands: bool) -> ClimateDevice<RecordingDispatcher> {
        ClimateDevice::new(&config(combine_commands), RecordingDispatcher::default()).unwrap()
    }

    fn sent_commands(device: &ClimateDevice<RecordingDispatcher>) -> Vec<&str> {
        device
            .dispatcher()
            .sent
            .iter()
            .map(|(_, _, command)| command.as_str())
            .collect()
    }

    #[tokio::test]
    async fn combined_mode_sends_one_command_per_operation() {
        let mut device = device(true);
        device.set_fan_mode("low").await.unwrap();
        device.set_hvac_mode(HvacMode::Heat).await.unwrap();

        assert_eq!(
            device.dispatcher().sent,
            vec![(
                "remote.office".to_string(),
                "Fujitsu".to_string(),
                "HeatFanLow22".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn separate_mode_sends_commands_in_order() {
        let mut device = device(false);
        device.set_hvac_mode(HvacMode::Heat).await.unwrap();
        device.turn_off().await.unwrap();

        assert_eq!(sent_commands(&device), vec!["Heat", "22", "Off"]);
    }

    #[tokio::test]
    async fn debug_mode_skips_dispatch() {
        let mut config = config(true);
        config.debug_mode = true;
        let mut device = ClimateDevice::new(&config, RecordingDispatcher::default()).unwrap();

        device.set_hvac_mode(HvacMode::Cool).await.unwrap();

        assert!(device.dispatcher().sent.is_empty());
        assert_eq!(device.status().hvac_mode, HvacMode::Cool);
    }

    #[tokio::test]
    async fn dispatch_failure_stops_sequence_and_propagates() {
        let mut device = device(false);
        device.dispatcher.fail_on = Some("Heat".to_string());
        let mut status = device.subscribe();

        let result = device.set_hvac_mode(HvacMode::Heat).await;

        match result {
            Err(ClimateError::Dispatch(err)) => {
                assert_eq!(err.command, "Heat");
                assert_eq!(err.remote_entity, "remote.office");
            }
            other => panic!("expected dispatch error, got {other:?}"),
        }
        assert!(sent_commands(&device).is_empty());
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().hvac_mode, HvacMode::Heat);
    }

    #[tokio::test]
    async fn every_operation_publishes_status() {
        let mut device = device(true);
        let mut status = device.subscribe();

        device.set_temperature(Some(25.0), None).await.unwrap();
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().temperature, 25.0);

        // Rejected values still refresh the display.
        device.set_temperature(Some(99.0), None).await.unwrap();
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().temperature, 25.0);

        device.turn_on().await.unwrap();
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().hvac_mode, HvacMode::Off);
    }

    #[tokio::test]
    async fn sensor_updates_never_dispatch() {
        let mut device = device(true);
        device.set_hvac_mode(HvacMode::Heat).await.unwrap();
        let mut status = device.subscribe();

        device.handle_sensor_event(&SensorEvent {
            entity_id: "sensor.office_temperature".to_string(),
            old_state: None,
            new_state: Some("23.4".to_string()),
        });

        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().current_temperature, Some(23.4));
        assert_eq!(sent_commands(&device), vec!["Heat22"]);

        device.handle_sensor_event(&SensorEvent {
            entity_id: "sensor.hallway_temperature".to_string(),
            old_state: None,
            new_state: Some("10.0".to_string()),
        });

        assert!(!status.has_changed().unwrap());
        assert_eq!(device.session().current_temperature(), Some(23.4));
    }

    #[tokio::test]
    async fn restore_publishes_seeded_state() {
        let mut device = device(true);
        let status = device.subscribe();

        device.restore(&PersistedClimateState {
            hvac_mode: HvacMode::Cool,
            fan_mode: Some("low".to_string()),
            temperature: 18.0,
            last_on_operation: Some(HvacMode::Cool),
            saved_at: None,
        });

        assert_eq!(status.borrow().hvac_mode, HvacMode::Cool);
        device.turn_off().await.unwrap();
        device.turn_on().await.unwrap();
        assert_eq!(sent_commands(&device), vec!["Off", "CoolFanLow18"]);
    }
}
