pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod session;
pub mod template;
pub mod topics;
pub mod types;

pub use config::{ClimateConfig, NetworkConfig, PersistedClimateState, RuntimeConfig};
pub use device::ClimateDevice;
pub use dispatch::{CommandDispatcher, DispatchError};
pub use error::ClimateError;
pub use registry::CommandRegistry;
pub use session::ClimateSession;
pub use template::{format_temperature, TemperatureTemplate, TemplateError};
pub use topics::*;
pub use types::{ClimateStatus, HvacMode, SensorEvent, STATE_UNKNOWN};
