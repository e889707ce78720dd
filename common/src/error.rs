use thiserror::Error;

use crate::dispatch::DispatchError;

#[derive(Debug, Error)]
pub enum ClimateError {
    #[error("hvac_modes must map 'off' to a command")]
    MissingOffCommand,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
