//! Engine error types

use contracts::ContractError;
use dispatcher::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Blueprint rejected before anything was started
    #[error("invalid blueprint: {0}")]
    Config(#[from] ContractError),

    /// A reporting sink could not be created
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<EngineError> for ContractError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => e,
            EngineError::Dispatch(DispatchError::Contract(e)) => e,
            EngineError::Dispatch(DispatchError::SinkCreation { name, message }) => {
                ContractError::SinkConnection {
                    sink_name: name,
                    message,
                }
            }
        }
    }
}
