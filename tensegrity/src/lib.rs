pub mod actuator;
pub mod anchor;
pub mod body;
pub mod controller;
pub mod world;

use actuator::ActuatorErrors;
use body::BodyErrors;
use controller::ControllerErrors;
use tensegrity_result::ResultErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TensegrityErrors {
    #[error("{0}")]
    Actuator(#[from] ActuatorErrors),
    #[error("could not find actuator '{0}' in the world")]
    ActuatorNotFound(String),
    #[error("{0}")]
    Body(#[from] BodyErrors),
    #[error("could not find body '{0}' in the world")]
    BodyNotFound(String),
    #[error("{0}")]
    Controller(#[from] ControllerErrors),
    #[error("run duration must be non-negative and finite, got {0}")]
    InvalidDuration(f64),
    #[error("world dt must be positive and finite, got {0}")]
    InvalidTimestep(f64),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("the name '{0}' is already taken")]
    NameTaken(String),
    #[error("{0}")]
    Result(#[from] ResultErrors),
    #[error("{0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("{0}")]
    RonWrite(#[from] ron::Error),
    #[error("could not find shared anchor '{0}'")]
    SharedAnchorNotFound(String),
}
