use thiserror::Error;
use tracing::debug;

use crate::{TensegrityErrors, world::World};

#[derive(Debug, Error)]
pub enum ControllerErrors {
    #[error("motor speed must be positive and finite, got {0}")]
    InvalidSpeed(f64),
    #[error("motor length must be positive and finite, got {0}")]
    InvalidLength(f64),
}

/// Higher level control acting between physics ticks. Controllers observe
/// tensions and lengths and command rest lengths; nothing else.
pub trait Controller {
    fn on_setup(&mut self, _world: &mut World) -> Result<(), TensegrityErrors> {
        Ok(())
    }
    fn on_step(&mut self, world: &mut World, dt: f64) -> Result<(), TensegrityErrors>;
    fn on_teardown(&mut self, _world: &mut World) -> Result<(), TensegrityErrors> {
        Ok(())
    }
}

/// Drives one actuator's rest length towards a target no faster than `max_speed`.
#[derive(Clone, Debug)]
pub struct MotorController {
    actuator: String,
    target: f64,
    max_speed: f64,
    min_length: f64,
}

impl MotorController {
    pub fn new(actuator: &str, target: f64, max_speed: f64) -> Result<Self, ControllerErrors> {
        if !(target > 0.0) || !target.is_finite() {
            return Err(ControllerErrors::InvalidLength(target));
        }
        if !(max_speed > 0.0) || !max_speed.is_finite() {
            return Err(ControllerErrors::InvalidSpeed(max_speed));
        }
        Ok(Self {
            actuator: actuator.to_string(),
            target,
            max_speed,
            min_length: 0.0,
        })
    }

    /// Floor on the commanded rest length, e.g. the length of the spool housing.
    pub fn with_min_length(mut self, min_length: f64) -> Result<Self, ControllerErrors> {
        if !(min_length > 0.0) || !min_length.is_finite() {
            return Err(ControllerErrors::InvalidLength(min_length));
        }
        self.min_length = min_length;
        Ok(self)
    }

    pub fn set_target(&mut self, target: f64) -> Result<(), ControllerErrors> {
        if !(target > 0.0) || !target.is_finite() {
            return Err(ControllerErrors::InvalidLength(target));
        }
        self.target = target;
        Ok(())
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

impl Controller for MotorController {
    fn on_setup(&mut self, world: &mut World) -> Result<(), TensegrityErrors> {
        world.actuator(&self.actuator)?;
        Ok(())
    }

    fn on_step(&mut self, world: &mut World, dt: f64) -> Result<(), TensegrityErrors> {
        let muscle = &mut world.actuator_mut(&self.actuator)?.muscle;
        let current = muscle.rest_length();
        let max_delta = self.max_speed * dt;
        let goal = self.target.max(self.min_length);
        let commanded = current + (goal - current).clamp(-max_delta, max_delta);
        if commanded != current {
            muscle.set_rest_length(commanded)?;
            debug!(actuator = %self.actuator, commanded, "motor command");
        }
        Ok(())
    }
}
