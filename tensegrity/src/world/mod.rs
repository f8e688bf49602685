use nalgebra::Vector3;
use std::{cell::RefCell, rc::Rc};
use tensegrity_result::{ResultManager, SimResult};
use tracing::info;

use crate::{
    TensegrityErrors,
    actuator::Actuator,
    body::{Body, BodyRef},
    controller::Controller,
};

pub mod builder;

pub use builder::{AnchorBuilder, CableBuilder, SharedAnchorBuilder, WorldBuilder};

/// Steps a set of free bodies and the muscles strung between them.
///
/// Each tick runs every actuator once, applying its impulses, then
/// integrates every body. Actuators only interact through the bodies, so
/// their order within a tick does not matter.
#[derive(Debug)]
pub struct World {
    actuators: Vec<Actuator>,
    bodies: Vec<Rc<RefCell<Body>>>,
    dt: f64,
    pub gravity: Vector3<f64>,
    time: f64,
}

impl World {
    pub fn new(dt: f64, gravity: Vector3<f64>) -> Result<Self, TensegrityErrors> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(TensegrityErrors::InvalidTimestep(dt));
        }
        Ok(Self {
            actuators: Vec::new(),
            bodies: Vec::new(),
            dt,
            gravity,
            time: 0.0,
        })
    }

    /// Adds a body and returns the handle anchors should be built against.
    pub fn add_body(&mut self, body: Body) -> Result<BodyRef, TensegrityErrors> {
        if self.bodies.iter().any(|b| b.borrow().name == body.name) {
            return Err(TensegrityErrors::NameTaken(body.name));
        }
        let body = Rc::new(RefCell::new(body));
        self.bodies.push(body.clone());
        Ok(BodyRef::from(body))
    }

    pub fn add_actuator(&mut self, actuator: Actuator) -> Result<(), TensegrityErrors> {
        if self.actuators.iter().any(|a| a.name == actuator.name) {
            return Err(TensegrityErrors::NameTaken(actuator.name));
        }
        self.actuators.push(actuator);
        Ok(())
    }

    pub fn actuator(&self, name: &str) -> Result<&Actuator, TensegrityErrors> {
        self.actuators
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| TensegrityErrors::ActuatorNotFound(name.to_string()))
    }

    pub fn actuator_mut(&mut self, name: &str) -> Result<&mut Actuator, TensegrityErrors> {
        self.actuators
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| TensegrityErrors::ActuatorNotFound(name.to_string()))
    }

    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    pub fn body(&self, name: &str) -> Result<Rc<RefCell<Body>>, TensegrityErrors> {
        self.bodies
            .iter()
            .find(|b| b.borrow().name == name)
            .cloned()
            .ok_or_else(|| TensegrityErrors::BodyNotFound(name.to_string()))
    }

    pub fn bodies(&self) -> &[Rc<RefCell<Body>>] {
        &self.bodies
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Elastic tension of every actuator, in insertion order.
    pub fn tensions(&self) -> Vec<f64> {
        self.actuators.iter().map(|a| a.muscle.tension()).collect()
    }

    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.bodies
            .iter()
            .map(|b| b.borrow().linear_momentum())
            .sum()
    }

    pub fn step(&mut self) -> Result<(), TensegrityErrors> {
        for actuator in &mut self.actuators {
            actuator.step(self.dt)?;
        }
        for body in &self.bodies {
            body.borrow_mut().integrate(self.dt, &self.gravity);
        }
        self.time += self.dt;
        Ok(())
    }

    /// Runs for `duration` seconds. Controllers act before every tick and
    /// results, when requested, are written after every tick. Calling `run`
    /// again with the same `ResultManager` continues the same files.
    pub fn run(
        &mut self,
        duration: f64,
        controllers: &mut [Box<dyn Controller>],
        mut results: Option<&mut ResultManager>,
    ) -> Result<(), TensegrityErrors> {
        if !(duration >= 0.0) || !duration.is_finite() {
            return Err(TensegrityErrors::InvalidDuration(duration));
        }
        let nsteps = (duration / self.dt).round() as usize;
        info!(
            nsteps,
            dt = self.dt,
            actuators = self.actuators.len(),
            bodies = self.bodies.len(),
            "running world"
        );

        for controller in controllers.iter_mut() {
            controller.on_setup(self)?;
        }
        if let Some(results) = results.as_deref_mut() {
            let open = results.writer_count();
            self.new_result(results)?;
            // a resumed run appends to its files, its starting row is already there
            if results.writer_count() > open {
                self.write_result(results)?;
            }
        }

        let dt = self.dt;
        for _ in 0..nsteps {
            for controller in controllers.iter_mut() {
                controller.on_step(self, dt)?;
            }
            self.step()?;
            if let Some(results) = results.as_deref_mut() {
                self.write_result(results)?;
            }
        }

        if let Some(results) = results {
            results.flush()?;
        }
        for controller in controllers.iter_mut() {
            controller.on_teardown(self)?;
        }
        info!(time = self.time, "world run finished");
        Ok(())
    }

    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), TensegrityErrors> {
        for actuator in &mut self.actuators {
            actuator.new_result(results)?;
        }
        for body in &self.bodies {
            body.borrow_mut().new_result(results)?;
        }
        Ok(())
    }

    fn write_result(&self, results: &mut ResultManager) -> Result<(), TensegrityErrors> {
        for actuator in &self.actuators {
            actuator.write_result(self.time, results)?;
        }
        for body in &self.bodies {
            body.borrow().write_result(self.time, results)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actuator::Muscle, anchor::Anchor};
    use approx::assert_abs_diff_eq;
    use mass_properties::MassProperties;

    fn two_body_world(separation: f64) -> (World, BodyRef, BodyRef) {
        let mut world = World::new(0.001, Vector3::zeros()).unwrap();
        let mp = MassProperties::sphere(1.0, 0.1).unwrap();
        let a = world.add_body(Body::new("a", mp, Vector3::zeros())).unwrap();
        let b = world
            .add_body(Body::new("b", mp, Vector3::new(separation, 0.0, 0.0)))
            .unwrap();
        (world, a, b)
    }

    #[test]
    fn test_invalid_timestep() {
        assert!(matches!(
            World::new(0.0, Vector3::zeros()),
            Err(TensegrityErrors::InvalidTimestep(_))
        ));
    }

    #[test]
    fn test_duplicate_names() {
        let (mut world, a, b) = two_body_world(1.0);
        let mp = MassProperties::sphere(1.0, 0.1).unwrap();
        assert!(matches!(
            world.add_body(Body::new("a", mp, Vector3::zeros())),
            Err(TensegrityErrors::NameTaken(_))
        ));

        let muscle = |a: &BodyRef, b: &BodyRef| {
            Muscle::new(
                vec![
                    Anchor::new(a.clone(), Vector3::zeros()).into(),
                    Anchor::new(b.clone(), Vector3::zeros()).into(),
                ],
                10.0,
                0.0,
                0.0,
            )
            .unwrap()
        };
        world.add_actuator(Actuator::new("c", muscle(&a, &b))).unwrap();
        assert!(matches!(
            world.add_actuator(Actuator::new("c", muscle(&a, &b))),
            Err(TensegrityErrors::NameTaken(_))
        ));
        assert!(matches!(
            world.actuator("missing"),
            Err(TensegrityErrors::ActuatorNotFound(_))
        ));
    }

    #[test]
    fn test_step_advances_time() {
        let (mut world, _, _) = two_body_world(1.0);
        for _ in 0..10 {
            world.step().unwrap();
        }
        assert_abs_diff_eq!(world.time(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_stretched_cable_pulls_bodies_together() {
        let (mut world, a, b) = two_body_world(1.2);
        let muscle = Muscle::new(
            vec![
                Anchor::new(a, Vector3::zeros()).into(),
                Anchor::new(b, Vector3::zeros()).into(),
            ],
            500.0,
            0.0,
            100.0,
        )
        .unwrap();
        assert_abs_diff_eq!(muscle.rest_length(), 1.0, epsilon = 1e-12);
        world.add_actuator(Actuator::new("cable", muscle)).unwrap();

        world.step().unwrap();
        let b = world.body("b").unwrap();
        // 100 N for 1 ms on 1 kg
        assert_abs_diff_eq!(b.borrow().state.velocity[0], -0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(world.linear_momentum(), Vector3::zeros(), epsilon = 1e-12);
    }
}
