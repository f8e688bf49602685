use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use std::{cell::Cell, rc::Rc};

use super::RigidBody;

/// Test double that records every impulse it receives and counts its own drops.
#[derive(Debug)]
pub struct ProbeBody {
    pub position: Vector3<f64>,
    pub attitude: UnitQuaternion<f64>,
    pub impulses: Vec<(Vector3<f64>, Vector3<f64>)>,
    pub active: bool,
    pub activations: usize,
    drops: Option<Rc<Cell<usize>>>,
}

impl ProbeBody {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            attitude: UnitQuaternion::identity(),
            impulses: Vec::new(),
            active: false,
            activations: 0,
            drops: None,
        }
    }

    pub fn with_drop_counter(mut self, drops: Rc<Cell<usize>>) -> Self {
        self.drops = Some(drops);
        self
    }

    pub fn net_impulse(&self) -> Vector3<f64> {
        self.impulses.iter().map(|(impulse, _)| *impulse).sum()
    }
}

impl RigidBody for ProbeBody {
    fn transform(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.attitude)
    }

    fn apply_impulse(&mut self, impulse: &Vector3<f64>, local_point: &Vector3<f64>) {
        assert!(self.active, "impulse applied to a sleeping body");
        self.impulses.push((*impulse, *local_point));
    }

    fn activate(&mut self) {
        self.active = true;
        self.activations += 1;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for ProbeBody {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.set(drops.get() + 1);
        }
    }
}
