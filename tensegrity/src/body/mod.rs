use mass_properties::{MassProperties, MassPropertiesBuilder, MassPropertiesErrors};
use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};
use tensegrity_result::{ResultErrors, ResultManager, SimResult};
use thiserror::Error;
use tracing::debug;
use uncertainty::Uncertainty;

#[cfg(test)]
pub(crate) mod probe;

/// Linear speed below which a body starts counting towards sleep.
pub const LINEAR_SLEEP_THRESHOLD: f64 = 0.8;
/// Angular speed below which a body starts counting towards sleep.
pub const ANGULAR_SLEEP_THRESHOLD: f64 = 1.0;
/// Time a body must stay under both thresholds before it is put to sleep.
pub const DEACTIVATION_TIME: f64 = 2.0;

#[derive(Debug, Error)]
pub enum BodyErrors {
    #[error("name cannot be empty for body")]
    EmptyName,
    #[error("{0}")]
    MassProperties(#[from] MassPropertiesErrors),
}

/// What an actuator needs from the physics world's rigid bodies.
///
/// Impulses are given in the world frame. The application point is the
/// attachment offset from the center of mass, expressed in the body frame.
pub trait RigidBody {
    fn transform(&self) -> Isometry3<f64>;
    fn apply_impulse(&mut self, impulse: &Vector3<f64>, local_point: &Vector3<f64>);
    fn activate(&mut self);
    fn is_active(&self) -> bool;
}

/// Shared handle to a rigid body. Anchors hold clones of this, never the body itself.
#[derive(Clone)]
pub struct BodyRef(Rc<RefCell<dyn RigidBody>>);

impl BodyRef {
    pub fn new<B: RigidBody + 'static>(body: B) -> Self {
        Self(Rc::new(RefCell::new(body)))
    }

    #[inline]
    pub fn transform(&self) -> Isometry3<f64> {
        self.0.borrow().transform()
    }

    #[inline]
    pub fn apply_impulse(&self, impulse: &Vector3<f64>, local_point: &Vector3<f64>) {
        self.0.borrow_mut().apply_impulse(impulse, local_point)
    }

    #[inline]
    pub fn activate(&self) {
        self.0.borrow_mut().activate()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0.borrow().is_active()
    }

    pub fn ptr_eq(&self, other: &BodyRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<B: RigidBody + 'static> From<Rc<RefCell<B>>> for BodyRef {
    fn from(body: Rc<RefCell<B>>) -> Self {
        Self(body)
    }
}

impl Debug for BodyRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyRef")
            .field(&self.transform().translation.vector)
            .finish()
    }
}

fn zeros() -> Vector3<f64> {
    Vector3::zeros()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyBuilder {
    pub name: String,
    /// None makes the body fixed in the world (infinite mass).
    pub mass_properties: Option<MassPropertiesBuilder>,
    #[serde(default = "zeros")]
    pub position: Vector3<f64>,
    /// Initial attitude as a scaled rotation axis (radians).
    #[serde(default = "zeros")]
    pub rotation: Vector3<f64>,
    #[serde(default = "zeros")]
    pub velocity: Vector3<f64>,
    #[serde(default = "zeros")]
    pub angular_rate: Vector3<f64>,
}

impl BodyBuilder {
    pub fn new(name: &str, mass_properties: MassPropertiesBuilder) -> Result<Self, BodyErrors> {
        if name.is_empty() {
            return Err(BodyErrors::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            mass_properties: Some(mass_properties),
            position: Vector3::zeros(),
            rotation: Vector3::zeros(),
            velocity: Vector3::zeros(),
            angular_rate: Vector3::zeros(),
        })
    }

    pub fn fixed(name: &str) -> Result<Self, BodyErrors> {
        let mut builder = Self::new(name, MassPropertiesBuilder::default())?;
        builder.mass_properties = None;
        Ok(builder)
    }

    pub fn with_position(mut self, x: f64, y: f64, z: f64) -> Self {
        self.position = Vector3::new(x, y, z);
        self
    }

    pub fn with_rotation(mut self, scaled_axis: Vector3<f64>) -> Self {
        self.rotation = scaled_axis;
        self
    }

    pub fn with_velocity(mut self, x: f64, y: f64, z: f64) -> Self {
        self.velocity = Vector3::new(x, y, z);
        self
    }
}

impl Uncertainty for BodyBuilder {
    type Error = BodyErrors;
    type Output = Body;

    fn sample(&self, nominal: bool, rng: &mut SmallRng) -> Result<Body, BodyErrors> {
        if self.name.is_empty() {
            return Err(BodyErrors::EmptyName);
        }
        let mass_properties = match &self.mass_properties {
            Some(builder) => Some(builder.sample(nominal, rng)?),
            None => None,
        };
        let mut body = Body {
            name: self.name.clone(),
            mass_properties,
            state: BodyState::new(
                self.position,
                UnitQuaternion::from_scaled_axis(self.rotation),
            ),
            active: true,
            sleep_timer: 0.0,
            result_id: None,
        };
        body.state.velocity = self.velocity;
        body.state.angular_rate = self.angular_rate;
        Ok(body)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: Vector3<f64>,
    /// Rotation from the body frame to the world frame.
    pub attitude: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    /// Angular rate in the world frame.
    pub angular_rate: Vector3<f64>,
}

impl BodyState {
    pub fn new(position: Vector3<f64>, attitude: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            attitude,
            velocity: Vector3::zeros(),
            angular_rate: Vector3::zeros(),
        }
    }
}

/// A free rigid body whose origin is its center of mass.
#[derive(Clone, Debug)]
pub struct Body {
    pub name: String,
    mass_properties: Option<MassProperties>,
    pub state: BodyState,
    active: bool,
    sleep_timer: f64,
    result_id: Option<u32>,
}

impl Body {
    pub fn new(name: &str, mass_properties: MassProperties, position: Vector3<f64>) -> Self {
        Self {
            name: name.to_string(),
            mass_properties: Some(mass_properties),
            state: BodyState::new(position, UnitQuaternion::identity()),
            active: true,
            sleep_timer: 0.0,
            result_id: None,
        }
    }

    pub fn fixed(name: &str, position: Vector3<f64>) -> Self {
        Self {
            name: name.to_string(),
            mass_properties: None,
            state: BodyState::new(position, UnitQuaternion::identity()),
            active: true,
            sleep_timer: 0.0,
            result_id: None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.mass_properties.is_none()
    }

    pub fn mass_properties(&self) -> Option<&MassProperties> {
        self.mass_properties.as_ref()
    }

    pub fn linear_momentum(&self) -> Vector3<f64> {
        match &self.mass_properties {
            Some(mp) => self.state.velocity * mp.mass,
            None => Vector3::zeros(),
        }
    }

    fn inverse_inertia_world(&self, mp: &MassProperties) -> Matrix3<f64> {
        let r = self.state.attitude.to_rotation_matrix();
        r.matrix() * mp.inverse_inertia() * r.matrix().transpose()
    }

    /// Semi-implicit Euler step. Fixed and sleeping bodies do not move.
    pub fn integrate(&mut self, dt: f64, gravity: &Vector3<f64>) {
        if self.is_fixed() || !self.active {
            return;
        }
        self.state.velocity += gravity * dt;
        self.state.position += self.state.velocity * dt;
        let rotation = UnitQuaternion::from_scaled_axis(self.state.angular_rate * dt);
        self.state.attitude = rotation * self.state.attitude;
        self.update_sleep(dt);
    }

    fn update_sleep(&mut self, dt: f64) {
        if self.state.velocity.norm() < LINEAR_SLEEP_THRESHOLD
            && self.state.angular_rate.norm() < ANGULAR_SLEEP_THRESHOLD
        {
            self.sleep_timer += dt;
            if self.sleep_timer > DEACTIVATION_TIME {
                debug!(body = %self.name, "putting body to sleep");
                self.active = false;
                self.state.velocity = Vector3::zeros();
                self.state.angular_rate = Vector3::zeros();
            }
        } else {
            self.sleep_timer = 0.0;
        }
    }

    pub fn headers() -> &'static [&'static str] {
        &[
            "t",
            "position[x]",
            "position[y]",
            "position[z]",
            "velocity[x]",
            "velocity[y]",
            "velocity[z]",
            "angular_rate[x]",
            "angular_rate[y]",
            "angular_rate[z]",
            "active",
        ]
    }
}

impl RigidBody for Body {
    fn transform(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.state.position), self.state.attitude)
    }

    fn apply_impulse(&mut self, impulse: &Vector3<f64>, local_point: &Vector3<f64>) {
        let Some(mp) = self.mass_properties else {
            return;
        };
        let lever = self.state.attitude * local_point;
        let delta_rate = self.inverse_inertia_world(&mp) * lever.cross(impulse);
        self.state.velocity += impulse / mp.mass;
        self.state.angular_rate += delta_rate;
    }

    fn activate(&mut self) {
        if !self.active {
            debug!(body = %self.name, "waking body");
        }
        self.active = true;
        self.sleep_timer = 0.0;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl SimResult for Body {
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors> {
        let path = results.result_path.join("bodies");
        let id = results.new_writer(&self.name, &path, Self::headers())?;
        self.result_id = Some(id);
        Ok(())
    }

    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors> {
        if let Some(id) = self.result_id {
            let s = &self.state;
            results.write_record(
                id,
                &[
                    t.to_string(),
                    s.position[0].to_string(),
                    s.position[1].to_string(),
                    s.position[2].to_string(),
                    s.velocity[0].to_string(),
                    s.velocity[1].to_string(),
                    s.velocity[2].to_string(),
                    s.angular_rate[0].to_string(),
                    s.angular_rate[1].to_string(),
                    s.angular_rate[2].to_string(),
                    self.active.to_string(),
                ],
            )?;
        }
        Ok(())
    }
}
