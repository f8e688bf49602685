use nalgebra::Vector3;
use tracing::{debug, trace, warn};

use super::{ActuatorErrors, ConfigurationErrors, MuscleParameters};
use crate::anchor::{Anchor, AnchorSlot};

/// Separations below this are treated as coincident anchors.
const COINCIDENT_LENGTH: f64 = 1e-12;

/// Two-point cable: a unilateral spring-damper acting between the first and
/// last anchors of its path.
#[derive(Debug)]
pub struct Muscle {
    anchors: Vec<AnchorSlot>,
    stiffness: f64,
    damping_coefficient: f64,
    rest_length: f64,
    previous_length: f64,
    velocity: f64,
    damping: f64,
    force: Vector3<f64>,
}

impl Muscle {
    pub fn new(
        anchors: Vec<AnchorSlot>,
        stiffness: f64,
        damping_coefficient: f64,
        pretension: f64,
    ) -> Result<Self, ActuatorErrors> {
        if anchors.len() < 2 {
            return Err(ConfigurationErrors::TooFewAnchors(anchors.len()).into());
        }
        if !(stiffness > 0.0) || !stiffness.is_finite() {
            return Err(ConfigurationErrors::NonPositiveStiffness(stiffness).into());
        }
        if !(damping_coefficient >= 0.0) || !damping_coefficient.is_finite() {
            return Err(ConfigurationErrors::NegativeDamping(damping_coefficient).into());
        }
        if !pretension.is_finite() {
            return Err(ConfigurationErrors::NonFinitePretension(pretension).into());
        }

        let length = (anchors[anchors.len() - 1].anchor().world_position()
            - anchors[0].anchor().world_position())
        .norm();
        let rest_length = length - pretension / stiffness;
        if !(rest_length > 0.0) {
            return Err(ConfigurationErrors::PretensionExceedsLength {
                length,
                pretension,
                rest_length,
            }
            .into());
        }
        debug!(
            anchors = anchors.len(),
            stiffness, damping_coefficient, rest_length, "created muscle"
        );

        Ok(Self {
            anchors,
            stiffness,
            damping_coefficient,
            rest_length,
            previous_length: rest_length,
            velocity: 0.0,
            damping: 0.0,
            force: Vector3::zeros(),
        })
    }

    pub fn from_parameters(
        anchors: Vec<AnchorSlot>,
        parameters: &MuscleParameters,
    ) -> Result<Self, ActuatorErrors> {
        Self::new(
            anchors,
            parameters.stiffness,
            parameters.damping,
            parameters.pretension,
        )
    }

    /// Advances the cable by one physics tick and applies the resulting
    /// impulses to both end bodies. Fails before touching any state if `dt`
    /// is not a positive, finite duration.
    pub fn step(&mut self, dt: f64) -> Result<(), ActuatorErrors> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(ConfigurationErrors::InvalidTimestep(dt).into());
        }

        let separation = self.separation();
        let current_length = separation.norm();

        let spring = self.stiffness * (current_length - self.rest_length);
        self.velocity = (current_length - self.previous_length) / dt;
        self.damping = clamp_damping(self.damping_coefficient * self.velocity, spring);
        let magnitude = spring + self.damping;

        // rest length is positive, so a taut cable always has a defined direction
        self.force = if current_length > self.rest_length {
            separation / current_length * magnitude
        } else {
            if current_length < COINCIDENT_LENGTH {
                warn!(current_length, "muscle anchors coincide, no force applied");
            }
            Vector3::zeros()
        };
        self.previous_length = current_length;
        trace!(current_length, spring, damping = self.damping, "muscle step");

        let impulse = self.force * dt;
        let first = self.first_anchor();
        first.body().activate();
        first.body().apply_impulse(&impulse, first.relative_position());

        let last = self.last_anchor();
        last.body().activate();
        last.body().apply_impulse(&-impulse, last.relative_position());
        Ok(())
    }

    /// Motor command. Leaves the rest length unchanged on failure.
    pub fn set_rest_length(&mut self, rest_length: f64) -> Result<(), ActuatorErrors> {
        if !(rest_length > 0.0) || !rest_length.is_finite() {
            return Err(ConfigurationErrors::NonPositiveRestLength(rest_length).into());
        }
        debug!(from = self.rest_length, to = rest_length, "rest length update");
        self.rest_length = rest_length;
        Ok(())
    }

    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    pub fn actual_length(&self) -> f64 {
        self.separation().norm()
    }

    /// Elastic tension only, never negative. Damping is excluded.
    pub fn tension(&self) -> f64 {
        ((self.actual_length() - self.rest_length) * self.stiffness).max(0.0)
    }

    /// Rate of change of length measured on the last step.
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Damping force after clamping, from the last step.
    pub fn damping_force(&self) -> f64 {
        self.damping
    }

    /// Force applied to the first anchor's body on the last step. The last
    /// anchor's body received the negation.
    pub fn force(&self) -> &Vector3<f64> {
        &self.force
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn damping_coefficient(&self) -> f64 {
        self.damping_coefficient
    }

    pub fn anchors(&self) -> &[AnchorSlot] {
        &self.anchors
    }

    pub fn first_anchor(&self) -> &Anchor {
        self.anchors[0].anchor()
    }

    pub fn last_anchor(&self) -> &Anchor {
        self.anchors[self.anchors.len() - 1].anchor()
    }

    fn separation(&self) -> Vector3<f64> {
        self.last_anchor().world_position() - self.first_anchor().world_position()
    }
}

/// Limits damping to the spring's magnitude so that an explicit damping term
/// can never reverse or overshoot the spring force between steps.
fn clamp_damping(damping: f64, spring: f64) -> f64 {
    if damping.abs() > spring.abs() {
        damping.signum() * spring.abs()
    } else {
        damping
    }
}
