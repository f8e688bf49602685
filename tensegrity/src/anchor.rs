use nalgebra::{Point3, Vector3};
use std::rc::Rc;

use crate::body::BodyRef;

/// A point of attachment on a rigid body.
///
/// The anchor does not own its body. Positions are resolved against the
/// body's current transform on every query since the body moves between steps.
#[derive(Debug)]
pub struct Anchor {
    body: BodyRef,
    offset: Vector3<f64>,
}

impl Anchor {
    /// `offset` is measured from the body's center of mass in the body frame.
    pub fn new(body: BodyRef, offset: Vector3<f64>) -> Self {
        Self { body, offset }
    }

    /// Attaches at a world-space point using the body's transform at the time of the call.
    pub fn from_world_position(body: BodyRef, position: &Vector3<f64>) -> Self {
        let offset = body
            .transform()
            .inverse_transform_point(&Point3::from(*position))
            .coords;
        Self { body, offset }
    }

    pub fn world_position(&self) -> Vector3<f64> {
        self.body
            .transform()
            .transform_point(&Point3::from(self.offset))
            .coords
    }

    /// Lever arm for impulses applied through this anchor.
    pub fn relative_position(&self) -> &Vector3<f64> {
        &self.offset
    }

    pub fn body(&self) -> &BodyRef {
        &self.body
    }
}

/// An anchor that may be referenced by several actuators, e.g. a routing point.
pub type SharedAnchor = Rc<Anchor>;

/// One entry of an actuator's anchor path, tagged with who is responsible for releasing it.
#[derive(Debug)]
pub enum AnchorSlot {
    /// Released with the actuator.
    Owned(Anchor),
    /// Released when the last holder lets go.
    Shared(SharedAnchor),
}

impl AnchorSlot {
    pub fn anchor(&self) -> &Anchor {
        match self {
            AnchorSlot::Owned(anchor) => anchor,
            AnchorSlot::Shared(anchor) => anchor.as_ref(),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, AnchorSlot::Owned(_))
    }
}

impl From<Anchor> for AnchorSlot {
    fn from(anchor: Anchor) -> Self {
        AnchorSlot::Owned(anchor)
    }
}

impl From<SharedAnchor> for AnchorSlot {
    fn from(anchor: SharedAnchor) -> Self {
        AnchorSlot::Shared(anchor)
    }
}
