use nalgebra::{Matrix3, Vector3};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uncertainty::{SimValue, Uncertainty, UncertaintyErrors};

#[derive(Debug, Error)]
pub enum MassPropertiesErrors {
    #[error("inertia matrix must be symmetric positive definite")]
    InertiaNotPositiveDefinite,
    #[error("Ixx cant be less than or equal to zero")]
    IxxLessThanOrEqualToZero,
    #[error("Iyy cant be less than or equal to zero")]
    IyyLessThanOrEqualToZero,
    #[error("Izz cant be less than or equal to zero")]
    IzzLessThanOrEqualToZero,
    #[error("mass cannot be less than or equal to zero")]
    MassLessThanOrEqualToZero,
    #[error("rod dimensions must be greater than zero")]
    NonPositiveDimension,
    #[error("{0}")]
    UncertaintyErrors(#[from] UncertaintyErrors),
}

/// Mass and inertia about the center of mass, expressed in the body frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MassProperties {
    pub mass: f64,
    inertia: Matrix3<f64>,
    inverse_inertia: Matrix3<f64>,
}

impl MassProperties {
    pub fn new(mass: f64, inertia: Matrix3<f64>) -> Result<Self, MassPropertiesErrors> {
        if !(mass > f64::EPSILON) || !mass.is_finite() {
            return Err(MassPropertiesErrors::MassLessThanOrEqualToZero);
        }
        if inertia[(0, 0)] <= f64::EPSILON {
            return Err(MassPropertiesErrors::IxxLessThanOrEqualToZero);
        }
        if inertia[(1, 1)] <= f64::EPSILON {
            return Err(MassPropertiesErrors::IyyLessThanOrEqualToZero);
        }
        if inertia[(2, 2)] <= f64::EPSILON {
            return Err(MassPropertiesErrors::IzzLessThanOrEqualToZero);
        }
        if (inertia - inertia.transpose()).abs().max() > 1e-12 {
            return Err(MassPropertiesErrors::InertiaNotPositiveDefinite);
        }
        let cholesky = inertia
            .cholesky()
            .ok_or(MassPropertiesErrors::InertiaNotPositiveDefinite)?;
        Ok(Self {
            mass,
            inertia,
            inverse_inertia: cholesky.inverse(),
        })
    }

    pub fn from_principal(
        mass: f64,
        ixx: f64,
        iyy: f64,
        izz: f64,
    ) -> Result<Self, MassPropertiesErrors> {
        Self::new(mass, Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)))
    }

    /// Solid sphere of the given radius.
    pub fn sphere(mass: f64, radius: f64) -> Result<Self, MassPropertiesErrors> {
        if !(radius > 0.0) {
            return Err(MassPropertiesErrors::NonPositiveDimension);
        }
        let i = 0.4 * mass * radius * radius;
        Self::from_principal(mass, i, i, i)
    }

    /// Solid cylinder with its axis along the body z axis, the usual tensegrity strut.
    pub fn rod(mass: f64, length: f64, radius: f64) -> Result<Self, MassPropertiesErrors> {
        if !(length > 0.0) || !(radius > 0.0) {
            return Err(MassPropertiesErrors::NonPositiveDimension);
        }
        let transverse = mass * (3.0 * radius * radius + length * length) / 12.0;
        let axial = 0.5 * mass * radius * radius;
        Self::from_principal(mass, transverse, transverse, axial)
    }

    pub fn inertia(&self) -> &Matrix3<f64> {
        &self.inertia
    }

    pub fn inverse_inertia(&self) -> &Matrix3<f64> {
        &self.inverse_inertia
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassPropertiesBuilder {
    pub mass: SimValue,
    pub ixx: SimValue,
    pub iyy: SimValue,
    pub izz: SimValue,
    #[serde(default = "zero")]
    pub ixy: SimValue,
    #[serde(default = "zero")]
    pub ixz: SimValue,
    #[serde(default = "zero")]
    pub iyz: SimValue,
}

fn zero() -> SimValue {
    SimValue::new(0.0)
}

impl Default for MassPropertiesBuilder {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }
}

impl MassPropertiesBuilder {
    pub fn new(mass: f64, ixx: f64, iyy: f64, izz: f64) -> Self {
        Self {
            mass: SimValue::new(mass),
            ixx: SimValue::new(ixx),
            iyy: SimValue::new(iyy),
            izz: SimValue::new(izz),
            ixy: zero(),
            ixz: zero(),
            iyz: zero(),
        }
    }

    pub fn with_products(mut self, ixy: f64, ixz: f64, iyz: f64) -> Self {
        self.ixy = SimValue::new(ixy);
        self.ixz = SimValue::new(ixz);
        self.iyz = SimValue::new(iyz);
        self
    }
}

impl Uncertainty for MassPropertiesBuilder {
    type Error = MassPropertiesErrors;
    type Output = MassProperties;

    fn sample(&self, nominal: bool, rng: &mut SmallRng) -> Result<MassProperties, Self::Error> {
        let mass = self.mass.sample(nominal, rng)?;
        let ixx = self.ixx.sample(nominal, rng)?;
        let iyy = self.iyy.sample(nominal, rng)?;
        let izz = self.izz.sample(nominal, rng)?;
        let ixy = self.ixy.sample(nominal, rng)?;
        let ixz = self.ixz.sample(nominal, rng)?;
        let iyz = self.iyz.sample(nominal, rng)?;
        MassProperties::new(
            mass,
            Matrix3::new(ixx, ixy, ixz, ixy, iyy, iyz, ixz, iyz, izz),
        )
    }
}
