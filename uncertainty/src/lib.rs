use rand::{distr::uniform, rngs::SmallRng};
use rand_distr::{Distribution, Normal, NormalError, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UncertaintyErrors {
    #[error("{0}")]
    NormalError(#[from] NormalError),
    #[error("standard deviation must be finite and non-negative, got {0}")]
    InvalidStandardDeviation(f64),
    #[error("uniform lower bound {0} must be less than upper bound {1}")]
    InvalidUniformBounds(f64, f64),
    #[error("{0}")]
    UniformError(#[from] uniform::Error),
}

/// Types that can be sampled into a concrete simulation object.
/// `nominal` requests the undispersed value of every parameter.
pub trait Uncertainty {
    type Error;
    type Output;
    fn sample(&self, nominal: bool, rng: &mut SmallRng) -> Result<Self::Output, Self::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Distributions {
    Normal { mean: f64, std: f64 },
    Uniform { low: f64, high: f64 },
}

impl Distributions {
    pub fn normal(mean: f64, std: f64) -> Result<Self, UncertaintyErrors> {
        if !std.is_finite() || std < 0.0 {
            return Err(UncertaintyErrors::InvalidStandardDeviation(std));
        }
        Ok(Self::Normal { mean, std })
    }

    pub fn uniform(low: f64, high: f64) -> Result<Self, UncertaintyErrors> {
        if !(low < high) {
            return Err(UncertaintyErrors::InvalidUniformBounds(low, high));
        }
        Ok(Self::Uniform { low, high })
    }

    pub fn sample(&self, rng: &mut SmallRng) -> Result<f64, UncertaintyErrors> {
        match *self {
            Distributions::Normal { mean, std } => Ok(Normal::new(mean, std)?.sample(rng)),
            Distributions::Uniform { low, high } => Ok(Uniform::new(low, high)?.sample(rng)),
        }
    }
}

/// A scalar parameter with a nominal value and an optional dispersion used for Monte Carlo runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimValue {
    pub nominal: f64,
    #[serde(default)]
    pub dispersion: Option<Distributions>,
}

impl SimValue {
    pub fn new(nominal: f64) -> Self {
        Self {
            nominal,
            dispersion: None,
        }
    }

    pub fn with_distribution(mut self, distribution: Distributions) -> Self {
        self.dispersion = Some(distribution);
        self
    }

    pub fn sample(&self, nominal: bool, rng: &mut SmallRng) -> Result<f64, UncertaintyErrors> {
        match (&self.dispersion, nominal) {
            (Some(dispersion), false) => dispersion.sample(rng),
            _ => Ok(self.nominal),
        }
    }
}

impl From<f64> for SimValue {
    fn from(nominal: f64) -> Self {
        Self::new(nominal)
    }
}
