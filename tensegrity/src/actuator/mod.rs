use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tensegrity_result::{ResultErrors, ResultManager, SimResult};
use thiserror::Error;
use uncertainty::{Distributions, SimValue, Uncertainty, UncertaintyErrors};

use crate::anchor::AnchorSlot;

pub mod muscle;

pub use muscle::Muscle;

#[derive(Debug, Error)]
pub enum ActuatorErrors {
    #[error("name cannot be empty for actuator")]
    EmptyName,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationErrors),
    #[error("{0}")]
    Uncertainty(#[from] UncertaintyErrors),
}

/// Reasons a muscle refuses a parameter, a rest length, or a timestep.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationErrors {
    #[error("timestep must be positive and finite, got {0}")]
    InvalidTimestep(f64),
    #[error("damping coefficient must be non-negative and finite, got {0}")]
    NegativeDamping(f64),
    #[error("pretension must be finite, got {0}")]
    NonFinitePretension(f64),
    #[error("rest length must be positive and finite, got {0}")]
    NonPositiveRestLength(f64),
    #[error("stiffness must be positive and finite, got {0}")]
    NonPositiveStiffness(f64),
    #[error(
        "pretension {pretension} shortens the rest length past zero (length {length}, rest length {rest_length})"
    )]
    PretensionExceedsLength {
        length: f64,
        pretension: f64,
        rest_length: f64,
    },
    #[error("a muscle needs at least 2 anchors, got {0}")]
    TooFewAnchors(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MuscleParameters {
    pub stiffness: f64,
    pub damping: f64,
    pub pretension: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuscleParametersBuilder {
    pub stiffness: SimValue,
    pub damping: SimValue,
    pub pretension: SimValue,
}

impl Uncertainty for MuscleParametersBuilder {
    type Error = ActuatorErrors;
    type Output = MuscleParameters;

    fn sample(&self, nominal: bool, rng: &mut SmallRng) -> Result<MuscleParameters, ActuatorErrors> {
        Ok(MuscleParameters {
            stiffness: self.stiffness.sample(nominal, rng)?,
            damping: self.damping.sample(nominal, rng)?,
            pretension: self.pretension.sample(nominal, rng)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActuatorBuilder {
    pub name: String,
    pub parameters: MuscleParametersBuilder,
}

impl ActuatorBuilder {
    pub fn new(name: &str, stiffness: f64, damping: f64) -> Result<Self, ActuatorErrors> {
        if name.is_empty() {
            return Err(ActuatorErrors::EmptyName);
        }
        if !(stiffness > 0.0) || !stiffness.is_finite() {
            return Err(ConfigurationErrors::NonPositiveStiffness(stiffness).into());
        }
        if !(damping >= 0.0) || !damping.is_finite() {
            return Err(ConfigurationErrors::NegativeDamping(damping).into());
        }
        Ok(Self {
            name: name.to_string(),
            parameters: MuscleParametersBuilder {
                stiffness: SimValue::new(stiffness),
                damping: SimValue::new(damping),
                pretension: SimValue::new(0.0),
            },
        })
    }

    pub fn with_pretension(mut self, pretension: f64) -> Result<Self, ActuatorErrors> {
        if !pretension.is_finite() {
            return Err(ConfigurationErrors::NonFinitePretension(pretension).into());
        }
        self.parameters.pretension = SimValue::new(pretension);
        Ok(self)
    }

    pub fn with_uncertainty_stiffness(mut self, distribution: Distributions) -> Self {
        self.parameters.stiffness = self.parameters.stiffness.with_distribution(distribution);
        self
    }

    pub fn with_uncertainty_damping(mut self, distribution: Distributions) -> Self {
        self.parameters.damping = self.parameters.damping.with_distribution(distribution);
        self
    }

    pub fn with_uncertainty_pretension(mut self, distribution: Distributions) -> Self {
        self.parameters.pretension = self.parameters.pretension.with_distribution(distribution);
        self
    }

    /// Samples the parameters and attaches the muscle to `anchors`.
    pub fn sample(
        &self,
        anchors: Vec<AnchorSlot>,
        nominal: bool,
        rng: &mut SmallRng,
    ) -> Result<Actuator, ActuatorErrors> {
        if self.name.is_empty() {
            return Err(ActuatorErrors::EmptyName);
        }
        let parameters = self.parameters.sample(nominal, rng)?;
        let muscle = Muscle::from_parameters(anchors, &parameters)?;
        Ok(Actuator::new(&self.name, muscle))
    }
}

/// A named muscle as the world sees it.
#[derive(Debug)]
pub struct Actuator {
    pub name: String,
    pub muscle: Muscle,
    /// Id of the result writer in the ResultManager
    result_id: Option<u32>,
}

impl Actuator {
    pub fn new(name: &str, muscle: Muscle) -> Self {
        Self {
            name: name.to_string(),
            muscle,
            result_id: None,
        }
    }

    pub fn step(&mut self, dt: f64) -> Result<(), ActuatorErrors> {
        self.muscle.step(dt)
    }

    pub fn headers() -> &'static [&'static str] {
        &[
            "t",
            "length",
            "rest_length",
            "tension",
            "velocity",
            "damping",
            "force[x]",
            "force[y]",
            "force[z]",
        ]
    }
}

impl SimResult for Actuator {
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors> {
        let path = results.result_path.join("actuators");
        let id = results.new_writer(&self.name, &path, Self::headers())?;
        self.result_id = Some(id);
        Ok(())
    }

    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors> {
        if let Some(id) = self.result_id {
            let m = &self.muscle;
            let force = m.force();
            results.write_record(
                id,
                &[
                    t.to_string(),
                    m.actual_length().to_string(),
                    m.rest_length().to_string(),
                    m.tension().to_string(),
                    m.velocity().to_string(),
                    m.damping_force().to_string(),
                    force[0].to_string(),
                    force[1].to_string(),
                    force[2].to_string(),
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anchor::Anchor,
        body::{BodyRef, probe::ProbeBody},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;
    use rand::SeedableRng;

    fn anchors(length: f64) -> Vec<AnchorSlot> {
        vec![
            Anchor::new(BodyRef::new(ProbeBody::at(0.0, 0.0, 0.0)), Vector3::zeros()).into(),
            Anchor::new(BodyRef::new(ProbeBody::at(0.0, 0.0, length)), Vector3::zeros()).into(),
        ]
    }

    #[test]
    fn test_builder_nominal() {
        let builder = ActuatorBuilder::new("cable", 1000.0, 10.0)
            .unwrap()
            .with_pretension(100.0)
            .unwrap()
            .with_uncertainty_stiffness(Distributions::uniform(900.0, 1100.0).unwrap());
        let actuator = builder
            .sample(anchors(1.0), true, &mut SmallRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(actuator.name, "cable");
        assert_eq!(actuator.muscle.stiffness(), 1000.0);
        assert_abs_diff_eq!(actuator.muscle.rest_length(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_builder_dispersed() {
        let builder = ActuatorBuilder::new("cable", 1000.0, 10.0)
            .unwrap()
            .with_uncertainty_stiffness(Distributions::uniform(900.0, 1100.0).unwrap())
            .with_uncertainty_damping(Distributions::uniform(0.0, 1.0).unwrap());
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..20 {
            let actuator = builder.sample(anchors(1.0), false, &mut rng).unwrap();
            assert!((900.0..1100.0).contains(&actuator.muscle.stiffness()));
            assert!((0.0..1.0).contains(&actuator.muscle.damping_coefficient()));
        }
    }

    #[test]
    fn test_builder_rejects_bad_parameters() {
        assert!(matches!(
            ActuatorBuilder::new("", 1.0, 0.0),
            Err(ActuatorErrors::EmptyName)
        ));
        assert!(matches!(
            ActuatorBuilder::new("c", 0.0, 0.0),
            Err(ActuatorErrors::InvalidConfiguration(
                ConfigurationErrors::NonPositiveStiffness(_)
            ))
        ));
        assert!(matches!(
            ActuatorBuilder::new("c", 1.0, -2.0),
            Err(ActuatorErrors::InvalidConfiguration(
                ConfigurationErrors::NegativeDamping(_)
            ))
        ));
    }

    #[test]
    fn test_sampled_pretension_too_large() {
        let builder = ActuatorBuilder::new("cable", 10.0, 0.0)
            .unwrap()
            .with_pretension(20.0)
            .unwrap();
        let result = builder.sample(anchors(1.0), true, &mut SmallRng::seed_from_u64(0));
        assert!(matches!(
            result,
            Err(ActuatorErrors::InvalidConfiguration(
                ConfigurationErrors::PretensionExceedsLength { .. }
            ))
        ));
    }
}
