use nalgebra::Vector3;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use ron::ser::{PrettyConfig, to_string_pretty};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    rc::Rc,
};
use tracing::debug;
use uncertainty::Uncertainty;

use super::World;
use crate::{
    TensegrityErrors,
    actuator::ActuatorBuilder,
    anchor::{Anchor, AnchorSlot, SharedAnchor},
    body::{BodyBuilder, BodyRef},
};

fn zeros() -> Vector3<f64> {
    Vector3::zeros()
}

/// A routing point that several cables may pass through.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedAnchorBuilder {
    pub name: String,
    pub body: String,
    /// World-space attachment point at the start of the simulation.
    pub position: Vector3<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnchorBuilder {
    /// Belongs to this cable alone. `position` is in world space at the start of the simulation.
    Owned { body: String, position: Vector3<f64> },
    /// Refers to an entry of `WorldBuilder::shared_anchors` by name.
    Shared(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CableBuilder {
    pub actuator: ActuatorBuilder,
    pub anchors: Vec<AnchorBuilder>,
}

/// Serializable description of a world, stored as `world.ron`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldBuilder {
    pub dt: f64,
    #[serde(default = "zeros")]
    pub gravity: Vector3<f64>,
    pub seed: u64,
    pub bodies: Vec<BodyBuilder>,
    #[serde(default)]
    pub shared_anchors: Vec<SharedAnchorBuilder>,
    #[serde(default)]
    pub cables: Vec<CableBuilder>,
}

impl WorldBuilder {
    pub fn new(dt: f64) -> Result<Self, TensegrityErrors> {
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(TensegrityErrors::InvalidTimestep(dt));
        }
        let seed = rand::rng().random::<u64>();
        Ok(Self {
            dt,
            gravity: Vector3::zeros(),
            seed,
            bodies: Vec::new(),
            shared_anchors: Vec::new(),
            cables: Vec::new(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_gravity(mut self, gx: f64, gy: f64, gz: f64) -> Self {
        self.gravity = Vector3::new(gx, gy, gz);
        self
    }

    pub fn add_body(&mut self, body: BodyBuilder) -> Result<(), TensegrityErrors> {
        if self.bodies.iter().any(|b| b.name == body.name) {
            return Err(TensegrityErrors::NameTaken(body.name));
        }
        self.bodies.push(body);
        Ok(())
    }

    pub fn add_shared_anchor(
        &mut self,
        name: &str,
        body: &str,
        position: Vector3<f64>,
    ) -> Result<(), TensegrityErrors> {
        if self.shared_anchors.iter().any(|a| a.name == name) {
            return Err(TensegrityErrors::NameTaken(name.to_string()));
        }
        self.shared_anchors.push(SharedAnchorBuilder {
            name: name.to_string(),
            body: body.to_string(),
            position,
        });
        Ok(())
    }

    pub fn add_cable(
        &mut self,
        actuator: ActuatorBuilder,
        anchors: Vec<AnchorBuilder>,
    ) -> Result<(), TensegrityErrors> {
        if self.cables.iter().any(|c| c.actuator.name == actuator.name) {
            return Err(TensegrityErrors::NameTaken(actuator.name));
        }
        self.cables.push(CableBuilder { actuator, anchors });
        Ok(())
    }

    /// Checks names and cross references without sampling anything.
    pub fn validate(&self) -> Result<(), TensegrityErrors> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(TensegrityErrors::InvalidTimestep(self.dt));
        }

        let mut bodies = HashSet::new();
        for body in &self.bodies {
            if !bodies.insert(body.name.as_str()) {
                return Err(TensegrityErrors::NameTaken(body.name.clone()));
            }
        }

        let mut shared = HashSet::new();
        for anchor in &self.shared_anchors {
            if !shared.insert(anchor.name.as_str()) {
                return Err(TensegrityErrors::NameTaken(anchor.name.clone()));
            }
            if !bodies.contains(anchor.body.as_str()) {
                return Err(TensegrityErrors::BodyNotFound(anchor.body.clone()));
            }
        }

        let mut cables = HashSet::new();
        for cable in &self.cables {
            if !cables.insert(cable.actuator.name.as_str()) {
                return Err(TensegrityErrors::NameTaken(cable.actuator.name.clone()));
            }
            for anchor in &cable.anchors {
                match anchor {
                    AnchorBuilder::Owned { body, .. } => {
                        if !bodies.contains(body.as_str()) {
                            return Err(TensegrityErrors::BodyNotFound(body.clone()));
                        }
                    }
                    AnchorBuilder::Shared(name) => {
                        if !shared.contains(name.as_str()) {
                            return Err(TensegrityErrors::SharedAnchorNotFound(name.clone()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Samples a world from the builder's own seed.
    pub fn sample(&self, nominal: bool) -> Result<World, TensegrityErrors> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        self.sample_with_rng(nominal, &mut rng)
    }

    pub fn sample_with_rng(
        &self,
        nominal: bool,
        rng: &mut SmallRng,
    ) -> Result<World, TensegrityErrors> {
        self.validate()?;
        let mut world = World::new(self.dt, self.gravity)?;

        let mut bodies: HashMap<&str, BodyRef> = HashMap::new();
        for builder in &self.bodies {
            let body = world.add_body(builder.sample(nominal, rng)?)?;
            bodies.insert(builder.name.as_str(), body);
        }

        // lookups below are covered by validate
        let mut shared: HashMap<&str, SharedAnchor> = HashMap::new();
        for builder in &self.shared_anchors {
            let body = bodies[builder.body.as_str()].clone();
            let anchor = Anchor::from_world_position(body, &builder.position);
            shared.insert(builder.name.as_str(), Rc::new(anchor));
        }

        for cable in &self.cables {
            let anchors: Vec<AnchorSlot> = cable
                .anchors
                .iter()
                .map(|anchor| match anchor {
                    AnchorBuilder::Owned { body, position } => {
                        Anchor::from_world_position(bodies[body.as_str()].clone(), position).into()
                    }
                    AnchorBuilder::Shared(name) => shared[name.as_str()].clone().into(),
                })
                .collect();
            let actuator = cable.actuator.sample(anchors, nominal, rng)?;
            debug!(
                cable = %actuator.name,
                rest_length = actuator.muscle.rest_length(),
                "sampled cable"
            );
            world.add_actuator(actuator)?;
        }
        Ok(world)
    }

    pub fn from_ron(contents: &str) -> Result<Self, TensegrityErrors> {
        Ok(ron::from_str(contents)?)
    }

    pub fn to_ron(&self) -> Result<String, TensegrityErrors> {
        Ok(to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn load(path: &Path) -> Result<Self, TensegrityErrors> {
        let contents = std::fs::read_to_string(path.join("world.ron"))?;
        Self::from_ron(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<(), TensegrityErrors> {
        std::fs::create_dir_all(path)?;
        std::fs::write(path.join("world.ron"), self.to_ron()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use mass_properties::MassPropertiesBuilder;
    use uncertainty::Distributions;

    fn triangle() -> WorldBuilder {
        let mut builder = WorldBuilder::new(0.001).unwrap().with_seed(17);
        let mp = MassPropertiesBuilder::new(1.0, 0.1, 0.1, 0.1);
        builder
            .add_body(BodyBuilder::new("a", mp.clone()).unwrap())
            .unwrap();
        builder
            .add_body(BodyBuilder::new("b", mp.clone()).unwrap().with_position(2.0, 0.0, 0.0))
            .unwrap();
        builder
            .add_body(BodyBuilder::fixed("top").unwrap().with_position(1.0, 1.0, 0.0))
            .unwrap();
        builder
            .add_shared_anchor("pulley", "top", Vector3::new(1.0, 1.0, 0.0))
            .unwrap();
        builder
            .add_cable(
                ActuatorBuilder::new("left", 100.0, 1.0)
                    .unwrap()
                    .with_uncertainty_stiffness(Distributions::uniform(90.0, 110.0).unwrap()),
                vec![
                    AnchorBuilder::Owned {
                        body: "a".into(),
                        position: Vector3::new(0.0, 0.0, 0.0),
                    },
                    AnchorBuilder::Shared("pulley".into()),
                ],
            )
            .unwrap();
        builder
            .add_cable(
                ActuatorBuilder::new("right", 100.0, 1.0).unwrap(),
                vec![
                    AnchorBuilder::Shared("pulley".into()),
                    AnchorBuilder::Owned {
                        body: "b".into(),
                        position: Vector3::new(2.0, 0.0, 0.0),
                    },
                ],
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_sample_nominal() {
        let world = triangle().sample(true).unwrap();
        assert_eq!(world.actuators().len(), 2);
        assert_eq!(world.bodies().len(), 3);
        let left = world.actuator("left").unwrap();
        assert_eq!(left.muscle.stiffness(), 100.0);
        assert_abs_diff_eq!(left.muscle.rest_length(), 2f64.sqrt(), epsilon = 1e-12);
        assert!(left.muscle.anchors()[0].is_owned());
        assert!(!left.muscle.anchors()[1].is_owned());
    }

    #[test]
    fn test_cables_share_pulley() {
        let world = triangle().sample(true).unwrap();
        let left = world.actuator("left").unwrap();
        let right = world.actuator("right").unwrap();
        match (&left.muscle.anchors()[1], &right.muscle.anchors()[0]) {
            (AnchorSlot::Shared(l), AnchorSlot::Shared(r)) => assert!(Rc::ptr_eq(l, r)),
            _ => panic!("pulley should be shared"),
        }
    }

    #[test]
    fn test_same_seed_same_world() {
        let builder = triangle();
        let k1 = builder.sample(false).unwrap().actuator("left").unwrap().muscle.stiffness();
        let k2 = builder.sample(false).unwrap().actuator("left").unwrap().muscle.stiffness();
        assert_eq!(k1, k2);
        assert!((90.0..110.0).contains(&k1));
    }

    #[test]
    fn test_unknown_references() {
        let mut builder = triangle();
        builder.cables[0].anchors[1] = AnchorBuilder::Shared("missing".into());
        assert!(matches!(
            builder.validate(),
            Err(TensegrityErrors::SharedAnchorNotFound(_))
        ));

        let mut builder = triangle();
        builder.shared_anchors[0].body = "nobody".into();
        assert!(matches!(
            builder.sample(true),
            Err(TensegrityErrors::BodyNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_cable_name() {
        let mut builder = triangle();
        let result = builder.add_cable(ActuatorBuilder::new("left", 1.0, 0.0).unwrap(), vec![]);
        assert!(matches!(result, Err(TensegrityErrors::NameTaken(_))));
    }

    #[test]
    fn test_ron_round_trip() {
        let builder = triangle();
        let ron = builder.to_ron().unwrap();
        assert_eq!(WorldBuilder::from_ron(&ron).unwrap(), builder);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let builder = triangle();
        builder.save(&path).unwrap();
        assert_eq!(WorldBuilder::load(&path).unwrap(), builder);
        std::fs::remove_dir_all(path).unwrap();
    }

    #[test]
    fn test_bad_ron() {
        assert!(matches!(
            WorldBuilder::from_ron("(dt: 0.1,"),
            Err(TensegrityErrors::RonParse(_))
        ));
    }
}
