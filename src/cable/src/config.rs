// Scene configuration. Every value is provided once at setup and passed
// explicitly; defaults reproduce the falling cable tutorial.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::material::CableMaterial;
use crate::solver::ConjugateGradient;
use crate::{CableError, Result, V3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestepperKind {
	/// One linear solve per step, first order.
	EulerImplicitLinearized,
	/// Newton iterations on the implicit Euler equations.
	EulerImplicit,
}

impl Default for TimestepperKind {
	fn default() -> Self {
		TimestepperKind::EulerImplicitLinearized
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
	pub max_iterations: u32,
	/// Relative residual of the linear solve.
	pub tolerance: f64,
	/// Allowed anchor mismatch, in length units.
	pub constraint_tolerance: f64,
	/// Seed each linear solve with the previous velocity update.
	pub warm_start: bool,
	/// Sub-steps used when a failed step is retried.
	pub retry_substeps: u32,
	pub max_newton_iterations: u32,
	/// Residual relative to the first Newton residual, or to one step of
	/// free fall when that is larger.
	pub newton_tolerance: f64,
	/// Newton stops once an update is this small relative to `|dv| + 1`.
	pub newton_increment_tolerance: f64,
}

impl Default for SolverConfig {
	fn default() -> Self {
		Self {
			max_iterations: 200,
			tolerance: 1e-10,
			constraint_tolerance: 1e-8,
			warm_start: true,
			retry_substeps: 2,
			max_newton_iterations: 20,
			newton_tolerance: 1e-6,
			newton_increment_tolerance: 1e-8,
		}
	}
}

impl SolverConfig {
	pub(crate) fn linear_solver(&self, dt: f64) -> ConjugateGradient {
		ConjugateGradient {
			max_iterations: self.max_iterations,
			tolerance: self.tolerance,
			// targets are velocity updates, one step away from the anchor
			constraint_tolerance: self.constraint_tolerance / dt,
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.max_iterations == 0 {
			return Err(invalid("solver max_iterations must be at least 1"));
		}
		if self.retry_substeps == 0 {
			return Err(invalid("solver retry_substeps must be at least 1"));
		}
		if self.max_newton_iterations == 0 {
			return Err(invalid("solver max_newton_iterations must be at least 1"));
		}
		for (name, value) in [
			("tolerance", self.tolerance),
			("constraint_tolerance", self.constraint_tolerance),
			("newton_tolerance", self.newton_tolerance),
			("newton_increment_tolerance", self.newton_increment_tolerance),
		] {
			if !(value.is_finite() && value > 0.0) {
				return Err(CableError::InvalidConfig(format!(
					"solver {} must be positive, got {}",
					name, value
				)));
			}
		}
		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
	pub gravity: [f64; 3],
	pub step_size: f64,
	pub timestepper: TimestepperKind,
	pub solver: SolverConfig,
}

impl Default for SimConfig {
	fn default() -> Self {
		Self {
			gravity: [0.0, -9.81, 0.0],
			step_size: 0.01,
			timestepper: TimestepperKind::default(),
			solver: SolverConfig::default(),
		}
	}
}

impl SimConfig {
	pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
		self.gravity = gravity;
		self
	}

	pub fn with_step_size(mut self, step_size: f64) -> Self {
		self.step_size = step_size;
		self
	}

	pub fn with_timestepper(mut self, kind: TimestepperKind) -> Self {
		self.timestepper = kind;
		self
	}

	pub fn gravity(&self) -> V3 {
		V3::from(self.gravity)
	}

	pub fn validate(&self) -> Result<()> {
		if !self.gravity.iter().all(|g| g.is_finite()) {
			return Err(CableError::InvalidConfig(format!(
				"gravity must be finite, got {:?}",
				self.gravity
			)));
		}
		if !(self.step_size.is_finite() && self.step_size > 0.0) {
			return Err(CableError::InvalidConfig(format!(
				"step size must be positive, got {}",
				self.step_size
			)));
		}
		self.solver.validate()
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CableConfig {
	pub node_count: usize,
	pub length: f64,
	/// Position of the first node.
	pub origin: [f64; 3],
	/// Direction of the straight segment, also the initial node tangent.
	pub direction: [f64; 3],
	/// Bind the first node to a fixed frame at its initial position.
	pub anchor_start: bool,
	pub material: CableMaterial,
}

impl Default for CableConfig {
	fn default() -> Self {
		Self {
			node_count: 16,
			length: 1.2,
			origin: [0.0, 0.5, 0.0],
			direction: [1.0, 0.0, 0.0],
			anchor_start: true,
			material: CableMaterial::default(),
		}
	}
}

impl CableConfig {
	pub fn validate(&self) -> Result<()> {
		if self.node_count < 2 {
			return Err(CableError::InvalidConfig(format!(
				"a cable needs at least 2 nodes, got {}",
				self.node_count
			)));
		}
		if !(self.length.is_finite() && self.length > 0.0) {
			return Err(CableError::InvalidConfig(format!(
				"cable length must be positive, got {}",
				self.length
			)));
		}
		if !self.origin.iter().all(|x| x.is_finite()) {
			return Err(CableError::InvalidConfig(format!(
				"cable origin must be finite, got {:?}",
				self.origin
			)));
		}
		let dir = V3::from(self.direction);
		if !(dir.iter().all(|x| x.is_finite()) && dir.norm() > 0.0) {
			return Err(CableError::InvalidConfig(format!(
				"cable direction must be a non-zero vector, got {:?}",
				self.direction
			)));
		}
		self.material.validate()
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
	pub sim: SimConfig,
	pub cable: CableConfig,
}

impl SceneConfig {
	pub fn from_ron_str(s: &str) -> Result<Self> {
		let scene: Self = ron::from_str(s)?;
		scene.validate()?;
		Ok(scene)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let f = File::open(path.as_ref())?;
		let scene: Self = ron::de::from_reader(f)?;
		scene.validate()?;
		Ok(scene)
	}

	pub fn validate(&self) -> Result<()> {
		self.sim.validate()?;
		self.cable.validate()
	}
}

fn invalid(msg: &str) -> CableError {
	CableError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_defaults_are_valid() {
		let scene = SceneConfig::default();
		assert!(scene.validate().is_ok());
		assert_eq!(scene.sim.gravity(), V3::new(0., -9.81, 0.));
		assert_eq!(scene.cable.node_count, 16);
		assert_eq!(scene.sim.solver.max_iterations, 200);
	}

	#[test]
	fn test_asset_parses() {
		let scene =
			SceneConfig::from_ron_str(include_str!("../assets/falling_cable.ron"))
				.unwrap();
		assert_eq!(scene, SceneConfig::default());
	}

	#[test]
	fn test_partial_ron_uses_defaults() {
		let scene = SceneConfig::from_ron_str(
			"(sim: (step_size: 0.005, timestepper: EulerImplicit), cable: (node_count: 4))",
		)
		.unwrap();
		assert_eq!(scene.sim.step_size, 0.005);
		assert_eq!(scene.sim.timestepper, TimestepperKind::EulerImplicit);
		assert_eq!(scene.cable.node_count, 4);
		assert_eq!(scene.cable.length, 1.2);
	}

	#[test]
	fn test_rejects_invalid() {
		let bad = [
			"(cable: (node_count: 1))",
			"(cable: (node_count: 0))",
			"(cable: (length: 0.0))",
			"(cable: (direction: (0.0, 0.0, 0.0)))",
			"(cable: (material: (diameter: -0.01)))",
			"(sim: (step_size: 0.0))",
			"(sim: (solver: (max_iterations: 0)))",
			"(sim: (solver: (newton_increment_tolerance: 0.0)))",
		];
		for s in bad {
			match SceneConfig::from_ron_str(s) {
				Err(CableError::InvalidConfig(_)) => {}
				other => panic!("{} gave {:?}", s, other.map(|_| ())),
			}
		}
		assert!(matches!(
			SceneConfig::from_ron_str("(cable: (node_count: \"many\"))"),
			Err(CableError::Parse(_))
		));
	}

	#[test]
	fn test_missing_file() {
		assert!(matches!(
			SceneConfig::load("/nonexistent/scene.ron"),
			Err(CableError::Io(_))
		));
	}
}
