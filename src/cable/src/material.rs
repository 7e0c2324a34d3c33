use serde::{Deserialize, Serialize};

use crate::{CableError, Result};

/// Section properties shared by every element of a cable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CableMaterial {
	pub diameter: f64,
	pub young_modulus: f64,
	/// Stiffness proportional Rayleigh damping coefficient.
	pub damping: f64,
	pub density: f64,
}

impl Default for CableMaterial {
	fn default() -> Self {
		Self {
			diameter: 0.01,
			young_modulus: 0.01e9,
			damping: 0.01,
			density: 1000.0,
		}
	}
}

impl CableMaterial {
	pub fn with_diameter(mut self, d: f64) -> Self {
		self.diameter = d;
		self
	}

	pub fn with_young_modulus(mut self, e: f64) -> Self {
		self.young_modulus = e;
		self
	}

	pub fn with_damping(mut self, damping: f64) -> Self {
		self.damping = damping;
		self
	}

	pub fn with_density(mut self, density: f64) -> Self {
		self.density = density;
		self
	}

	pub fn area(&self) -> f64 {
		std::f64::consts::PI * self.diameter.powi(2) / 4.0
	}

	pub fn axial_rigidity(&self) -> f64 {
		self.young_modulus * self.area()
	}

	pub fn linear_density(&self) -> f64 {
		self.density * self.area()
	}

	pub fn validate(&self) -> Result<()> {
		let positive = [
			("diameter", self.diameter),
			("young_modulus", self.young_modulus),
			("density", self.density),
		];
		for (name, value) in positive {
			if !(value.is_finite() && value > 0.0) {
				return Err(CableError::InvalidConfig(format!(
					"material {} must be positive, got {}",
					name, value
				)));
			}
		}
		if !(self.damping.is_finite() && self.damping >= 0.0) {
			return Err(CableError::InvalidConfig(format!(
				"material damping must be non-negative, got {}",
				self.damping
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn test_section() {
		let m = CableMaterial::default();
		assert_relative_eq!(m.area(), 7.853981633974483e-5, max_relative = 1e-12);
		assert_relative_eq!(m.axial_rigidity(), 785.3981633974483, max_relative = 1e-12);
		assert!(m.validate().is_ok());
	}

	#[test]
	fn test_invalid() {
		assert!(CableMaterial::default().with_diameter(0.).validate().is_err());
		assert!(CableMaterial::default()
			.with_young_modulus(f64::NAN)
			.validate()
			.is_err());
		assert!(CableMaterial::default().with_damping(-1.).validate().is_err());
		assert!(CableMaterial::default().with_damping(0.).validate().is_ok());
	}
}
