use std::sync::Arc;

use crate::element::{Element, ElementState};
use crate::material::CableMaterial;
use crate::node::NodeHandle;
use crate::{M3, V3};

/// Axial cable segment between two nodes.
#[derive(Clone, Debug)]
pub struct CableElement {
	nodes: [NodeHandle; 2],
	material: Arc<CableMaterial>,
	l0: f64,
}

impl CableElement {
	pub fn new_with_l0(
		a: NodeHandle,
		b: NodeHandle,
		material: Arc<CableMaterial>,
		l0: f64,
	) -> Self {
		Self {
			nodes: [a, b],
			material,
			l0,
		}
	}

	pub fn material(&self) -> &Arc<CableMaterial> {
		&self.material
	}

	/// Axial spring constant `EA / l0`.
	pub fn axial_stiffness(&self) -> f64 {
		self.material.axial_rigidity() / self.l0
	}

	pub fn build(self) -> Box<dyn Element> {
		Box::new(self)
	}
}

impl Element for CableElement {
	fn nodes(&self) -> [NodeHandle; 2] {
		self.nodes
	}

	fn rest_length(&self) -> f64 {
		self.l0
	}

	fn mass(&self) -> f64 {
		self.material.linear_density() * self.l0
	}

	fn evaluate(&self, xa: V3, xb: V3) -> ElementState {
		let k = self.axial_stiffness();
		let dp = xb - xa;
		let l = dp.magnitude();
		if !l.is_normal() {
			// coincident nodes, no direction to pull along
			log::warn!(
				"bad element length {} between nodes {} and {}",
				l,
				self.nodes[0].index(),
				self.nodes[1].index()
			);
			return ElementState {
				nodes: self.nodes,
				force: V3::zeros(),
				stiffness: M3::identity() * k,
				damping: self.material.damping,
			};
		}
		let u = dp / l;
		let tension = k * (l - self.l0);
		let uu = u * u.transpose();
		// geometric term only under tension, keeps the block semi-definite
		let stiffness =
			uu * k + (M3::identity() - uu) * (tension.max(0.0) / l);
		ElementState {
			nodes: self.nodes,
			force: u * tension,
			stiffness,
			damping: self.material.damping,
		}
	}
}
