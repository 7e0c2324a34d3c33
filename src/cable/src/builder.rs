use std::sync::Arc;

use crate::anchor::{AnchorFrame, AnchorHandle};
use crate::config::{CableConfig, SceneConfig};
use crate::element::ElementHandle;
use crate::material::CableMaterial;
use crate::node::NodeHandle;
use crate::system::System;
use crate::world::World;
use crate::{CableError, Result, V3};

/// Handles of a cable built into a system.
#[derive(Clone, Debug)]
pub struct Cable {
	pub nodes: Vec<NodeHandle>,
	pub elements: Vec<ElementHandle>,
	pub anchor: Option<AnchorHandle>,
	pub material: Arc<CableMaterial>,
}

impl Cable {
	pub fn start(&self) -> NodeHandle {
		self.nodes[0]
	}

	pub fn free_end(&self) -> NodeHandle {
		self.nodes[self.nodes.len() - 1]
	}
}

/// Lays a straight cable of evenly spaced nodes and links consecutive
/// nodes with elements sharing one material.
pub struct CableBuilder {
	config: CableConfig,
}

impl CableBuilder {
	pub fn new(config: CableConfig) -> Self {
		Self { config }
	}

	pub fn build(&self, system: &mut System) -> Result<Cable> {
		// validate first, a rejected config leaves the system untouched
		self.config.validate()?;
		let c = &self.config;
		let origin = V3::from(c.origin);
		let dir = V3::from(c.direction).normalize();
		let material = Arc::new(c.material);
		let segments = (c.node_count - 1) as f64;
		let positions: Vec<V3> = (0..c.node_count)
			.map(|i| origin + dir * (c.length * i as f64 / segments))
			.collect();
		// large offsets can round neighbouring nodes onto each other
		for (i, w) in positions.windows(2).enumerate() {
			let l0 = (w[1] - w[0]).norm();
			if !(l0.is_finite() && l0 > 0.0) {
				return Err(CableError::InvalidTopology(format!(
					"cable segment {} has rest length {}",
					i, l0
				)));
			}
		}
		let nodes: Vec<NodeHandle> = positions
			.into_iter()
			.map(|pos| system.create_node(pos, dir))
			.collect();
		let elements = nodes
			.windows(2)
			.map(|w| system.connect(w[0], w[1], &material))
			.collect::<Result<Vec<_>>>()?;
		let anchor = if c.anchor_start {
			Some(system.anchor(nodes[0], AnchorFrame::point(origin))?)
		} else {
			None
		};
		log::debug!(
			"built cable: {} nodes, {} elements, length {}",
			nodes.len(),
			elements.len(),
			c.length
		);
		Ok(Cable {
			nodes,
			elements,
			anchor,
			material,
		})
	}
}

/// The tutorial scene: one cable under gravity, ready to step.
pub fn falling_cable(scene: &SceneConfig) -> Result<(World, Cable)> {
	scene.validate()?;
	let mut system = System::new(scene.sim.clone())?;
	let cable = CableBuilder::new(scene.cable.clone()).build(&mut system)?;
	Ok((World::new(system)?, cable))
}
