use std::sync::Arc;

use crate::anchor::{AnchorFrame, AnchorHandle, ConstraintRegistry};
use crate::config::SimConfig;
use crate::element::{Element, ElementAssembler, ElementHandle};
use crate::material::CableMaterial;
use crate::node::{Node, NodeHandle, NodeStore};
use crate::{CableError, Result, V3};

/// Nodes, elements, anchors and the global parameters they are simulated
/// with. Built during setup, then handed to a `World`.
#[derive(Clone)]
pub struct System {
	config: SimConfig,
	nodes: NodeStore,
	assembler: ElementAssembler,
	registry: ConstraintRegistry,
	// elements touching each node, filled by `finalize`
	incident: Vec<Vec<ElementHandle>>,
}

impl System {
	pub fn new(config: SimConfig) -> Result<Self> {
		config.validate()?;
		Ok(Self {
			config,
			nodes: NodeStore::default(),
			assembler: ElementAssembler::default(),
			registry: ConstraintRegistry::default(),
			incident: Vec::new(),
		})
	}

	pub fn config(&self) -> &SimConfig {
		&self.config
	}

	pub fn gravity(&self) -> V3 {
		self.config.gravity()
	}

	pub fn create_node(&mut self, pos: V3, dir: V3) -> NodeHandle {
		self.nodes.create_node(pos, dir)
	}

	pub fn connect(
		&mut self,
		a: NodeHandle,
		b: NodeHandle,
		material: &Arc<CableMaterial>,
	) -> Result<ElementHandle> {
		self.assembler.connect(&self.nodes, a, b, material)
	}

	pub fn add_element(
		&mut self,
		element: Box<dyn Element>,
	) -> Result<ElementHandle> {
		self.assembler.add(&self.nodes, element)
	}

	pub fn anchor(
		&mut self,
		node: NodeHandle,
		frame: AnchorFrame,
	) -> Result<AnchorHandle> {
		self.registry.anchor(&mut self.nodes, node, frame)
	}

	/// Anchors a node where it currently is.
	pub fn anchor_in_place(&mut self, node: NodeHandle) -> Result<AnchorHandle> {
		let pos = self.nodes.get(node).map(|n| n.get_pos()).ok_or_else(|| {
			CableError::InvalidTopology(format!(
				"cannot anchor unknown node {}",
				node.index()
			))
		})?;
		self.anchor(node, AnchorFrame::point(pos))
	}

	pub fn nodes(&self) -> &NodeStore {
		&self.nodes
	}

	pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
		self.nodes.get(handle)
	}

	pub fn elements(&self) -> &ElementAssembler {
		&self.assembler
	}

	pub fn constraints(&self) -> &ConstraintRegistry {
		&self.registry
	}

	pub(crate) fn incident(&self, node: usize) -> &[ElementHandle] {
		self.incident.get(node).map(|v| v.as_slice()).unwrap_or(&[])
	}

	/// Checks the assembled mesh and derives lumped masses and adjacency.
	pub fn finalize(&mut self) -> Result<()> {
		let n = self.nodes.len();
		if n == 0 {
			return Err(CableError::InvalidTopology(
				"system has no nodes".to_string(),
			));
		}
		let mut masses = vec![0.0; n];
		let mut incident = vec![Vec::new(); n];
		for (i, e) in self.assembler.as_slice().iter().enumerate() {
			let half = 0.5 * e.mass();
			for h in e.nodes() {
				if !self.nodes.contains(h) {
					return Err(CableError::InvalidTopology(format!(
						"element {} references unknown node {}",
						i,
						h.index()
					)));
				}
				masses[h.index()] += half;
				incident[h.index()].push(ElementHandle(i));
			}
		}
		for a in self.registry.iter() {
			if !self.nodes.contains(a.node()) {
				return Err(CableError::InvalidTopology(format!(
					"anchor references unknown node {}",
					a.node().index()
				)));
			}
		}
		for (h, mass) in self.nodes.handles().zip(masses.into_iter()) {
			let node = match self.nodes.get_mut(h) {
				Some(node) => node,
				None => continue,
			};
			let finite = node.pos.iter().chain(node.dir.iter()).all(|x| x.is_finite());
			if !finite {
				return Err(CableError::InvalidConfig(format!(
					"node {} has a non-finite position or direction",
					h.index()
				)));
			}
			if mass <= 0.0 && !node.fixed {
				return Err(CableError::InvalidTopology(format!(
					"node {} has no elements and no anchor",
					h.index()
				)));
			}
			node.mass = mass;
		}
		self.incident = incident;
		log::info!(
			"finalized system: {} nodes, {} elements, {} anchors",
			n,
			self.assembler.len(),
			self.registry.len()
		);
		Ok(())
	}

	pub(crate) fn commit(&mut self, nodes: Vec<Node>) {
		self.nodes.commit(nodes);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use approx::assert_relative_eq;

	fn three_nodes() -> (System, Vec<NodeHandle>) {
		let mut sys = System::new(SimConfig::default()).unwrap();
		let hs: Vec<NodeHandle> = (0..3)
			.map(|i| sys.create_node(V3::new(0.1 * i as f64, 0.5, 0.), V3::x()))
			.collect();
		(sys, hs)
	}

	#[test]
	fn test_lumped_masses() {
		let (mut sys, hs) = three_nodes();
		let mat = Arc::new(CableMaterial::default());
		sys.connect(hs[0], hs[1], &mat).unwrap();
		sys.connect(hs[1], hs[2], &mat).unwrap();
		sys.finalize().unwrap();
		let m = mat.linear_density() * 0.1;
		assert_relative_eq!(sys.node(hs[0]).unwrap().mass, 0.5 * m, max_relative = 1e-9);
		assert_relative_eq!(sys.node(hs[1]).unwrap().mass, m, max_relative = 1e-9);
		assert_eq!(sys.incident(1).len(), 2);
		assert_eq!(sys.incident(2), &[ElementHandle(1)]);
	}

	#[test]
	fn test_orphan_node() {
		let (mut sys, hs) = three_nodes();
		let mat = Arc::new(CableMaterial::default());
		sys.connect(hs[0], hs[1], &mat).unwrap();
		assert!(matches!(sys.finalize(), Err(CableError::InvalidTopology(_))));
		// an anchored node without elements is fine
		sys.anchor_in_place(hs[2]).unwrap();
		assert!(sys.finalize().is_ok());
	}

	#[test]
	fn test_invalid_config() {
		let config = SimConfig::default().with_step_size(-0.01);
		assert!(matches!(
			System::new(config),
			Err(CableError::InvalidConfig(_))
		));
	}

	#[test]
	fn test_empty() {
		let mut sys = System::new(SimConfig::default()).unwrap();
		assert!(sys.finalize().is_err());
	}

	#[test]
	fn test_non_finite_node() {
		let (mut sys, hs) = three_nodes();
		let mat = Arc::new(CableMaterial::default());
		let bad = sys.create_node(V3::new(0.3, 0.5, 0.), V3::new(f64::NAN, 0., 0.));
		sys.connect(hs[0], hs[1], &mat).unwrap();
		sys.connect(hs[1], hs[2], &mat).unwrap();
		sys.connect(hs[2], bad, &mat).unwrap();
		assert!(matches!(sys.finalize(), Err(CableError::InvalidConfig(_))));
	}
}
