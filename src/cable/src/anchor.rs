use fnv::FnvHashMap;
use protocol::pr_model::PrAnchor;

use crate::node::{Node, NodeHandle, NodeStore};
use crate::solver::Dirichlet;
use crate::{to_array, CableError, Result, V3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorHandle(pub(crate) usize);

impl AnchorHandle {
	pub fn index(&self) -> usize {
		self.0
	}
}

/// Fixed reference frame a node is bound to. With a direction, the node
/// tangent is locked as well.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorFrame {
	pub origin: V3,
	pub direction: Option<V3>,
}

impl AnchorFrame {
	pub fn point(origin: V3) -> Self {
		Self {
			origin,
			direction: None,
		}
	}

	pub fn with_direction(mut self, direction: V3) -> Self {
		self.direction = Some(direction);
		self
	}

	fn validate(&self) -> Result<()> {
		if !self.origin.iter().all(|x| x.is_finite()) {
			return Err(CableError::InvalidConfig(format!(
				"anchor origin is not finite: {:?}",
				self.origin
			)));
		}
		if let Some(d) = self.direction {
			if !d.iter().all(|x| x.is_finite()) || d.norm() == 0.0 {
				return Err(CableError::InvalidConfig(format!(
					"anchor direction must be a non-zero vector: {:?}",
					d
				)));
			}
		}
		Ok(())
	}
}

#[derive(Clone, Debug)]
pub struct Anchor {
	node: NodeHandle,
	frame: AnchorFrame,
}

impl Anchor {
	pub fn node(&self) -> NodeHandle {
		self.node
	}

	pub fn frame(&self) -> &AnchorFrame {
		&self.frame
	}

	/// Largest position or direction mismatch between a node and the frame.
	pub fn violation(&self, node: &Node) -> f64 {
		let dp = (node.get_pos() - self.frame.origin).norm();
		match self.frame.direction {
			Some(d) => dp.max((node.get_dir() - d).norm()),
			None => dp,
		}
	}

	pub fn render(&self) -> PrAnchor {
		PrAnchor {
			node: self.node.index(),
			origin: to_array(self.frame.origin),
		}
	}
}

#[derive(Clone, Default)]
pub struct ConstraintRegistry {
	anchors: Vec<Anchor>,
	by_node: FnvHashMap<NodeHandle, Vec<AnchorHandle>>,
}

impl ConstraintRegistry {
	/// Binds `node` to a fixed frame and marks it as constrained.
	pub fn anchor(
		&mut self,
		store: &mut NodeStore,
		node: NodeHandle,
		mut frame: AnchorFrame,
	) -> Result<AnchorHandle> {
		frame.validate()?;
		frame.direction = frame.direction.map(|d| d.normalize());
		let n = store.get_mut(node).ok_or_else(|| {
			CableError::InvalidTopology(format!(
				"cannot anchor unknown node {}",
				node.index()
			))
		})?;
		n.fixed = true;
		let handle = AnchorHandle(self.anchors.len());
		self.anchors.push(Anchor { node, frame });
		let list = self.by_node.entry(node).or_insert_with(Vec::new);
		list.push(handle);
		if list.len() > 1 {
			log::warn!(
				"node {} now has {} anchors, redundant anchors are not checked",
				node.index(),
				list.len()
			);
		}
		Ok(handle)
	}

	pub fn get(&self, handle: AnchorHandle) -> Option<&Anchor> {
		self.anchors.get(handle.0)
	}

	pub fn anchors_of(&self, node: NodeHandle) -> &[AnchorHandle] {
		self.by_node.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
	}

	pub fn len(&self) -> usize {
		self.anchors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.anchors.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
		self.anchors.iter()
	}

	pub fn violation(&self, nodes: &[Node]) -> f64 {
		self.anchors
			.iter()
			.filter_map(|a| nodes.get(a.node.index()).map(|n| a.violation(n)))
			.fold(0.0, f64::max)
	}

	/// Velocity updates that carry every anchored node onto its frame
	/// origin within one step of length `dt`, in registration order.
	pub(crate) fn dirichlet(&self, nodes: &[Node], dt: f64) -> Vec<Dirichlet> {
		self.anchors
			.iter()
			.map(|a| {
				let n = &nodes[a.node.index()];
				let target_vel = (a.frame.origin - n.get_pos()) / dt;
				Dirichlet {
					index: a.node.index(),
					value: target_vel - n.get_vel(),
				}
			})
			.collect()
	}

	pub(crate) fn apply_directions(&self, nodes: &mut [Node]) {
		for a in self.anchors.iter() {
			if let Some(d) = a.frame.direction {
				nodes[a.node.index()].dir = d;
			}
		}
	}

	pub fn render(&self) -> Vec<PrAnchor> {
		self.anchors.iter().map(|a| a.render()).collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_anchor_marks_fixed() {
		let mut store = NodeStore::default();
		let a = store.create_node(V3::new(0., 0.5, 0.), V3::x());
		let b = store.create_node(V3::new(0.1, 0.5, 0.), V3::x());
		let mut reg = ConstraintRegistry::default();
		let h = reg
			.anchor(&mut store, a, AnchorFrame::point(V3::new(0., 0.5, 0.)))
			.unwrap();
		assert!(store.get(a).unwrap().is_fixed());
		assert!(!store.get(b).unwrap().is_fixed());
		assert_eq!(reg.anchors_of(a), &[h]);
		assert!(reg.anchors_of(b).is_empty());
		assert_eq!(reg.violation(store.as_slice()), 0.);
		assert_eq!(reg.render()[0].node, 0);
	}

	#[test]
	fn test_unknown_node() {
		let mut store = NodeStore::default();
		let mut reg = ConstraintRegistry::default();
		let err = reg
			.anchor(&mut store, NodeHandle(3), AnchorFrame::point(V3::zeros()))
			.unwrap_err();
		assert!(matches!(err, CableError::InvalidTopology(_)));
		assert!(reg.is_empty());
	}

	#[test]
	fn test_bad_frame() {
		let mut store = NodeStore::default();
		let a = store.create_node(V3::zeros(), V3::x());
		let mut reg = ConstraintRegistry::default();
		let frame = AnchorFrame::point(V3::zeros()).with_direction(V3::zeros());
		assert!(reg.anchor(&mut store, a, frame).is_err());
		assert!(!store.get(a).unwrap().is_fixed());
	}

	#[test]
	fn test_dirichlet_targets() {
		let mut store = NodeStore::default();
		let a = store.create_node(V3::new(1., 0., 0.), V3::x());
		let mut reg = ConstraintRegistry::default();
		reg.anchor(&mut store, a, AnchorFrame::point(V3::new(1., 0.1, 0.)))
			.unwrap();
		let d = reg.dirichlet(store.as_slice(), 0.01);
		assert_eq!(d.len(), 1);
		assert_eq!(d[0].index, 0);
		assert!((d[0].value - V3::new(0., 10., 0.)).norm() < 1e-9);
	}

	#[test]
	fn test_direction_lock() {
		let mut store = NodeStore::default();
		let a = store.create_node(V3::zeros(), V3::x());
		let mut reg = ConstraintRegistry::default();
		let frame = AnchorFrame::point(V3::zeros()).with_direction(V3::new(0., 2., 0.));
		reg.anchor(&mut store, a, frame).unwrap();
		assert!((reg.violation(store.as_slice()) - 2f64.sqrt()).abs() < 1e-12);
		let mut nodes = store.as_slice().to_vec();
		reg.apply_directions(&mut nodes);
		assert_eq!(nodes[0].get_dir(), V3::y());
		assert_eq!(reg.violation(&nodes), 0.);
	}
}
