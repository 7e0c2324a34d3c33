pub mod cable;

use std::sync::Arc;

use dyn_clone::DynClone;
use protocol::pr_model::PrElement;

use crate::element::cable::CableElement;
use crate::material::CableMaterial;
use crate::node::{NodeHandle, NodeStore};
use crate::{CableError, Result, M3, V3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub(crate) usize);

impl ElementHandle {
	pub fn index(&self) -> usize {
		self.0
	}
}

/// Linearized contribution of a two-node element at a given configuration.
///
/// `force` acts on `nodes[0]` and its negation on `nodes[1]`. The element
/// stiffness matrix is `[[k, -k], [-k, k]]` with `k = stiffness`.
#[derive(Clone, Debug)]
pub struct ElementState {
	pub nodes: [NodeHandle; 2],
	pub force: V3,
	pub stiffness: M3,
	pub damping: f64,
}

pub trait Element: DynClone + Send + Sync {
	fn nodes(&self) -> [NodeHandle; 2];

	fn rest_length(&self) -> f64;

	fn mass(&self) -> f64;

	fn evaluate(&self, xa: V3, xb: V3) -> ElementState;

	/// Unit vector from the first to the second node, if defined.
	fn tangent(&self, xa: V3, xb: V3) -> Option<V3> {
		(xb - xa).try_normalize(f64::EPSILON)
	}

	fn render(&self, id: usize) -> PrElement {
		let [a, b] = self.nodes();
		PrElement {
			id,
			nodes: [a.index(), b.index()],
		}
	}
}

dyn_clone::clone_trait_object!(Element);

#[derive(Clone, Default)]
pub struct ElementAssembler {
	elements: Vec<Box<dyn Element>>,
}

impl ElementAssembler {
	/// Links two existing, distinct nodes with a cable element. The rest
	/// length is the current distance between them.
	pub fn connect(
		&mut self,
		store: &NodeStore,
		a: NodeHandle,
		b: NodeHandle,
		material: &Arc<CableMaterial>,
	) -> Result<ElementHandle> {
		let (pa, pb) = check_pair(store, a, b)?;
		material.validate()?;
		let l0 = (pb - pa).norm();
		let element = CableElement::new_with_l0(a, b, material.clone(), l0);
		self.add(store, element.build())
	}

	pub fn add(
		&mut self,
		store: &NodeStore,
		element: Box<dyn Element>,
	) -> Result<ElementHandle> {
		let [a, b] = element.nodes();
		check_pair(store, a, b)?;
		let l0 = element.rest_length();
		if !(l0.is_finite() && l0 > 0.0) {
			return Err(CableError::InvalidTopology(format!(
				"element between nodes {} and {} has rest length {}",
				a.index(),
				b.index(),
				l0
			)));
		}
		self.elements.push(element);
		Ok(ElementHandle(self.elements.len() - 1))
	}

	pub fn get(&self, handle: ElementHandle) -> Option<&dyn Element> {
		self.elements.get(handle.0).map(|e| e.as_ref())
	}

	pub fn len(&self) -> usize {
		self.elements.len()
	}

	pub fn is_empty(&self) -> bool {
		self.elements.is_empty()
	}

	pub fn pairs(&self) -> Vec<(NodeHandle, NodeHandle)> {
		self.elements
			.iter()
			.map(|e| {
				let [a, b] = e.nodes();
				(a, b)
			})
			.collect()
	}

	pub(crate) fn as_slice(&self) -> &[Box<dyn Element>] {
		&self.elements
	}
}

fn check_pair(
	store: &NodeStore,
	a: NodeHandle,
	b: NodeHandle,
) -> Result<(V3, V3)> {
	let pos = |h: NodeHandle| {
		store.get(h).map(|n| n.get_pos()).ok_or_else(|| {
			CableError::InvalidTopology(format!(
				"unknown node {} (store has {} nodes)",
				h.index(),
				store.len()
			))
		})
	};
	let (pa, pb) = (pos(a)?, pos(b)?);
	if a == b {
		return Err(CableError::InvalidTopology(format!(
			"element connects node {} to itself",
			a.index()
		)));
	}
	Ok((pa, pb))
}

#[cfg(test)]
mod test {
	use super::*;

	fn store(n: usize) -> NodeStore {
		let mut store = NodeStore::default();
		for i in 0..n {
			store.create_node(V3::new(0.1 * i as f64, 0., 0.), V3::x());
		}
		store
	}

	#[test]
	fn test_connect() {
		let store = store(3);
		let mat = Arc::new(CableMaterial::default());
		let mut asm = ElementAssembler::default();
		let e0 = asm.connect(&store, NodeHandle(0), NodeHandle(1), &mat).unwrap();
		let e1 = asm.connect(&store, NodeHandle(1), NodeHandle(2), &mat).unwrap();
		assert_eq!(e0.index(), 0);
		assert_eq!(e1.index(), 1);
		assert!((asm.get(e1).unwrap().rest_length() - 0.1).abs() < 1e-12);
		assert_eq!(
			asm.pairs(),
			vec![
				(NodeHandle(0), NodeHandle(1)),
				(NodeHandle(1), NodeHandle(2))
			]
		);
		assert_eq!(asm.get(e1).unwrap().render(1).nodes, [1, 2]);
	}

	#[test]
	fn test_unknown_node() {
		let store = store(2);
		let mat = Arc::new(CableMaterial::default());
		let mut asm = ElementAssembler::default();
		let err = asm
			.connect(&store, NodeHandle(0), NodeHandle(5), &mat)
			.unwrap_err();
		assert!(matches!(err, CableError::InvalidTopology(_)));
		assert!(asm.is_empty());
	}

	#[test]
	fn test_degenerate_pairs() {
		let mut store = store(2);
		let mat = Arc::new(CableMaterial::default());
		let mut asm = ElementAssembler::default();
		let err = asm
			.connect(&store, NodeHandle(1), NodeHandle(1), &mat)
			.unwrap_err();
		assert!(matches!(err, CableError::InvalidTopology(_)));
		// coincident nodes give a zero rest length
		let c = store.create_node(V3::new(0.1, 0., 0.), V3::x());
		let err = asm.connect(&store, NodeHandle(1), c, &mat).unwrap_err();
		assert!(matches!(err, CableError::InvalidTopology(_)));
		assert_eq!(asm.len(), 0);
	}
}
