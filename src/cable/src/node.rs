use protocol::pr_model::PrNode;

use crate::{to_array, V3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub(crate) usize);

impl NodeHandle {
	pub fn index(&self) -> usize {
		self.0
	}
}

/// Discretization point of a cable: position plus tangent direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
	pub id: usize,
	pub pos: V3,
	pub dir: V3,
	pub vel: V3,
	pub mass: f64, // lumped, set when the system is finalized
	pub fixed: bool,
}

impl Node {
	pub fn new(id: usize, pos: V3, dir: V3) -> Self {
		Self {
			id,
			pos,
			dir,
			vel: V3::zeros(),
			mass: 0.0,
			fixed: false,
		}
	}

	pub fn get_pos(&self) -> V3 {
		self.pos
	}

	pub fn get_dir(&self) -> V3 {
		self.dir
	}

	pub fn get_vel(&self) -> V3 {
		self.vel
	}

	pub fn is_fixed(&self) -> bool {
		self.fixed
	}

	pub fn render(&self) -> PrNode {
		PrNode {
			id: self.id,
			pos: to_array(self.pos),
			dir: to_array(self.dir),
			fixed: self.fixed,
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct NodeStore {
	nodes: Vec<Node>,
}

impl NodeStore {
	pub fn create_node(&mut self, pos: V3, dir: V3) -> NodeHandle {
		let id = self.nodes.len();
		self.nodes.push(Node::new(id, pos, dir));
		NodeHandle(id)
	}

	pub fn contains(&self, handle: NodeHandle) -> bool {
		handle.0 < self.nodes.len()
	}

	pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
		self.nodes.get(handle.0)
	}

	pub(crate) fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
		self.nodes.get_mut(handle.0)
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn handles(&self) -> impl Iterator<Item = NodeHandle> {
		(0..self.nodes.len()).map(NodeHandle)
	}

	pub fn as_slice(&self) -> &[Node] {
		&self.nodes
	}

	/// Replaces the whole state with the result of a committed step.
	pub(crate) fn commit(&mut self, nodes: Vec<Node>) {
		debug_assert_eq!(nodes.len(), self.nodes.len());
		self.nodes = nodes;
	}
}
