// pr_model: committed cable state for rendering

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrNode {
	pub id: usize,
	pub pos: [f64; 3],
	pub dir: [f64; 3],
	pub fixed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrElement {
	pub id: usize,
	pub nodes: [usize; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrAnchor {
	pub node: usize,
	pub origin: [f64; 3],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PrModel {
	pub step: u64,
	pub time: f64,
	pub nodes: Vec<PrNode>,
	pub elements: Vec<PrElement>,
	pub anchors: Vec<PrAnchor>,
}

impl PrModel {
	pub fn node_pos(&self, id: usize) -> Option<[f64; 3]> {
		self.nodes.get(id).map(|n| n.pos)
	}
}
