pub mod pr_model;
use pr_model::PrModel;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
	WorldUpdate(PrModel),
}

impl Message {
	pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
		bincode::serialize(&self)
	}

	pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
		bincode::deserialize(bytes)
	}

	/// Frames are written back to back, a reader calls `read_from` until
	/// the stream is exhausted.
	pub fn write_to<W: Write>(&self, writer: W) -> bincode::Result<()> {
		bincode::serialize_into(writer, &self)
	}

	pub fn read_from<R: Read>(reader: R) -> bincode::Result<Self> {
		bincode::deserialize_from(reader)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::pr_model::{PrElement, PrNode};

	fn model(step: u64) -> PrModel {
		PrModel {
			step,
			time: step as f64 * 0.01,
			nodes: vec![
				PrNode {
					id: 0,
					pos: [0., 0.5, 0.],
					dir: [1., 0., 0.],
					fixed: true,
				},
				PrNode {
					id: 1,
					pos: [0.08, 0.5, 0.],
					dir: [1., 0., 0.],
					fixed: false,
				},
			],
			elements: vec![PrElement { id: 0, nodes: [0, 1] }],
			anchors: vec![],
		}
	}

	#[test]
	fn test_frame_stream() {
		let mut buf = Vec::new();
		for step in 0..3 {
			Message::WorldUpdate(model(step)).write_to(&mut buf).unwrap();
		}
		let mut reader = std::io::Cursor::new(buf);
		for step in 0..3 {
			let Message::WorldUpdate(m) = Message::read_from(&mut reader).unwrap();
			assert_eq!(m, model(step));
		}
		assert!(Message::read_from(&mut reader).is_err());
	}

	#[test]
	fn test_node_pos() {
		let m = model(0);
		assert_eq!(m.node_pos(1), Some([0.08, 0.5, 0.]));
		assert_eq!(m.node_pos(2), None);
	}
}
