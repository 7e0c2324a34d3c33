pub mod anchor;
pub mod builder;
pub mod config;
pub mod element;
pub mod error;
pub mod material;
pub mod node;
pub mod solver;
pub mod system;
mod timestepper;
pub mod world;

pub use error::{CableError, Result};

pub type V3 = nalgebra::Vector3<f64>;
pub type M3 = nalgebra::Matrix3<f64>;

pub(crate) fn to_array(v: V3) -> [f64; 3] {
	[v[0], v[1], v[2]]
}
