use thiserror::Error;

#[derive(Debug, Error)]
pub enum CableError {
	/// An element or anchor references a node that does not exist, or the
	/// assembled mesh is otherwise unusable.
	#[error("Invalid topology: {0}")]
	InvalidTopology(String),

	#[error("Solver did not converge after {iterations} iterations (residual: {residual:.2e})")]
	SolverNonConvergence { iterations: u32, residual: f64 },

	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("Simulation is stopped")]
	Stopped,

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Config parse error: {0}")]
	Parse(#[from] ron::error::SpannedError),
}

pub type Result<T> = std::result::Result<T, CableError>;
