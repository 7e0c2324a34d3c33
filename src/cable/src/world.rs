use std::sync::mpsc::Sender;

use protocol::pr_model::PrModel;

use crate::node::{Node, NodeHandle};
use crate::system::System;
use crate::timestepper::{self, Advance};
use crate::{CableError, Result, V3};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepState {
	Idle,
	Running,
	Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
	pub step: u64,
	pub time: f64,
	pub iterations: u32,
	pub residual: f64,
	/// The step only succeeded as a sequence of smaller sub-steps.
	pub retried: bool,
}

/// Pull-based stepping loop around a finalized `System`.
///
/// A presentation layer calls `step` at its own cadence and reads
/// `snapshot` between steps; the state only changes inside `step`.
pub struct World {
	system: System,
	state: StepState,
	step_count: u64,
	time: f64,
	warm_start: Option<Vec<V3>>,
	tx: Option<Sender<PrModel>>,
}

impl World {
	pub fn new(mut system: System) -> Result<Self> {
		system.finalize()?;
		log::info!(
			"world ready: dt {}, {:?}",
			system.config().step_size,
			system.config().timestepper
		);
		Ok(Self {
			system,
			state: StepState::Idle,
			step_count: 0,
			time: 0.0,
			warm_start: None,
			tx: None,
		})
	}

	/// Every committed step sends a snapshot to `tx`.
	pub fn with_snapshot_sender(mut self, tx: Sender<PrModel>) -> Self {
		self.tx = Some(tx);
		self
	}

	pub fn state(&self) -> StepState {
		self.state
	}

	pub fn system(&self) -> &System {
		&self.system
	}

	pub fn nodes(&self) -> &[Node] {
		self.system.nodes().as_slice()
	}

	pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
		self.system.node(handle)
	}

	pub fn time(&self) -> f64 {
		self.time
	}

	pub fn step_count(&self) -> u64 {
		self.step_count
	}

	pub fn halt(&mut self) {
		if self.state != StepState::Stopped {
			log::info!("halted at step {}", self.step_count);
		}
		self.state = StepState::Stopped;
	}

	pub fn step(&mut self) -> Result<StepReport> {
		match self.state {
			StepState::Stopped => return Err(CableError::Stopped),
			StepState::Idle => self.state = StepState::Running,
			StepState::Running => {}
		}
		let dt = self.system.config().step_size;
		let guess = if self.system.config().solver.warm_start {
			self.warm_start.as_deref()
		} else {
			None
		};
		let first = timestepper::advance(
			&self.system,
			self.system.nodes().as_slice(),
			dt,
			guess,
		);
		let result = match first {
			Ok(adv) => Ok((adv, false)),
			Err(CableError::SolverNonConvergence {
				iterations,
				residual,
			}) => {
				log::warn!(
					"step {} did not converge ({} iterations, residual {:.2e}), retrying",
					self.step_count + 1,
					iterations,
					residual
				);
				self.retry(dt).map(|adv| (adv, true))
			}
			Err(e) => Err(e),
		};
		let (adv, retried) = match result {
			Ok(r) => r,
			Err(e) => {
				log::error!("step {} failed: {}", self.step_count + 1, e);
				self.state = StepState::Stopped;
				return Err(e);
			}
		};

		let Advance { nodes, dv, stats } = adv;
		self.system.commit(nodes);
		self.warm_start = if retried { None } else { Some(dv) };
		self.step_count += 1;
		self.time += dt;
		log::debug!(
			"step {}: t = {:.4}, {} iterations, residual {:.2e}",
			self.step_count,
			self.time,
			stats.iterations,
			stats.residual
		);
		self.emit();
		Ok(StepReport {
			step: self.step_count,
			time: self.time,
			iterations: stats.iterations,
			residual: stats.residual,
			retried,
		})
	}

	/// Repeats a failed step as several shorter sub-steps.
	fn retry(&self, dt: f64) -> Result<Advance> {
		let substeps = self.system.config().solver.retry_substeps.max(1);
		let h = dt / substeps as f64;
		let mut nodes = self.system.nodes().as_slice().to_vec();
		let mut dv = vec![V3::zeros(); nodes.len()];
		let mut stats = Default::default();
		for _ in 0..substeps {
			let adv = timestepper::advance(&self.system, &nodes, h, None)?;
			nodes = adv.nodes;
			dv = adv.dv;
			stats = adv.stats;
		}
		Ok(Advance { nodes, dv, stats })
	}

	pub fn run(&mut self, steps: u64) -> Result<()> {
		for _ in 0..steps {
			self.step()?;
		}
		Ok(())
	}

	pub fn snapshot(&self) -> PrModel {
		let elements = self.system.elements();
		PrModel {
			step: self.step_count,
			time: self.time,
			nodes: self.nodes().iter().map(|n| n.render()).collect(),
			elements: elements
				.as_slice()
				.iter()
				.enumerate()
				.map(|(id, e)| e.render(id))
				.collect(),
			anchors: self.system.constraints().render(),
		}
	}

	fn emit(&mut self) {
		let sent = self
			.tx
			.as_ref()
			.map(|tx| tx.send(self.snapshot()).is_ok());
		if sent == Some(false) {
			log::warn!("snapshot receiver is gone, no more snapshots are sent");
			self.tx = None;
		}
	}
}
