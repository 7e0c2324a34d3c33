// Implicit Euler integration of the cable equations of motion. Both
// timesteppers work on a copy of the node state; nothing is committed here.

use crate::config::TimestepperKind;
use crate::element::{Element, ElementState};
use crate::node::Node;
use crate::solver::{BlockMatrix, Dirichlet, SolveStats};
use crate::system::System;
use crate::{CableError, Result, M3, V3};

pub(crate) struct Advance {
	pub nodes: Vec<Node>,
	/// Velocity update of the step, reused as a warm start.
	pub dv: Vec<V3>,
	pub stats: SolveStats,
}

pub(crate) fn advance(
	system: &System,
	nodes: &[Node],
	dt: f64,
	guess: Option<&[V3]>,
) -> Result<Advance> {
	let (dv, stats) = match system.config().timestepper {
		TimestepperKind::EulerImplicitLinearized => {
			euler_implicit_linearized(system, nodes, dt, guess)?
		}
		TimestepperKind::EulerImplicit => euler_implicit(system, nodes, dt)?,
	};
	let next = integrate(system, nodes, &dv, dt);
	let violation = system.constraints().violation(&next);
	if violation > system.config().solver.constraint_tolerance {
		return Err(CableError::SolverNonConvergence {
			iterations: stats.iterations,
			residual: violation,
		});
	}
	Ok(Advance {
		nodes: next,
		dv,
		stats,
	})
}

struct Assembly {
	/// `M + sum (dt beta + dt^2) K_e`
	matrix: BlockMatrix,
	/// Elastic and gravity forces.
	force: Vec<V3>,
	/// `K v`
	stiff_v: Vec<V3>,
	/// `C v = sum beta K_e v`
	damp_v: Vec<V3>,
}

#[cfg(not(debug_assertions))]
fn evaluate_elements(
	elements: &[Box<dyn Element>],
	pos: &[V3],
) -> Vec<ElementState> {
	use rayon::prelude::*;
	elements
		.par_iter()
		.map(|e| {
			let [a, b] = e.nodes();
			e.evaluate(pos[a.index()], pos[b.index()])
		})
		.collect()
}

#[cfg(debug_assertions)]
fn evaluate_elements(
	elements: &[Box<dyn Element>],
	pos: &[V3],
) -> Vec<ElementState> {
	elements
		.iter()
		.map(|e| {
			let [a, b] = e.nodes();
			e.evaluate(pos[a.index()], pos[b.index()])
		})
		.collect()
}

/// Builds the step matrix `M + dt C + dt^2 K` and the force terms. `stiffness`
/// supplies `K` and the elastic forces, `damping` the matrix behind `C`.
fn assemble(
	system: &System,
	nodes: &[Node],
	stiffness: &[ElementState],
	damping: &[ElementState],
	vel: &[V3],
	dt: f64,
) -> Assembly {
	let n = nodes.len();
	let gravity = system.gravity();
	let mut matrix = BlockMatrix::new(n);
	let mut force = Vec::with_capacity(n);
	for (i, node) in nodes.iter().enumerate() {
		matrix.add_diag(i, M3::identity() * node.mass);
		force.push(gravity * node.mass);
	}
	let mut stiff_v = vec![V3::zeros(); n];
	let mut damp_v = vec![V3::zeros(); n];
	// scatter in element order so every build sums identically
	for (s, d) in stiffness.iter().zip(damping.iter()) {
		let [a, b] = [s.nodes[0].index(), s.nodes[1].index()];
		let k = s.stiffness * (dt * dt) + d.stiffness * (dt * d.damping);
		matrix.add_diag(a, k);
		matrix.add_diag(b, k);
		matrix.add_off(a, b, -k);
		force[a] += s.force;
		force[b] -= s.force;
		let dvel = vel[a] - vel[b];
		let kv = s.stiffness * dvel;
		stiff_v[a] += kv;
		stiff_v[b] -= kv;
		let cv = d.stiffness * dvel * d.damping;
		damp_v[a] += cv;
		damp_v[b] -= cv;
	}
	Assembly {
		matrix,
		force,
		stiff_v,
		damp_v,
	}
}

fn norm(v: &[V3]) -> f64 {
	v.iter().map(|x| x.norm_squared()).sum::<f64>().sqrt()
}

/// `(M + dt C + dt^2 K) dv = dt (f - dt K v - C v)`
fn euler_implicit_linearized(
	system: &System,
	nodes: &[Node],
	dt: f64,
	guess: Option<&[V3]>,
) -> Result<(Vec<V3>, SolveStats)> {
	let pos: Vec<V3> = nodes.iter().map(|n| n.get_pos()).collect();
	let vel: Vec<V3> = nodes.iter().map(|n| n.get_vel()).collect();
	let states = evaluate_elements(system.elements().as_slice(), &pos);
	let asm = assemble(system, nodes, &states, &states, &vel, dt);
	let rhs: Vec<V3> = (0..nodes.len())
		.map(|i| (asm.force[i] - asm.stiff_v[i] * dt - asm.damp_v[i]) * dt)
		.collect();
	let fixed = system.constraints().dirichlet(nodes, dt);
	system
		.config()
		.solver
		.linear_solver(dt)
		.solve(&asm.matrix, &rhs, &fixed, guess)
}

/// Newton iterations on `g(dv) = M dv - dt (f(x1) - C v1)` with
/// `v1 = v0 + dv` and `x1 = x0 + dt v1`. `C` is taken at the start of the
/// step.
fn euler_implicit(
	system: &System,
	nodes: &[Node],
	dt: f64,
) -> Result<(Vec<V3>, SolveStats)> {
	let config = &system.config().solver;
	let solver = config.linear_solver(dt);
	let n = nodes.len();
	let elements = system.elements().as_slice();
	let pos0: Vec<V3> = nodes.iter().map(|n| n.get_pos()).collect();
	let damping = evaluate_elements(elements, &pos0);
	let targets = system.constraints().dirichlet(nodes, dt);
	// residual of one step of free fall, floors the convergence scale
	let fall = nodes
		.iter()
		.filter(|node| !node.fixed)
		.map(|node| (system.gravity() * (node.mass * dt)).norm_squared())
		.sum::<f64>()
		.sqrt();
	let mut dv = vec![V3::zeros(); n];
	let mut scale = None;
	let mut total = SolveStats::default();
	for newton in 0..=config.max_newton_iterations {
		let vel: Vec<V3> =
			nodes.iter().zip(dv.iter()).map(|(n, d)| n.get_vel() + d).collect();
		let pos: Vec<V3> = nodes
			.iter()
			.zip(vel.iter())
			.map(|(n, v)| n.get_pos() + v * dt)
			.collect();
		let stiffness = evaluate_elements(elements, &pos);
		let asm = assemble(system, nodes, &stiffness, &damping, &vel, dt);
		let rhs: Vec<V3> = (0..n)
			.map(|i| {
				(asm.force[i] - asm.damp_v[i]) * dt - dv[i] * nodes[i].mass
			})
			.collect();
		let g_norm = rhs
			.iter()
			.zip(nodes.iter())
			.filter(|(_, node)| !node.fixed)
			.map(|(r, _)| r.norm_squared())
			.sum::<f64>()
			.sqrt();
		let g_ref = *scale.get_or_insert(g_norm.max(fall));
		let increments: Vec<Dirichlet> = targets
			.iter()
			.map(|d| Dirichlet {
				index: d.index,
				value: d.value - dv[d.index],
			})
			.collect();
		let pending = increments
			.iter()
			.map(|d| d.value.norm() * dt)
			.fold(0.0, f64::max);
		total.residual = if g_ref > 0.0 { g_norm / g_ref } else { g_norm };
		total.constraint_residual = pending;
		if g_norm <= config.newton_tolerance * g_ref
			&& pending <= config.constraint_tolerance
		{
			log::trace!("newton converged after {} iterations", newton);
			return Ok((dv, total));
		}
		if newton == config.max_newton_iterations {
			break;
		}
		let (delta, stats) = solver.solve(&asm.matrix, &rhs, &increments, None)?;
		total.iterations += stats.iterations;
		for (d, x) in dv.iter_mut().zip(delta.iter()) {
			*d += x;
		}
		// anchored blocks take their targets exactly in every solve
		if norm(&delta) <= config.newton_increment_tolerance * (norm(&dv) + 1.0) {
			log::trace!("newton increment vanished after {} iterations", newton + 1);
			total.constraint_residual = 0.0;
			return Ok((dv, total));
		}
	}
	Err(CableError::SolverNonConvergence {
		iterations: total.iterations,
		residual: total.residual.max(total.constraint_residual),
	})
}

/// Applies a velocity update and refreshes node tangents.
fn integrate(system: &System, nodes: &[Node], dv: &[V3], dt: f64) -> Vec<Node> {
	let mut next = nodes.to_vec();
	for (node, d) in next.iter_mut().zip(dv.iter()) {
		node.vel += d;
		node.pos += node.vel * dt;
	}
	let elements = system.elements();
	let tangents: Vec<Option<V3>> = (0..next.len())
		.map(|i| {
			let sum = system
				.incident(i)
				.iter()
				.filter_map(|h| elements.get(*h))
				.filter_map(|e| {
					let [a, b] = e.nodes();
					e.tangent(next[a.index()].pos, next[b.index()].pos)
				})
				.fold(V3::zeros(), |acc, t| acc + t);
			sum.try_normalize(f64::EPSILON)
		})
		.collect();
	for (node, t) in next.iter_mut().zip(tangents.into_iter()) {
		if let Some(t) = t {
			node.dir = t;
		}
	}
	system.constraints().apply_directions(&mut next);
	next
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::config::SimConfig;
	use crate::material::CableMaterial;
	use crate::node::NodeHandle;
	use std::sync::Arc;

	fn cable(config: SimConfig, n: usize) -> (System, Vec<NodeHandle>) {
		let mut sys = System::new(config).unwrap();
		let mat = Arc::new(CableMaterial::default());
		let hs: Vec<NodeHandle> = (0..n)
			.map(|i| sys.create_node(V3::new(0.08 * i as f64, 0.5, 0.), V3::x()))
			.collect();
		for w in hs.windows(2) {
			sys.connect(w[0], w[1], &mat).unwrap();
		}
		sys.anchor_in_place(hs[0]).unwrap();
		sys.finalize().unwrap();
		(sys, hs)
	}

	#[test]
	fn test_free_fall_step() {
		let (sys, _) = cable(SimConfig::default(), 4);
		let adv = advance(&sys, sys.nodes().as_slice(), 0.01, None).unwrap();
		let g = -9.81 * 0.01;
		// all free nodes share the same vertical update at rest
		for i in 1..4 {
			assert!((adv.dv[i][1] - g).abs() < 1e-9, "{:?}", adv.dv[i]);
			assert!(adv.nodes[i].pos[1] < 0.5);
		}
		assert_eq!(adv.nodes[0].pos, V3::new(0., 0.5, 0.));
		assert_eq!(adv.nodes[0].vel, V3::zeros());
	}

	#[test]
	fn test_newton_matches_rest_fixed_point() {
		let config = SimConfig::default()
			.with_gravity([0., 0., 0.])
			.with_timestepper(TimestepperKind::EulerImplicit);
		let (sys, _) = cable(config, 5);
		let adv = advance(&sys, sys.nodes().as_slice(), 0.01, None).unwrap();
		assert_eq!(adv.stats.iterations, 0);
		for (a, b) in adv.nodes.iter().zip(sys.nodes().as_slice()) {
			assert_eq!(a.pos, b.pos);
		}
	}

	#[test]
	fn test_newton_falls() {
		let config =
			SimConfig::default().with_timestepper(TimestepperKind::EulerImplicit);
		let (sys, hs) = cable(config, 5);
		let adv = advance(&sys, sys.nodes().as_slice(), 0.01, None).unwrap();
		assert!(adv.nodes[hs[4].index()].pos[1] < 0.5);
		assert!((adv.nodes[0].pos - V3::new(0., 0.5, 0.)).norm() < 1e-8);
	}

	#[test]
	fn test_tangents_follow_elements() {
		let (sys, _) = cable(SimConfig::default(), 3);
		let mut nodes = sys.nodes().as_slice().to_vec();
		nodes[2].pos = V3::new(0.08, 0.42, 0.);
		let next = integrate(&sys, &nodes, &[V3::zeros(); 3], 0.01);
		assert!((next[2].dir - V3::new(0., -1., 0.)).norm() < 1e-12);
		let mid = V3::new(1., -1., 0.).normalize();
		assert!((next[1].dir - mid).norm() < 1e-12);
	}
}
