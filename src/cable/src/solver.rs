// Block-sparse symmetric matrices and a filtered preconditioned conjugate
// gradient solver (Baraff and Witkin) for the per-step velocity update.
// Anchored nodes are Dirichlet blocks projected out of every direction.

use crate::{CableError, Result, M3, V3};

/// Symmetric matrix of 3x3 blocks. Only the upper off-diagonal blocks are
/// stored, `(i, j, b)` means `A_ij = b` and `A_ji = b^T`.
#[derive(Clone, Debug)]
pub struct BlockMatrix {
	diag: Vec<M3>,
	off: Vec<(usize, usize, M3)>,
}

impl BlockMatrix {
	pub fn new(n: usize) -> Self {
		Self {
			diag: vec![M3::zeros(); n],
			off: Vec::new(),
		}
	}

	pub fn size(&self) -> usize {
		self.diag.len()
	}

	pub fn add_diag(&mut self, i: usize, m: M3) {
		self.diag[i] += m;
	}

	pub fn add_off(&mut self, i: usize, j: usize, m: M3) {
		debug_assert_ne!(i, j);
		self.off.push((i, j, m));
	}

	pub fn diag(&self, i: usize) -> &M3 {
		&self.diag[i]
	}

	pub fn mul(&self, x: &[V3]) -> Vec<V3> {
		let mut y: Vec<V3> =
			self.diag.iter().zip(x.iter()).map(|(m, v)| m * v).collect();
		for (i, j, m) in self.off.iter() {
			y[*i] += m * x[*j];
			y[*j] += m.transpose() * x[*i];
		}
		y
	}
}

/// Prescribed value for all three components of block `index`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dirichlet {
	pub index: usize,
	pub value: V3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
	pub iterations: u32,
	/// Relative residual of the free equations.
	pub residual: f64,
	/// Largest mismatch between a Dirichlet target and the solution.
	pub constraint_residual: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct ConjugateGradient {
	pub max_iterations: u32,
	pub tolerance: f64,
	pub constraint_tolerance: f64,
}

fn dot(a: &[V3], b: &[V3]) -> f64 {
	a.iter().zip(b.iter()).map(|(x, y)| x.dot(y)).sum()
}

fn norm(a: &[V3]) -> f64 {
	dot(a, a).sqrt()
}

impl ConjugateGradient {
	/// Solves `A x = b` with the blocks listed in `fixed` held at their
	/// targets. Later entries for the same block override earlier ones;
	/// conflicting entries leave a constraint residual that never vanishes,
	/// so such systems run into the iteration cap.
	pub fn solve(
		&self,
		a: &BlockMatrix,
		b: &[V3],
		fixed: &[Dirichlet],
		guess: Option<&[V3]>,
	) -> Result<(Vec<V3>, SolveStats)> {
		let n = a.size();
		debug_assert_eq!(b.len(), n);
		let mut free = vec![true; n];
		let mut x = match guess {
			Some(g) if g.len() == n => g.to_vec(),
			_ => vec![V3::zeros(); n],
		};
		let mut z0 = vec![V3::zeros(); n];
		for d in fixed.iter() {
			free[d.index] = false;
			x[d.index] = d.value;
			z0[d.index] = d.value;
		}
		let constraint_residual = fixed
			.iter()
			.map(|d| (x[d.index] - d.value).norm())
			.fold(0.0, f64::max);
		let filter = |v: &mut Vec<V3>| {
			for (vi, f) in v.iter_mut().zip(free.iter()) {
				if !f {
					*vi = V3::zeros();
				}
			}
		};
		let residual_of = |x: &[V3]| {
			let mut r: Vec<V3> = b
				.iter()
				.zip(a.mul(x).iter())
				.map(|(bi, axi)| bi - axi)
				.collect();
			filter(&mut r);
			r
		};

		// the reference does not depend on the warm start
		let r_ref = norm(&residual_of(&z0));
		let threshold = self.tolerance * r_ref;
		let relative = |r: f64| if r_ref > 0.0 { r / r_ref } else { r };

		// Jacobi preconditioner over the free components
		let inv_diag: Vec<V3> = (0..n)
			.map(|i| {
				let m = a.diag(i);
				V3::from_fn(|k, _| {
					let d = m[(k, k)];
					if free[i] && d > 0.0 {
						1.0 / d
					} else {
						0.0
					}
				})
			})
			.collect();
		let precond = |r: &[V3]| -> Vec<V3> {
			r.iter()
				.zip(inv_diag.iter())
				.map(|(ri, di)| ri.component_mul(di))
				.collect()
		};

		let mut r = residual_of(&x);
		let mut s = precond(&r);
		let mut p = s.clone();
		let mut rs = dot(&r, &s);
		let mut iterations = 0;
		loop {
			let r_norm = norm(&r);
			if !r_norm.is_finite() {
				return Err(CableError::SolverNonConvergence {
					iterations,
					residual: r_norm,
				});
			}
			let stats = SolveStats {
				iterations,
				residual: relative(r_norm),
				constraint_residual,
			};
			if r_norm <= threshold
				&& constraint_residual <= self.constraint_tolerance
			{
				return Ok((x, stats));
			}
			if iterations >= self.max_iterations {
				return Err(CableError::SolverNonConvergence {
					iterations,
					residual: stats.residual.max(constraint_residual),
				});
			}
			let mut q = a.mul(&p);
			filter(&mut q);
			let pq = dot(&p, &q);
			if !(pq > 0.0) {
				// breakdown, nothing left to reduce along p
				return Err(CableError::SolverNonConvergence {
					iterations,
					residual: stats.residual.max(constraint_residual),
				});
			}
			let alpha = rs / pq;
			for i in 0..n {
				x[i] += p[i] * alpha;
				r[i] -= q[i] * alpha;
			}
			s = precond(&r);
			let rs_new = dot(&r, &s);
			let beta = rs_new / rs;
			for i in 0..n {
				p[i] = s[i] + p[i] * beta;
			}
			rs = rs_new;
			iterations += 1;
		}
	}
}
