//! Selects a numerical method from [`Options`], exposes `solve(b)` over a
//! dense or sparse [`MnaSystem`], and caches the factorization or
//! preconditioner across calls until the system is replaced.

use std::io::Write;
use std::time::Instant;

use log::warn;
use nalgebra::{Cholesky, DMatrix, DVector, Dynamic, LU};

use crate::commands::Options;
use crate::error::SpicError;
use crate::system::{sparse_to_dense, MnaSystem};

type DenseLu = LU<f64, Dynamic, Dynamic>;
type DenseCholesky = Cholesky<f64, Dynamic>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Lu,
    Cholesky,
    Cg,
    BiCg,
}

impl Method {
    pub fn select(iter: bool, spd: bool) -> Method {
        match (iter, spd) {
            (false, false) => Method::Lu,
            (false, true) => Method::Cholesky,
            (true, false) => Method::BiCg,
            (true, true) => Method::Cg,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PerfCounters {
    pub decompose_seconds: f64,
    pub decompose_calls: u64,
    pub compute_seconds: f64,
    pub compute_calls: u64,
    pub solve_seconds: f64,
    pub solve_calls: u64,
}

impl PerfCounters {
    fn record_decompose(&mut self, secs: f64) {
        self.decompose_seconds += secs;
        self.decompose_calls += 1;
    }

    fn record_compute(&mut self, secs: f64) {
        self.compute_seconds += secs;
        self.compute_calls += 1;
    }

    fn record_solve(&mut self, secs: f64) {
        self.solve_seconds += secs;
        self.solve_calls += 1;
    }

    pub fn dump(&self, path: &std::path::Path, wallclock: f64) -> Result<(), SpicError> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "decompose_seconds {}", self.decompose_seconds)?;
        writeln!(file, "decompose_calls {}", self.decompose_calls)?;
        writeln!(file, "compute_seconds {}", self.compute_seconds)?;
        writeln!(file, "compute_calls {}", self.compute_calls)?;
        writeln!(file, "solve_seconds {}", self.solve_seconds)?;
        writeln!(file, "solve_calls {}", self.solve_calls)?;
        writeln!(file, "total_secs {}", wallclock)?;
        Ok(())
    }
}

/// Per-method cached algorithm state: factorization or preconditioner, one
/// variant per method, never a shared union.
enum SolverState {
    CustomLu { perm: Vec<usize> },
    CustomCholesky,
    LibraryLu(DenseLu),
    LibraryCholesky(DenseCholesky),
    Iterative { preconditioner: DVector<f64> },
}

/// Outcome of one `solve(b)` call. Always `Ok` at the type level — the
/// non-fatal numeric conditions (iterative non-convergence, BiCG
/// breakdown) are reported here rather than as an `Err`, matching the
/// "log and continue" propagation policy.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub x: DVector<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub error: f64,
    pub breakdown: bool,
}

pub struct Solver {
    method: Method,
    itol: f64,
    state: SolverState,
    perf: PerfCounters,
}

impl Solver {
    /// Chooses a method from `options`, performs the one-shot
    /// factorization (direct methods) or preconditioner computation
    /// (iterative methods) against `system`, and returns a ready-to-use
    /// solver. A non-SPD Cholesky factorization or a singular LU pivot is
    /// a fatal error here, never silently demoted to another method.
    pub fn new(options: &Options, system: &mut MnaSystem) -> Result<Solver, SpicError> {
        options.validate()?;
        let method = Method::select(options.iter, options.spd);
        let mut perf = PerfCounters::default();
        let n = system.n();

        let state = match method {
            Method::Lu if options.custom => {
                let start = Instant::now();
                let dense = require_dense(system)?;
                let perm = lu_custom_decompose(&mut dense.a)?;
                perf.record_decompose(start.elapsed().as_secs_f64());
                SolverState::CustomLu { perm }
            }
            Method::Lu => {
                let start = Instant::now();
                let a = dense_copy(system, options.sparse);
                let lu = a.lu();
                perf.record_decompose(start.elapsed().as_secs_f64());
                SolverState::LibraryLu(lu)
            }
            Method::Cholesky if options.custom => {
                let start = Instant::now();
                let dense = require_dense(system)?;
                cholesky_custom_decompose(&mut dense.a)?;
                perf.record_decompose(start.elapsed().as_secs_f64());
                SolverState::CustomCholesky
            }
            Method::Cholesky => {
                let start = Instant::now();
                let a = dense_copy(system, options.sparse);
                let chol = a.cholesky().ok_or(SpicError::NonSpd(0))?;
                perf.record_decompose(start.elapsed().as_secs_f64());
                SolverState::LibraryCholesky(chol)
            }
            Method::Cg | Method::BiCg => {
                let start = Instant::now();
                let preconditioner = jacobi_preconditioner(system, n);
                perf.record_compute(start.elapsed().as_secs_f64());
                SolverState::Iterative { preconditioner }
            }
        };

        Ok(Solver {
            method,
            itol: options.itol,
            state,
            perf,
        })
    }

    /// Solves `A·x = b`, writing the result into `system`'s `x` and `b`.
    pub fn solve(&mut self, system: &mut MnaSystem, b: &DVector<f64>) -> Result<SolveOutcome, SpicError> {
        let start = Instant::now();
        *system.b_mut() = b.clone();

        let outcome = match &self.state {
            SolverState::CustomLu { perm } => {
                let dense = require_dense(system)?;
                let x = lu_custom_solve(&dense.a, perm, b);
                SolveOutcome {
                    x,
                    converged: true,
                    iterations: 0,
                    error: 0.0,
                    breakdown: false,
                }
            }
            SolverState::CustomCholesky => {
                let dense = require_dense(system)?;
                let x = cholesky_custom_solve(&dense.a, b);
                SolveOutcome {
                    x,
                    converged: true,
                    iterations: 0,
                    error: 0.0,
                    breakdown: false,
                }
            }
            SolverState::LibraryLu(lu) => {
                let x = lu.solve(b).ok_or(SpicError::Singular(0))?;
                SolveOutcome {
                    x,
                    converged: true,
                    iterations: 0,
                    error: 0.0,
                    breakdown: false,
                }
            }
            SolverState::LibraryCholesky(chol) => {
                let x = chol.solve(b);
                SolveOutcome {
                    x,
                    converged: true,
                    iterations: 0,
                    error: 0.0,
                    breakdown: false,
                }
            }
            SolverState::Iterative { preconditioner } => match self.method {
                Method::Cg => cg_solve(system, b, preconditioner, self.itol),
                Method::BiCg => bicg_solve(system, b, preconditioner, self.itol),
                _ => unreachable!("iterative state only constructed for Cg/BiCg"),
            },
        };

        *system.x_mut() = outcome.x.clone();
        self.perf.record_solve(start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    pub fn perf_counters(&self) -> &PerfCounters {
        &self.perf
    }

    pub fn dump_perf_counters(&self, path: &std::path::Path, wallclock: f64) -> Result<(), SpicError> {
        self.perf.dump(path, wallclock)
    }
}

fn require_dense(system: &mut MnaSystem) -> Result<&mut crate::system::DenseSystem, SpicError> {
    match system {
        MnaSystem::Dense(d) => Ok(d),
        MnaSystem::Sparse(_) => Err(SpicError::Config(
            "custom direct kernels require a dense system".to_string(),
        )),
    }
}

fn dense_copy(system: &MnaSystem, sparse: bool) -> DMatrix<f64> {
    match system {
        MnaSystem::Dense(d) => d.a.clone(),
        MnaSystem::Sparse(s) => {
            debug_assert!(sparse);
            sparse_to_dense(&s.a, s.n)
        }
    }
}

fn matvec(system: &MnaSystem, v: &DVector<f64>) -> DVector<f64> {
    match system {
        MnaSystem::Dense(d) => &d.a * v,
        MnaSystem::Sparse(s) => s.matvec(v),
    }
}

fn transpose_matvec(system: &MnaSystem, v: &DVector<f64>) -> DVector<f64> {
    match system {
        MnaSystem::Dense(d) => d.a.transpose() * v,
        MnaSystem::Sparse(s) => s.transpose_matvec(v),
    }
}

fn diag_at(system: &MnaSystem, i: usize) -> f64 {
    match system {
        MnaSystem::Dense(d) => d.a[(i, i)],
        MnaSystem::Sparse(s) => s.diag(i),
    }
}

fn jacobi_preconditioner(system: &MnaSystem, n: usize) -> DVector<f64> {
    const EPS: f64 = 1e-12;
    DVector::from_iterator(
        n,
        (0..n).map(|i| {
            let d = diag_at(system, i);
            if d.abs() >= EPS {
                1.0 / d
            } else {
                1.0
            }
        }),
    )
}

/// In-place LU with partial pivoting. `L` (unit diagonal, implicit) is
/// stored strictly below the diagonal, `U` on and above it.
fn lu_custom_decompose(a: &mut DMatrix<f64>) -> Result<Vec<usize>, SpicError> {
    let n = a.nrows();
    let mut perm: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let mut max_val = a[(k, k)].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let v = a[(i, k)].abs();
            if v > max_val {
                max_val = v;
                max_row = i;
            }
        }
        if max_row != k {
            for j in 0..n {
                a.swap((k, j), (max_row, j));
            }
            perm.swap(k, max_row);
        }
        if a[(k, k)] == 0.0 {
            return Err(SpicError::Singular(k));
        }
        for i in (k + 1)..n {
            a[(i, k)] /= a[(k, k)];
        }
        for i in (k + 1)..n {
            let factor = a[(i, k)];
            for j in (k + 1)..n {
                a[(i, j)] -= factor * a[(k, j)];
            }
        }
    }
    Ok(perm)
}

fn lu_custom_solve(a: &DMatrix<f64>, perm: &[usize], b: &DVector<f64>) -> DVector<f64> {
    let n = a.nrows();
    let mut y = DVector::zeros(n);
    for i in 0..n {
        let mut sum = b[perm[i]];
        for j in 0..i {
            sum -= a[(i, j)] * y[j];
        }
        y[i] = sum;
    }
    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= a[(i, j)] * x[j];
        }
        x[i] = sum / a[(i, i)];
    }
    x
}

/// In-place Cholesky `A = L·Lᵀ`, storing only `L`. Back-substitution reads
/// the lower triangle in place of `Lᵀ` since the latter is never stored.
fn cholesky_custom_decompose(a: &mut DMatrix<f64>) -> Result<(), SpicError> {
    let n = a.nrows();
    for k in 0..n {
        let mut s = a[(k, k)];
        for j in 0..k {
            s -= a[(k, j)] * a[(k, j)];
        }
        if s < 0.0 {
            return Err(SpicError::NonSpd(k));
        }
        let d = s.sqrt();
        a[(k, k)] = d;
        for i in (k + 1)..n {
            let mut v = a[(i, k)];
            for j in 0..k {
                v -= a[(i, j)] * a[(k, j)];
            }
            a[(i, k)] = v / d;
        }
    }
    Ok(())
}

fn cholesky_custom_solve(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = a.nrows();
    let mut y = DVector::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= a[(i, j)] * y[j];
        }
        y[i] = sum / a[(i, i)];
    }
    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= a[(j, i)] * x[j];
        }
        x[i] = sum / a[(i, i)];
    }
    x
}

/// Jacobi-preconditioned Conjugate Gradient, starting from the system's
/// current `x` as the initial guess.
fn cg_solve(system: &MnaSystem, b: &DVector<f64>, precond: &DVector<f64>, itol: f64) -> SolveOutcome {
    let n = system.n();
    let bnorm = b.norm();
    let mut x = system.x().clone();

    if bnorm < 1e-30 {
        x.fill(0.0);
        return SolveOutcome {
            x,
            converged: true,
            iterations: 0,
            error: 0.0,
            breakdown: false,
        };
    }

    let mut r = b - matvec(system, &x);
    let mut rho_prev = 1.0;
    let mut p = DVector::zeros(n);
    let mut iterations = 0;
    let mut error = r.norm() / bnorm;

    for iter in 1..=n {
        let z = precond.component_mul(&r);
        let rho = r.dot(&z);
        if iter == 1 {
            p = z;
        } else {
            p = &z + (rho / rho_prev) * &p;
        }
        let q = matvec(system, &p);
        let alpha = rho / p.dot(&q);
        x += alpha * &p;
        r -= alpha * &q;
        rho_prev = rho;
        iterations = iter;
        error = r.norm() / bnorm;
        if error <= itol {
            break;
        }
    }

    let converged = error <= itol;
    if converged {
        for i in 0..n {
            if x[i].abs() < itol {
                x[i] = 0.0;
            }
        }
    } else {
        warn!("{}", SpicError::NonConvergent { iterations, error });
    }
    SolveOutcome {
        x,
        converged,
        iterations,
        error,
        breakdown: false,
    }
}

/// Two-sided (biconjugate) preconditioned kernel using a transposed
/// matrix-vector product and a shadow residual. Reports breakdown instead
/// of failing the run when `|ρ|` or `|p̃·q|` collapse toward zero.
fn bicg_solve(system: &MnaSystem, b: &DVector<f64>, precond: &DVector<f64>, itol: f64) -> SolveOutcome {
    const EPS: f64 = 1e-14;
    let n = system.n();
    let bnorm = b.norm();
    let mut x = system.x().clone();

    if bnorm < 1e-30 {
        x.fill(0.0);
        return SolveOutcome {
            x,
            converged: true,
            iterations: 0,
            error: 0.0,
            breakdown: false,
        };
    }

    let mut r = b - matvec(system, &x);
    let mut r_tilde = r.clone();
    let mut p = DVector::zeros(n);
    let mut p_tilde = DVector::zeros(n);
    let mut rho_prev = 1.0;
    let mut iterations = 0;
    let mut error = r.norm() / bnorm;
    let mut breakdown = false;

    for iter in 1..=n {
        let z = precond.component_mul(&r);
        let z_tilde = precond.component_mul(&r_tilde);
        let rho = r_tilde.dot(&z);
        if rho.abs() < EPS {
            breakdown = true;
            break;
        }
        if iter == 1 {
            p = z;
            p_tilde = z_tilde;
        } else {
            let beta = rho / rho_prev;
            p = &z + beta * &p;
            p_tilde = &z_tilde + beta * &p_tilde;
        }
        let q = matvec(system, &p);
        let q_tilde = transpose_matvec(system, &p_tilde);
        let denom = p_tilde.dot(&q);
        if denom.abs() < EPS {
            breakdown = true;
            break;
        }
        let alpha = rho / denom;
        x += alpha * &p;
        r -= alpha * &q;
        r_tilde -= alpha * &q_tilde;
        rho_prev = rho;
        iterations = iter;
        error = r.norm() / bnorm;
        if error <= itol {
            break;
        }
    }

    let converged = !breakdown && error <= itol;
    if breakdown {
        warn!("{}", SpicError::Breakdown(iterations));
    } else if converged {
        for i in 0..n {
            if x[i].abs() < itol {
                x[i] = 0.0;
            }
        }
    } else {
        warn!("{}", SpicError::NonConvergent { iterations, error });
    }
    SolveOutcome {
        x,
        converged,
        iterations,
        error,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Options;
    use crate::system::DenseSystem;

    fn spd_system() -> MnaSystem {
        let mut sys = DenseSystem::zeros(2);
        sys.a[(0, 0)] = 4.0;
        sys.a[(1, 1)] = 3.0;
        sys.a[(0, 1)] = 1.0;
        sys.a[(1, 0)] = 1.0;
        sys.b = DVector::from_vec(vec![1.0, 2.0]);
        MnaSystem::Dense(sys)
    }

    #[test]
    fn custom_lu_matches_library_lu() {
        let mut sys_custom = spd_system();
        let mut sys_lib = spd_system();
        let opts_custom = Options {
            custom: true,
            ..Default::default()
        };
        let opts_lib = Options::default();
        let mut solver_custom = Solver::new(&opts_custom, &mut sys_custom).unwrap();
        let mut solver_lib = Solver::new(&opts_lib, &mut sys_lib).unwrap();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let out_custom = solver_custom.solve(&mut sys_custom, &b).unwrap();
        let out_lib = solver_lib.solve(&mut sys_lib, &b).unwrap();
        assert!((out_custom.x[0] - out_lib.x[0]).abs() < 1e-9);
        assert!((out_custom.x[1] - out_lib.x[1]).abs() < 1e-9);
    }

    #[test]
    fn cg_converges_on_spd_system() {
        let mut sys = spd_system();
        let opts = Options {
            iter: true,
            spd: true,
            custom: true,
            itol: 1e-9,
            ..Default::default()
        };
        let mut solver = Solver::new(&opts, &mut sys).unwrap();
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let out = solver.solve(&mut sys, &b).unwrap();
        assert!(out.converged);
        let residual = (&b - matvec(&sys, &out.x)).norm();
        assert!(residual / b.norm() <= 1e-6);
    }

    #[test]
    fn singular_lu_is_fatal() {
        let mut sys = DenseSystem::zeros(2);
        sys.b = DVector::from_vec(vec![1.0, 1.0]);
        let mut system = MnaSystem::Dense(sys);
        let opts = Options {
            custom: true,
            ..Default::default()
        };
        let err = Solver::new(&opts, &mut system);
        assert!(matches!(err, Err(SpicError::Singular(_))));
    }

    #[test]
    fn sparse_custom_direct_rejected_at_construction() {
        let opts = Options {
            custom: true,
            sparse: true,
            iter: false,
            ..Default::default()
        };
        let mut sys = spd_system();
        let err = Solver::new(&opts, &mut sys);
        assert!(matches!(err, Err(SpicError::Config(_))));
    }
}
