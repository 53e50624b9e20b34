use thiserror::Error;

/// Domain error kinds, layered under the crate-wide `anyhow::Result` alias.
///
/// Most variants are fatal and propagated as `Err`. `NonConvergent` and
/// `Breakdown` are the exception: the iterative kernels in `solver.rs`
/// construct them purely to format their `Display` message into a log line,
/// then fold the underlying condition into a successful `SolveOutcome`
/// instead of returning `Err` — the "log and continue" policy, typed rather
/// than left to convention.
#[derive(Error, Debug)]
pub enum SpicError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("duplicate element name: {0}")]
    DuplicateElement(String),

    #[error("unknown source referenced in directive: {0}")]
    UnknownSource(String),

    #[error("incompatible option combination: {0}")]
    Config(String),

    #[error("singular matrix: zero pivot at row {0}")]
    Singular(usize),

    #[error("matrix is not symmetric positive-definite (Cholesky failed at row {0})")]
    NonSpd(usize),

    #[error("iterative solve did not converge after {iterations} iterations (error={error:e})")]
    NonConvergent { iterations: usize, error: f64 },

    #[error("breakdown in iterative solve at iteration {0}")]
    Breakdown(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
