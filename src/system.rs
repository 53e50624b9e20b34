//! The MNA `System`: holds `A`, `x`, `b` of dimension `n`, in either dense
//! or sparse storage, plus the triplet accumulator used to build a sparse
//! `A` during assembly.

use nalgebra::{DMatrix, DVector};
use sprs::{CsMat, TriMat};

/// Triplet accumulator for sparse assembly. Duplicate `(row, col)` entries
/// are summed when compressed, matching the four-point stamp's habit of
/// touching the same cell from more than one element.
pub struct SparseTriplets {
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    n: usize,
}

impl SparseTriplets {
    pub fn with_capacity(n: usize, capacity: usize) -> Self {
        SparseTriplets {
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            vals: Vec::with_capacity(capacity),
            n,
        }
    }

    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.vals.push(value);
    }

    pub fn into_csmat(self) -> CsMat<f64> {
        let tri = TriMat::from_triplets((self.n, self.n), self.rows, self.cols, self.vals);
        tri.to_csr()
    }
}

#[derive(Debug, Clone)]
pub struct DenseSystem {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub x: DVector<f64>,
    pub n: usize,
}

impl DenseSystem {
    pub fn zeros(n: usize) -> Self {
        DenseSystem {
            a: DMatrix::zeros(n, n),
            b: DVector::zeros(n),
            x: DVector::zeros(n),
            n,
        }
    }

    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.a * x
    }
}

#[derive(Debug, Clone)]
pub struct SparseSystem {
    pub a: CsMat<f64>,
    pub b: DVector<f64>,
    pub x: DVector<f64>,
    pub n: usize,
}

impl SparseSystem {
    pub fn new(a: CsMat<f64>, n: usize) -> Self {
        SparseSystem {
            a,
            b: DVector::zeros(n),
            x: DVector::zeros(n),
            n,
        }
    }

    /// `A * x`, computed row by row without relying on sprs's own
    /// linear-algebra interop.
    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        sparse_matvec(&self.a, x)
    }

    /// `Aᵀ * x`, used by the two-sided (BiCG) hand-rolled kernel.
    pub fn transpose_matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        sparse_transpose_matvec(&self.a, x)
    }

    pub fn diag(&self, i: usize) -> f64 {
        sparse_get(&self.a, i, i)
    }
}

pub fn sparse_matvec(a: &CsMat<f64>, x: &DVector<f64>) -> DVector<f64> {
    let a = a.to_csr();
    let mut out = DVector::zeros(a.rows());
    for (row_idx, row_vec) in a.outer_iterator().enumerate() {
        let mut acc = 0.0;
        for (col_idx, &val) in row_vec.iter() {
            acc += val * x[col_idx];
        }
        out[row_idx] = acc;
    }
    out
}

pub fn sparse_transpose_matvec(a: &CsMat<f64>, x: &DVector<f64>) -> DVector<f64> {
    let a = a.to_csr();
    let mut out = DVector::zeros(a.cols());
    for (row_idx, row_vec) in a.outer_iterator().enumerate() {
        let xi = x[row_idx];
        if xi == 0.0 {
            continue;
        }
        for (col_idx, &val) in row_vec.iter() {
            out[col_idx] += val * xi;
        }
    }
    out
}

pub fn sparse_get(a: &CsMat<f64>, row: usize, col: usize) -> f64 {
    let a = a.to_csr();
    a.get(row, col).copied().unwrap_or(0.0)
}

/// Converts a `CsMat` to its dense equivalent, used by the library-backed
/// sparse direct solve path which materializes `A` once before factoring
/// (there is no off-the-shelf sparse direct factorization in this crate's
/// dependency stack).
pub fn sparse_to_dense(a: &CsMat<f64>, n: usize) -> DMatrix<f64> {
    let a = a.to_csr();
    let mut dense = DMatrix::zeros(n, n);
    for (row_idx, row_vec) in a.outer_iterator().enumerate() {
        for (col_idx, &val) in row_vec.iter() {
            dense[(row_idx, col_idx)] = val;
        }
    }
    dense
}

/// Elementwise `a + scale * c`, combined via triplets so the result does
/// not depend on `a` and `c` sharing a sparsity pattern.
pub fn sparse_add_scaled(a: &CsMat<f64>, c: &CsMat<f64>, scale: f64, n: usize) -> CsMat<f64> {
    let mut acc = SparseTriplets::with_capacity(n, a.nnz() + c.nnz());
    let a = a.to_csr();
    for (row_idx, row_vec) in a.outer_iterator().enumerate() {
        for (col_idx, &val) in row_vec.iter() {
            acc.push(row_idx, col_idx, val);
        }
    }
    let c = c.to_csr();
    for (row_idx, row_vec) in c.outer_iterator().enumerate() {
        for (col_idx, &val) in row_vec.iter() {
            acc.push(row_idx, col_idx, val * scale);
        }
    }
    acc.into_csmat()
}

#[derive(Debug, Clone)]
pub enum MnaSystem {
    Dense(DenseSystem),
    Sparse(SparseSystem),
}

impl MnaSystem {
    pub fn n(&self) -> usize {
        match self {
            MnaSystem::Dense(s) => s.n,
            MnaSystem::Sparse(s) => s.n,
        }
    }

    pub fn b(&self) -> &DVector<f64> {
        match self {
            MnaSystem::Dense(s) => &s.b,
            MnaSystem::Sparse(s) => &s.b,
        }
    }

    pub fn b_mut(&mut self) -> &mut DVector<f64> {
        match self {
            MnaSystem::Dense(s) => &mut s.b,
            MnaSystem::Sparse(s) => &mut s.b,
        }
    }

    pub fn x(&self) -> &DVector<f64> {
        match self {
            MnaSystem::Dense(s) => &s.x,
            MnaSystem::Sparse(s) => &s.x,
        }
    }

    pub fn x_mut(&mut self) -> &mut DVector<f64> {
        match self {
            MnaSystem::Dense(s) => &mut s.x,
            MnaSystem::Sparse(s) => &mut s.x,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, MnaSystem::Sparse(_))
    }

    /// Snapshot of just the `A` matrix, used by the transient view to save
    /// and later restore the DC `G`.
    pub fn clone_a(&self) -> AMatrix {
        match self {
            MnaSystem::Dense(s) => AMatrix::Dense(s.a.clone()),
            MnaSystem::Sparse(s) => AMatrix::Sparse(s.a.clone()),
        }
    }

    pub fn set_a(&mut self, a: AMatrix) {
        match (self, a) {
            (MnaSystem::Dense(s), AMatrix::Dense(m)) => s.a = m,
            (MnaSystem::Sparse(s), AMatrix::Sparse(m)) => s.a = m,
            _ => panic!("MnaSystem::set_a: storage kind mismatch between system and matrix"),
        }
    }

    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            MnaSystem::Dense(s) => s.matvec(x),
            MnaSystem::Sparse(s) => s.matvec(x),
        }
    }
}

/// A standalone `A` matrix snapshot, independent of its owning system's `b`
/// and `x`. Used to save/restore/recombine `G` and `C` during a transient
/// run without assuming dense or sparse storage.
#[derive(Debug, Clone)]
pub enum AMatrix {
    Dense(DMatrix<f64>),
    Sparse(CsMat<f64>),
}

impl AMatrix {
    pub fn n(&self) -> usize {
        match self {
            AMatrix::Dense(m) => m.nrows(),
            AMatrix::Sparse(m) => m.rows(),
        }
    }

    pub fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        match self {
            AMatrix::Dense(m) => m * x,
            AMatrix::Sparse(m) => sparse_matvec(m, x),
        }
    }

    /// `self + scale * other`, requiring matching storage kinds.
    pub fn add_scaled(&self, other: &AMatrix, scale: f64) -> AMatrix {
        match (self, other) {
            (AMatrix::Dense(a), AMatrix::Dense(b)) => AMatrix::Dense(a + b * scale),
            (AMatrix::Sparse(a), AMatrix::Sparse(b)) => {
                AMatrix::Sparse(sparse_add_scaled(a, b, scale, self.n()))
            }
            _ => panic!("AMatrix::add_scaled: storage kind mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplets_sum_duplicates() {
        let mut tr = SparseTriplets::with_capacity(2, 4);
        tr.push(0, 0, 1.0);
        tr.push(0, 0, 2.0);
        tr.push(1, 1, 5.0);
        let mat = tr.into_csmat();
        assert_eq!(sparse_get(&mat, 0, 0), 3.0);
        assert_eq!(sparse_get(&mat, 1, 1), 5.0);
    }

    #[test]
    fn sparse_matvec_matches_dense() {
        let mut tr = SparseTriplets::with_capacity(2, 4);
        tr.push(0, 0, 2.0);
        tr.push(0, 1, 1.0);
        tr.push(1, 0, 1.0);
        tr.push(1, 1, 3.0);
        let mat = tr.into_csmat();
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let result = sparse_matvec(&mat, &x);
        assert_eq!(result[0], 4.0);
        assert_eq!(result[1], 7.0);
    }
}
