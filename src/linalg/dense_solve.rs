use super::sparse_matrix::SparseMatrix;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Largest system [solve_dense] accepts
pub const MAX_DENSE_SIZE: usize = 1000;

/// Solve Au = b by casting A as a dense matrix and using Nalgebra's LU decomposition
///
/// This is only recommended for small problems since the dense matrix uses a very large amount of memory when the system is large.
pub fn solve_dense(a: &SparseMatrix, b: &[f64]) -> Result<Vec<f64>, SolveError> {
    let [rows, cols] = a.shape();
    if rows != cols {
        return Err(SolveError::NotSquare { rows, cols });
    }
    if b.len() != rows {
        return Err(SolveError::DimensionMismatch {
            dim: rows,
            rhs: b.len(),
        });
    }
    if rows > MAX_DENSE_SIZE {
        return Err(SolveError::ProblemTooLarge(rows));
    }

    let a_mat: DMatrix<f64> = a.clone().into();
    let b_vec = DVector::from_column_slice(b);

    let solution = a_mat.lu().solve(&b_vec).ok_or(SolveError::Singular)?;
    if solution.iter().any(|x| !x.is_finite()) {
        return Err(SolveError::Singular);
    }

    log::debug!("solved dense system with {} dofs", rows);
    Ok(solution.iter().copied().collect())
}

/// Error type for the dense solver
#[derive(Debug, Clone, Error)]
pub enum SolveError {
    #[error("Matrix is not square ({rows} x {cols})")]
    NotSquare { rows: usize, cols: usize },
    #[error("Right hand side has length {rhs}; expected {dim}")]
    DimensionMismatch { dim: usize, rhs: usize },
    #[error("Problem is too large ({0} dofs) to be solved with dense matrices")]
    ProblemTooLarge(usize),
    #[error("Matrix is singular")]
    Singular,
}
