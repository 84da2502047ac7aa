//! Compressed-sparse-column structure for provider-supplied Jacobians.
//!
//! Providers describe the sparsity of the Newton matrix `dF/dy + cj * dF/dy'`
//! with raw CSC index arrays; the engine validates them once, builds a
//! [`faer`] symbolic structure from them, and refreshes the value array in
//! place on every Jacobian evaluation.

use faer::sparse::{SparseColMat, SymbolicSparseColMat};

use crate::error::{DaesolError, MatrixError};
use crate::matrix_error;

/// A validated CSC sparsity pattern: row indices, column pointers and the
/// declared nonzero count of a square Newton matrix.
#[derive(Debug, Clone)]
pub struct CscPattern {
    nrows: usize,
    ncols: usize,
    row_indices: Vec<usize>,
    col_pointers: Vec<usize>,
}

impl CscPattern {
    /// Validate raw CSC arrays against the declared shape and nonzero count.
    ///
    /// The column pointer sequence must have length `ncols + 1`, start at
    /// zero, be non-decreasing and end at `nnz`; row indices must be in
    /// bounds and strictly increasing within each column.
    pub fn new(
        nrows: usize,
        ncols: usize,
        nnz: usize,
        row_indices: Vec<usize>,
        col_pointers: Vec<usize>,
    ) -> Result<Self, DaesolError> {
        if nrows == 0 || ncols == 0 {
            return Err(matrix_error!(MatrixShapeError));
        }
        if col_pointers.len() != ncols + 1 {
            return Err(DaesolError::from(MatrixError::ColumnPointersWrongLength {
                expected: ncols + 1,
                found: col_pointers.len(),
            }));
        }
        if col_pointers[0] != 0 || col_pointers.windows(2).any(|w| w[0] > w[1]) {
            return Err(matrix_error!(ColumnPointersNotMonotonic));
        }
        let found = *col_pointers.last().unwrap();
        if found != nnz || row_indices.len() != nnz {
            return Err(DaesolError::from(MatrixError::NnzMismatch {
                declared: nnz,
                found,
            }));
        }
        for j in 0..ncols {
            let col = &row_indices[col_pointers[j]..col_pointers[j + 1]];
            for &i in col {
                if i >= nrows {
                    return Err(DaesolError::from(MatrixError::RowIndexOutOfBounds {
                        index: i,
                        nrows,
                    }));
                }
            }
            if col.windows(2).any(|w| w[0] >= w[1]) {
                return Err(matrix_error!(RowIndicesNotSorted));
            }
        }
        Ok(Self {
            nrows,
            ncols,
            row_indices,
            col_pointers,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    /// Build the faer symbolic structure. The pattern has already been
    /// validated, so the checked constructor cannot fail.
    pub fn to_symbolic(&self) -> SymbolicSparseColMat<usize> {
        SymbolicSparseColMat::new_checked(
            self.nrows,
            self.ncols,
            self.col_pointers.clone(),
            None,
            self.row_indices.clone(),
        )
    }

    /// Allocate a zero-valued matrix with this structure.
    pub fn new_matrix(&self) -> SparseColMat<usize, f64> {
        SparseColMat::new(self.to_symbolic(), vec![0.0; self.nnz()])
    }
}

/// Check a freshly refreshed value array for non-finite entries.
pub fn check_finite(values: &[f64]) -> Result<(), DaesolError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(matrix_error!(NonFiniteValue));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_pattern() {
        // | x . |
        // | x x |
        let pattern = CscPattern::new(2, 2, 3, vec![0, 1, 1], vec![0, 2, 3]).unwrap();
        assert_eq!(pattern.nnz(), 3);
        let mat = pattern.new_matrix();
        assert_eq!(mat.nrows(), 2);
        assert_eq!(mat.ncols(), 2);
        assert_eq!(mat.val().len(), 3);
    }

    #[test]
    fn test_nnz_mismatch() {
        let err = CscPattern::new(2, 2, 4, vec![0, 1, 1], vec![0, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            DaesolError::MatrixError(MatrixError::NnzMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_col_pointers() {
        let err = CscPattern::new(2, 2, 3, vec![0, 1, 1], vec![0, 2]).unwrap_err();
        assert!(matches!(
            err,
            DaesolError::MatrixError(MatrixError::ColumnPointersWrongLength { .. })
        ));
        let err = CscPattern::new(2, 2, 3, vec![0, 1, 1], vec![0, 2, 2]).unwrap_err();
        assert!(matches!(
            err,
            DaesolError::MatrixError(MatrixError::NnzMismatch { .. })
        ));
    }

    #[test]
    fn test_row_index_out_of_bounds() {
        let err = CscPattern::new(2, 2, 3, vec![0, 2, 1], vec![0, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            DaesolError::MatrixError(MatrixError::RowIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite(&[1.0, 2.0]).is_ok());
        assert!(check_finite(&[1.0, f64::NAN]).is_err());
        assert!(check_finite(&[f64::INFINITY]).is_err());
    }
}
