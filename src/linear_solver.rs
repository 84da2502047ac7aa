//! Direct solvers for the Newton linear systems.
//!
//! The Jacobian mode chosen at problem construction selects one of two
//! solvers: [`SparseLu`] factorises the provider-assembled CSC Newton matrix
//! (symbolic analysis done once, numeric refactorisation per linearisation),
//! and [`DenseLu`] materialises the Newton matrix by probing the Jacobian
//! action with unit basis vectors and factorises it densely.

use faer::linalg::solvers::{FullPivLu, Solve};
use faer::reborrow::Reborrow;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::SparseColMat;
use faer::{Col, Mat};

use crate::error::{DaesolError, LinearSolverError, MatrixError};
use crate::matrix::CscPattern;
use crate::op::NonLinearOpJacobian;
use crate::{linear_solver_error, matrix_error};

/// Dense LU over a Newton matrix assembled column-by-column from the
/// Jacobian action.
pub struct DenseLu {
    matrix: Mat<f64>,
    probe: Col<f64>,
    col: Col<f64>,
    lu: Option<FullPivLu<f64>>,
}

impl DenseLu {
    pub fn new(nstates: usize) -> Self {
        Self {
            matrix: Mat::zeros(nstates, nstates),
            probe: Col::zeros(nstates),
            col: Col::zeros(nstates),
            lu: None,
        }
    }

    pub fn set_linearisation(
        &mut self,
        op: &impl NonLinearOpJacobian,
        x: &Col<f64>,
        t: f64,
    ) -> Result<(), DaesolError> {
        let n = op.nstates();
        for j in 0..n {
            self.probe[j] = 1.0;
            op.jac_mul_inplace(x, t, &self.probe, &mut self.col);
            self.probe[j] = 0.0;
            if !crate::vector::all_finite(&self.col) {
                return Err(matrix_error!(NonFiniteValue));
            }
            self.matrix.col_mut(j).copy_from(&self.col);
        }
        self.lu = Some(self.matrix.full_piv_lu());
        Ok(())
    }

    pub fn solve_in_place(&self, x: &mut Col<f64>) -> Result<(), DaesolError> {
        let lu = self
            .lu
            .as_ref()
            .ok_or(linear_solver_error!(LuNotInitialized))?;
        lu.solve_in_place(x.as_mut());
        Ok(())
    }
}

/// Sparse LU over the provider-assembled CSC Newton matrix.
pub struct SparseLu {
    matrix: SparseColMat<usize, f64>,
    symbolic: SymbolicLu<usize>,
    lu: Option<Lu<usize, f64>>,
}

impl SparseLu {
    pub fn new(pattern: &CscPattern) -> Result<Self, DaesolError> {
        let matrix = pattern.new_matrix();
        let symbolic = SymbolicLu::try_new(matrix.symbolic())
            .map_err(|_| linear_solver_error!(FactorisationFailed))?;
        Ok(Self {
            matrix,
            symbolic,
            lu: None,
        })
    }

    pub fn set_linearisation(
        &mut self,
        op: &impl NonLinearOpJacobian,
        x: &Col<f64>,
        t: f64,
    ) -> Result<(), DaesolError> {
        op.jacobian_sparse_inplace(x, t, &mut self.matrix)?;
        self.lu = Some(
            Lu::try_new_with_symbolic(self.symbolic.clone(), self.matrix.rb())
                .map_err(|_| linear_solver_error!(FactorisationFailed))?,
        );
        Ok(())
    }

    pub fn solve_in_place(&self, x: &mut Col<f64>) -> Result<(), DaesolError> {
        let lu = self
            .lu
            .as_ref()
            .ok_or(linear_solver_error!(LuNotInitialized))?;
        lu.solve_in_place(x);
        Ok(())
    }
}

/// The Newton linear solver, selected once at problem construction.
pub enum LinearSolver {
    Dense(DenseLu),
    Sparse(SparseLu),
}

impl LinearSolver {
    pub fn dense(nstates: usize) -> Self {
        Self::Dense(DenseLu::new(nstates))
    }

    pub fn sparse(pattern: &CscPattern) -> Result<Self, DaesolError> {
        Ok(Self::Sparse(SparseLu::new(pattern)?))
    }

    pub fn set_linearisation(
        &mut self,
        op: &impl NonLinearOpJacobian,
        x: &Col<f64>,
        t: f64,
    ) -> Result<(), DaesolError> {
        match self {
            Self::Dense(lu) => lu.set_linearisation(op, x, t),
            Self::Sparse(lu) => lu.set_linearisation(op, x, t),
        }
    }

    pub fn solve_in_place(&self, x: &mut Col<f64>) -> Result<(), DaesolError> {
        match self {
            Self::Dense(lu) => lu.solve_in_place(x),
            Self::Sparse(lu) => lu.solve_in_place(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::NonLinearOp;

    struct DiagOp;

    impl NonLinearOp for DiagOp {
        fn nstates(&self) -> usize {
            2
        }
        fn call_inplace(&self, x: &Col<f64>, _t: f64, y: &mut Col<f64>) {
            y[0] = 2.0 * x[0];
            y[1] = 4.0 * x[1];
        }
    }

    impl NonLinearOpJacobian for DiagOp {
        fn jac_mul_inplace(&self, _x: &Col<f64>, _t: f64, v: &Col<f64>, y: &mut Col<f64>) {
            y[0] = 2.0 * v[0];
            y[1] = 4.0 * v[1];
        }
    }

    #[test]
    fn test_dense_lu_solve() {
        let mut solver = LinearSolver::dense(2);
        let x0 = Col::<f64>::zeros(2);
        solver.set_linearisation(&DiagOp, &x0, 0.0).unwrap();
        let mut rhs = Col::<f64>::from_fn(2, |i| [2.0, 8.0][i]);
        solver.solve_in_place(&mut rhs).unwrap();
        assert!((rhs[0] - 1.0).abs() < 1e-12);
        assert!((rhs[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_without_linearisation_fails() {
        let solver = LinearSolver::dense(2);
        let mut rhs = Col::<f64>::zeros(2);
        assert!(matches!(
            solver.solve_in_place(&mut rhs),
            Err(DaesolError::LinearSolverError(
                LinearSolverError::LuNotInitialized
            ))
        ));
    }
}
