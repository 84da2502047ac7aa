use faer::Col;

use crate::error::{DaesolError, NonLinearSolverError};
use crate::linear_solver::LinearSolver;
use crate::non_linear_solver_error;
use crate::nonlinear_solver::convergence::{Convergence, ConvergenceStatus};
use crate::op::{NonLinearOp, NonLinearOpJacobian};

pub fn newton_iteration(
    xn: &mut Col<f64>,
    tmp: &mut Col<f64>,
    error_y: &Col<f64>,
    fun: impl Fn(&Col<f64>, &mut Col<f64>),
    linear_solver: impl Fn(&mut Col<f64>) -> Result<(), DaesolError>,
    convergence: &mut Convergence,
) -> Result<(), DaesolError> {
    convergence.reset();
    loop {
        fun(xn, tmp);
        // tmp = G(x_n)

        linear_solver(tmp)?;
        // tmp = -delta_n

        for i in 0..xn.nrows() {
            xn[i] -= tmp[i];
        }
        // xn = xn + delta_n

        match convergence.check_new_iteration(tmp, error_y) {
            ConvergenceStatus::Continue => continue,
            ConvergenceStatus::Converged => return Ok(()),
            ConvergenceStatus::Diverged => break,
            ConvergenceStatus::MaximumIterations => break,
        }
    }
    Err(non_linear_solver_error!(NewtonDidNotConverge))
}

/// Newton solver over a factorised Newton matrix.
///
/// The factorisation is refreshed explicitly via [`Self::reset_jacobian`];
/// between refreshes every solve (including the sensitivity solves) reuses
/// it.
pub struct NewtonSolver {
    linear_solver: LinearSolver,
    is_jacobian_set: bool,
    tmp: Col<f64>,
}

impl NewtonSolver {
    pub fn new(linear_solver: LinearSolver, nstates: usize) -> Self {
        Self {
            linear_solver,
            is_jacobian_set: false,
            tmp: Col::zeros(nstates),
        }
    }

    pub fn is_jacobian_set(&self) -> bool {
        self.is_jacobian_set
    }

    pub fn reset_jacobian(
        &mut self,
        op: &impl NonLinearOpJacobian,
        x: &Col<f64>,
        t: f64,
    ) -> Result<(), DaesolError> {
        self.is_jacobian_set = false;
        self.linear_solver.set_linearisation(op, x, t)?;
        self.is_jacobian_set = true;
        Ok(())
    }

    /// Solve the linearised system in place with the current factorisation.
    pub fn solve_linearised_in_place(&self, x: &mut Col<f64>) -> Result<(), DaesolError> {
        self.linear_solver.solve_in_place(x)
    }

    pub fn solve_in_place(
        &mut self,
        op: &impl NonLinearOp,
        xn: &mut Col<f64>,
        t: f64,
        error_y: &Col<f64>,
        convergence: &mut Convergence,
    ) -> Result<(), DaesolError> {
        if !self.is_jacobian_set {
            return Err(non_linear_solver_error!(JacobianNotReset));
        }
        if xn.nrows() != op.nstates() {
            return Err(DaesolError::from(NonLinearSolverError::WrongStateLength {
                expected: op.nstates(),
                found: xn.nrows(),
            }));
        }
        let linear_solver = |x: &mut Col<f64>| self.linear_solver.solve_in_place(x);
        let fun = |x: &Col<f64>, y: &mut Col<f64>| op.call_inplace(x, t, y);
        newton_iteration(xn, &mut self.tmp, error_y, fun, linear_solver, convergence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SquareMinusTwo;

    impl NonLinearOp for SquareMinusTwo {
        fn nstates(&self) -> usize {
            1
        }
        fn call_inplace(&self, x: &Col<f64>, _t: f64, y: &mut Col<f64>) {
            y[0] = x[0] * x[0] - 2.0;
        }
    }

    impl NonLinearOpJacobian for SquareMinusTwo {
        fn jac_mul_inplace(&self, x: &Col<f64>, _t: f64, v: &Col<f64>, y: &mut Col<f64>) {
            y[0] = 2.0 * x[0] * v[0];
        }
    }

    #[test]
    fn test_newton_sqrt_two() {
        let op = SquareMinusTwo;
        let mut solver = NewtonSolver::new(LinearSolver::dense(1), 1);
        let atol = Col::<f64>::from_fn(1, |_| 1e-12);
        let mut convergence = Convergence::new(1e-10, &atol);
        let mut x = Col::<f64>::from_fn(1, |_| 1.5);
        // chord iteration with the Jacobian refreshed each sweep
        for _ in 0..5 {
            solver.reset_jacobian(&op, &x, 0.0).unwrap();
            let error_y = x.to_owned();
            if solver
                .solve_in_place(&op, &mut x, 0.0, &error_y, &mut convergence)
                .is_ok()
            {
                break;
            }
        }
        assert!((x[0] - 2.0f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn test_solve_without_jacobian_fails() {
        let op = SquareMinusTwo;
        let mut solver = NewtonSolver::new(LinearSolver::dense(1), 1);
        let atol = Col::<f64>::from_fn(1, |_| 1e-12);
        let mut convergence = Convergence::new(1e-10, &atol);
        let mut x = Col::<f64>::from_fn(1, |_| 1.5);
        let error_y = x.to_owned();
        assert!(solver
            .solve_in_place(&op, &mut x, 0.0, &error_y, &mut convergence)
            .is_err());
    }
}
