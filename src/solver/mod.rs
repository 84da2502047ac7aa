//! The BDF integrator, its problem/builder surface and the returned
//! [`Solution`].

pub mod bdf;
pub mod config;
pub mod jacobian_update;
pub mod problem;
pub mod solution;
pub mod state;

use faer::{Col, Mat};
use log::debug;

use crate::error::{DaeSolverError, DaesolError};
use crate::linear_solver::LinearSolver;
use crate::nonlinear_solver::{Convergence, NewtonSolver, RootFinder};
use crate::op::init::InitOp;
use crate::op::sens::SensOp;
use crate::op::step::StepOp;
use crate::op::DaeSystem;

pub use bdf::StepOutcome;
pub(crate) use bdf::DaeSolver;
pub use config::SolverConfig;
pub use problem::{CancelToken, DaeBuilder, DaeProblem, EventAction, JacobianMode};
pub use solution::{Solution, SolveStatus, Statistics};
pub use state::BdfState;

use jacobian_update::JacobianUpdate;

/// How many times the consistent-initialisation Newton solve may refresh its
/// Jacobian before giving up.
const MAX_INIT_ATTEMPTS: usize = 5;

/// Solve `F(t, y, y') = 0` for the algebraic components of `y` and the
/// differential components of `y'`, holding the differential components of
/// `y` fixed.
fn make_consistent<S: DaeSystem>(
    system: &S,
    t: f64,
    y: &mut Col<f64>,
    yp: &mut Col<f64>,
    rtol: f64,
    atol: &Col<f64>,
) -> Result<(), DaesolError> {
    let op = InitOp::new(system, y, yp);
    let n = system.nstates();
    let mut solver = NewtonSolver::new(LinearSolver::dense(n), n);
    let mut convergence = Convergence::new(rtol, atol);
    let mut x = op.initial_guess();
    let error_y = x.to_owned();
    let mut converged = false;
    for attempt in 0..MAX_INIT_ATTEMPTS {
        if solver.reset_jacobian(&op, &x, t).is_err() {
            break;
        }
        match solver.solve_in_place(&op, &mut x, t, &error_y, &mut convergence) {
            Ok(()) => {
                converged = true;
                break;
            }
            Err(e) => {
                debug!("initialisation attempt {} did not converge: {}", attempt, e);
            }
        }
    }
    if !converged || !crate::vector::all_finite(&x) {
        return Err(DaesolError::from(
            DaeSolverError::InconsistentInitialConditions,
        ));
    }
    op.scatter_solution(&x, y, yp);
    Ok(())
}

impl<'a, S: DaeSystem> DaeSolver<'a, S> {
    pub(crate) fn new(problem: &'a DaeProblem<S>) -> Result<Self, DaesolError> {
        let system = &problem.system;
        let n = system.nstates();
        let nparams = system.nparams();

        let (alpha, gamma, error_const2) = Self::coefficient_tables();

        // make the initial conditions consistent before any output exists
        let mut y0 = problem.y0.to_owned();
        let mut yp0 = problem.yp0.to_owned();
        make_consistent(system, problem.t0, &mut y0, &mut yp0, problem.rtol, &problem.atol)?;

        let s0 = problem.s0.clone();
        let ds0 = vec![Col::zeros(n); nparams];
        let h0 = problem.h0.unwrap_or(0.0);
        let state = BdfState::new(y0, yp0, s0, ds0, problem.t0, h0);

        let linear_solver = match problem.jacobian_mode {
            JacobianMode::Assembled => {
                // builder validation guarantees the pattern exists
                LinearSolver::sparse(system.jacobian_sparsity().unwrap())?
            }
            JacobianMode::MatrixFree => LinearSolver::dense(n),
        };
        let nonlinear_solver = NewtonSolver::new(linear_solver, n);
        let mut convergence = Convergence::new(problem.rtol, &problem.atol);
        convergence.set_max_iter(problem.config.maximum_newton_iterations);

        let op = StepOp::new(&problem.system);
        let s_op = if nparams > 0 {
            Some(SensOp::new(&problem.system))
        } else {
            None
        };
        let root_finder = if system.nroots() > 0 {
            Some(RootFinder::new(system.nroots(), n))
        } else {
            None
        };

        Ok(Self {
            problem,
            op,
            s_op,
            nonlinear_solver,
            convergence,
            state,
            y_delta: Col::zeros(n),
            y_predict: Col::zeros(n),
            t_predict: 0.0,
            s_predict: Col::zeros(n),
            s_deltas: vec![Col::zeros(n); nparams],
            yp_scratch: Col::zeros(n),
            diff_tmp: Mat::zeros(n, BdfState::MAX_ORDER + 3),
            u: Self::compute_r(1, 1.0),
            alpha,
            gamma,
            error_const2,
            n_equal_steps: 0,
            tstop: None,
            root_finder,
            // the first call to step() initialises the difference matrices,
            // the Newton matrix and the root finder from the current state
            is_state_modified: true,
            restart_event_index: None,
            jacobian_update: JacobianUpdate::default(),
            statistics: Statistics::default(),
        })
    }

    /// Drive the integration through every requested output time, appending
    /// requested points and event points to the returned [`Solution`].
    pub(crate) fn run(&mut self, t_eval: &[f64]) -> Solution {
        let n = self.problem.system.nstates();
        let nparams = self.problem.system.nparams();
        let mut solution = Solution::new(n, nparams);
        let mut sens_scratch = vec![Col::<f64>::zeros(n); nparams];
        let t_end = *t_eval.last().unwrap();

        // default initial step: a small fraction of the requested span
        if self.state.h == 0.0 {
            self.state.h = if t_end > self.state.t {
                1e-4 * (t_end - self.state.t)
            } else {
                1e-6
            };
        }

        if t_end <= self.state.t {
            // every requested time is the initial time
            for &t_out in t_eval {
                if let Err(e) = self.emit(&mut solution, t_out, &mut sens_scratch) {
                    return self.finish(solution, SolveStatus::from_error(&e));
                }
            }
            return self.finish(solution, SolveStatus::Success);
        }

        if let Err(e) = self.set_stop_time(t_end) {
            return self.finish(solution, SolveStatus::from_error(&e));
        }

        let mut i = 0;
        'output: while i < t_eval.len() {
            let t_out = t_eval[i];
            while self.state.t < t_out {
                match self.step() {
                    Err(e) => {
                        debug!("integration stopped at t = {}: {}", self.state.t, e);
                        return self.finish(solution, SolveStatus::from_error(&e));
                    }
                    Ok(StepOutcome::InternalStep) => {}
                    Ok(StepOutcome::TstopReached) => break,
                    Ok(StepOutcome::EventFound { index, t }) => {
                        // requested times passed before the event come first
                        while i < t_eval.len() && t_eval[i] < t {
                            if let Err(e) = self.emit(&mut solution, t_eval[i], &mut sens_scratch)
                            {
                                return self.finish(solution, SolveStatus::from_error(&e));
                            }
                            i += 1;
                        }
                        // the event point stands in for a coincident
                        // requested time
                        if let Err(e) = self.emit(&mut solution, t, &mut sens_scratch) {
                            return self.finish(solution, SolveStatus::from_error(&e));
                        }
                        while i < t_eval.len() && t_eval[i] <= t {
                            i += 1;
                        }
                        match self.problem.event_actions[index] {
                            EventAction::Stop => {
                                return self.finish(solution, SolveStatus::EventStop(index));
                            }
                            EventAction::Restart => {
                                if let Err(e) = self.restart_from(index, t, &mut sens_scratch) {
                                    return self.finish(solution, SolveStatus::from_error(&e));
                                }
                                continue 'output;
                            }
                        }
                    }
                }
            }
            if let Err(e) = self.emit(&mut solution, t_out, &mut sens_scratch) {
                return self.finish(solution, SolveStatus::from_error(&e));
            }
            i += 1;
        }
        self.finish(solution, SolveStatus::Success)
    }

    fn finish(&self, mut solution: Solution, status: SolveStatus) -> Solution {
        solution.status = status;
        solution.statistics = self.statistics.clone();
        solution
    }

    /// Interpolate the state (and sensitivities) at `t` and append them to
    /// the solution.
    fn emit(
        &self,
        solution: &mut Solution,
        t: f64,
        sens_scratch: &mut [Col<f64>],
    ) -> Result<(), DaesolError> {
        let n = self.problem.system.nstates();
        let nparams = self.problem.system.nparams();
        let mut y = Col::zeros(n);
        self.interpolate_inplace(t, &mut y)?;
        let ys = if nparams > 0 {
            self.interpolate_sens_inplace(t, sens_scratch)?;
            Some(Mat::from_fn(n, nparams, |row, j| sens_scratch[j][row]))
        } else {
            None
        };
        solution.push(t, y, ys);
        Ok(())
    }

    /// Restart integration from the interpolated event point as a freshly
    /// consistent first-order state.
    fn restart_from(
        &mut self,
        event_index: usize,
        t_event: f64,
        sens_scratch: &mut [Col<f64>],
    ) -> Result<(), DaesolError> {
        let n = self.problem.system.nstates();
        let mut y = Col::zeros(n);
        self.interpolate_inplace(t_event, &mut y)?;
        if !sens_scratch.is_empty() {
            self.interpolate_sens_inplace(t_event, sens_scratch)?;
            for (s, interp) in self.state.s.iter_mut().zip(sens_scratch.iter()) {
                s.copy_from(interp);
            }
        }
        self.state.t = t_event;
        self.state.y.copy_from(&y);
        make_consistent(
            &self.problem.system,
            t_event,
            &mut self.state.y,
            &mut self.state.dy,
            self.problem.rtol,
            &self.problem.atol,
        )?;
        // the next step rebuilds the difference history, the Newton matrix
        // and the root-finder bracket from here
        self.is_state_modified = true;
        self.restart_event_index = Some(event_index);
        Ok(())
    }
}
