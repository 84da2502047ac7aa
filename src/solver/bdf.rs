use faer::{Col, Mat};
use log::{debug, trace};

use crate::error::{DaeSolverError, DaesolError};
use crate::nonlinear_solver::{Convergence, NewtonSolver, RootFinder};
use crate::op::sens::SensOp;
use crate::op::step::StepOp;
use crate::op::DaeSystem;
use crate::solver::jacobian_update::{JacobianUpdate, SolverState};
use crate::solver::problem::DaeProblem;
use crate::solver::solution::Statistics;
use crate::solver::state::BdfState;

/// Why an internal step call returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// An internal step was accepted; the state is at the new internal time.
    InternalStep,
    /// An event function crossed zero inside the accepted step. The state is
    /// past the crossing; the event point itself is obtained by
    /// interpolation.
    EventFound { index: usize, t: f64 },
    /// The stop time was reached exactly.
    TstopReached,
}

// The stepper implements the variable-order (1..=5) NDF/BDF family in the
// fixed-leading-coefficient difference-matrix form derived in
//
// [1] Byrne, G. D., & Hindmarsh, A. C. (1975). A polyalgorithm for the
//     numerical solution of ordinary differential equations. ACM TOMS 1(1).
// [2] Shampine, L. F., & Reichelt, M. W. (1997). The Matlab ODE suite.
//     SIAM J. Sci. Comput. 18(1),
//
// applied to the fully-implicit residual F(t, y, y') = 0: at each trial step
// the predicted state and the scalar c = h * alpha_k fix the derivative as
// y' = (y - y0 + psi) / c, and Newton iterates on y with the matrix
// dF/dy + cj * dF/dy', cj = 1 / c.
pub(crate) struct DaeSolver<'a, S: DaeSystem> {
    pub(crate) problem: &'a DaeProblem<S>,
    pub(crate) op: StepOp<'a, S>,
    pub(crate) s_op: Option<SensOp<'a, S>>,
    pub(crate) nonlinear_solver: NewtonSolver,
    pub(crate) convergence: Convergence<'a>,
    pub(crate) state: BdfState,
    pub(crate) y_delta: Col<f64>,
    pub(crate) y_predict: Col<f64>,
    pub(crate) t_predict: f64,
    pub(crate) s_predict: Col<f64>,
    pub(crate) s_deltas: Vec<Col<f64>>,
    pub(crate) yp_scratch: Col<f64>,
    pub(crate) diff_tmp: Mat<f64>,
    pub(crate) u: Mat<f64>,
    pub(crate) alpha: Vec<f64>,
    pub(crate) gamma: Vec<f64>,
    pub(crate) error_const2: Vec<f64>,
    pub(crate) n_equal_steps: usize,
    pub(crate) tstop: Option<f64>,
    pub(crate) root_finder: Option<RootFinder>,
    pub(crate) is_state_modified: bool,
    pub(crate) restart_event_index: Option<usize>,
    pub(crate) jacobian_update: JacobianUpdate,
    pub(crate) statistics: Statistics,
}

impl<'a, S: DaeSystem> DaeSolver<'a, S> {
    /// kappa values for the NDF difference orders, from Table 1 of [1]
    pub(crate) fn coefficient_tables() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let kappa: [f64; 6] = [0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0];
        let mut alpha = vec![0.0];
        let mut gamma = vec![0.0];
        let mut error_const2 = vec![1.0];
        for i in 1..=BdfState::MAX_ORDER {
            let i_t = i as f64;
            gamma.push(gamma[i - 1] + 1.0 / i_t);
            alpha.push(1.0 / ((1.0 - kappa[i]) * gamma[i]));
            error_const2.push((kappa[i] * gamma[i] + 1.0 / (i_t + 1.0)).powi(2));
        }
        (alpha, gamma, error_const2)
    }

    // the R matrix from the first equation on page 8 of [1], used to rescale
    // the difference matrix when the step size changes by `factor`; with
    // factor = 1 this is the U matrix of the same section
    pub(crate) fn compute_r(order: usize, factor: f64) -> Mat<f64> {
        let mut r = Mat::<f64>::zeros(order + 1, order + 1);
        for j in 0..=order {
            r[(0, j)] = 1.0;
        }
        for j in 1..=order {
            for i in 1..=order {
                r[(i, j)] = r[(i - 1, j)] * (i as f64 - 1.0 - factor * j as f64) / i as f64;
            }
        }
        r
    }

    // D[:, 0..=order] = D[:, 0..=order] * (R U)
    fn update_diff_for_step_size(ru: &Mat<f64>, diff: &mut Mat<f64>, diff_tmp: &mut Mat<f64>, order: usize) {
        let n = diff.nrows();
        for row in 0..n {
            for j in 0..=order {
                let mut acc = 0.0;
                for k in 0..=order {
                    acc += diff[(row, k)] * ru[(k, j)];
                }
                diff_tmp[(row, j)] = acc;
            }
        }
        for row in 0..n {
            for j in 0..=order {
                diff[(row, j)] = diff_tmp[(row, j)];
            }
        }
    }

    // update of the difference matrix with the accepted correction d, first
    // equation on page 4 of [1] combined with the standard backwards
    // difference recurrence
    fn update_diff(order: usize, d: &Col<f64>, diff: &mut Mat<f64>) {
        let n = diff.nrows();
        for row in 0..n {
            diff[(row, order + 2)] = d[row] - diff[(row, order + 1)];
        }
        for row in 0..n {
            diff[(row, order + 1)] = d[row];
        }
        for i in (0..=order).rev() {
            for row in 0..n {
                diff[(row, i)] += diff[(row, i + 1)];
            }
        }
    }

    // predict forward to the new step, eq 2 in [1]
    fn predict_using_diff(y_predict: &mut Col<f64>, diff: &Mat<f64>, order: usize) {
        for row in 0..y_predict.nrows() {
            let mut acc = 0.0;
            for i in 0..=order {
                acc += diff[(row, i)];
            }
            y_predict[row] = acc;
        }
    }

    // interpolating polynomial from page 7 of [1], evaluated at t within the
    // last step [t1 - h, t1]
    pub(crate) fn interpolate_from_diff(
        t: f64,
        diff: &Mat<f64>,
        t1: f64,
        h: f64,
        order: usize,
        y: &mut Col<f64>,
    ) {
        for row in 0..y.nrows() {
            y[row] = diff[(row, 0)];
        }
        let mut time_factor = 1.0;
        for i in 0..order {
            let i_t = i as f64;
            time_factor *= (t - (t1 - h * i_t)) / (h * (1.0 + i_t));
            for row in 0..y.nrows() {
                y[row] += time_factor * diff[(row, i + 1)];
            }
        }
    }

    fn squared_norm_masked_column(
        diff: &Mat<f64>,
        col: usize,
        y: &Col<f64>,
        atol: &Col<f64>,
        rtol: f64,
        mask: &[bool],
    ) -> f64 {
        let mut acc = 0.0;
        let mut count = 0usize;
        for i in 0..y.nrows() {
            if !mask[i] {
                continue;
            }
            let w = y[i].abs() * rtol + atol[i];
            let x = diff[(i, col)];
            acc += (x / w) * (x / w);
            count += 1;
        }
        if count == 0 {
            return 0.0;
        }
        acc / count as f64
    }

    fn predict_forward(&mut self) {
        Self::predict_using_diff(&mut self.y_predict, &self.state.diff, self.state.order);
        self.op.set_psi_and_y0(
            &self.state.diff,
            &self.gamma,
            &self.alpha,
            self.state.order,
            &self.y_predict,
        );
        self.t_predict = self.state.t + self.state.h;
    }

    /// Refresh the Newton matrix if the update policy says so. A refresh
    /// failure (non-finite or singular Jacobian) leaves the factorisation
    /// unset; the following solve attempt then fails and is handled through
    /// the normal convergence-failure retry path.
    fn jacobian_updates(&mut self, c: f64, solver_state: SolverState) {
        if self
            .jacobian_update
            .check_jacobian_update(c, &solver_state)
        {
            match self
                .nonlinear_solver
                .reset_jacobian(&self.op, &self.state.y, self.state.t)
            {
                Ok(()) => {
                    self.statistics.number_of_jacobian_evals += 1;
                    self.jacobian_update.update_jacobian(c);
                }
                Err(e) => debug!("jacobian refresh failed at t = {}: {}", self.state.t, e),
            }
        }
    }

    fn update_step_size(&mut self, factor: f64) -> Result<f64, DaesolError> {
        let new_h = factor * self.state.h;
        self.n_equal_steps = 0;

        // rescale the difference histories, section 3.2 of [1]
        let order = self.state.order;
        let r = Self::compute_r(order, factor);
        let mut ru = Mat::<f64>::zeros(order + 1, order + 1);
        for i in 0..=order {
            for j in 0..=order {
                let mut acc = 0.0;
                for k in 0..=order {
                    acc += r[(i, k)] * self.u[(k, j)];
                }
                ru[(i, j)] = acc;
            }
        }
        Self::update_diff_for_step_size(&ru, &mut self.state.diff, &mut self.diff_tmp, order);
        for sdiff in self.state.sdiff.iter_mut() {
            Self::update_diff_for_step_size(&ru, sdiff, &mut self.diff_tmp, order);
        }

        self.op.set_c(new_h, self.alpha[order]);
        if let Some(s_op) = self.s_op.as_ref() {
            s_op.set_c(new_h, self.alpha[order]);
        }

        self.state.h = new_h;

        if self.state.h.abs() < self.problem.config.minimum_timestep {
            return Err(DaesolError::from(DaeSolverError::StepSizeTooSmall {
                time: self.state.t,
            }));
        }
        Ok(new_h)
    }

    /// Local truncation error of the trial step, squared and averaged over
    /// the differential components of the state and (when active) the
    /// sensitivities. Algebraic components are pinned by the residual and
    /// carry no weight.
    fn error_control(&self) -> f64 {
        let order = self.state.order;
        let atol = &self.problem.atol;
        let rtol = self.problem.rtol;
        let mask = self.problem.system.differential_mask();
        let mut error_norm = crate::vector::squared_norm_masked(
            &self.y_delta,
            &self.state.y,
            atol,
            rtol,
            mask,
        ) * self.error_const2[order];
        let mut ncontrib = 1;
        for (i, s_delta) in self.s_deltas.iter().enumerate() {
            error_norm += crate::vector::squared_norm_masked(
                s_delta,
                &self.state.s[i],
                atol,
                rtol,
                mask,
            ) * self.error_const2[order];
            ncontrib += 1;
        }
        if ncontrib > 1 {
            error_norm /= ncontrib as f64;
        }
        error_norm
    }

    /// Predicted error norm at a different order, from the stored difference
    /// columns.
    fn predict_error_control(&self, order: usize) -> f64 {
        let atol = &self.problem.atol;
        let rtol = self.problem.rtol;
        let mask = self.problem.system.differential_mask();
        let mut error_norm = Self::squared_norm_masked_column(
            &self.state.diff,
            order + 1,
            &self.state.y,
            atol,
            rtol,
            mask,
        ) * self.error_const2[order];
        let mut ncontrib = 1;
        for (i, sdiff) in self.state.sdiff.iter().enumerate() {
            error_norm += Self::squared_norm_masked_column(
                sdiff,
                order + 1,
                &self.state.s[i],
                atol,
                rtol,
                mask,
            ) * self.error_const2[order];
            ncontrib += 1;
        }
        if ncontrib > 1 {
            error_norm /= ncontrib as f64;
        }
        error_norm
    }

    /// Advance the sensitivities through the trial step, reusing the primary
    /// Newton factorisation. `y_new` is the converged primary iterate.
    fn sensitivity_solve(&mut self, t_new: f64, y_new: &Col<f64>) -> Result<(), DaesolError> {
        let order = self.state.order;
        let s_op = self.s_op.as_ref().unwrap();

        self.op.yp_of(y_new, &mut self.yp_scratch);
        s_op.update_state(y_new, &self.yp_scratch);

        let nparams = self.problem.system.nparams();
        for i in 0..nparams {
            s_op.set_index(i);
            Self::predict_using_diff(&mut self.s_predict, &self.state.sdiff[i], order);
            s_op.set_psi_and_s0(
                &self.state.sdiff[i],
                &self.gamma,
                &self.alpha,
                order,
                &self.s_predict,
            );

            let s_new = &mut self.state.s[i];
            s_new.copy_from(&self.s_predict);
            self.nonlinear_solver.solve_in_place(
                s_op,
                s_new,
                t_new,
                &self.s_predict,
                &mut self.convergence,
            )?;
            self.statistics.number_of_nonlinear_solver_iterations += self.convergence.niter();
            for row in 0..s_new.nrows() {
                self.s_deltas[i][row] = s_new[row] - self.s_predict[row];
            }
            s_op.sp_of(&self.state.s[i], &mut self.state.ds[i]);
        }
        Ok(())
    }

    /// Reinitialise the difference histories to first order, refresh the
    /// Newton matrix and re-seed the root finder. Runs before the first step
    /// and after any external modification of the state (e.g. an event
    /// restart).
    pub(crate) fn initialise_to_first_order(&mut self) {
        self.n_equal_steps = 0;
        self.state.initialise_diff_to_first_order();
        if self.s_op.is_some() {
            self.state.initialise_sdiff_to_first_order();
        }
        self.u = Self::compute_r(1, 1.0);

        let order = self.state.order;
        self.op.set_c(self.state.h, self.alpha[order]);
        if let Some(s_op) = self.s_op.as_ref() {
            s_op.set_c(self.state.h, self.alpha[order]);
        }
        self.jacobian_updates(self.state.h * self.alpha[order], SolverState::Restart);

        if let Some(root_finder) = self.root_finder.as_mut() {
            let system = &self.problem.system;
            root_finder.init(
                &|t, y: &Col<f64>, g: &mut Col<f64>| system.root_inplace(t, y, g),
                &self.state.y,
                self.state.t,
            );
            if let Some(index) = self.restart_event_index.take() {
                root_finder.settle_on_root(index);
            }
        }
        self.is_state_modified = false;
    }

    fn handle_tstop(&mut self, tstop: f64) -> Result<Option<StepOutcome>, DaesolError> {
        // are we already there?
        let troundoff = 100.0 * f64::EPSILON * (self.state.t.abs() + self.state.h.abs());
        if (self.state.t - tstop).abs() <= troundoff {
            self.tstop = None;
            return Ok(Some(StepOutcome::TstopReached));
        } else if tstop < self.state.t - troundoff {
            self.tstop = None;
            return Err(DaesolError::from(DaeSolverError::StopTimeBeforeCurrentTime {
                stop_time: tstop,
                state_time: self.state.t,
            }));
        }

        // if the next step would overshoot, clamp the step size to land on it
        if self.state.t + self.state.h > tstop + troundoff {
            let factor = (tstop - self.state.t) / self.state.h;
            // ignore a possible step-size underflow here, the error test
            // bounds still apply on the clamped step
            let _ = self.update_step_size(factor);
            self.jacobian_updates(
                self.state.h * self.alpha[self.state.order],
                SolverState::StepSuccess,
            );
        }
        Ok(None)
    }

    pub(crate) fn set_stop_time(&mut self, tstop: f64) -> Result<(), DaesolError> {
        self.tstop = Some(tstop);
        if let Some(StepOutcome::TstopReached) = self.handle_tstop(tstop)? {
            self.tstop = None;
            return Err(DaesolError::from(DaeSolverError::StopTimeAtCurrentTime));
        }
        Ok(())
    }

    /// Interpolate the state at `t`, which must lie within the last step.
    pub(crate) fn interpolate_inplace(&self, t: f64, y: &mut Col<f64>) -> Result<(), DaesolError> {
        if y.nrows() != self.state.y.nrows() {
            return Err(DaesolError::from(
                DaeSolverError::InterpolationVectorWrongSize {
                    expected: self.state.y.nrows(),
                    found: y.nrows(),
                },
            ));
        }
        let state = &self.state;
        if self.is_state_modified {
            if t == state.t {
                y.copy_from(&state.y);
                return Ok(());
            } else {
                return Err(DaesolError::from(
                    DaeSolverError::InterpolationTimeOutsideCurrentStep,
                ));
            }
        }
        if t > state.t {
            return Err(DaesolError::from(
                DaeSolverError::InterpolationTimeOutsideCurrentStep,
            ));
        }
        Self::interpolate_from_diff(t, &state.diff, state.t, state.h, state.order, y);
        Ok(())
    }

    /// Interpolate the sensitivity vectors at `t`.
    pub(crate) fn interpolate_sens_inplace(
        &self,
        t: f64,
        sens: &mut [Col<f64>],
    ) -> Result<(), DaesolError> {
        if sens.len() != self.state.sdiff.len() {
            return Err(DaesolError::from(DaeSolverError::SensitivityCountMismatch {
                expected: self.state.sdiff.len(),
                found: sens.len(),
            }));
        }
        let state = &self.state;
        if self.is_state_modified {
            if t == state.t {
                for (s, st) in sens.iter_mut().zip(state.s.iter()) {
                    s.copy_from(st);
                }
                return Ok(());
            } else {
                return Err(DaesolError::from(
                    DaeSolverError::InterpolationTimeOutsideCurrentStep,
                ));
            }
        }
        if t > state.t {
            return Err(DaesolError::from(
                DaeSolverError::InterpolationTimeOutsideCurrentStep,
            ));
        }
        for (s, sdiff) in sens.iter_mut().zip(state.sdiff.iter()) {
            Self::interpolate_from_diff(t, sdiff, state.t, state.h, state.order, s);
        }
        Ok(())
    }

    /// Take one internal step, with step-size and order control.
    pub(crate) fn step(&mut self) -> Result<StepOutcome, DaesolError> {
        if self.is_state_modified {
            self.initialise_to_first_order();
            if let Some(tstop) = self.tstop {
                if let Some(StepOutcome::TstopReached) = self.handle_tstop(tstop)? {
                    return Ok(StepOutcome::TstopReached);
                }
            }
        }

        let integrate_sens = self.s_op.is_some();
        let mut convergence_fail = false;
        let mut n_error_test_failures = 0usize;
        let mut n_convergence_failures = 0usize;
        let mut safety;
        let mut error_norm;

        self.predict_forward();

        // loop until the step is accepted
        loop {
            if self.problem.cancel.is_cancelled() {
                return Err(DaesolError::from(DaeSolverError::Cancelled));
            }
            let order = self.state.order;
            self.y_delta.copy_from(&self.y_predict);

            // solve the BDF system with the predictor as the starting point
            let mut solve_result = self.nonlinear_solver.solve_in_place(
                &self.op,
                &mut self.y_delta,
                self.t_predict,
                &self.y_predict,
                &mut self.convergence,
            );
            self.statistics.number_of_nonlinear_solver_iterations += self.convergence.niter();

            // only solve the sensitivities once the primary solve holds;
            // y_delta still holds the converged iterate here
            if solve_result.is_ok() && integrate_sens {
                let y_new = self.y_delta.to_owned();
                if self.sensitivity_solve(self.t_predict, &y_new).is_err() {
                    solve_result = Err(DaesolError::from(DaeSolverError::SensitivitySolveFailed));
                }
            }

            if let Err(e) = solve_result {
                self.statistics.number_of_nonlinear_solver_fails += 1;
                n_convergence_failures += 1;
                debug!(
                    "newton failure {} at t = {}: {}",
                    n_convergence_failures, self.t_predict, e
                );
                if n_convergence_failures >= self.problem.config.maximum_convergence_failures {
                    return Err(DaesolError::from(DaeSolverError::TooManyNewtonFailures {
                        time: self.state.t,
                    }));
                }
                if convergence_fail {
                    // jacobian is already fresh, reduce the step by 0.3 (as
                    // per [1]) and try again
                    let new_h = self.update_step_size(0.3)?;
                    self.jacobian_updates(
                        new_h * self.alpha[order],
                        SolverState::SecondConvergenceFail,
                    );
                    self.predict_forward();
                } else {
                    // refresh the jacobian at the same step size first
                    self.jacobian_updates(
                        self.state.h * self.alpha[order],
                        SolverState::FirstConvergenceFail,
                    );
                    convergence_fail = true;
                    // same prediction as last time
                }
                continue;
            }

            // y_delta -> correction over the predictor
            for row in 0..self.y_delta.nrows() {
                self.y_delta[row] -= self.y_predict[row];
            }

            error_norm = self.error_control();

            // the safety factor depends on how hard Newton had to work
            let maxiter = self.convergence.max_iter() as f64;
            let niter = self.convergence.niter() as f64;
            safety = 0.9 * (2.0 * maxiter + 1.0) / (2.0 * maxiter + niter);

            if error_norm <= 1.0 {
                // step accepted
                break;
            }
            // step rejected: shrink by the optimal factor, eq 2.46 of [2]
            let mut factor = safety * error_norm.powf(-0.5 / (order as f64 + 1.0));
            if factor < self.problem.config.minimum_timestep_shrink {
                factor = self.problem.config.minimum_timestep_shrink;
            }
            debug!(
                "error test failure at t = {} (norm {:.3e}), shrinking h by {:.3}",
                self.t_predict, error_norm, factor
            );
            let new_h = self.update_step_size(factor)?;
            self.jacobian_updates(new_h * self.alpha[order], SolverState::ErrorTestFail);
            self.predict_forward();

            self.statistics.number_of_error_test_failures += 1;
            n_error_test_failures += 1;
            if n_error_test_failures >= self.problem.config.maximum_error_test_failures {
                return Err(DaesolError::from(DaeSolverError::TooManyErrorTestFailures {
                    time: self.state.t,
                }));
            }
        }

        // commit the accepted step
        {
            let order = self.state.order;
            Self::update_diff(order, &self.y_delta, &mut self.state.diff);
            for (i, sdiff) in self.state.sdiff.iter_mut().enumerate() {
                Self::update_diff(order, &self.s_deltas[i], sdiff);
            }

            for row in 0..self.state.y.nrows() {
                self.state.y[row] = self.y_predict[row] + self.y_delta[row];
            }
            self.state.t = self.t_predict;
            let y_new = &self.state.y;
            self.op.yp_of(y_new, &mut self.yp_scratch);
            self.state.dy.copy_from(&self.yp_scratch);
        }

        self.statistics.number_of_steps += 1;
        self.jacobian_update.step();
        trace!(
            "step accepted: t = {}, h = {:.3e}, order = {}",
            self.state.t,
            self.state.h,
            self.state.order
        );

        // a change in order is only considered after running at order k for
        // k + 1 steps (page 83 of [2])
        self.n_equal_steps += 1;
        if self.n_equal_steps > self.state.order {
            let order = self.state.order;
            let error_m_norm = if order > 1 {
                self.predict_error_control(order - 1)
            } else {
                f64::INFINITY
            };
            let error_p_norm = if order < BdfState::MAX_ORDER {
                self.predict_error_control(order + 1)
            } else {
                f64::INFINITY
            };
            let error_norms = [error_m_norm, error_norm, error_p_norm];
            let factors: Vec<f64> = error_norms
                .iter()
                .enumerate()
                .map(|(i, norm)| norm.powf(-0.5 / (i as f64 + order as f64)))
                .collect();

            let max_index = factors
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .unwrap()
                .0;

            let new_order = match max_index {
                0 => order - 1,
                1 => order,
                2 => order + 1,
                _ => unreachable!(),
            };
            self.state.order = new_order;
            if max_index != 1 {
                self.u = Self::compute_r(new_order, 1.0);
            }

            let mut factor = safety * factors[max_index];
            if factor > self.problem.config.maximum_timestep_growth {
                factor = self.problem.config.maximum_timestep_growth;
            }
            if factor < self.problem.config.minimum_timestep_shrink {
                factor = self.problem.config.minimum_timestep_shrink;
            }
            // skip negligible step-size changes at the same order
            if factor >= self.problem.config.minimum_timestep_growth
                || factor < self.problem.config.maximum_timestep_shrink
                || max_index != 1
            {
                let new_h = self.update_step_size(factor)?;
                self.jacobian_updates(new_h * self.alpha[new_order], SolverState::StepSuccess);
            }
        }

        // check for an event crossing within the accepted step
        if self.problem.system.nroots() > 0 {
            let mut root_finder = self.root_finder.take();
            let ret = {
                let root_finder = root_finder.as_mut().unwrap();
                let state = &self.state;
                let system = &self.problem.system;
                let interp = |t: f64, y: &mut Col<f64>| -> Result<(), DaesolError> {
                    Self::interpolate_from_diff(t, &state.diff, state.t, state.h, state.order, y);
                    Ok(())
                };
                let root_fn =
                    |t: f64, y: &Col<f64>, g: &mut Col<f64>| system.root_inplace(t, y, g);
                root_finder.check_root(&interp, &root_fn, &state.y, state.t)
            };
            self.root_finder = root_finder;
            if let Some((index, t_root)) = ret {
                return Ok(StepOutcome::EventFound { index, t: t_root });
            }
        }

        if let Some(tstop) = self.tstop {
            if let Some(outcome) = self.handle_tstop(tstop)? {
                return Ok(outcome);
            }
        }

        Ok(StepOutcome::InternalStep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Solver<'a> = DaeSolver<'a, crate::ClosureSystem>;

    #[test]
    fn test_coefficient_tables() {
        let (alpha, gamma, error_const2) = Solver::coefficient_tables();
        assert_eq!(alpha.len(), BdfState::MAX_ORDER + 1);
        assert_eq!(gamma.len(), BdfState::MAX_ORDER + 1);
        assert_eq!(error_const2.len(), BdfState::MAX_ORDER + 1);
        // order 1: gamma = 1, alpha = 1 / (1 - kappa_1)
        assert!((gamma[1] - 1.0).abs() < 1e-14);
        assert!((alpha[1] - 1.0 / 1.1850).abs() < 1e-12);
    }

    #[test]
    fn test_compute_r_identity_factor() {
        // with factor = 1 the first two columns follow the recurrence
        // r[i, j] = r[i-1, j] * (i - 1 - j) / i
        let r = Solver::compute_r(2, 1.0);
        assert_eq!(r[(0, 0)], 1.0);
        assert_eq!(r[(1, 1)], -1.0);
        assert_eq!(r[(2, 1)], 0.0);
        assert_eq!(r[(1, 2)], -2.0);
        assert_eq!(r[(2, 2)], 1.0);
    }
}
