use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use faer::Col;

use crate::dae_solver_error;
use crate::error::{DaeSolverError, DaesolError};
use crate::op::DaeSystem;
use crate::solver::config::SolverConfig;
use crate::solver::solution::Solution;
use crate::solver::DaeSolver;

/// Cooperative cancellation handle.
///
/// Clone it, hand a copy to another thread, and call [`Self::cancel`]; the
/// solver polls the flag between Newton solves and returns the partial
/// trajectory with a cancellation status.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// What the solver does when an event function crosses zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Truncate the trajectory at the event time and stop with a positive
    /// status.
    Stop,
    /// Record the event point, restart from it as a freshly consistent
    /// first-order state, and continue.
    Restart,
}

/// How the Newton matrix is obtained, fixed at problem construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianMode {
    /// The provider assembles `dF/dy + cj * dF/dy'` in CSC form.
    Assembled,
    /// The Newton matrix is probed column-by-column from the Jacobian and
    /// mass actions.
    MatrixFree,
}

/// An immutable integration problem: the system evaluators plus everything
/// on the common parameter surface of the two provider shapes.
pub struct DaeProblem<S: DaeSystem> {
    pub(crate) system: S,
    pub(crate) t0: f64,
    pub(crate) y0: Col<f64>,
    pub(crate) yp0: Col<f64>,
    pub(crate) s0: Vec<Col<f64>>,
    pub(crate) rtol: f64,
    pub(crate) atol: Col<f64>,
    pub(crate) h0: Option<f64>,
    pub(crate) jacobian_mode: JacobianMode,
    pub(crate) event_actions: Vec<EventAction>,
    pub(crate) config: SolverConfig,
    pub(crate) cancel: CancelToken,
}

impl<S: DaeSystem> std::fmt::Debug for DaeProblem<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaeProblem")
            .field("t0", &self.t0)
            .field("rtol", &self.rtol)
            .field("h0", &self.h0)
            .field("jacobian_mode", &self.jacobian_mode)
            .field("event_actions", &self.event_actions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: DaeSystem> DaeProblem<S> {
    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    pub fn atol(&self) -> &Col<f64> {
        &self.atol
    }

    /// Integrate from the initial time through every requested output time.
    ///
    /// Blocks until the integration converges, fails or is cancelled.
    /// Configuration and initialization failures return `Err` before any
    /// output exists; failures during stepping return the partial trajectory
    /// with a failure status.
    pub fn solve(&self, t_eval: &[f64]) -> Result<Solution, DaesolError> {
        if t_eval.is_empty()
            || t_eval[0] < self.t0
            || t_eval.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(dae_solver_error!(InvalidTEval));
        }
        let mut solver = DaeSolver::new(self)?;
        Ok(solver.run(t_eval))
    }
}

/// Builder for [`DaeProblem`]: the common parameter surface, validated at
/// [`Self::build`].
pub struct DaeBuilder<S: DaeSystem> {
    system: S,
    t0: f64,
    y0: Vec<f64>,
    yp0: Vec<f64>,
    s0: Option<Vec<Vec<f64>>>,
    rtol: f64,
    atol: Vec<f64>,
    h0: Option<f64>,
    use_jacobian: Option<bool>,
    event_actions: Option<Vec<EventAction>>,
    config: SolverConfig,
    cancel: CancelToken,
}

impl<S: DaeSystem> DaeBuilder<S> {
    pub fn new(system: S) -> Self {
        Self {
            system,
            t0: 0.0,
            y0: Vec::new(),
            yp0: Vec::new(),
            s0: None,
            rtol: 1e-6,
            atol: vec![1e-6],
            h0: None,
            use_jacobian: None,
            event_actions: None,
            config: SolverConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn t0(mut self, t0: f64) -> Self {
        self.t0 = t0;
        self
    }

    pub fn y0(mut self, y0: impl Into<Vec<f64>>) -> Self {
        self.y0 = y0.into();
        self
    }

    pub fn yp0(mut self, yp0: impl Into<Vec<f64>>) -> Self {
        self.yp0 = yp0.into();
        self
    }

    /// Initial sensitivities, one vector per parameter. Defaults to zero.
    pub fn s0(mut self, s0: Vec<Vec<f64>>) -> Self {
        self.s0 = Some(s0);
        self
    }

    pub fn rtol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    /// Scalar absolute tolerance, broadcast over all components.
    pub fn atol(mut self, atol: f64) -> Self {
        self.atol = vec![atol];
        self
    }

    /// Per-component absolute tolerances.
    pub fn atol_per_component(mut self, atol: impl Into<Vec<f64>>) -> Self {
        self.atol = atol.into();
        self
    }

    pub fn h0(mut self, h0: f64) -> Self {
        self.h0 = Some(h0);
        self
    }

    /// With `true`, require the provider's assembled Jacobian; with `false`
    /// the Newton matrix is probed from the Jacobian action instead. The
    /// default uses the assembled Jacobian whenever the provider declares a
    /// sparsity pattern.
    pub fn use_jacobian(mut self, use_jacobian: bool) -> Self {
        self.use_jacobian = Some(use_jacobian);
        self
    }

    /// Per-event terminal-or-restart policy. Defaults to `Stop` for every
    /// event.
    pub fn event_actions(mut self, actions: Vec<EventAction>) -> Self {
        self.event_actions = Some(actions);
        self
    }

    pub fn config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<DaeProblem<S>, DaesolError> {
        let nstates = self.system.nstates();
        let nparams = self.system.nparams();
        let nroots = self.system.nroots();

        if self.y0.len() != nstates {
            return Err(dae_solver_error!(
                BuilderError,
                format!("y0 has length {}, expected {}", self.y0.len(), nstates)
            ));
        }
        if self.yp0.len() != nstates {
            return Err(dae_solver_error!(
                BuilderError,
                format!("yp0 has length {}, expected {}", self.yp0.len(), nstates)
            ));
        }
        if self.system.differential_mask().len() != nstates {
            return Err(dae_solver_error!(
                BuilderError,
                format!(
                    "differential mask has length {}, expected {}",
                    self.system.differential_mask().len(),
                    nstates
                )
            ));
        }
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(dae_solver_error!(BuilderError, "rtol must be positive"));
        }
        if self.atol.len() != 1 && self.atol.len() != nstates {
            return Err(dae_solver_error!(
                BuilderError,
                format!(
                    "atol has length {}, expected 1 or {}",
                    self.atol.len(),
                    nstates
                )
            ));
        }
        if self.atol.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(dae_solver_error!(BuilderError, "atol must be positive"));
        }
        if let Some(h0) = self.h0 {
            if !(h0.is_finite() && h0 > 0.0) {
                return Err(dae_solver_error!(BuilderError, "h0 must be positive"));
            }
        }
        if let Some(pattern) = self.system.jacobian_sparsity() {
            if pattern.nrows() != nstates || pattern.ncols() != nstates {
                return Err(dae_solver_error!(
                    BuilderError,
                    format!(
                        "jacobian sparsity is {}x{}, expected {}x{}",
                        pattern.nrows(),
                        pattern.ncols(),
                        nstates,
                        nstates
                    )
                ));
            }
        }
        let use_jacobian = self
            .use_jacobian
            .unwrap_or(self.system.jacobian_sparsity().is_some());
        if use_jacobian && self.system.jacobian_sparsity().is_none() {
            return Err(DaesolError::from(DaeSolverError::JacobianNotAvailable));
        }
        let jacobian_mode = if use_jacobian {
            JacobianMode::Assembled
        } else {
            JacobianMode::MatrixFree
        };

        let event_actions = match self.event_actions {
            Some(actions) => {
                if actions.len() != nroots {
                    return Err(dae_solver_error!(
                        BuilderError,
                        format!(
                            "{} event actions given for {} event functions",
                            actions.len(),
                            nroots
                        )
                    ));
                }
                actions
            }
            None => vec![EventAction::Stop; nroots],
        };

        let s0 = match self.s0 {
            Some(s0) => {
                if s0.len() != nparams || s0.iter().any(|s| s.len() != nstates) {
                    return Err(dae_solver_error!(
                        BuilderError,
                        "s0 must hold one vector of length nstates per parameter"
                    ));
                }
                s0.into_iter()
                    .map(|s| Col::from_fn(nstates, |i| s[i]))
                    .collect()
            }
            None => vec![Col::zeros(nstates); nparams],
        };

        let atol = if self.atol.len() == 1 {
            Col::from_fn(nstates, |_| self.atol[0])
        } else {
            Col::from_fn(nstates, |i| self.atol[i])
        };

        Ok(DaeProblem {
            t0: self.t0,
            y0: Col::from_fn(nstates, |i| self.y0[i]),
            yp0: Col::from_fn(nstates, |i| self.yp0[i]),
            s0,
            rtol: self.rtol,
            atol,
            h0: self.h0,
            jacobian_mode,
            event_actions,
            config: self.config,
            cancel: self.cancel,
            system: self.system,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::decay_system;

    #[test]
    fn test_builder_rejects_mismatched_lengths() {
        let err = DaeBuilder::new(decay_system(1.0, 0))
            .y0([1.0, 2.0])
            .yp0([-1.0])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DaesolError::DaeSolverError(DaeSolverError::BuilderError(_))
        ));
    }

    #[test]
    fn test_builder_rejects_bad_tolerances() {
        let err = DaeBuilder::new(decay_system(1.0, 0))
            .y0([1.0])
            .yp0([-1.0])
            .rtol(-1.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DaesolError::DaeSolverError(DaeSolverError::BuilderError(_))
        ));

        let err = DaeBuilder::new(decay_system(1.0, 0))
            .y0([1.0])
            .yp0([-1.0])
            .atol_per_component([1e-6, 1e-6])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DaesolError::DaeSolverError(DaeSolverError::BuilderError(_))
        ));
    }

    #[test]
    fn test_solve_rejects_unordered_t_eval() {
        let problem = DaeBuilder::new(decay_system(1.0, 0))
            .y0([1.0])
            .yp0([-1.0])
            .build()
            .unwrap();
        assert!(matches!(
            problem.solve(&[0.0, 2.0, 1.0]),
            Err(DaesolError::DaeSolverError(DaeSolverError::InvalidTEval))
        ));
        assert!(problem.solve(&[]).is_err());
    }

    #[test]
    fn test_cancel_token_round_trip() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
