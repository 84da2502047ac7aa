use faer::{Col, Mat};
use serde::Serialize;

use crate::error::{DaeSolverError, DaesolError};

/// How a solve terminated.
///
/// The integer encoding (see [`Self::flag`]) distinguishes a clean finish
/// (zero), an event-triggered early stop (positive) and the failure kinds
/// (negative); a typed status cannot be confused with "no sensitivities
/// requested", which is visible only in the `Solution` dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// All requested output times were reached.
    Success,
    /// A terminal event stopped the integration; carries the event index.
    EventStop(usize),
    /// Newton iteration failed repeatedly despite Jacobian refreshes and
    /// step reductions.
    NewtonFailure,
    /// The local error test failed more times than the configured bound.
    TooManyErrorTestFailures,
    /// Step size underflowed the configured minimum.
    StepSizeTooSmall,
    /// The caller's cancel token was observed.
    Cancelled,
}

impl SolveStatus {
    pub fn flag(&self) -> i32 {
        match self {
            SolveStatus::Success => 0,
            SolveStatus::EventStop(_) => 2,
            SolveStatus::NewtonFailure => -1,
            SolveStatus::TooManyErrorTestFailures => -2,
            SolveStatus::StepSizeTooSmall => -3,
            SolveStatus::Cancelled => -4,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Success)
    }

    /// Map a stepping error to the terminal status reported alongside the
    /// partial trajectory.
    pub(crate) fn from_error(err: &DaesolError) -> Self {
        match err {
            DaesolError::DaeSolverError(DaeSolverError::Cancelled) => SolveStatus::Cancelled,
            DaesolError::DaeSolverError(DaeSolverError::StepSizeTooSmall { .. }) => {
                SolveStatus::StepSizeTooSmall
            }
            DaesolError::DaeSolverError(DaeSolverError::TooManyErrorTestFailures { .. }) => {
                SolveStatus::TooManyErrorTestFailures
            }
            _ => SolveStatus::NewtonFailure,
        }
    }
}

/// Counters accumulated over one solve.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub number_of_steps: usize,
    pub number_of_error_test_failures: usize,
    pub number_of_nonlinear_solver_iterations: usize,
    pub number_of_nonlinear_solver_fails: usize,
    pub number_of_jacobian_evals: usize,
}

/// The trajectory returned by a solve.
///
/// `t` holds the reached times (the requested output times, plus any event
/// points), `y` the state at each of them, and `ys` one `nstates x nparams`
/// sensitivity block per time point whenever sensitivities were requested
/// (`ys` is empty otherwise). Grows by append only and is handed to the
/// caller by value.
#[derive(Debug, Clone)]
pub struct Solution {
    pub t: Vec<f64>,
    pub y: Vec<Col<f64>>,
    pub ys: Vec<Mat<f64>>,
    pub status: SolveStatus,
    pub statistics: Statistics,
    nstates: usize,
    nparams: usize,
}

impl Solution {
    pub(crate) fn new(nstates: usize, nparams: usize) -> Self {
        Self {
            t: Vec::new(),
            y: Vec::new(),
            ys: Vec::new(),
            status: SolveStatus::Success,
            statistics: Statistics::default(),
            nstates,
            nparams,
        }
    }

    pub fn nstates(&self) -> usize {
        self.nstates
    }

    pub fn nparams(&self) -> usize {
        self.nparams
    }

    /// The integer exit flag: 0 success, positive event stop, negative
    /// failure kind.
    pub fn flag(&self) -> i32 {
        self.status.flag()
    }

    pub(crate) fn push(&mut self, t: f64, y: Col<f64>, ys: Option<Mat<f64>>) {
        debug_assert_eq!(y.nrows(), self.nstates);
        self.t.push(t);
        self.y.push(y);
        if self.nparams > 0 {
            let ys = ys.expect("sensitivity block missing");
            debug_assert_eq!(ys.nrows(), self.nstates);
            debug_assert_eq!(ys.ncols(), self.nparams);
            self.ys.push(ys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_encoding() {
        assert_eq!(SolveStatus::Success.flag(), 0);
        assert_eq!(SolveStatus::EventStop(3).flag(), 2);
        assert!(SolveStatus::NewtonFailure.flag() < 0);
        assert!(SolveStatus::Cancelled.flag() < 0);
    }

    #[test]
    fn test_push_aligns_sensitivities() {
        let mut sol = Solution::new(2, 1);
        sol.push(0.0, Col::zeros(2), Some(Mat::zeros(2, 1)));
        sol.push(1.0, Col::zeros(2), Some(Mat::zeros(2, 1)));
        assert_eq!(sol.t.len(), sol.y.len());
        assert_eq!(sol.ys.len(), sol.t.len());

        let mut sol = Solution::new(2, 0);
        sol.push(0.0, Col::zeros(2), None);
        assert!(sol.ys.is_empty());
    }
}
