//! # Daesol
//!
//! Daesol is a library for solving differential-algebraic equations (DAEs) of
//! the fully-implicit form `F(t, y, y') = 0`, where the state mixes
//! differential unknowns with algebraic constraints. It integrates with a
//! variable-order (1..=5) BDF scheme with Newton iteration, optionally
//! propagates forward sensitivities with respect to a set of model
//! parameters, and locates user-defined events by root finding during
//! integration.
//!
//! ## Defining a system
//!
//! The model is described through the [DaeSystem] trait, which the engine
//! consumes as a capability interface: the residual, the Newton matrix
//! `dF/dy + cj * dF/dy'` (assembled in compressed-sparse-column form, or as
//! an action to probe), the per-parameter residual partials, the event
//! functions and the algebraic/differential mask. Two implementations are
//! provided:
//! - [ClosureSystem], which wraps interpreted callbacks: a residual closure,
//!   optional Jacobian value/row/column providers, a mass-action closure, a
//!   sensitivity-residual closure and an event closure.
//! - [CompiledSystem], which wraps the evaluators of a compiled symbolic
//!   backend: a fused residual evaluator with its algebraic mask, a
//!   `dF/dy + cj * dF/dy'` evaluator with its own sparsity arrays, and
//!   separate Jacobian-action, parameter-Jacobian-action and mass-action
//!   evaluators.
//!
//! ## Solving
//!
//! Build a problem with [DaeBuilder] (initial state and derivative,
//! tolerances, Jacobian mode, per-event actions, sensitivity count, solver
//! configuration, cancel token) and call [DaeProblem::solve] with the
//! requested output times. The call blocks until the integration converges,
//! fails or is cancelled, and returns a [Solution] holding the reached times,
//! the states, one sensitivity block per time point when sensitivities were
//! requested, and a [SolveStatus] with an integer flag encoding (0 success,
//! positive event stop, negative failure kind).
//!
//! Before the first step the initial conditions are made consistent: the
//! algebraic components of `y0` and the differential components of `y0'` are
//! corrected by a Newton solve so the residual starts near zero.
//!
//! ## Events
//!
//! Event functions are watched for sign changes on every accepted step and
//! crossings are localised by bracketing and interpolation. Each event is
//! configured with an [EventAction]: `Stop` truncates the trajectory at the
//! event time and returns a positive status, `Restart` records the event
//! point and continues integration from it as a freshly consistent state.
//!
//! ## Sensitivities
//!
//! With a nonzero parameter count the solver advances one forward
//! sensitivity vector per parameter alongside the primary state, reusing the
//! primary Newton factorisation with per-parameter right-hand sides.
//! Sensitivity error is included in step-size control, and sensitivity
//! updates are committed only together with an accepted primary step.

pub mod error;
pub mod linear_solver;
pub mod matrix;
pub mod nonlinear_solver;
pub mod op;
pub mod solver;
pub mod vector;

pub use error::DaesolError;
pub use matrix::CscPattern;
pub use op::compiled::{CompiledSystem, JacActionFn, ParamActionFn};
pub use op::interpreted::{
    ClosureSystem, JacobianFn, MassActionFn, ResidualFn, RootFn, SensResidualFn,
};
pub use op::DaeSystem;
pub use solver::{
    CancelToken, DaeBuilder, DaeProblem, EventAction, JacobianMode, Solution, SolveStatus,
    SolverConfig, Statistics,
};

#[cfg(test)]
pub(crate) mod test_models;
