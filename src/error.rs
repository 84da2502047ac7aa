use thiserror::Error;

/// Custom error type for Daesol
///
/// This error type is used to wrap all possible errors that can occur when using Daesol
#[derive(Error, Debug)]
pub enum DaesolError {
    #[error("Linear solver error: {0}")]
    LinearSolverError(#[from] LinearSolverError),
    #[error("Non-linear solver error: {0}")]
    NonLinearSolverError(#[from] NonLinearSolverError),
    #[error("DAE solver error: {0}")]
    DaeSolverError(#[from] DaeSolverError),
    #[error("Matrix error: {0}")]
    MatrixError(#[from] MatrixError),
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when solving a linear problem
#[derive(Error, Debug)]
pub enum LinearSolverError {
    #[error("LU not initialized")]
    LuNotInitialized,
    #[error("Failed to factorise Newton matrix")]
    FactorisationFailed,
    #[error("Linear solver not setup")]
    LinearSolverNotSetup,
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when solving a non-linear problem
#[derive(Error, Debug)]
pub enum NonLinearSolverError {
    #[error("Newton iterations did not converge")]
    NewtonDidNotConverge,
    #[error("Jacobian not reset before calling solve")]
    JacobianNotReset,
    #[error("State has wrong length: expected {expected}, got {found}")]
    WrongStateLength { expected: usize, found: usize },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when integrating a DAE
#[derive(Debug, Error)]
pub enum DaeSolverError {
    #[error(
        "Stop time = {} is less than current state time = {}",
        stop_time,
        state_time
    )]
    StopTimeBeforeCurrentTime { stop_time: f64, state_time: f64 },
    #[error("Stop time is at the current state time")]
    StopTimeAtCurrentTime,
    #[error("Interpolation vector is not the correct length, expected {expected}, got {found}")]
    InterpolationVectorWrongSize { expected: usize, found: usize },
    #[error("Number of sensitivities does not match number of parameters")]
    SensitivityCountMismatch { expected: usize, found: usize },
    #[error("Interpolation time is outside the current step")]
    InterpolationTimeOutsideCurrentStep,
    #[error("Sensitivity solve failed")]
    SensitivitySolveFailed,
    #[error("Exceeded maximum number of error test failures at time = {time}")]
    TooManyErrorTestFailures { time: f64 },
    #[error("Exceeded maximum number of Newton failures at time = {time}")]
    TooManyNewtonFailures { time: f64 },
    #[error("Step size is too small at time = {time}")]
    StepSizeTooSmall { time: f64 },
    #[error("Initial state could not be made consistent with the residual")]
    InconsistentInitialConditions,
    #[error("Solve cancelled by caller")]
    Cancelled,
    #[error("Jacobian not available")]
    JacobianNotAvailable,
    #[error("Output times must be strictly increasing and start at or after the initial time")]
    InvalidTEval,
    #[error("Builder error: {0}")]
    BuilderError(String),
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors for matrix operations
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(
        "Column pointers have length {found}, expected {expected} (number of columns plus one)"
    )]
    ColumnPointersWrongLength { expected: usize, found: usize },
    #[error("Column pointers must start at zero and be non-decreasing")]
    ColumnPointersNotMonotonic,
    #[error("Declared nonzero count {declared} disagrees with column pointers ({found})")]
    NnzMismatch { declared: usize, found: usize },
    #[error("Row index {index} out of bounds for matrix with {nrows} rows")]
    RowIndexOutOfBounds { index: usize, nrows: usize },
    #[error("Row indices within a column must be strictly increasing")]
    RowIndicesNotSorted,
    #[error("Matrix values contain a non-finite entry")]
    NonFiniteValue,
    #[error("Cannot create a matrix with zero rows or columns")]
    MatrixShapeError,
    #[error("Error: {0}")]
    Other(String),
}

#[macro_export]
macro_rules! linear_solver_error {
    ($variant:ident) => {
        DaesolError::from(LinearSolverError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        DaesolError::from(LinearSolverError::$variant($($arg)*))
    };
}

#[macro_export]
macro_rules! non_linear_solver_error {
    ($variant:ident) => {
        DaesolError::from(NonLinearSolverError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        DaesolError::from(NonLinearSolverError::$variant($($arg)*))
    };
}

#[macro_export]
macro_rules! dae_solver_error {
    ($variant:ident) => {
        DaesolError::from(DaeSolverError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        DaesolError::from(DaeSolverError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! matrix_error {
    ($variant:ident) => {
        DaesolError::from(MatrixError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        DaesolError::from(MatrixError::$variant($($arg)*))
    };
}
