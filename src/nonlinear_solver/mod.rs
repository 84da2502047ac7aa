pub mod convergence;
pub mod newton;
pub mod root;

pub use convergence::{Convergence, ConvergenceStatus};
pub use newton::NewtonSolver;
pub use root::RootFinder;
