/// Step-control and retry bounds for the BDF integrator.
///
/// Carried by value on every problem so concurrent solves never share
/// configuration state.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub minimum_timestep: f64,
    pub maximum_error_test_failures: usize,
    pub maximum_convergence_failures: usize,
    pub maximum_timestep_growth: f64,
    pub minimum_timestep_growth: f64,
    pub maximum_timestep_shrink: f64,
    pub minimum_timestep_shrink: f64,
    pub maximum_newton_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            minimum_timestep: 1e-32,
            maximum_error_test_failures: 40,
            maximum_convergence_failures: 10,
            maximum_timestep_growth: 2.1,
            minimum_timestep_growth: 2.0,
            maximum_timestep_shrink: 0.9,
            minimum_timestep_shrink: 0.5,
            maximum_newton_iterations: 4,
        }
    }
}
