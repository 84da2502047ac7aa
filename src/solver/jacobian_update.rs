/// Where in the step cycle a Jacobian refresh decision is being made.
pub enum SolverState {
    StepSuccess,
    FirstConvergenceFail,
    SecondConvergenceFail,
    ErrorTestFail,
    Restart,
}

/// Decides when the Newton matrix is re-assembled and re-factorised.
///
/// The matrix depends on the step scalar `c`, so it is reused across steps
/// until `c` drifts too far from the value it was built with, a step-count
/// threshold passes, or the step runs into trouble.
#[derive(Clone)]
pub struct JacobianUpdate {
    steps_since_jacobian_eval: usize,
    c_at_last_jacobian_update: f64,
    threshold_to_update_jacobian: f64,
    update_jacobian_after_steps: usize,
}

impl JacobianUpdate {
    pub fn new() -> Self {
        Self {
            steps_since_jacobian_eval: 0,
            c_at_last_jacobian_update: 1.0,
            threshold_to_update_jacobian: 0.3,
            update_jacobian_after_steps: 20,
        }
    }

    pub fn update_jacobian(&mut self, c: f64) {
        self.steps_since_jacobian_eval = 0;
        self.c_at_last_jacobian_update = c;
    }

    pub fn step(&mut self) {
        self.steps_since_jacobian_eval += 1;
    }

    pub fn check_jacobian_update(&self, c: f64, state: &SolverState) -> bool {
        match state {
            SolverState::StepSuccess => {
                self.steps_since_jacobian_eval >= self.update_jacobian_after_steps
                    || (c / self.c_at_last_jacobian_update - 1.0).abs()
                        > self.threshold_to_update_jacobian
            }
            SolverState::FirstConvergenceFail => true,
            SolverState::SecondConvergenceFail => true,
            SolverState::ErrorTestFail => true,
            SolverState::Restart => true,
        }
    }
}

impl Default for JacobianUpdate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_on_large_step_change() {
        let mut update = JacobianUpdate::new();
        update.update_jacobian(1.0);
        assert!(!update.check_jacobian_update(1.1, &SolverState::StepSuccess));
        assert!(update.check_jacobian_update(2.0, &SolverState::StepSuccess));
        assert!(update.check_jacobian_update(1.0, &SolverState::FirstConvergenceFail));
    }

    #[test]
    fn test_refresh_after_step_threshold() {
        let mut update = JacobianUpdate::new();
        update.update_jacobian(1.0);
        for _ in 0..20 {
            update.step();
        }
        assert!(update.check_jacobian_update(1.0, &SolverState::StepSuccess));
    }
}
