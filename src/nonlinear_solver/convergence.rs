use faer::Col;

use crate::vector::squared_norm;

/// Monitors a Newton iteration: estimates the convergence rate from
/// successive update norms, predicts whether the iteration can still meet the
/// tolerance within the remaining iterations, and aborts early when it
/// cannot.
pub struct Convergence<'a> {
    rtol: f64,
    atol: &'a Col<f64>,
    tol: f64,
    max_iter: usize,
    niter: usize,
    old_norm: Option<f64>,
}

pub enum ConvergenceStatus {
    Converged,
    Diverged,
    Continue,
    MaximumIterations,
}

impl<'a> Convergence<'a> {
    pub fn new(rtol: f64, atol: &'a Col<f64>) -> Self {
        Self {
            rtol,
            atol,
            tol: 0.33,
            max_iter: 10,
            niter: 0,
            old_norm: None,
        }
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn set_max_iter(&mut self, value: usize) {
        self.max_iter = value;
    }

    pub fn niter(&self) -> usize {
        self.niter
    }

    pub fn reset(&mut self) {
        self.niter = 0;
        self.old_norm = None;
    }

    pub fn check_new_iteration(&mut self, dy: &Col<f64>, y: &Col<f64>) -> ConvergenceStatus {
        let norm = squared_norm(dy, y, self.atol, self.rtol).sqrt();
        // a non-finite update norm means the linearisation or residual blew
        // up, treat as divergence so the stepper can shrink and retry
        if !norm.is_finite() {
            return ConvergenceStatus::Diverged;
        }
        self.niter += 1;
        if norm <= f64::EPSILON {
            return ConvergenceStatus::Converged;
        }
        let eta = if let Some(old_norm) = self.old_norm {
            let rate = (norm / old_norm).powf(1.0 / (self.niter - 1) as f64);

            if rate > 0.9 {
                return ConvergenceStatus::Diverged;
            }

            // if the iteration cannot reach the tolerance within the
            // remaining iterations at the current rate, abort now
            let remaining = (self.max_iter - self.niter) as i32;
            if rate.powi(remaining) / (1.0 - rate) * norm > self.tol {
                return ConvergenceStatus::Diverged;
            }

            rate / (1.0 - rate)
        } else {
            self.old_norm = Some(norm);
            20.0
        };
        if eta * norm < self.tol {
            return ConvergenceStatus::Converged;
        }
        if self.niter >= self.max_iter {
            return ConvergenceStatus::MaximumIterations;
        }
        ConvergenceStatus::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_update_converges_immediately() {
        let atol = Col::<f64>::from_fn(1, |_| 1e-6);
        let mut conv = Convergence::new(1e-6, &atol);
        conv.reset();
        let y = Col::<f64>::from_fn(1, |_| 1.0);
        let dy = Col::<f64>::from_fn(1, |_| 1e-24);
        assert!(matches!(
            conv.check_new_iteration(&dy, &y),
            ConvergenceStatus::Converged
        ));
    }

    #[test]
    fn test_growing_updates_diverge() {
        let atol = Col::<f64>::from_fn(1, |_| 1e-6);
        let mut conv = Convergence::new(1e-6, &atol);
        conv.reset();
        let y = Col::<f64>::from_fn(1, |_| 1.0);
        let dy0 = Col::<f64>::from_fn(1, |_| 1e-2);
        let dy1 = Col::<f64>::from_fn(1, |_| 2e-2);
        assert!(matches!(
            conv.check_new_iteration(&dy0, &y),
            ConvergenceStatus::Continue
        ));
        assert!(matches!(
            conv.check_new_iteration(&dy1, &y),
            ConvergenceStatus::Diverged
        ));
    }

    #[test]
    fn test_non_finite_norm_diverges() {
        let atol = Col::<f64>::from_fn(1, |_| 1e-6);
        let mut conv = Convergence::new(1e-6, &atol);
        conv.reset();
        let y = Col::<f64>::from_fn(1, |_| 1.0);
        let dy = Col::<f64>::from_fn(1, |_| f64::NAN);
        assert!(matches!(
            conv.check_new_iteration(&dy, &y),
            ConvergenceStatus::Diverged
        ));
    }
}
