//! The interpreted-callback provider: every evaluator is an opaque callable.

use faer::Col;

use crate::error::{DaeSolverError, DaesolError};
use crate::matrix::CscPattern;
use crate::op::{finite_difference_action, DaeSystem};

/// Residual evaluator `F(t, y, y', out)`.
pub type ResidualFn = Box<dyn Fn(f64, &Col<f64>, &Col<f64>, &mut Col<f64>)>;
/// Newton matrix evaluator: writes the CSC values of `dF/dy + cj * dF/dy'`.
pub type JacobianFn = Box<dyn Fn(f64, &Col<f64>, &Col<f64>, f64, &mut [f64])>;
/// Mass action `out = (dF/dy') v`.
pub type MassActionFn = Box<dyn Fn(&Col<f64>, &mut Col<f64>)>;
/// Full sensitivity residual for one parameter:
/// `out = (dF/dy) s + (dF/dy') s' + dF/dp_index`, called as
/// `(t, y, y', index, s, s', out)`.
pub type SensResidualFn =
    Box<dyn Fn(f64, &Col<f64>, &Col<f64>, usize, &Col<f64>, &Col<f64>, &mut Col<f64>)>;
/// Event function evaluator `g(t, y, out)`.
pub type RootFn = Box<dyn Fn(f64, &Col<f64>, &mut Col<f64>)>;

/// A DAE system assembled from interpreted callbacks.
///
/// Only the residual is mandatory. Without a Jacobian provider the engine
/// runs matrix-free (probing the residual by finite differences); without a
/// mass-action callable the derivative Jacobian is probed the same way.
pub struct ClosureSystem {
    residual: ResidualFn,
    jacobian: Option<(CscPattern, JacobianFn)>,
    mass_action: Option<MassActionFn>,
    sens: Option<SensResidualFn>,
    root: Option<RootFn>,
    mask: Vec<bool>,
    nstates: usize,
    nparams: usize,
    nroots: usize,
}

impl ClosureSystem {
    /// A purely differential system with `nstates` states.
    pub fn new(nstates: usize, residual: ResidualFn) -> Self {
        Self {
            residual,
            jacobian: None,
            mass_action: None,
            sens: None,
            root: None,
            mask: vec![true; nstates],
            nstates,
            nparams: 0,
            nroots: 0,
        }
    }

    /// Attach an assembled-Jacobian provider with its sparsity pattern.
    pub fn with_jacobian(mut self, pattern: CscPattern, jacobian: JacobianFn) -> Self {
        self.jacobian = Some((pattern, jacobian));
        self
    }

    pub fn with_mass_action(mut self, mass_action: MassActionFn) -> Self {
        self.mass_action = Some(mass_action);
        self
    }

    pub fn with_sens(mut self, nparams: usize, sens: SensResidualFn) -> Self {
        self.nparams = nparams;
        self.sens = Some(sens);
        self
    }

    pub fn with_events(mut self, nroots: usize, root: RootFn) -> Self {
        self.nroots = nroots;
        self.root = Some(root);
        self
    }

    /// Mark which states are differential (true) and which are algebraic
    /// (false). Defaults to all differential.
    pub fn with_differential_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = mask;
        self
    }
}

impl DaeSystem for ClosureSystem {
    fn nstates(&self) -> usize {
        self.nstates
    }

    fn nparams(&self) -> usize {
        self.nparams
    }

    fn nroots(&self) -> usize {
        self.nroots
    }

    fn differential_mask(&self) -> &[bool] {
        &self.mask
    }

    fn residual_inplace(&self, t: f64, y: &Col<f64>, yp: &Col<f64>, out: &mut Col<f64>) {
        (self.residual)(t, y, yp, out)
    }

    fn jacobian_sparsity(&self) -> Option<&CscPattern> {
        self.jacobian.as_ref().map(|(pattern, _)| pattern)
    }

    fn jacobian_inplace(
        &self,
        t: f64,
        y: &Col<f64>,
        yp: &Col<f64>,
        cj: f64,
        values: &mut [f64],
    ) -> Result<(), DaesolError> {
        match &self.jacobian {
            Some((_, jacobian)) => {
                jacobian(t, y, yp, cj, values);
                Ok(())
            }
            None => Err(DaesolError::from(DaeSolverError::JacobianNotAvailable)),
        }
    }

    fn mass_action_inplace(
        &self,
        t: f64,
        y: &Col<f64>,
        yp: &Col<f64>,
        v: &Col<f64>,
        out: &mut Col<f64>,
    ) {
        match &self.mass_action {
            Some(mass_action) => mass_action(v, out),
            None => {
                finite_difference_action(|ypp, out| self.residual_inplace(t, y, ypp, out), yp, v, out)
            }
        }
    }

    fn sens_residual_inplace(
        &self,
        t: f64,
        y: &Col<f64>,
        yp: &Col<f64>,
        index: usize,
        s: &Col<f64>,
        sp: &Col<f64>,
        out: &mut Col<f64>,
    ) {
        let sens = self
            .sens
            .as_ref()
            .expect("sensitivity provider not configured");
        sens(t, y, yp, index, s, sp, out)
    }

    fn root_inplace(&self, t: f64, y: &Col<f64>, out: &mut Col<f64>) {
        if let Some(root) = &self.root {
            root(t, y, out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_system_residual_and_jacobian() {
        // F = y' + 2 y, J = 2 + cj
        let pattern = CscPattern::new(1, 1, 1, vec![0], vec![0, 1]).unwrap();
        let system = ClosureSystem::new(
            1,
            Box::new(|_t, y, yp, out| {
                out[0] = yp[0] + 2.0 * y[0];
            }),
        )
        .with_jacobian(
            pattern,
            Box::new(|_t, _y, _yp, cj, values| {
                values[0] = 2.0 + cj;
            }),
        );

        let y = Col::from_fn(1, |_| 3.0);
        let yp = Col::from_fn(1, |_| -1.0);
        let mut out = Col::zeros(1);
        system.residual_inplace(0.0, &y, &yp, &mut out);
        assert!((out[0] - 5.0).abs() < 1e-14);

        let mut values = [0.0];
        system.jacobian_inplace(0.0, &y, &yp, 10.0, &mut values).unwrap();
        assert!((values[0] - 12.0).abs() < 1e-14);
    }

    #[test]
    fn test_mass_action_falls_back_to_finite_difference() {
        let system = ClosureSystem::new(
            1,
            Box::new(|_t, y, yp, out| {
                out[0] = 3.0 * yp[0] + y[0];
            }),
        );
        let y = Col::from_fn(1, |_| 1.0);
        let yp = Col::from_fn(1, |_| 1.0);
        let v = Col::from_fn(1, |_| 1.0);
        let mut out = Col::zeros(1);
        system.mass_action_inplace(0.0, &y, &yp, &v, &mut out);
        assert!((out[0] - 3.0).abs() < 1e-6);
    }
}
