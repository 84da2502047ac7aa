//! The compiled-expression provider: evaluators produced by a symbolic
//! backend ahead of time, with the Newton-matrix sparsity known up front and
//! the derivative information split into separate action evaluators.

use std::cell::RefCell;

use faer::Col;

use crate::error::DaesolError;
use crate::matrix::CscPattern;
use crate::op::interpreted::{JacobianFn, MassActionFn, ResidualFn, RootFn};
use crate::op::DaeSystem;

/// Jacobian action `out = (dF/dy) v`, called as `(t, y, v, out)`.
pub type JacActionFn = Box<dyn Fn(f64, &Col<f64>, &Col<f64>, &mut Col<f64>)>;
/// Parameter partial `out = dF/dp_index`, called as `(t, y, y', index, out)`.
pub type ParamActionFn = Box<dyn Fn(f64, &Col<f64>, &Col<f64>, usize, &mut Col<f64>)>;

/// A DAE system backed by compiled evaluators.
///
/// The fused residual evaluator comes with the algebraic/differential mask of
/// its equations; the Newton matrix `dF/dy + cj * dF/dy'` is assembled
/// directly by the backend into the sparsity it declared, and the separate
/// Jacobian-action, parameter-Jacobian-action and mass-action evaluators
/// drive the matrix-free mode and the sensitivity right-hand sides.
pub struct CompiledSystem {
    residual: ResidualFn,
    jacobian: JacobianFn,
    pattern: CscPattern,
    jac_action: JacActionFn,
    param_action: ParamActionFn,
    mass_action: MassActionFn,
    root: Option<RootFn>,
    mask: Vec<bool>,
    nstates: usize,
    nparams: usize,
    nroots: usize,
    scratch: RefCell<Col<f64>>,
}

impl CompiledSystem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mask: Vec<bool>,
        residual: ResidualFn,
        pattern: CscPattern,
        jacobian: JacobianFn,
        jac_action: JacActionFn,
        param_action: ParamActionFn,
        mass_action: MassActionFn,
        nparams: usize,
    ) -> Self {
        let nstates = mask.len();
        Self {
            residual,
            jacobian,
            pattern,
            jac_action,
            param_action,
            mass_action,
            root: None,
            mask,
            nstates,
            nparams,
            nroots: 0,
            scratch: RefCell::new(Col::zeros(nstates)),
        }
    }

    pub fn with_events(mut self, nroots: usize, root: RootFn) -> Self {
        self.nroots = nroots;
        self.root = Some(root);
        self
    }
}

impl DaeSystem for CompiledSystem {
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
        Some(&self.pattern)
    }

    fn jacobian_inplace(
        &self,
        t: f64,
        y: &Col<f64>,
        yp: &Col<f64>,
        cj: f64,
        values: &mut [f64],
    ) -> Result<(), DaesolError> {
        (self.jacobian)(t, y, yp, cj, values);
        Ok(())
    }

    fn jac_action_inplace(
        &self,
        t: f64,
        y: &Col<f64>,
        _yp: &Col<f64>,
        v: &Col<f64>,
        out: &mut Col<f64>,
    ) {
        (self.jac_action)(t, y, v, out)
    }

    fn mass_action_inplace(
        &self,
        _t: f64,
        _y: &Col<f64>,
        _yp: &Col<f64>,
        v: &Col<f64>,
        out: &mut Col<f64>,
    ) {
        (self.mass_action)(v, out)
    }

    // (dF/dy) s + (dF/dy') s' + dF/dp_index, assembled from the separate
    // compiled actions
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
        let mut scratch = self.scratch.borrow_mut();
        (self.jac_action)(t, y, s, out);
        (self.mass_action)(sp, &mut scratch);
        for i in 0..out.nrows() {
            out[i] += scratch[i];
        }
        (self.param_action)(t, y, yp, index, &mut scratch);
        for i in 0..out.nrows() {
            out[i] += scratch[i];
        }
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
    use crate::vector::assert_eq_st;

    // F = y' + p y with p = 2, one state, one parameter
    fn system() -> CompiledSystem {
        let pattern = CscPattern::new(1, 1, 1, vec![0], vec![0, 1]).unwrap();
        CompiledSystem::new(
            vec![true],
            Box::new(|_t, y, yp, out| out[0] = yp[0] + 2.0 * y[0]),
            pattern,
            Box::new(|_t, _y, _yp, cj, values| values[0] = 2.0 + cj),
            Box::new(|_t, _y, v, out| out[0] = 2.0 * v[0]),
            Box::new(|_t, y, _yp, _index, out| out[0] = y[0]),
            Box::new(|v, out| out[0] = v[0]),
            1,
        )
    }

    #[test]
    fn test_sens_residual_from_actions() {
        let sys = system();
        let y = Col::from_fn(1, |_| 3.0);
        let yp = Col::from_fn(1, |_| -6.0);
        let s = Col::from_fn(1, |_| 0.5);
        let sp = Col::from_fn(1, |_| -1.0);
        let mut out = Col::zeros(1);
        // 2 * 0.5 + (-1.0) + 3.0 = 3.0
        sys.sens_residual_inplace(0.0, &y, &yp, 0, &s, &sp, &mut out);
        assert_eq_st(&out, &[3.0], 1e-14);
    }
}
