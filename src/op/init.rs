use std::cell::RefCell;

use faer::Col;

use crate::op::{DaeSystem, NonLinearOp, NonLinearOpJacobian};

/// Consistent initial conditions for a DAE system.
///
/// We follow the approach of Brown, P. N., Hindmarsh, A. C., & Petzold, L. R.
/// (1998). Consistent initial condition calculation for differential-algebraic
/// systems. SIAM Journal on Scientific Computing, 19(5), 1495-1512: holding
/// the differential components of `y` fixed, solve `F(t0, y, y') = 0` for the
/// algebraic components of `y` and the differential components of `y'`.
///
/// The unknown vector packs both: at a differential index it carries the
/// `y'` component, at an algebraic index the `y` component.
pub struct InitOp<'a, S: DaeSystem> {
    system: &'a S,
    y: RefCell<Col<f64>>,
    yp: RefCell<Col<f64>>,
    v_diff: RefCell<Col<f64>>,
    v_alg: RefCell<Col<f64>>,
    tmp: RefCell<Col<f64>>,
}

impl<'a, S: DaeSystem> InitOp<'a, S> {
    pub fn new(system: &'a S, y0: &Col<f64>, yp0: &Col<f64>) -> Self {
        let n = system.nstates();
        Self {
            system,
            y: RefCell::new(y0.to_owned()),
            yp: RefCell::new(yp0.to_owned()),
            v_diff: RefCell::new(Col::zeros(n)),
            v_alg: RefCell::new(Col::zeros(n)),
            tmp: RefCell::new(Col::zeros(n)),
        }
    }

    /// Pack the initial guess for the unknown vector.
    pub fn initial_guess(&self) -> Col<f64> {
        let y = self.y.borrow();
        let yp = self.yp.borrow();
        let mask = self.system.differential_mask();
        Col::from_fn(y.nrows(), |i| if mask[i] { yp[i] } else { y[i] })
    }

    /// Unpack a converged solution into the state and its derivative.
    pub fn scatter_solution(&self, x: &Col<f64>, y0: &mut Col<f64>, yp0: &mut Col<f64>) {
        let mask = self.system.differential_mask();
        for i in 0..x.nrows() {
            if mask[i] {
                yp0[i] = x[i];
            } else {
                y0[i] = x[i];
            }
        }
    }
}

impl<S: DaeSystem> NonLinearOp for InitOp<'_, S> {
    fn nstates(&self) -> usize {
        self.system.nstates()
    }

    fn call_inplace(&self, x: &Col<f64>, t: f64, out: &mut Col<f64>) {
        let mut y = self.y.borrow_mut();
        let mut yp = self.yp.borrow_mut();
        let mask = self.system.differential_mask();
        for i in 0..x.nrows() {
            if mask[i] {
                yp[i] = x[i];
            } else {
                y[i] = x[i];
            }
        }
        self.system.residual_inplace(t, &y, &yp, out);
    }
}

impl<S: DaeSystem> NonLinearOpJacobian for InitOp<'_, S> {
    // J v = (dF/dy') v_diff + (dF/dy) v_alg, where v is split by the mask
    fn jac_mul_inplace(&self, _x: &Col<f64>, t: f64, v: &Col<f64>, out: &mut Col<f64>) {
        let y = self.y.borrow();
        let yp = self.yp.borrow();
        let mut v_diff = self.v_diff.borrow_mut();
        let mut v_alg = self.v_alg.borrow_mut();
        let mut tmp = self.tmp.borrow_mut();
        let mask = self.system.differential_mask();
        for i in 0..v.nrows() {
            v_diff[i] = if mask[i] { v[i] } else { 0.0 };
            v_alg[i] = if mask[i] { 0.0 } else { v[i] };
        }
        self.system.mass_action_inplace(t, &y, &yp, &v_diff, out);
        self.system.jac_action_inplace(t, &y, &yp, &v_alg, &mut tmp);
        for i in 0..out.nrows() {
            out[i] += tmp[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::decay_with_algebraic_system;
    use crate::vector::assert_eq_st;

    #[test]
    fn test_init_op_packs_by_mask() {
        // y1' = y2, 0 = y1 - y2, mask = [differential, algebraic]
        let system = decay_with_algebraic_system();
        let y0 = Col::from_fn(2, |i| [1.0, 3.0][i]);
        let yp0 = Col::from_fn(2, |i| [0.5, 0.0][i]);
        let op = InitOp::new(&system, &y0, &yp0);

        let x = op.initial_guess();
        // unknowns: (yp1, y2)
        assert_eq_st(&x, &[0.5, 3.0], 1e-14);

        // residual at the guess: (yp1 - y2, y1 - y2) = (0.5 - 3, 1 - 3)
        let mut out = Col::zeros(2);
        op.call_inplace(&x, 0.0, &mut out);
        assert_eq_st(&out, &[-2.5, -2.0], 1e-14);

        // J = | 1 -1 |   (d/dyp1, d/dy2)
        //     | 0 -1 |
        let v = Col::from_fn(2, |_| 1.0);
        op.jac_mul_inplace(&x, 0.0, &v, &mut out);
        assert_eq_st(&out, &[0.0, -1.0], 1e-6);
    }
}
