use std::cell::{Cell, RefCell};

use faer::{Col, Mat};

use crate::op::{DaeSystem, NonLinearOp};

/// The BDF-discretised sensitivity system for one parameter.
///
/// The forward sensitivity of the residual is linear in `s`:
///
/// `(dF/dy) s + (dF/dy') s' + dF/dp_i = 0`
///
/// and the BDF step fixes `s' = (s - s0 + psi_s) / c`, so the Newton matrix
/// is identical to the primary step's and its factorisation is reused; only
/// the right-hand side changes per parameter. The linearisation state
/// `(y, y')` is frozen at the accepted primary iterate via
/// [`Self::update_state`], and [`Self::set_index`] selects the parameter
/// column.
pub struct SensOp<'a, S: DaeSystem> {
    system: &'a S,
    psi_neg_s0: RefCell<Col<f64>>,
    c: Cell<f64>,
    y: RefCell<Col<f64>>,
    yp: RefCell<Col<f64>>,
    sp: RefCell<Col<f64>>,
    index: Cell<usize>,
}

impl<'a, S: DaeSystem> SensOp<'a, S> {
    pub fn new(system: &'a S) -> Self {
        let n = system.nstates();
        Self {
            system,
            psi_neg_s0: RefCell::new(Col::zeros(n)),
            c: Cell::new(0.0),
            y: RefCell::new(Col::zeros(n)),
            yp: RefCell::new(Col::zeros(n)),
            sp: RefCell::new(Col::zeros(n)),
            index: Cell::new(0),
        }
    }

    pub fn set_c(&self, h: f64, alpha: f64) {
        self.c.set(h * alpha);
    }

    /// Freeze the primary state the sensitivity right-hand sides linearise
    /// about.
    pub fn update_state(&self, y: &Col<f64>, yp: &Col<f64>) {
        self.y.borrow_mut().copy_from(y);
        self.yp.borrow_mut().copy_from(yp);
    }

    pub fn set_index(&self, index: usize) {
        self.index.set(index);
    }

    /// The sensitivity derivative the BDF discretisation assigns to `x`:
    /// `(x - s0 + psi_s) / c`.
    pub fn sp_of(&self, x: &Col<f64>, out: &mut Col<f64>) {
        let psi_neg_s0 = self.psi_neg_s0.borrow();
        let cj = 1.0 / self.c.get();
        for i in 0..out.nrows() {
            out[i] = (x[i] + psi_neg_s0[i]) * cj;
        }
    }

    /// Update the psi term for this parameter's difference history and fold
    /// in the negated predicted sensitivity.
    pub fn set_psi_and_s0(
        &self,
        sdiff: &Mat<f64>,
        gamma: &[f64],
        alpha: &[f64],
        order: usize,
        s0: &Col<f64>,
    ) {
        let mut psi = self.psi_neg_s0.borrow_mut();
        psi.iter_mut().for_each(|p| *p = 0.0);
        for (i, &gamma_i) in gamma.iter().enumerate().take(order + 1).skip(1) {
            for row in 0..psi.nrows() {
                psi[row] += gamma_i * sdiff[(row, i)];
            }
        }
        for row in 0..psi.nrows() {
            psi[row] = alpha[order] * psi[row] - s0[row];
        }
    }
}

impl<S: DaeSystem> NonLinearOp for SensOp<'_, S> {
    fn nstates(&self) -> usize {
        self.system.nstates()
    }

    // G(s) = (dF/dy) s + (dF/dy') (s - s0 + psi_s) / c + dF/dp_i
    fn call_inplace(&self, x: &Col<f64>, t: f64, out: &mut Col<f64>) {
        let psi_neg_s0 = self.psi_neg_s0.borrow();
        let mut sp = self.sp.borrow_mut();
        let cj = 1.0 / self.c.get();
        for i in 0..sp.nrows() {
            sp[i] = (x[i] + psi_neg_s0[i]) * cj;
        }
        let y = self.y.borrow();
        let yp = self.yp.borrow();
        self.system
            .sens_residual_inplace(t, &y, &yp, self.index.get(), x, &sp, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::decay_system;
    use crate::vector::assert_eq_st;

    #[test]
    fn test_sens_op_rhs() {
        // F = y' + p y, p = 0.1: sens residual = s' + p s + y
        let system = decay_system(0.1, 1);
        let op = SensOp::new(&system);
        op.set_c(0.1, 1.0);
        let y = Col::from_fn(1, |_| 2.0);
        let yp = Col::from_fn(1, |_| -0.2);
        op.update_state(&y, &yp);
        op.set_index(0);
        {
            let mut psi = op.psi_neg_s0.borrow_mut();
            psi[0] = -1.0;
        }
        // s = 1: s' = (1 - 1) / 0.1 = 0, G = 0 + 0.1 * 1 + 2 = 2.1
        let s = Col::from_fn(1, |_| 1.0);
        let mut out = Col::zeros(1);
        op.call_inplace(&s, 0.0, &mut out);
        assert_eq_st(&out, &[2.1], 1e-12);
    }
}
