use faer::{Col, Mat};

/// Internal integrator state: the current solution, its derivative, the
/// sensitivity vectors, and the backward-difference histories they are
/// predicted and interpolated from. Owned by the solver, mutated in place on
/// every step and discarded at return.
#[derive(Clone)]
pub struct BdfState {
    pub(crate) order: usize,
    pub(crate) diff: Mat<f64>,
    pub(crate) sdiff: Vec<Mat<f64>>,
    pub(crate) y: Col<f64>,
    pub(crate) dy: Col<f64>,
    pub(crate) s: Vec<Col<f64>>,
    pub(crate) ds: Vec<Col<f64>>,
    pub(crate) t: f64,
    pub(crate) h: f64,
}

impl BdfState {
    pub(crate) const MAX_ORDER: usize = 5;

    pub fn new(y: Col<f64>, dy: Col<f64>, s: Vec<Col<f64>>, ds: Vec<Col<f64>>, t: f64, h: f64) -> Self {
        let nstates = y.nrows();
        let diff = Mat::zeros(nstates, Self::MAX_ORDER + 3);
        let sdiff = vec![Mat::zeros(nstates, Self::MAX_ORDER + 3); s.len()];
        Self {
            order: 1,
            diff,
            sdiff,
            y,
            dy,
            s,
            ds,
            t,
            h,
        }
    }

    pub fn initialise_diff_to_first_order(&mut self) {
        self.order = 1;
        let n = self.y.nrows();
        for i in 0..n {
            self.diff[(i, 0)] = self.y[i];
            self.diff[(i, 1)] = self.dy[i] * self.h;
        }
        for j in 2..self.diff.ncols() {
            for i in 0..n {
                self.diff[(i, j)] = 0.0;
            }
        }
    }

    pub fn initialise_sdiff_to_first_order(&mut self) {
        let n = self.y.nrows();
        for (k, sdiff) in self.sdiff.iter_mut().enumerate() {
            for i in 0..n {
                sdiff[(i, 0)] = self.s[k][i];
                sdiff[(i, 1)] = self.ds[k][i] * self.h;
            }
            for j in 2..sdiff.ncols() {
                for i in 0..n {
                    sdiff[(i, j)] = 0.0;
                }
            }
        }
    }
}
