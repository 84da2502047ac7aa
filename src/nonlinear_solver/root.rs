use faer::Col;
use log::debug;

use crate::error::DaesolError;
use crate::vector::root_scan;

/// Locates zero crossings of the event functions inside an accepted step.
///
/// Sign changes are detected against the event values at the last accepted
/// step; a crossing is then localised with the modified secant / bisection
/// scheme used by Sundials
/// (<https://sundials.readthedocs.io/en/latest/cvode/Mathematics_link.html#rootfinding>),
/// sampling the solution through the stepper's interpolant. When several
/// event functions cross within the step, the one with the largest
/// normalised crossing fraction is chased, which yields the earliest
/// crossing.
pub struct RootFinder {
    t0: f64,
    g0: Col<f64>,
    g1: Col<f64>,
    gmid: Col<f64>,
    ymid: Col<f64>,
}

impl RootFinder {
    pub fn new(nroots: usize, nstates: usize) -> Self {
        Self {
            t0: 0.0,
            g0: Col::zeros(nroots),
            g1: Col::zeros(nroots),
            gmid: Col::zeros(nroots),
            ymid: Col::zeros(nstates),
        }
    }

    /// Set the lower boundary of the root search. Called once at the start
    /// of integration and again whenever the state is reset (e.g. restarting
    /// from an event point).
    pub fn init(&mut self, root_fn: &impl Fn(f64, &Col<f64>, &mut Col<f64>), y: &Col<f64>, t: f64) {
        root_fn(t, y, &mut self.g0);
        self.t0 = t;
    }

    /// Mark `index` as sitting exactly on its root, so that the next window
    /// only reports a fresh crossing. Used when integration restarts from a
    /// located event point, where rounding in the interpolated state would
    /// otherwise re-trigger the same event.
    pub fn settle_on_root(&mut self, index: usize) {
        self.g0[index] = 0.0;
    }

    /// Check for a zero crossing between the last boundary and `(t, y)`.
    ///
    /// Returns the index of the governing event function and the crossing
    /// time. Whether or not a crossing is found, the upper boundary becomes
    /// the lower boundary for the next call.
    pub fn check_root(
        &mut self,
        interpolate: &impl Fn(f64, &mut Col<f64>) -> Result<(), DaesolError>,
        root_fn: &impl Fn(f64, &Col<f64>, &mut Col<f64>),
        y: &Col<f64>,
        t: f64,
    ) -> Option<(usize, f64)> {
        root_fn(t, y, &mut self.g1);

        let (root_at_end, _max_frac, max_frac_index) = root_scan(&self.g0, &self.g1);

        let Some(mut imax) = max_frac_index else {
            // no sign change, slide the window forward
            let root = if root_at_end {
                // event function exactly zero at the endpoint
                (0..self.g1.nrows()).find(|&i| self.g1[i] == 0.0).map(|i| (i, t))
            } else {
                None
            };
            std::mem::swap(&mut self.g0, &mut self.g1);
            self.t0 = t;
            return root;
        };

        // modified secant iteration, per the Sundials scheme
        let mut alpha = 1.0;
        let mut sign_change = [false, true];
        let mut i = 0;
        let mut t1 = t;
        let mut t0 = self.t0;
        let tol = 100.0 * f64::EPSILON * (t1.abs() + (t1 - t0).abs());
        while (t1 - t0).abs() > tol {
            let mut t_mid =
                t1 - (t1 - t0) * self.g1[imax] / (self.g1[imax] - alpha * self.g0[imax]);

            // adjust t_mid away from the bracket boundaries
            if (t_mid - t0).abs() < 0.5 * tol {
                let fracint = (t1 - t0).abs() / tol;
                let fracsub = if fracint > 5.0 { 0.1 } else { 0.5 / fracint };
                t_mid = t0 + fracsub * (t1 - t0);
            }
            if (t1 - t_mid).abs() < 0.5 * tol {
                let fracint = (t1 - t0).abs() / tol;
                let fracsub = if fracint > 5.0 { 0.1 } else { 0.5 / fracint };
                t_mid = t1 - fracsub * (t1 - t0);
            }

            if interpolate(t_mid, &mut self.ymid).is_err() {
                break;
            }
            root_fn(t_mid, &self.ymid, &mut self.gmid);

            let (root_at_mid, _, lower_index) = root_scan(&self.g0, &self.gmid);
            let lower = lower_index.is_some();

            if let Some(lower_imax) = lower_index {
                // sign change in (t0, t_mid), replace the upper boundary
                t1 = t_mid;
                imax = lower_imax;
                std::mem::swap(&mut self.g1, &mut self.gmid);
            } else if root_at_mid {
                // no sign change in (t0, t_mid) but g = 0 at t_mid
                root_fn(t, y, &mut self.g0);
                self.t0 = t;
                debug!("event {} located at t = {}", imax, t_mid);
                return Some((imax, t_mid));
            } else {
                // sign change must be in (t_mid, t1), replace the lower boundary
                t0 = t_mid;
                std::mem::swap(&mut self.g0, &mut self.gmid);
            }

            sign_change[i % 2] = lower;
            if i >= 2 {
                alpha = if sign_change[0] != sign_change[1] {
                    1.0
                } else if sign_change[0] {
                    0.5 * alpha
                } else {
                    2.0 * alpha
                };
            }
            i += 1;
        }
        // seed g0 for the next window before reporting the root
        root_fn(t, y, &mut self.g0);
        self.t0 = t;
        debug!("event {} located at t = {}", imax, t1);
        Some((imax, t1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_root() {
        let root_fn = |_t: f64, y: &Col<f64>, g: &mut Col<f64>| {
            g[0] = y[0] - 0.4;
        };
        let interpolate = |t: f64, y: &mut Col<f64>| -> Result<(), DaesolError> {
            y[0] = t;
            Ok(())
        };
        let mut finder = RootFinder::new(1, 1);
        finder.init(&root_fn, &Col::from_fn(1, |_| 0.0), 0.0);
        let root = finder.check_root(&interpolate, &root_fn, &Col::from_fn(1, |_| 0.3), 0.3);
        assert_eq!(root, None);
    }

    #[test]
    fn test_root_located() {
        let root_fn = |_t: f64, y: &Col<f64>, g: &mut Col<f64>| {
            g[0] = y[0] - 0.4;
        };
        let interpolate = |t: f64, y: &mut Col<f64>| -> Result<(), DaesolError> {
            y[0] = t;
            Ok(())
        };
        let mut finder = RootFinder::new(1, 1);
        finder.init(&root_fn, &Col::from_fn(1, |_| 0.0), 0.0);
        let root = finder.check_root(&interpolate, &root_fn, &Col::from_fn(1, |_| 1.3), 1.3);
        let (index, t_root) = root.expect("expected a root");
        assert_eq!(index, 0);
        assert!((t_root - 0.4).abs() < 1e-10);
    }

    #[test]
    fn test_earliest_of_two_roots_governs() {
        // two linear event functions crossing at t = 0.2 and t = 0.7
        let root_fn = |t: f64, _y: &Col<f64>, g: &mut Col<f64>| {
            g[0] = t - 0.7;
            g[1] = t - 0.2;
        };
        let interpolate = |t: f64, y: &mut Col<f64>| -> Result<(), DaesolError> {
            y[0] = t;
            Ok(())
        };
        let mut finder = RootFinder::new(2, 1);
        finder.init(&root_fn, &Col::from_fn(1, |_| 0.0), 0.0);
        let root = finder.check_root(&interpolate, &root_fn, &Col::from_fn(1, |_| 1.0), 1.0);
        let (index, t_root) = root.expect("expected a root");
        assert_eq!(index, 1);
        assert!((t_root - 0.2).abs() < 1e-9);
    }
}
