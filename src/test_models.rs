//! Shared problem fixtures for the unit and solver tests.

use crate::matrix::CscPattern;
use crate::op::compiled::CompiledSystem;
use crate::op::interpreted::ClosureSystem;

/// Scalar decay in residual form, `F = y' + p y`, with solution
/// `y(t) = y0 * exp(-p t)`. With `nparams == 1` the sensitivity with respect
/// to `p` is also wired up (`dF/dp = y`).
pub fn decay_system(p: f64, nparams: usize) -> ClosureSystem {
    let pattern = CscPattern::new(1, 1, 1, vec![0], vec![0, 1]).unwrap();
    let mut system = ClosureSystem::new(
        1,
        Box::new(move |_t, y, yp, out| {
            out[0] = yp[0] + p * y[0];
        }),
    )
    .with_jacobian(
        pattern,
        Box::new(move |_t, _y, _yp, cj, values| {
            values[0] = p + cj;
        }),
    )
    .with_mass_action(Box::new(|v, out| {
        out[0] = v[0];
    }));
    if nparams > 0 {
        assert_eq!(nparams, 1);
        system = system.with_sens(
            1,
            Box::new(move |_t, y, _yp, _index, s, sp, out| {
                out[0] = sp[0] + p * s[0] + y[0];
            }),
        );
    }
    system
}

/// Scalar decay with an event function `y - threshold`.
pub fn decay_with_root_system(p: f64, threshold: f64) -> ClosureSystem {
    decay_system(p, 0).with_events(
        1,
        Box::new(move |_t, y, out| {
            out[0] = y[0] - threshold;
        }),
    )
}

/// The index-1 DAE `y1' = y2, 0 = y1 - y2`, with solution
/// `y1(t) = y2(t) = y1(0) * exp(t)`.
pub fn decay_with_algebraic_system() -> ClosureSystem {
    // J = | cj  -1 |
    //     | 1   -1 |
    let pattern = CscPattern::new(2, 2, 4, vec![0, 1, 0, 1], vec![0, 2, 4]).unwrap();
    ClosureSystem::new(
        2,
        Box::new(|_t, y, yp, out| {
            out[0] = yp[0] - y[1];
            out[1] = y[0] - y[1];
        }),
    )
    .with_jacobian(
        pattern,
        Box::new(|_t, _y, _yp, cj, values| {
            values[0] = cj;
            values[1] = 1.0;
            values[2] = -1.0;
            values[3] = -1.0;
        }),
    )
    .with_mass_action(Box::new(|v, out| {
        out[0] = v[0];
        out[1] = 0.0;
    }))
    .with_differential_mask(vec![true, false])
}

/// The Robertson chemical kinetics problem in its DAE form, with the third
/// equation replaced by the conservation constraint.
pub fn robertson_system() -> ClosureSystem {
    let pattern = CscPattern::new(
        3,
        3,
        9,
        vec![0, 1, 2, 0, 1, 2, 0, 1, 2],
        vec![0, 3, 6, 9],
    )
    .unwrap();
    ClosureSystem::new(
        3,
        Box::new(|_t, y, yp, out| {
            out[0] = yp[0] + 0.04 * y[0] - 1.0e4 * y[1] * y[2];
            out[1] = yp[1] - 0.04 * y[0] + 1.0e4 * y[1] * y[2] + 3.0e7 * y[1] * y[1];
            out[2] = y[0] + y[1] + y[2] - 1.0;
        }),
    )
    .with_jacobian(
        pattern,
        Box::new(|_t, y, _yp, cj, values| {
            values[0] = 0.04 + cj;
            values[1] = -0.04;
            values[2] = 1.0;
            values[3] = -1.0e4 * y[2];
            values[4] = 1.0e4 * y[2] + 6.0e7 * y[1] + cj;
            values[5] = 1.0;
            values[6] = -1.0e4 * y[1];
            values[7] = 1.0e4 * y[1];
            values[8] = 1.0;
        }),
    )
    .with_mass_action(Box::new(|v, out| {
        out[0] = v[0];
        out[1] = v[1];
        out[2] = 0.0;
    }))
    .with_differential_mask(vec![true, true, false])
}

/// The decay problem expressed through the compiled-provider surface, with
/// one sensitivity parameter and an event at `y = threshold`.
pub fn compiled_decay_system(p: f64, threshold: f64) -> CompiledSystem {
    let pattern = CscPattern::new(1, 1, 1, vec![0], vec![0, 1]).unwrap();
    CompiledSystem::new(
        vec![true],
        Box::new(move |_t, y, yp, out| {
            out[0] = yp[0] + p * y[0];
        }),
        pattern,
        Box::new(move |_t, _y, _yp, cj, values| {
            values[0] = p + cj;
        }),
        Box::new(move |_t, _y, v, out| {
            out[0] = p * v[0];
        }),
        Box::new(|_t, y, _yp, _index, out| {
            out[0] = y[0];
        }),
        Box::new(|v, out| {
            out[0] = v[0];
        }),
        1,
    )
    .with_events(
        1,
        Box::new(move |_t, y, out| {
            out[0] = y[0] - threshold;
        }),
    )
}
