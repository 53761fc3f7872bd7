// ==============================================================================
// friction.rs — SLIP → FRICTION COEFFICIENT CURVE
// ==============================================================================
// Piecewise curve parameterised by an extremum point and an asymptote point:
//
//   mu
//    |        (extremum)
//    |       /\
//    |      /  \______________ (asymptote) ...... flat tail
//    |     /
//    |    /
//    |___/________________________________ |slip|
//    0
//
// - 0 .. extremum_slip        : linear rise from (0,0) to the extremum
// - extremum .. asymptote     : linear fall/level towards the asymptote value
// - beyond asymptote_slip     : constant asymptote value
//
// Ground stiffness is NOT baked in; the wheel multiplies it on top.
// ==============================================================================

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrictionCurve {
    pub extremum_slip: f32,
    pub extremum_value: f32,
    pub asymptote_slip: f32,
    pub asymptote_value: f32,
}

impl FrictionCurve {
    /// Typical longitudinal (forward) curve.
    pub const fn forward() -> Self {
        Self {
            extremum_slip: 0.2,
            extremum_value: 1.0,
            asymptote_slip: 0.8,
            asymptote_value: 0.75,
        }
    }

    /// Typical lateral (sideways) curve.
    pub const fn sideways() -> Self {
        Self {
            extremum_slip: 0.25,
            extremum_value: 1.0,
            asymptote_slip: 0.5,
            asymptote_value: 0.8,
        }
    }

    /// Friction coefficient for a slip ratio. Sign of `slip` is ignored.
    pub fn evaluate(&self, slip: f32) -> f32 {
        evaluate(slip, self)
    }

    /// Highest value anywhere on the curve.
    pub fn peak(&self) -> f32 {
        self.extremum_value.max(self.asymptote_value).max(0.0)
    }
}

impl Default for FrictionCurve {
    fn default() -> Self { Self::forward() }
}

/// Evaluate a friction curve. Deterministic, no side effects.
pub fn evaluate(slip: f32, curve: &FrictionCurve) -> f32 {
    if !slip.is_finite() {
        return 0.0;
    }

    let s = slip.abs();
    if s <= 0.0 {
        return 0.0;
    }

    let ext_s = curve.extremum_slip.max(0.0);
    let asym_s = curve.asymptote_slip;

    // Rising segment
    if s < ext_s {
        return curve.extremum_value * (s / ext_s);
    }

    // Degenerate tail (asymptote at or before extremum) → hold asymptote
    if asym_s <= ext_s {
        return if s == ext_s { curve.extremum_value } else { curve.asymptote_value };
    }

    // Falling / levelling segment
    if s < asym_s {
        let t = (s - ext_s) / (asym_s - ext_s);
        return curve.extremum_value + (curve.asymptote_value - curve.extremum_value) * t;
    }

    curve.asymptote_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn boundary_points() {
        let c = FrictionCurve::forward();
        assert_eq!(evaluate(0.0, &c), 0.0);
        assert_abs_diff_eq!(evaluate(c.extremum_slip, &c), c.extremum_value, epsilon = 1e-6);
        assert_abs_diff_eq!(evaluate(c.asymptote_slip, &c), c.asymptote_value, epsilon = 1e-6);
        assert_eq!(evaluate(c.asymptote_slip + 0.01, &c), c.asymptote_value);
        assert_eq!(evaluate(50.0, &c), c.asymptote_value);
    }

    #[test]
    fn rising_segment_is_linear() {
        let c = FrictionCurve::forward();
        assert_abs_diff_eq!(evaluate(0.1, &c), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn falling_segment_interpolates() {
        let c = FrictionCurve::forward();
        let mid = (c.extremum_slip + c.asymptote_slip) * 0.5;
        assert_abs_diff_eq!(evaluate(mid, &c), 0.875, epsilon = 1e-5);
    }

    #[test]
    fn sign_is_ignored() {
        let c = FrictionCurve::sideways();
        assert_eq!(evaluate(-0.3, &c), evaluate(0.3, &c));
    }

    #[test]
    fn nan_slip_is_zero() {
        assert_eq!(evaluate(f32::NAN, &FrictionCurve::forward()), 0.0);
    }

    #[test]
    fn degenerate_curve_holds_asymptote() {
        let c = FrictionCurve {
            extremum_slip: 0.0,
            extremum_value: 1.0,
            asymptote_slip: 0.0,
            asymptote_value: 0.6,
        };
        assert_eq!(evaluate(0.0, &c), 0.0);
        assert_eq!(evaluate(0.5, &c), 0.6);
    }
}
