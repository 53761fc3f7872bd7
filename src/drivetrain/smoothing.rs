// ==============================================================================
// smoothing.rs — FRAME-RATE INDEPENDENT FILTERS
// ------------------------------------------------------------------------------
// exp_approach(x, target, rate, dt):
//     x + (target - x) * (1 - e^(-rate * dt))
//
// SmoothDamp (critically damped spring, Game Programming Gems 4 ch. 1.10):
// - smooth_time is roughly the time to reach the target
// - the result never passes the target (overshoot guard), so a value
//   filtered between two in-range endpoints stays in range
// ==============================================================================

/// Exponential approach towards `target` with rate `rate` (1/s).
#[inline]
pub fn exp_approach(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
    if dt <= 0.0 || rate <= 0.0 {
        return current;
    }
    current + (target - current) * (1.0 - (-rate * dt).exp())
}

/// Critically damped follower. Owns its velocity term.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SmoothDamp {
    velocity: f32,
}

impl SmoothDamp {
    pub fn new() -> Self {
        Self { velocity: 0.0 }
    }

    pub fn reset(&mut self) {
        self.velocity = 0.0;
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn step(&mut self, current: f32, target: f32, smooth_time: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return current;
        }
        if !current.is_finite() || !target.is_finite() {
            self.velocity = 0.0;
            return if target.is_finite() { target } else { 0.0 };
        }

        let smooth_time = smooth_time.max(1e-4);
        let omega = 2.0 / smooth_time;
        let x = omega * dt;
        let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

        let change = current - target;
        let temp = (self.velocity + omega * change) * dt;
        self.velocity = (self.velocity - omega * temp) * exp;
        let mut output = target + (change + temp) * exp;

        // never pass the target
        if (target - current > 0.0) == (output > target) {
            output = target;
            self.velocity = 0.0;
        }

        output
    }
}
