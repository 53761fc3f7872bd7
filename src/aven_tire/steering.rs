// ==============================================================================
// steering.rs — STEERING RACK (RATE LIMITED) + ACKERMANN SPLIT
// ==============================================================================
// Responsibilities:
// - Turn a normalized steer input (-1..1) into a target rack angle
// - Move the rack towards the target at a bounded angular speed
// - Split the rack angle into left/right wheel angles (Ackermann blend)
// ------------------------------------------------------------------------------
// Sign convention: + angle = wheels turned towards chassis right. This matches
// kinematics::wheel_basis(), which rotates forward towards right.
//
// ackermann_angles(base, wheelbase, track):
// - Bicycle-model turning radius r = wheelbase / tan(|base|)
// - inner wheel follows r - track/2, outer wheel r + track/2
// - blended with parallel steer by `ackermann` (0 = parallel, 1 = full)
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Steering configuration (per steered axle)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub max_steer_angle: f32, // radians
    pub steer_speed: f32,     // rad/s rack speed limit
    pub ackermann: f32,       // 0 = parallel, 1 = full Ackermann
    pub wheelbase: f32,       // meters
    pub track_width: f32,     // meters
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_steer_angle: 0.6,
            steer_speed: 2.5,
            ackermann: 0.6,
            wheelbase: 2.57,
            track_width: 1.52,
        }
    }
}

/// Advance the rack angle towards `steer_input * max_steer_angle`.
pub fn update_steering_rack(config: &SteeringConfig, steer_input: f32, steer_angle: f32, dt: f32) -> f32 {
    let max_angle = config.max_steer_angle.abs();
    let target = steer_input.clamp(-1.0, 1.0) * max_angle;

    let max_step = config.steer_speed.max(0.0) * dt.max(0.0);
    let delta = (target - steer_angle).clamp(-max_step, max_step);

    (steer_angle + delta).clamp(-max_angle, max_angle)
}

/// Compute Ackermann (left, right) wheel angles for a rack angle.
pub fn ackermann_angles(base: f32, wheelbase: f32, track: f32) -> (f32, f32) {
    let eps = 1e-4;
    if base.abs() < eps || wheelbase <= eps {
        return (base, base);
    }

    let sign = base.signum();
    let a = base.abs().min(1.5);

    // Bicycle-model turning radius
    let r = wheelbase / a.tan();

    let r_in = (r - track * 0.5).max(0.01);
    let r_out = (r + track * 0.5).max(0.01);

    let inner = (wheelbase / r_in).atan() * sign;
    let outer = (wheelbase / r_out).atan() * sign;

    if sign > 0.0 {
        (outer, inner) // right turn: right wheel is inner
    } else {
        (inner, outer) // left turn
    }
}

/// Per-wheel angles blended between parallel and full Ackermann.
pub fn wheel_angles(config: &SteeringConfig, steer_angle: f32) -> (f32, f32) {
    let (ack_l, ack_r) = ackermann_angles(steer_angle, config.wheelbase, config.track_width);
    let blend = config.ackermann.clamp(0.0, 1.0);

    let left = (1.0 - blend) * steer_angle + blend * ack_l;
    let right = (1.0 - blend) * steer_angle + blend * ack_r;
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rack_is_rate_limited() {
        let cfg = SteeringConfig::default();
        let a = update_steering_rack(&cfg, 1.0, 0.0, 0.02);
        assert_abs_diff_eq!(a, cfg.steer_speed * 0.02, epsilon = 1e-6);

        let mut angle = 0.0;
        for _ in 0..200 {
            angle = update_steering_rack(&cfg, 1.0, angle, 0.02);
        }
        assert_abs_diff_eq!(angle, cfg.max_steer_angle, epsilon = 1e-6);
    }

    #[test]
    fn rack_never_exceeds_max_angle() {
        let cfg = SteeringConfig::default();
        let a = update_steering_rack(&cfg, 5.0, 2.0, 0.02);
        assert!(a <= cfg.max_steer_angle);
    }

    #[test]
    fn inner_wheel_turns_more() {
        let cfg = SteeringConfig { ackermann: 1.0, ..Default::default() };
        let (l, r) = wheel_angles(&cfg, 0.3);
        assert!(r > l && l > 0.0);
        let (l, r) = wheel_angles(&cfg, -0.3);
        assert!(l < r && r < 0.0);
    }

    #[test]
    fn parallel_steer_without_ackermann() {
        let cfg = SteeringConfig { ackermann: 0.0, ..Default::default() };
        assert_eq!(wheel_angles(&cfg, 0.2), (0.2, 0.2));
        assert_eq!(wheel_angles(&cfg, 0.0), (0.0, 0.0));
    }
}
