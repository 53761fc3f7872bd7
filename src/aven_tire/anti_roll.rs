// ==============================================================================
// anti_roll.rs — ANTI-ROLL BAR (ARB) FORCE PAIR (IMPULSE DOMAIN)
// ------------------------------------------------------------------------------
// Anti-roll bars do NOT create net vertical force; they push the more
// compressed side up and the less compressed side down by the same amount.
//
// anti_roll_impulses(left, right, stiffness, dt):
// - Requires both samples grounded (otherwise None, bar is unloaded)
// - force = stiffness * (travel_l - travel_r)     travel: 0 extended .. 1 compressed
// - impulse +force*n*dt at the left contact, -force*n*dt at the right contact
// ==============================================================================

use crate::aven_tire::types::{GroundSample, Vec3, v_scale};

/// One side of the bar: world impulse and where to apply it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArbImpulse {
    pub impulse: Vec3,
    pub at_point: Vec3,
}

/// Signed bar force (N) from the travel difference.
pub fn anti_roll_force(travel_left: f32, travel_right: f32, stiffness: f32) -> f32 {
    let delta = travel_left - travel_right;
    if delta.abs() < 1e-4 || !delta.is_finite() {
        return 0.0;
    }
    stiffness * delta
}

pub fn anti_roll_impulses(
    left: &GroundSample,
    right: &GroundSample,
    stiffness: f32,
    dt: f32,
) -> Option<(f32, [ArbImpulse; 2])> {
    if !left.grounded || !right.grounded {
        return None;
    }

    let force = anti_roll_force(left.travel, right.travel, stiffness);
    if force == 0.0 {
        return None;
    }

    Some((
        force,
        [
            ArbImpulse { impulse: v_scale(left.normal, force * dt), at_point: left.point },
            ArbImpulse { impulse: v_scale(right.normal, -force * dt), at_point: right.point },
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(travel: f32, x: f32) -> GroundSample {
        GroundSample { travel, ..GroundSample::flat([x, 0.0, 0.0], 3000.0, 0) }
    }

    #[test]
    fn impulses_are_equal_and_opposite() {
        let (force, pair) = anti_roll_impulses(&sample(0.7, 0.8), &sample(0.3, -0.8), 10_000.0, 0.02)
            .expect("both grounded");
        assert_abs_diff_eq!(force, 4000.0, epsilon = 1e-2);
        assert_abs_diff_eq!(pair[0].impulse[1], 80.0, epsilon = 1e-3);
        assert_abs_diff_eq!(pair[0].impulse[1] + pair[1].impulse[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn skipped_unless_both_grounded() {
        let left = sample(0.7, 0.8);
        let right = GroundSample::airborne();
        assert!(anti_roll_impulses(&left, &right, 10_000.0, 0.02).is_none());
    }

    #[test]
    fn level_axle_produces_nothing() {
        assert!(anti_roll_impulses(&sample(0.5, 0.8), &sample(0.5, -0.8), 10_000.0, 0.02).is_none());
    }
}
