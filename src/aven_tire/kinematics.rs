// ==============================================================================
// kinematics.rs — WHEEL BASIS + SLIP DECOMPOSITION (WORLD SPACE)
// ------------------------------------------------------------------------------
// This module converts chassis orientation + steering angle into a per-wheel
// orthonormal basis on the ground plane:
// - forward: wheel rolling direction (world)
// - right:   lateral direction (world)
//
// wheel_basis(...):
// - Rotates the chassis forward towards chassis right by the steer angle
// - Projects both onto the contact plane (ground normal) and normalizes
//
// slip_components(point_vel, forward, right):
// - v_long = dot(v, forward)
// - v_lat  = dot(v, right)
//
// forward_slip / lateral_slip:
// - dimensionless ratios in [-1, 1], guarded against near-zero speeds
// ==============================================================================

use crate::aven_tire::types::{Vec3, v_add, v_cross, v_dot, v_norm, v_reject, v_scale, v_sub};

/// Speed floor used in slip denominators (m/s).
pub const SLIP_SPEED_FLOOR: f32 = 0.5;

/// World-space velocity of an arbitrary point rigidly attached to the body:
/// v(p) = v_com + ω × (p - com)
#[inline]
pub fn point_velocity(linvel: Vec3, angvel: Vec3, com: Vec3, p: Vec3) -> Vec3 {
    v_add(linvel, v_cross(angvel, v_sub(p, com)))
}

/// Returns (wheel_forward, wheel_right) in world space.
/// Positive `steer_angle` turns the wheel towards chassis right.
#[inline]
pub fn wheel_basis(
    chassis_forward: Vec3,
    chassis_right: Vec3,
    ground_normal: Vec3,
    steer_angle: f32,
) -> (Vec3, Vec3) {
    let (s, c) = steer_angle.sin_cos();

    let fwd = v_add(v_scale(chassis_forward, c), v_scale(chassis_right, s));
    let right = v_sub(v_scale(chassis_right, c), v_scale(chassis_forward, s));

    // project onto contact plane
    let fwd_p = v_norm(v_reject(fwd, ground_normal));
    let right_p = v_norm(v_reject(right, ground_normal));

    // degenerate (wall contact) → keep the unprojected basis
    let fwd_out = if v_dot(fwd_p, fwd_p) > 0.5 { fwd_p } else { v_norm(fwd) };
    let right_out = if v_dot(right_p, right_p) > 0.5 { right_p } else { v_norm(right) };

    (fwd_out, right_out)
}

/// Compute (v_long, v_lat) given point velocity and wheel basis.
#[inline]
pub fn slip_components(point_vel: Vec3, wheel_forward: Vec3, wheel_right: Vec3) -> (f32, f32) {
    (v_dot(point_vel, wheel_forward), v_dot(point_vel, wheel_right))
}

/// Longitudinal slip ratio: (ω·r − v) / max(|ω·r|, |v|, floor).
/// Positive = wheel surface faster than ground (traction), negative = braking.
#[inline]
pub fn forward_slip(surface_speed: f32, v_long: f32) -> f32 {
    let denom = surface_speed.abs().max(v_long.abs()).max(SLIP_SPEED_FLOOR);
    let s = (surface_speed - v_long) / denom;
    if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Lateral slip ratio: v_lat / max(|v_long|, |v_lat|, floor).
#[inline]
pub fn lateral_slip(v_long: f32, v_lat: f32) -> f32 {
    let denom = v_long.abs().max(v_lat.abs()).max(SLIP_SPEED_FLOOR);
    let s = v_lat / denom;
    if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Signed slip angle (radians) of the chassis velocity against its heading,
/// measured around `up`. Zero below 0.5 m/s.
pub fn body_slip_angle(velocity: Vec3, forward: Vec3, up: Vec3) -> f32 {
    let planar = v_reject(velocity, up);
    if v_dot(planar, planar) < SLIP_SPEED_FLOOR * SLIP_SPEED_FLOOR {
        return 0.0;
    }
    let dir = v_norm(planar);
    let s = v_dot(v_cross(forward, dir), up).clamp(-1.0, 1.0);
    -s.asin()
}
