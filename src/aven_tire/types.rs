//! Core shared types for `aven_tire` (engine-agnostic).
// aven_tire/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Vec3 = [f32; 3];

// ----- tiny vec helpers (avoid pulling a math crate into the tire solver) -----
#[inline] pub fn v_add(a: Vec3, b: Vec3) -> Vec3 { [a[0]+b[0], a[1]+b[1], a[2]+b[2]] }
#[inline] pub fn v_sub(a: Vec3, b: Vec3) -> Vec3 { [a[0]-b[0], a[1]-b[1], a[2]-b[2]] }
#[inline] pub fn v_scale(v: Vec3, s: f32) -> Vec3 { [v[0]*s, v[1]*s, v[2]*s] }
#[inline] pub fn v_dot(a: Vec3, b: Vec3) -> f32 { a[0]*b[0] + a[1]*b[1] + a[2]*b[2] }
#[inline] pub fn v_mag(v: Vec3) -> f32 { v_dot(v, v).sqrt() }

#[inline]
pub fn v_norm(v: Vec3) -> Vec3 {
    let m = v_mag(v);
    if m > 1e-6 { v_scale(v, 1.0 / m) } else { [0.0, 0.0, 0.0] }
}

#[inline]
pub fn v_cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1]*b[2] - a[2]*b[1],
        a[2]*b[0] - a[0]*b[2],
        a[0]*b[1] - a[1]*b[0],
    ]
}

/// Remove the component of `v` along unit vector `n`.
#[inline]
pub fn v_reject(v: Vec3, n: Vec3) -> Vec3 {
    v_sub(v, v_scale(n, v_dot(v, n)))
}

/// Rodrigues rotation of `v` around unit `axis` by `angle` radians.
#[inline]
pub fn v_rotate(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let (s, c) = angle.sin_cos();
    let k = v_norm(axis);
    let kxv = v_cross(k, v);
    let kdv = v_dot(k, v);
    [
        v[0]*c + kxv[0]*s + k[0]*kdv*(1.0 - c),
        v[1]*c + kxv[1]*s + k[1]*kdv*(1.0 - c),
        v[2]*c + kxv[2]*s + k[2]*kdv*(1.0 - c),
    ]
}

#[inline]
pub fn v_is_finite(v: Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 { a + (b - a) * t }

#[inline]
pub fn inverse_lerp(a: f32, b: f32, v: f32) -> f32 {
    if (b - a).abs() < 1e-6 { 0.0 } else { ((v - a) / (b - a)).clamp(0.0, 1.0) }
}

// ============================================
// Wheel identification
// ============================================

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum WheelId { FL, FR, RL, RR }

impl WheelId {
    pub fn from_debug(s: &str) -> Self {
        match s {
            "FL" => WheelId::FL,
            "FR" => WheelId::FR,
            "RL" => WheelId::RL,
            "RR" => WheelId::RR,
            _ => WheelId::FL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// ----- contact sample (from the host's suspension pass) -----
// ============================================

/// One suspension hit, produced by whatever raycast/solver owns the chassis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundSample {
    pub grounded: bool,
    pub point: Vec3,        // world contact point
    pub normal: Vec3,       // world ground normal
    pub load: f32,          // N, suspension normal force
    pub travel: f32,        // 0 = fully extended .. 1 = fully compressed
    pub ground_index: usize,
}

impl GroundSample {
    pub fn airborne() -> Self {
        Self {
            grounded: false,
            point: [0.0, 0.0, 0.0],
            normal: [0.0, 1.0, 0.0],
            load: 0.0,
            travel: 0.0,
            ground_index: 0,
        }
    }

    pub fn flat(point: Vec3, load: f32, ground_index: usize) -> Self {
        Self {
            grounded: true,
            point,
            normal: [0.0, 1.0, 0.0],
            load,
            travel: 0.5,
            ground_index,
        }
    }
}

impl Default for GroundSample {
    fn default() -> Self { Self::airborne() }
}

/// Tire output for one tick, before it is handed to the chassis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WheelForces {
    pub longitudinal: f32,  // N along wheel forward
    pub lateral: f32,       // N along wheel right
    pub impulse: Vec3,      // world N*s
    pub at_point: Vec3,     // world application point
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rotate_quarter_turn_about_up() {
        // right-handed: +Z rotated a quarter turn about +Y lands on +X
        let r = v_rotate([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], std::f32::consts::FRAC_PI_2);
        assert_abs_diff_eq!(r[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(r[2], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(v_norm([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn inverse_lerp_degenerate_range() {
        assert_eq!(inverse_lerp(1.0, 1.0, 5.0), 0.0);
        assert_abs_diff_eq!(inverse_lerp(0.0, 10.0, 2.5), 0.25);
    }
}
