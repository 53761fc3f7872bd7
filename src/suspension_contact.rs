// ==============================================================================
// suspension_contact.rs — RAYCAST SUSPENSION → GROUND SAMPLE
// ------------------------------------------------------------------------------
// Per-wheel raycast from the chassis mount straight down (chassis frame):
//
//   origin      = body × (mount + up × (radius + 0.02))
//   max_dist    = rest_length + max_length + radius
//   compression = clamp(rest_length − (toi − radius), 0, max_length)
//   load        = spring + damper (deadzone, one-way damper, damper ≤ 0.6 spring)
//
// The result is a GroundSample the WheelContact consumes plus the suspension
// impulse along the hit normal. The tire forces are NOT computed here.
// ==============================================================================

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aven_tire::types::{GroundSample, Vec3};
use crate::host::GRAVITY;
use crate::physics::{to_point, to_vec3};

const MOUNT_CLEARANCE: f32 = 0.02; // m above the wheel top
const DAMPER_DEADZONE: f32 = 0.05; // m/s
const REBOUND_SCALE: f32 = 0.4;
const DAMPER_LIMIT: f32 = 0.6; // fraction of spring force

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub rest_length: f32, // m
    pub max_length: f32,  // m of travel
    pub stiffness: f32,   // N/m
    pub damping: f32,     // N*s/m
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self::from_sag(1350.0, 4, 0.05, 0.9)
    }
}

impl SuspensionConfig {
    /// Spring rate from the static sag of one corner, damping from a ratio:
    /// k = m·g / sag, c = 2ζ√(k·m).
    pub fn from_sag(vehicle_mass: f32, wheels: usize, sag: f32, zeta: f32) -> Self {
        let m = vehicle_mass / wheels.max(1) as f32;
        let k = m * GRAVITY / sag.max(1e-3);
        let c = 2.0 * zeta * (k * m).sqrt();
        Self { rest_length: 0.35, max_length: 0.25, stiffness: k, damping: c }
    }
}

pub(crate) fn compute_suspension_force(compression: f32, suspension_vel: f32, k: f32, c: f32) -> f32 {
    // Deadzone
    let v = if suspension_vel.abs() < DAMPER_DEADZONE { 0.0 } else { suspension_vel };

    // One-way damper (kills rebound)
    let v = if v > 0.0 { v * REBOUND_SCALE } else { v };

    let spring = k * compression;
    let damper = (-c * v).clamp(-spring * DAMPER_LIMIT, spring * DAMPER_LIMIT);

    (spring + damper).max(0.0)
}

#[derive(Clone, Copy, Debug)]
pub struct SuspensionHit {
    pub sample: GroundSample,
    pub compression: f32, // m
    pub impulse: Vec3,    // N*s along the hit normal, at sample.point
}

/// Everything the raycast needs from the world.
pub struct SuspensionQuery<'a> {
    pub query: &'a QueryPipeline,
    pub bodies: &'a RigidBodySet,
    pub colliders: &'a ColliderSet,
}

/// Cast one wheel. `None` means the wheel is airborne.
pub fn cast_suspension(
    world: &SuspensionQuery<'_>,
    handle: RigidBodyHandle,
    mount: Vec3,
    radius: f32,
    cfg: &SuspensionConfig,
    ground_index: impl Fn(ColliderHandle) -> usize,
    dt: f32,
) -> Option<SuspensionHit> {
    let body = world.bodies.get(handle)?;
    let pos = body.position();
    let up = pos.rotation * vector![0.0, 1.0, 0.0];

    let origin = pos * (to_point(mount) + vector![0.0, radius + MOUNT_CLEARANCE, 0.0]);
    let dir = -up;
    let ray = Ray::new(origin, dir);
    let max_dist = cfg.rest_length + cfg.max_length + radius + MOUNT_CLEARANCE;

    let filter = QueryFilter::default().exclude_rigid_body(handle);
    let (collider, hit) =
        world.query.cast_ray_and_get_normal(world.bodies, world.colliders, &ray, max_dist, true, filter)?;

    let toi = hit.time_of_impact - MOUNT_CLEARANCE;
    if toi <= radius {
        return None;
    }

    let compression = (cfg.rest_length - (toi - radius)).clamp(0.0, cfg.max_length);
    if compression <= 0.0 {
        return None;
    }

    let hit_point = ray.point_at(hit.time_of_impact);
    let normal = if hit.normal.norm_squared() > 0.5 { hit.normal.normalize() } else { up };

    let r = hit_point.coords - body.center_of_mass().coords;
    let point_vel = body.linvel() + body.angvel().cross(&r);
    let suspension_vel = point_vel.dot(&normal);

    let load = compute_suspension_force(compression, suspension_vel, cfg.stiffness, cfg.damping);
    if !load.is_finite() {
        return None;
    }

    let sample = GroundSample {
        grounded: true,
        point: to_vec3(&hit_point.coords),
        normal: to_vec3(&normal),
        load,
        travel: (compression / cfg.max_length.max(1e-3)).clamp(0.0, 1.0),
        ground_index: ground_index(collider),
    };

    Some(SuspensionHit {
        sample,
        compression,
        impulse: to_vec3(&(normal * (load * dt))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sag_gives_static_balance() {
        let cfg = SuspensionConfig::from_sag(1200.0, 4, 0.05, 0.9);
        let corner = 1200.0 / 4.0 * GRAVITY;
        assert_relative_eq!(cfg.stiffness * 0.05, corner, max_relative = 1e-5);
        assert!(cfg.damping > 0.0);
    }

    #[test]
    fn damper_never_exceeds_spring_share() {
        let f = compute_suspension_force(0.1, -10.0, 50_000.0, 8_000.0);
        assert_relative_eq!(f, 5_000.0 * 1.6);
        let f = compute_suspension_force(0.1, 10.0, 50_000.0, 8_000.0);
        assert_relative_eq!(f, 5_000.0 * 0.4);
    }

    #[test]
    fn small_velocities_are_ignored() {
        assert_eq!(compute_suspension_force(0.1, 0.01, 1000.0, 500.0), 100.0);
        assert_eq!(compute_suspension_force(0.0, 1.0, 1000.0, 500.0), 0.0);
    }
}
