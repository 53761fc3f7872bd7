// ==============================================================================
// host.rs — RIGID-BODY SEAM (EXTERNAL 6-DOF SOLVER)
// ==============================================================================
// The drivetrain never integrates the chassis. It reads kinematics from and
// hands impulses to whatever implements ChassisBody:
//
// - physics::RapierChassis   wraps a rapier3d RigidBody (drive-server)
// - FlatGroundChassis        planar (x, z, yaw) body on a flat plane, with a
//                            static m·g/n load per wheel (tests, tuning)
//
// World convention: +Y up, chassis forward = local +Z, chassis right =
// forward × up (local −X).
// ==============================================================================

use crate::aven_tire::kinematics::point_velocity;
use crate::aven_tire::types::{
    GroundSample, Vec3, v_add, v_cross, v_dot, v_is_finite, v_mag, v_rotate, v_scale, v_sub,
};

pub const GRAVITY: f32 = 9.81; // m/s^2

pub trait ChassisBody {
    fn mass(&self) -> f32;
    fn position(&self) -> Vec3;
    /// World centre of mass.
    fn center_of_mass(&self) -> Vec3 {
        self.position()
    }
    fn forward(&self) -> Vec3;
    fn right(&self) -> Vec3;
    fn up(&self) -> Vec3;
    fn linear_velocity(&self) -> Vec3;
    fn angular_velocity(&self) -> Vec3;

    fn point_velocity(&self, p: Vec3) -> Vec3 {
        point_velocity(self.linear_velocity(), self.angular_velocity(), self.center_of_mass(), p)
    }

    fn set_linear_velocity(&mut self, v: Vec3);
    fn set_angular_velocity(&mut self, w: Vec3);
    fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3);
    fn apply_torque_impulse(&mut self, impulse: Vec3);
    fn set_angular_damping(&mut self, damping: f32);

    /// Signed speed along the chassis forward axis (m/s).
    fn forward_speed(&self) -> f32 {
        v_dot(self.linear_velocity(), self.forward())
    }
}

// ============================================
// FlatGroundChassis
// ============================================

#[derive(Clone, Debug)]
pub struct FlatGroundChassis {
    mass: f32,
    yaw_inertia: f32,
    ride_height: f32,

    position: Vec3, // y fixed at ride height
    yaw: f32,       // rad about +Y
    velocity: Vec3, // y always 0
    yaw_rate: f32,  // rad/s about +Y
    angular_damping: f32,

    wheel_offsets: Vec<Vec3>, // chassis local (x left, y up, z forward)
    ground_index: Vec<usize>,
}

impl FlatGroundChassis {
    /// `wheel_offsets` are chassis-local mounts; each wheel starts on material 0.
    pub fn new(mass: f32, wheel_offsets: Vec<Vec3>) -> Self {
        let mass = if mass.is_finite() && mass > 1.0 { mass } else { 1.0 };
        let (length, width) = footprint(&wheel_offsets);
        let ground_index = vec![0; wheel_offsets.len()];
        Self {
            mass,
            // solid box about the vertical axis
            yaw_inertia: (mass * (length * length + width * width) / 12.0).max(1.0),
            ride_height: 0.5,
            position: [0.0, 0.5, 0.0],
            yaw: 0.0,
            velocity: [0.0; 3],
            yaw_rate: 0.0,
            angular_damping: 0.0,
            wheel_offsets,
            ground_index,
        }
    }

    pub fn set_ground_index(&mut self, wheel: usize, index: usize) {
        if let Some(slot) = self.ground_index.get_mut(wheel) {
            *slot = index;
        }
    }

    pub fn set_ground_index_all(&mut self, index: usize) {
        self.ground_index.iter_mut().for_each(|i| *i = index);
    }

    pub fn yaw(&self) -> f32 { self.yaw }
    pub fn yaw_rate(&self) -> f32 { self.yaw_rate }
    pub fn angular_damping(&self) -> f32 { self.angular_damping }

    pub fn speed(&self) -> f32 {
        v_mag(self.velocity)
    }

    pub fn wheel_position(&self, wheel: usize) -> Option<Vec3> {
        let off = self.wheel_offsets.get(wheel)?;
        let left = v_scale(self.right(), -1.0);
        let local = v_add(v_add(v_scale(left, off[0]), v_scale(self.up(), off[1])), v_scale(self.forward(), off[2]));
        Some(v_add(self.position, local))
    }

    /// One sample per wheel: contact straight below the mount, static load.
    pub fn ground_samples(&self) -> Vec<GroundSample> {
        let n = self.wheel_offsets.len().max(1) as f32;
        let load = self.mass * GRAVITY / n;
        (0..self.wheel_offsets.len())
            .map(|i| {
                let p = self.wheel_position(i).unwrap_or(self.position);
                GroundSample::flat([p[0], 0.0, p[2]], load, self.ground_index[i])
            })
            .collect()
    }

    /// Integrate the planar state.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        if self.angular_damping > 0.0 {
            self.yaw_rate /= 1.0 + dt * self.angular_damping;
        }
        self.position = v_add(self.position, v_scale(self.velocity, dt));
        self.position[1] = self.ride_height;
        self.yaw += self.yaw_rate * dt;
    }
}

fn footprint(offsets: &[Vec3]) -> (f32, f32) {
    let span = |axis: usize| {
        let lo = offsets.iter().map(|o| o[axis]).fold(f32::INFINITY, f32::min);
        let hi = offsets.iter().map(|o| o[axis]).fold(f32::NEG_INFINITY, f32::max);
        if hi > lo { hi - lo } else { 1.0 }
    };
    (span(2) + 1.0, span(0) + 0.3)
}

impl ChassisBody for FlatGroundChassis {
    fn mass(&self) -> f32 { self.mass }
    fn position(&self) -> Vec3 { self.position }

    fn forward(&self) -> Vec3 {
        v_rotate([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], self.yaw)
    }

    fn right(&self) -> Vec3 {
        v_cross(self.forward(), self.up())
    }

    fn up(&self) -> Vec3 { [0.0, 1.0, 0.0] }
    fn linear_velocity(&self) -> Vec3 { self.velocity }
    fn angular_velocity(&self) -> Vec3 { [0.0, self.yaw_rate, 0.0] }

    fn set_linear_velocity(&mut self, v: Vec3) {
        if v_is_finite(v) {
            self.velocity = [v[0], 0.0, v[2]];
        }
    }

    fn set_angular_velocity(&mut self, w: Vec3) {
        if w[1].is_finite() {
            self.yaw_rate = w[1];
        }
    }

    fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3) {
        if !v_is_finite(impulse) || !v_is_finite(point) {
            return;
        }
        let planar = [impulse[0], 0.0, impulse[2]];
        self.velocity = v_add(self.velocity, v_scale(planar, 1.0 / self.mass));

        let lever = v_sub(point, self.position);
        let torque = v_cross([lever[0], 0.0, lever[2]], planar);
        self.yaw_rate += torque[1] / self.yaw_inertia;
    }

    fn apply_torque_impulse(&mut self, impulse: Vec3) {
        if impulse[1].is_finite() {
            self.yaw_rate += impulse[1] / self.yaw_inertia;
        }
    }

    fn set_angular_damping(&mut self, damping: f32) {
        if damping.is_finite() {
            self.angular_damping = damping.max(0.0);
        }
    }
}
