// ==============================================================================
// wheel.rs — PER-WHEEL CONTACT STATE (SLIP, FRICTION, SPIN, TORQUE ARBITRATION)
// ==============================================================================
// One WheelContact per physical wheel. Per tick the owner:
//
//   1) set_ground_sample(..)          host suspension pass
//   2) accumulate_*_torque(..)        axle / differential / brakes (additive)
//   3) step(frame, materials, dt)     consumes and zeroes the accumulators
//
// step():
// - torque arbitration: stability cuts, motor clamped to commanded direction,
//   brake clamped non-negative
// - spin integration: motor torque, brake torque (never reverses spin),
//   ground rolling drag, tire reaction torque
// - slip from contact-patch kinematics (kinematics.rs), forces from the
//   friction curves × ground stiffness (solve.rs)
// - slip smoothing is frame-rate independent: x += (t - x) * (1 - e^(-k dt))
//
// Forces are returned as a world impulse; the caller owns the rigid body.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aven_tire::friction::FrictionCurve;
use crate::aven_tire::ground::GroundMaterials;
use crate::aven_tire::kinematics::{forward_slip, lateral_slip, slip_components, wheel_basis};
use crate::aven_tire::solve::{ContactInput, solve_contact};
use crate::aven_tire::types::{
    GroundSample, Vec3, WheelForces, WheelId, lerp, v_add, v_is_finite, v_scale,
};
use crate::stability::{cut_brake_abs, cut_traction_tcs};

pub const GROUNDED_SLIP_RATE: f32 = 25.0; // 1/s
pub const AIRBORNE_SLIP_DECAY: f32 = 5.0; // 1/s
pub const MAX_ANGULAR_VELOCITY: f32 = 400.0; // rad/s

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub radius: f32,  // m
    pub inertia: f32, // kg*m^2 about the spin axis

    pub forward_curve: FrictionCurve,
    pub sideways_curve: FrictionCurve,

    pub deflated_radius_multiplier: f32,
    pub deflated_stiffness_multiplier: f32,

    /// Sideways stiffness at full handbrake (lerped by handbrake input).
    pub handbrake_sideways_multiplier: f32,

    pub drift_mode: bool,
    pub drift_min_stiffness: f32,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            radius: 0.33,
            inertia: 1.2,
            forward_curve: FrictionCurve::forward(),
            sideways_curve: FrictionCurve::sideways(),
            deflated_radius_multiplier: 0.8,
            deflated_stiffness_multiplier: 0.5,
            handbrake_sideways_multiplier: 0.5,
            drift_mode: false,
            drift_min_stiffness: 0.5,
        }
    }
}

/// Chassis kinematics at the contact point, sampled by the vehicle before `step`.
#[derive(Clone, Copy, Debug)]
pub struct ContactFrame {
    pub point_velocity: Vec3,
    pub chassis_forward: Vec3,
    pub chassis_right: Vec3,
    pub mass_share: f32, // kg
}

#[derive(Clone, Debug)]
pub struct WheelContact {
    id: WheelId,
    config: WheelConfig,
    base_radius: f32,
    radius: f32,
    enabled: bool,
    deflated: bool,

    sample: GroundSample,
    steer_angle: f32,      // rad, + = right
    angular_velocity: f32, // rad/s

    // accumulators (write → consume → zero)
    motor_accum: f32,
    brake_accum: f32,
    handbrake_accum: f32,
    stability_brake_accum: f32, // ESP, bypasses the ABS cut

    // one-tick modifiers, consumed by step()
    drive_sign: f32,
    motor_cut: f32,
    brake_cut: f32,
    handbrake_input: f32,
    traction_multiplier: f32,

    forward_slip: f32,
    lateral_slip: f32,
    forward_stiffness: f32,
    sideways_stiffness: f32,
    skidding: bool,

    applied_motor: f32,
    applied_brake: f32,
    last_forces: WheelForces,
}

impl WheelContact {
    pub fn new(id: WheelId, config: WheelConfig) -> Self {
        let base_radius = config.radius;
        Self {
            id,
            config,
            base_radius,
            radius: base_radius,
            enabled: true,
            deflated: false,
            sample: GroundSample::airborne(),
            steer_angle: 0.0,
            angular_velocity: 0.0,
            motor_accum: 0.0,
            brake_accum: 0.0,
            handbrake_accum: 0.0,
            stability_brake_accum: 0.0,
            drive_sign: 1.0,
            motor_cut: 0.0,
            brake_cut: 0.0,
            handbrake_input: 0.0,
            traction_multiplier: 1.0,
            forward_slip: 0.0,
            lateral_slip: 0.0,
            forward_stiffness: 1.0,
            sideways_stiffness: 1.0,
            skidding: false,
            applied_motor: 0.0,
            applied_brake: 0.0,
            last_forces: WheelForces::default(),
        }
    }

    /// Back to spawn state (pooling / respawn). Config is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.id, self.config.clone());
    }

    pub fn id(&self) -> WheelId { self.id }
    pub fn config(&self) -> &WheelConfig { &self.config }

    // --------------------------------------------------
    // Contact input
    // --------------------------------------------------

    pub fn set_ground_sample(&mut self, sample: GroundSample) {
        let finite = v_is_finite(sample.point) && v_is_finite(sample.normal) && sample.load.is_finite();
        if !finite {
            warn!(wheel = %self.id, "non-finite ground sample, treating wheel as airborne");
            self.sample = GroundSample::airborne();
            return;
        }
        self.sample = sample;
    }

    pub fn ground_sample(&self) -> &GroundSample { &self.sample }

    pub fn is_grounded(&self) -> bool {
        self.enabled && self.sample.grounded
    }

    // --------------------------------------------------
    // Accumulators
    // --------------------------------------------------

    pub fn accumulate_motor_torque(&mut self, nm: f32) {
        if self.enabled && nm.is_finite() {
            self.motor_accum += nm;
        }
    }

    pub fn accumulate_brake_torque(&mut self, nm: f32) {
        if self.enabled && nm.is_finite() {
            self.brake_accum += nm;
        }
    }

    pub fn accumulate_handbrake_torque(&mut self, nm: f32) {
        if self.enabled && nm.is_finite() {
            self.handbrake_accum += nm;
        }
    }

    /// Yaw-correction brake. ABS never cuts it.
    pub fn accumulate_stability_brake_torque(&mut self, nm: f32) {
        if self.enabled && nm.is_finite() {
            self.stability_brake_accum += nm;
        }
    }

    pub fn pending_motor_torque(&self) -> f32 { self.motor_accum }

    pub fn pending_brake_torque(&self) -> f32 {
        self.brake_accum + self.handbrake_accum + self.stability_brake_accum
    }

    // --------------------------------------------------
    // Modifiers
    // --------------------------------------------------

    /// +1 forward, -1 reverse. Motor torque is clamped to this sign.
    pub fn set_drive_sign(&mut self, sign: f32) {
        self.drive_sign = if sign < 0.0 { -1.0 } else { 1.0 };
    }

    /// Fractions in [0,1] removed from motor / service brake torque next step.
    pub fn set_stability_cuts(&mut self, motor_cut: f32, brake_cut: f32) {
        self.motor_cut = motor_cut.clamp(0.0, 1.0);
        self.brake_cut = brake_cut.clamp(0.0, 1.0);
    }

    pub fn set_handbrake_input(&mut self, input: f32) {
        self.handbrake_input = input.clamp(0.0, 1.0);
    }

    pub fn set_traction_multiplier(&mut self, m: f32) {
        self.traction_multiplier = if m.is_finite() { m.max(0.0) } else { 1.0 };
    }

    pub fn set_steer_angle(&mut self, angle: f32) {
        self.steer_angle = if angle.is_finite() { angle } else { 0.0 };
    }

    pub fn steer_angle(&self) -> f32 { self.steer_angle }

    // --------------------------------------------------
    // Deflation
    // --------------------------------------------------

    /// Returns true when the state changed.
    pub fn deflate(&mut self) -> bool {
        if self.deflated {
            return false;
        }
        self.deflated = true;
        self.radius = self.base_radius * self.config.deflated_radius_multiplier.clamp(0.1, 1.0);
        debug!(wheel = %self.id, radius = self.radius, "tire deflated");
        true
    }

    /// Returns true when the state changed.
    pub fn inflate(&mut self) -> bool {
        if !self.deflated {
            return false;
        }
        self.deflated = false;
        self.radius = self.base_radius;
        debug!(wheel = %self.id, radius = self.radius, "tire inflated");
        true
    }

    pub fn is_deflated(&self) -> bool { self.deflated }
    pub fn radius(&self) -> f32 { self.radius }

    // --------------------------------------------------
    // Enable / disable (live guard, indices stay valid)
    // --------------------------------------------------

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.motor_accum = 0.0;
        self.brake_accum = 0.0;
        self.handbrake_accum = 0.0;
        self.stability_brake_accum = 0.0;
        if !enabled {
            self.sample = GroundSample::airborne();
            self.skidding = false;
            self.applied_motor = 0.0;
            self.applied_brake = 0.0;
            self.last_forces = WheelForces::default();
        }
        debug!(wheel = %self.id, enabled, "wheel enable changed");
    }

    pub fn is_enabled(&self) -> bool { self.enabled }

    // --------------------------------------------------
    // Observables
    // --------------------------------------------------

    pub fn angular_velocity(&self) -> f32 { self.angular_velocity }

    pub fn rpm(&self) -> f32 {
        self.angular_velocity * 60.0 / std::f32::consts::TAU
    }

    pub fn forward_slip(&self) -> f32 { self.forward_slip }
    pub fn lateral_slip(&self) -> f32 { self.lateral_slip }

    pub fn total_slip(&self) -> f32 {
        (self.forward_slip.abs() + self.lateral_slip.abs()) * 0.5
    }

    pub fn is_skidding(&self) -> bool { self.skidding }
    pub fn forward_stiffness(&self) -> f32 { self.forward_stiffness }
    pub fn sideways_stiffness(&self) -> f32 { self.sideways_stiffness }
    pub fn applied_motor_torque(&self) -> f32 { self.applied_motor }
    pub fn applied_brake_torque(&self) -> f32 { self.applied_brake }
    pub fn last_forces(&self) -> &WheelForces { &self.last_forces }

    // --------------------------------------------------
    // Tick
    // --------------------------------------------------

    pub fn step(&mut self, frame: &ContactFrame, materials: &GroundMaterials, dt: f32) -> WheelForces {
        let motor_in = std::mem::take(&mut self.motor_accum);
        let brake_in = std::mem::take(&mut self.brake_accum);
        let handbrake_in = std::mem::take(&mut self.handbrake_accum);
        let stability_in = std::mem::take(&mut self.stability_brake_accum);
        let motor_cut = std::mem::take(&mut self.motor_cut);
        let brake_cut = std::mem::take(&mut self.brake_cut);
        let traction = std::mem::replace(&mut self.traction_multiplier, 1.0);

        if !self.enabled || dt <= 0.0 {
            self.applied_motor = 0.0;
            self.applied_brake = 0.0;
            self.skidding = false;
            self.last_forces = WheelForces::default();
            return self.last_forces;
        }

        // --------------------------------------------------
        // Torque arbitration
        // --------------------------------------------------
        let motor = cut_traction_tcs(motor_in, motor_cut);
        let motor = if self.drive_sign >= 0.0 { motor.max(0.0) } else { motor.min(0.0) };
        let brake = cut_brake_abs(brake_in, brake_cut) + stability_in.max(0.0) + handbrake_in.max(0.0);
        self.applied_motor = motor;
        self.applied_brake = brake;

        let cfg = &self.config;
        let inertia = cfg.inertia.max(0.05);
        let material = materials.get(self.sample.ground_index);

        // --------------------------------------------------
        // Stiffness (recomputed from the current material every tick)
        // --------------------------------------------------
        let deflate_mult = if self.deflated { cfg.deflated_stiffness_multiplier } else { 1.0 };
        let fwd_stiffness = material.forward_stiffness * deflate_mult;
        let mut side_stiffness = material.sideways_stiffness
            * deflate_mult
            * lerp(1.0, cfg.handbrake_sideways_multiplier, self.handbrake_input)
            * traction;
        if cfg.drift_mode {
            side_stiffness *= lerp(1.0, cfg.drift_min_stiffness, self.forward_slip.abs().min(1.0));
        }
        self.forward_stiffness = fwd_stiffness;
        self.sideways_stiffness = side_stiffness.max(0.0);

        // --------------------------------------------------
        // Spin: motor, then brake (stops at zero, never reverses)
        // --------------------------------------------------
        let mut omega = self.angular_velocity + motor / inertia * dt;
        let brake_dw = brake / inertia * dt;
        omega = if omega.abs() <= brake_dw { 0.0 } else { omega - omega.signum() * brake_dw };

        let grounded = self.sample.grounded && self.sample.load > 0.0;
        let mut forces = WheelForces::default();

        if grounded {
            if material.damp > 0.0 {
                omega *= (-material.damp / inertia * dt).exp();
            }

            let (fwd, right) = wheel_basis(
                frame.chassis_forward,
                frame.chassis_right,
                self.sample.normal,
                self.steer_angle,
            );
            let (v_long, v_lat) = slip_components(frame.point_velocity, fwd, right);

            let surface_speed = omega * self.radius;
            let raw_forward = forward_slip(surface_speed, v_long);
            let raw_lateral = lateral_slip(v_long, v_lat);

            let out = solve_contact(
                &ContactInput {
                    forward_slip: raw_forward,
                    lateral_slip: raw_lateral,
                    slip_speed: surface_speed - v_long,
                    v_lat,
                    load: self.sample.load,
                    forward_stiffness: self.forward_stiffness,
                    sideways_stiffness: self.sideways_stiffness,
                    radius: self.radius,
                    inertia,
                    mass_share: frame.mass_share,
                    dt,
                },
                &cfg.forward_curve,
                &cfg.sideways_curve,
            );

            // tire reaction on the wheel
            omega -= out.fx * self.radius / inertia * dt;

            let alpha = 1.0 - (-GROUNDED_SLIP_RATE * dt).exp();
            self.forward_slip += (raw_forward - self.forward_slip) * alpha;
            self.lateral_slip += (raw_lateral - self.lateral_slip) * alpha;

            let force = v_add(v_scale(fwd, out.fx), v_scale(right, out.fy));
            forces = WheelForces {
                longitudinal: out.fx,
                lateral: out.fy,
                impulse: v_scale(force, dt),
                at_point: self.sample.point,
            };
        } else {
            let decay = (-AIRBORNE_SLIP_DECAY * dt).exp();
            self.forward_slip *= decay;
            self.lateral_slip *= decay;
        }

        if !omega.is_finite() {
            warn!(wheel = %self.id, "non-finite wheel spin, resetting");
            omega = 0.0;
        }
        self.angular_velocity = omega.clamp(-MAX_ANGULAR_VELOCITY, MAX_ANGULAR_VELOCITY);
        self.skidding = grounded && self.total_slip() > material.slip_threshold;
        self.last_forces = forces;
        forces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f32 = 0.02;

    fn frame(v: Vec3) -> ContactFrame {
        ContactFrame {
            point_velocity: v,
            chassis_forward: [0.0, 0.0, 1.0],
            chassis_right: [-1.0, 0.0, 0.0],
            mass_share: 337.0,
        }
    }

    fn grounded_wheel() -> WheelContact {
        let mut w = WheelContact::new(WheelId::RL, WheelConfig::default());
        w.set_ground_sample(GroundSample::flat([0.0; 3], 3300.0, 0));
        w
    }

    #[test]
    fn accumulators_are_consumed() {
        let mut w = grounded_wheel();
        w.accumulate_motor_torque(200.0);
        w.accumulate_motor_torque(100.0);
        assert_eq!(w.pending_motor_torque(), 300.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.pending_motor_torque(), 0.0);
        assert_eq!(w.applied_motor_torque(), 300.0);
    }

    #[test]
    fn motor_torque_spins_wheel_and_pushes_forward() {
        let mut w = grounded_wheel();
        w.accumulate_motor_torque(1500.0);
        let f = w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert!(w.angular_velocity() > 0.0);
        assert!(f.longitudinal > 0.0);
        assert!(f.impulse[2] > 0.0);
        assert!(w.forward_slip() > 0.0);
    }

    #[test]
    fn motor_clamped_to_drive_direction() {
        let mut w = grounded_wheel();
        w.set_drive_sign(1.0);
        w.accumulate_motor_torque(-400.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.applied_motor_torque(), 0.0);

        w.set_drive_sign(-1.0);
        w.accumulate_motor_torque(-400.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.applied_motor_torque(), -400.0);
    }

    #[test]
    fn brake_never_reverses_spin() {
        let mut w = grounded_wheel();
        w.accumulate_motor_torque(600.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        w.set_ground_sample(GroundSample::airborne());
        w.accumulate_brake_torque(100_000.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.angular_velocity(), 0.0);
    }

    #[test]
    fn stability_cuts_reduce_and_reset() {
        let mut w = grounded_wheel();
        w.set_stability_cuts(0.5, 1.0);
        w.accumulate_motor_torque(400.0);
        w.accumulate_brake_torque(300.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_abs_diff_eq!(w.applied_motor_torque(), 200.0);
        assert_eq!(w.applied_brake_torque(), 0.0);

        w.accumulate_brake_torque(300.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.applied_brake_torque(), 300.0);
    }

    #[test]
    fn abs_release_keeps_the_stability_brake() {
        let mut w = grounded_wheel();
        w.set_stability_cuts(0.0, 1.0);
        w.accumulate_brake_torque(3000.0);
        w.accumulate_stability_brake_torque(2500.0);
        assert_eq!(w.pending_brake_torque(), 5500.0);
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(w.applied_brake_torque(), 2500.0);
        assert_eq!(w.pending_brake_torque(), 0.0);
    }

    #[test]
    fn airborne_slip_decays_smoothly() {
        let mut w = grounded_wheel();
        w.accumulate_motor_torque(1500.0);
        for _ in 0..10 {
            w.accumulate_motor_torque(1500.0);
            w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        }
        let before = w.forward_slip();
        assert!(before > 0.5);

        w.set_ground_sample(GroundSample::airborne());
        w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        let after = w.forward_slip();
        assert!(after < before && after > 0.0);
        assert_abs_diff_eq!(after, before * (-AIRBORNE_SLIP_DECAY * DT).exp(), epsilon = 1e-5);
    }

    #[test]
    fn deflate_is_idempotent_and_inflate_restores_radius() {
        let mut w = grounded_wheel();
        let original = w.radius();
        assert!(w.deflate());
        let once = w.radius();
        assert!(!w.deflate());
        assert_eq!(w.radius(), once);
        assert!(w.is_deflated());
        assert!(w.inflate());
        assert_eq!(w.radius(), original);
        assert!(!w.inflate());
    }

    #[test]
    fn deflated_tire_has_reduced_stiffness() {
        let mut w = grounded_wheel();
        w.deflate();
        w.step(&frame([0.0, 0.0, 5.0]), &GroundMaterials::standard(), DT);
        assert_abs_diff_eq!(w.forward_stiffness(), 0.5);
        assert_abs_diff_eq!(w.sideways_stiffness(), 0.5);
    }

    #[test]
    fn stiffness_follows_material_each_tick() {
        let mut w = grounded_wheel();
        let table = GroundMaterials::standard();
        w.step(&frame([0.0, 0.0, 5.0]), &table, DT);
        assert_eq!(w.forward_stiffness(), 1.0);
        w.set_ground_sample(GroundSample::flat([0.0; 3], 3300.0, 3));
        w.step(&frame([0.0, 0.0, 5.0]), &table, DT);
        assert_abs_diff_eq!(w.forward_stiffness(), 0.15);
        w.set_ground_sample(GroundSample::flat([0.0; 3], 3300.0, 42));
        w.step(&frame([0.0, 0.0, 5.0]), &table, DT);
        assert_eq!(w.forward_stiffness(), 1.0);
    }

    #[test]
    fn handbrake_and_traction_reduce_lateral_stiffness() {
        let mut w = grounded_wheel();
        w.set_handbrake_input(1.0);
        w.set_traction_multiplier(0.5);
        w.step(&frame([0.0, 0.0, 5.0]), &GroundMaterials::standard(), DT);
        assert_abs_diff_eq!(w.sideways_stiffness(), 0.25);
        // traction multiplier is one-tick
        w.set_handbrake_input(0.0);
        w.step(&frame([0.0, 0.0, 5.0]), &GroundMaterials::standard(), DT);
        assert_abs_diff_eq!(w.sideways_stiffness(), 1.0);
    }

    #[test]
    fn drift_mode_loosens_a_spinning_wheel() {
        let spin = |drift_mode: bool| {
            let mut w = WheelContact::new(WheelId::RL, WheelConfig { drift_mode, ..Default::default() });
            w.set_ground_sample(GroundSample::flat([0.0; 3], 3300.0, 0));
            for _ in 0..10 {
                w.accumulate_motor_torque(3000.0);
                w.step(&frame([0.0, 0.0, 1.0]), &GroundMaterials::standard(), DT);
            }
            w.sideways_stiffness()
        };
        assert_abs_diff_eq!(spin(false), 1.0);
        assert!(spin(true) < 0.9);
    }

    #[test]
    fn disabled_wheel_zeroes_accumulators() {
        let mut w = grounded_wheel();
        w.accumulate_motor_torque(300.0);
        w.set_enabled(false);
        assert_eq!(w.pending_motor_torque(), 0.0);
        w.accumulate_motor_torque(300.0);
        assert_eq!(w.pending_motor_torque(), 0.0);
        assert!(!w.is_grounded());
        let f = w.step(&frame([0.0; 3]), &GroundMaterials::standard(), DT);
        assert_eq!(f, WheelForces::default());
    }

    #[test]
    fn non_finite_sample_is_airborne() {
        let mut w = grounded_wheel();
        w.set_ground_sample(GroundSample::flat([f32::NAN, 0.0, 0.0], 3300.0, 0));
        assert!(!w.is_grounded());
    }

    #[test]
    fn sliding_sideways_reports_skid() {
        let mut w = grounded_wheel();
        for _ in 0..20 {
            w.step(&frame([-6.0, 0.0, 2.0]), &GroundMaterials::standard(), DT);
        }
        assert!(w.lateral_slip() < -0.5 || w.lateral_slip() > 0.5);
        assert!(w.is_skidding());
    }
}
