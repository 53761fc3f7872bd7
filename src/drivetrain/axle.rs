// ==============================================================================
// axle.rs — LEFT/RIGHT WHEEL PAIR: STEERING, POWER, BRAKES, ANTI-ROLL
// ==============================================================================
// An Axle never owns wheels; it holds optional indices into the vehicle's
// wheel list so wheels can be disabled without invalidating anything.
//
// Per tick (called by the vehicle in pipeline order):
//   receive_inputs()        throttle / brake / steer / handbrake fractions
//   update_steering(dt)     rate-limited rack → Ackermann split → wheels
//   receive_drive_torque()  differential output × power_multiplier
//   distribute()            motor + brake + handbrake into wheel accumulators
//   anti_roll()             ARB impulse pair (both wheels grounded only)
//   update_grounded()       OR of both wheels
//
// A missing wheel is a degraded configuration: the other side still works,
// anti-roll is skipped.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aven_tire::anti_roll::{ArbImpulse, anti_roll_impulses};
use crate::aven_tire::steering::{SteeringConfig, update_steering_rack, wheel_angles};
use crate::aven_tire::wheel::WheelContact;
use crate::drivetrain::differential::DifferentialConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxlePosition {
    Front,
    Rear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxleConfig {
    pub position: AxlePosition,
    pub left_wheel: Option<usize>,
    pub right_wheel: Option<usize>,

    pub is_power: bool,
    pub power_multiplier: f32,
    pub is_steer: bool,
    pub steer_multiplier: f32,
    pub is_brake: bool,
    pub brake_multiplier: f32,
    pub is_handbrake: bool,
    pub handbrake_multiplier: f32,

    pub max_brake_torque: f32,     // Nm for the whole axle
    pub max_handbrake_torque: f32, // Nm for the whole axle
    pub anti_roll_force: f32,      // N per unit travel difference

    pub steering: SteeringConfig,
    pub differential: DifferentialConfig,
}

impl Default for AxleConfig {
    fn default() -> Self {
        Self {
            position: AxlePosition::Front,
            left_wheel: None,
            right_wheel: None,
            is_power: false,
            power_multiplier: 1.0,
            is_steer: false,
            steer_multiplier: 1.0,
            is_brake: true,
            brake_multiplier: 1.0,
            is_handbrake: false,
            handbrake_multiplier: 1.0,
            max_brake_torque: 3000.0,
            max_handbrake_torque: 4000.0,
            anti_roll_force: 5000.0,
            steering: SteeringConfig::default(),
            differential: DifferentialConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxleInputs {
    pub throttle: f32,
    pub brake: f32,
    pub steer: f32,
    pub handbrake: f32,
}

#[derive(Clone, Debug)]
pub struct Axle {
    config: AxleConfig,
    inputs: AxleInputs,
    steer_angle: f32,
    drive_left: f32,
    drive_right: f32,
    anti_roll: f32,
    grounded: bool,
}

impl Axle {
    pub fn new(config: AxleConfig) -> Self {
        if config.left_wheel.is_none() || config.right_wheel.is_none() {
            warn!(position = ?config.position, "axle is missing a wheel, running degraded");
        }
        Self {
            config,
            inputs: AxleInputs::default(),
            steer_angle: 0.0,
            drive_left: 0.0,
            drive_right: 0.0,
            anti_roll: 0.0,
            grounded: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self {
            config: self.config.clone(),
            inputs: AxleInputs::default(),
            steer_angle: 0.0,
            drive_left: 0.0,
            drive_right: 0.0,
            anti_roll: 0.0,
            grounded: false,
        };
    }

    pub fn config(&self) -> &AxleConfig { &self.config }
    pub fn position(&self) -> AxlePosition { self.config.position }
    pub fn is_power(&self) -> bool { self.config.is_power }
    pub fn is_brake(&self) -> bool { self.config.is_brake }
    pub fn inputs(&self) -> &AxleInputs { &self.inputs }
    pub fn steer_angle(&self) -> f32 { self.steer_angle }
    pub fn anti_roll_force(&self) -> f32 { self.anti_roll }
    pub fn is_grounded(&self) -> bool { self.grounded }

    /// Existing wheel indices, left first.
    pub fn wheels(&self) -> impl Iterator<Item = usize> + '_ {
        self.config.left_wheel.into_iter().chain(self.config.right_wheel)
    }

    pub fn receive_inputs(&mut self, throttle: f32, brake: f32, steer: f32, handbrake: f32) {
        self.inputs = AxleInputs {
            throttle: clamp_unit(throttle, 0.0),
            brake: clamp_unit(brake, 0.0),
            steer: clamp_unit(steer, -1.0),
            handbrake: clamp_unit(handbrake, 0.0),
        };
    }

    pub fn update_steering(&mut self, wheels: &mut [WheelContact], dt: f32) {
        if !self.config.is_steer {
            return;
        }
        let steer = self.inputs.steer * self.config.steer_multiplier;
        self.steer_angle = update_steering_rack(&self.config.steering, steer, self.steer_angle, dt);

        let (left, right) = wheel_angles(&self.config.steering, self.steer_angle);
        if let Some(w) = self.config.left_wheel.and_then(|i| wheels.get_mut(i)) {
            w.set_steer_angle(left);
        }
        if let Some(w) = self.config.right_wheel.and_then(|i| wheels.get_mut(i)) {
            w.set_steer_angle(right);
        }
    }

    /// Called with the differential output for this axle.
    pub fn receive_drive_torque(&mut self, left: f32, right: f32) {
        if !self.config.is_power {
            self.drive_left = 0.0;
            self.drive_right = 0.0;
            return;
        }
        self.drive_left = left * self.config.power_multiplier;
        self.drive_right = right * self.config.power_multiplier;
    }

    /// Push drive, brake and handbrake torque into the wheel accumulators.
    pub fn distribute(&mut self, wheels: &mut [WheelContact], drive_sign: f32) {
        let brake = if self.config.is_brake {
            self.inputs.brake * self.config.max_brake_torque * self.config.brake_multiplier
        } else {
            0.0
        };
        let handbrake = if self.config.is_handbrake {
            self.inputs.handbrake * self.config.max_handbrake_torque * self.config.handbrake_multiplier
        } else {
            0.0
        };
        let handbrake_input = if self.config.is_handbrake { self.inputs.handbrake } else { 0.0 };

        let sides = [
            (self.config.left_wheel, self.drive_left),
            (self.config.right_wheel, self.drive_right),
        ];
        for (index, drive) in sides {
            let Some(w) = index.and_then(|i| wheels.get_mut(i)) else { continue };
            w.set_drive_sign(drive_sign);
            w.set_handbrake_input(handbrake_input);
            if self.config.is_power {
                w.accumulate_motor_torque(drive);
            }
            w.accumulate_brake_torque(brake * 0.5);
            w.accumulate_handbrake_torque(handbrake * 0.5);
        }

        self.drive_left = 0.0;
        self.drive_right = 0.0;
    }

    /// Anti-roll pair for this tick, or None when a wheel is missing or airborne.
    pub fn anti_roll(&mut self, wheels: &[WheelContact], dt: f32) -> Option<[ArbImpulse; 2]> {
        self.anti_roll = 0.0;
        let (Some(l), Some(r)) = (
            self.config.left_wheel.and_then(|i| wheels.get(i)),
            self.config.right_wheel.and_then(|i| wheels.get(i)),
        ) else {
            return None;
        };
        if !l.is_grounded() || !r.is_grounded() {
            return None;
        }
        let (force, pair) = anti_roll_impulses(l.ground_sample(), r.ground_sample(), self.config.anti_roll_force, dt)?;
        self.anti_roll = force;
        Some(pair)
    }

    pub fn update_grounded(&mut self, wheels: &[WheelContact]) -> bool {
        let grounded = self.wheels().filter_map(|i| wheels.get(i)).any(|w| w.is_grounded());
        self.grounded = grounded;
        grounded
    }

    /// Mean RPM of the existing, enabled wheels (left, right).
    pub fn wheel_rpms(&self, wheels: &[WheelContact]) -> (f32, f32) {
        let rpm = |idx: Option<usize>| {
            idx.and_then(|i| wheels.get(i)).filter(|w| w.is_enabled()).map(|w| w.rpm())
        };
        match (rpm(self.config.left_wheel), rpm(self.config.right_wheel)) {
            (Some(l), Some(r)) => (l, r),
            (Some(l), None) => (l, l),
            (None, Some(r)) => (r, r),
            (None, None) => (0.0, 0.0),
        }
    }
}

fn clamp_unit(v: f32, min: f32) -> f32 {
    if v.is_finite() { v.clamp(min, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aven_tire::types::{GroundSample, WheelId};
    use crate::aven_tire::wheel::WheelConfig;

    fn wheels() -> Vec<WheelContact> {
        vec![
            WheelContact::new(WheelId::FL, WheelConfig::default()),
            WheelContact::new(WheelId::FR, WheelConfig::default()),
        ]
    }

    fn front() -> AxleConfig {
        AxleConfig {
            left_wheel: Some(0),
            right_wheel: Some(1),
            is_steer: true,
            is_power: true,
            ..Default::default()
        }
    }

    #[test]
    fn inputs_are_clamped() {
        let mut a = Axle::new(front());
        a.receive_inputs(3.0, -1.0, -7.0, f32::NAN);
        assert_eq!(*a.inputs(), AxleInputs { throttle: 1.0, brake: 0.0, steer: -1.0, handbrake: 0.0 });
    }

    #[test]
    fn steering_is_rate_limited() {
        let mut a = Axle::new(front());
        let mut w = wheels();
        a.receive_inputs(0.0, 0.0, 1.0, 0.0);
        a.update_steering(&mut w, 0.02);
        let step = a.config().steering.steer_speed * 0.02;
        assert!((a.steer_angle() - step).abs() < 1e-6);
        assert!(w[0].steer_angle() > 0.0 && w[1].steer_angle() > 0.0);
    }

    #[test]
    fn brakes_split_evenly() {
        let mut a = Axle::new(AxleConfig { is_handbrake: true, ..front() });
        let mut w = wheels();
        a.receive_inputs(0.0, 1.0, 0.0, 0.5);
        a.distribute(&mut w, 1.0);
        let expected = 0.5 * 3000.0 + 0.5 * 2000.0;
        assert_eq!(w[0].pending_brake_torque(), expected);
        assert_eq!(w[1].pending_brake_torque(), expected);
    }

    #[test]
    fn drive_torque_uses_power_multiplier() {
        let mut a = Axle::new(AxleConfig { power_multiplier: 0.5, ..front() });
        let mut w = wheels();
        a.receive_drive_torque(100.0, 300.0);
        a.distribute(&mut w, 1.0);
        assert_eq!(w[0].pending_motor_torque(), 50.0);
        assert_eq!(w[1].pending_motor_torque(), 150.0);
    }

    #[test]
    fn missing_wheel_degrades() {
        let mut a = Axle::new(AxleConfig { right_wheel: None, ..front() });
        let mut w = wheels();
        w[0].set_ground_sample(GroundSample { travel: 0.9, ..GroundSample::flat([0.0; 3], 3000.0, 0) });
        a.receive_drive_torque(100.0, 100.0);
        a.distribute(&mut w, 1.0);
        assert_eq!(w[0].pending_motor_torque(), 100.0);
        assert_eq!(w[1].pending_motor_torque(), 0.0);
        assert!(a.anti_roll(&w, 0.02).is_none());
        assert!(a.update_grounded(&w));
    }

    #[test]
    fn anti_roll_only_when_both_grounded() {
        let mut a = Axle::new(front());
        let mut w = wheels();
        w[0].set_ground_sample(GroundSample { travel: 0.8, ..GroundSample::flat([0.8, 0.0, 0.0], 3000.0, 0) });
        assert!(a.anti_roll(&w, 0.02).is_none());
        w[1].set_ground_sample(GroundSample { travel: 0.2, ..GroundSample::flat([-0.8, 0.0, 0.0], 3000.0, 0) });
        let pair = a.anti_roll(&w, 0.02).expect("both grounded");
        assert!(pair[0].impulse[1] > 0.0 && pair[1].impulse[1] < 0.0);
        assert!(a.anti_roll_force() > 0.0);
    }

    #[test]
    fn grounded_is_or_of_wheels() {
        let mut a = Axle::new(front());
        let mut w = wheels();
        assert!(!a.update_grounded(&w));
        w[1].set_ground_sample(GroundSample::flat([0.0; 3], 3000.0, 0));
        assert!(a.update_grounded(&w));
        assert!(a.is_grounded());
        w[1].set_enabled(false);
        assert!(!a.update_grounded(&w));
        assert!(!a.is_grounded());
    }
}
