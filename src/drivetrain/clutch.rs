// ==============================================================================
// clutch.rs — ENGINE → GEARBOX COUPLING (CONTINUOUS CONTROL LAW)
// ------------------------------------------------------------------------------
// clutch input: 0 = fully engaged (no slip) .. 1 = fully disengaged
//
// raw input (automatic):
//   rpm <= engage_rpm                  → 1   (stall protection)
//   speed < 20 km/h                    → approach lerp(1, slip_floor, throttle * bite)
//                                          bite       = clamp01((rpm - engage) / engage)
//                                          slip_floor = LAUNCH_SLIP * (1 - speed / 20)
//   otherwise                          → 0
//   shifting OR handbrake >= 0.75      → 1   (overrides everything)
// raw input (manual): the driver's clutch axis, still forced to 1 while shifting
//
// The public input is SmoothDamp(raw, clutch_inertia). Transmitted torque uses
// the raw value by default; ClutchTorquePolicy::Smoothed uses the filtered one.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::aven_tire::types::lerp;
use crate::drivetrain::smoothing::{SmoothDamp, exp_approach};

pub const LAUNCH_SPEED_KMH: f32 = 20.0;
pub const HANDBRAKE_DISENGAGE: f32 = 0.75;
const LAUNCH_RATE: f32 = 10.0; // 1/s
pub const LAUNCH_SLIP: f32 = 0.3; // clutch input held at standstill, fades out by LAUNCH_SPEED_KMH

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClutchTorquePolicy {
    #[default]
    Raw,
    Smoothed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutchConfig {
    pub automatic: bool,
    pub engage_rpm: f32,
    pub clutch_inertia: f32, // s, SmoothDamp time
    pub torque_policy: ClutchTorquePolicy,
}

impl Default for ClutchConfig {
    fn default() -> Self {
        Self {
            automatic: true,
            engage_rpm: 1000.0,
            clutch_inertia: 0.15,
            torque_policy: ClutchTorquePolicy::Raw,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClutchInputs {
    pub engine_rpm: f32,
    pub speed_kmh: f32,
    pub throttle: f32,
    pub handbrake: f32,
    pub shifting: bool,
    pub manual_clutch: f32,
}

#[derive(Clone, Debug)]
pub struct Clutch {
    config: ClutchConfig,
    raw_input: f32,
    input: f32,
    filter: SmoothDamp,
    received_torque: f32,
    produced_torque: f32,
}

impl Clutch {
    pub fn new(config: ClutchConfig) -> Self {
        Self {
            config,
            raw_input: 1.0,
            input: 1.0,
            filter: SmoothDamp::new(),
            received_torque: 0.0,
            produced_torque: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn config(&self) -> &ClutchConfig { &self.config }
    pub fn raw_input(&self) -> f32 { self.raw_input }

    /// Smoothed clutch input, always in [0, 1].
    pub fn input(&self) -> f32 { self.input }

    pub fn received_torque(&self) -> f32 { self.received_torque }
    pub fn produced_torque(&self) -> f32 { self.produced_torque }

    pub fn update(&mut self, inputs: &ClutchInputs, dt: f32) {
        let cfg = &self.config;

        let mut raw = if cfg.automatic {
            let engage = cfg.engage_rpm.max(1.0);
            if inputs.engine_rpm <= engage {
                1.0
            } else if inputs.speed_kmh.abs() < LAUNCH_SPEED_KMH {
                let bite = ((inputs.engine_rpm - engage) / engage).clamp(0.0, 1.0);
                let slip_floor = LAUNCH_SLIP * (1.0 - inputs.speed_kmh.abs() / LAUNCH_SPEED_KMH);
                let target = lerp(1.0, slip_floor, inputs.throttle.clamp(0.0, 1.0) * bite);
                exp_approach(self.raw_input, target, LAUNCH_RATE, dt)
            } else {
                0.0
            }
        } else {
            inputs.manual_clutch
        };

        if inputs.shifting || inputs.handbrake >= HANDBRAKE_DISENGAGE {
            raw = 1.0;
        }
        self.raw_input = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 1.0 };

        let smoothed = self.filter.step(self.input, self.raw_input, cfg.clutch_inertia, dt);
        self.input = smoothed.clamp(0.0, 1.0);
    }

    pub fn transmit(&mut self, received: f32) -> f32 {
        let factor = match self.config.torque_policy {
            ClutchTorquePolicy::Raw => self.raw_input,
            ClutchTorquePolicy::Smoothed => self.input,
        };
        self.received_torque = received;
        self.produced_torque = received * (1.0 - factor);
        self.produced_torque
    }
}
