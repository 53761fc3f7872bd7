// ==============================================================================
// gearbox.rs — RATIO SELECTION STATE MACHINE (MANUAL / AUTOMATIC)
// ==============================================================================
// States: Forward(i) | Neutral | Reverse, plus an optional pending shift:
//
//   request(target) ──► Shifting(target) ──(shifting_time)──► commit target
//
// - While shifting, output torque is 0 and new requests are ignored.
// - Automatic mode waits `auto_shift_cooldown` after every commit.
// - Reverse runs on ratio[0] with the sign flipped.
//
// Output = received × ratio × gear_engaged × (−1 in reverse)
// ==============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::{EventQueue, VehicleEvent};

pub const AUTO_REVERSE_SPEED_KMH: f32 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearState {
    Forward(usize),
    Neutral,
    Reverse,
}

impl fmt::Display for GearState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GearState::Forward(i) => write!(f, "{}", i + 1),
            GearState::Neutral => write!(f, "N"),
            GearState::Reverse => write!(f, "R"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GearboxConfig {
    pub ratios: Vec<f32>,       // index 0 = first gear
    pub automatic: bool,
    pub shifting_time: f32,     // s
    pub shift_up_rpm: f32,
    pub shift_down_rpm: f32,
    pub shift_threshold: f32,   // fraction of the per-gear speed band
    pub max_speed_kmh: f32,
    pub auto_shift_cooldown: f32, // s
    pub auto_reverse: bool,
}

impl Default for GearboxConfig {
    fn default() -> Self {
        Self {
            ratios: vec![3.63, 2.19, 1.54, 1.21, 1.0, 0.77],
            automatic: true,
            shifting_time: 0.2,
            shift_up_rpm: 6500.0,
            shift_down_rpm: 3000.0,
            shift_threshold: 0.85,
            max_speed_kmh: 230.0,
            auto_shift_cooldown: 1.0,
            auto_reverse: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GearboxInputs {
    pub engine_rpm: f32,
    pub wheel_speed_kmh: f32,
    pub vehicle_speed_kmh: f32,
    /// driver pedals before any reverse swap
    pub throttle: f32,
    pub brake: f32,
}

#[derive(Clone, Debug)]
pub struct Gearbox {
    config: GearboxConfig,
    state: GearState,
    pending: Option<GearState>,
    shift_timer: f32,
    cooldown: f32,
    received_torque: f32,
    produced_torque: f32,
}

impl Gearbox {
    pub fn new(config: GearboxConfig) -> Self {
        let mut config = config;
        if config.ratios.is_empty() {
            warn!("gearbox has no ratios, using a single 1:1 gear");
            config.ratios.push(1.0);
        }
        Self {
            config,
            state: GearState::Neutral,
            pending: None,
            shift_timer: 0.0,
            cooldown: 0.0,
            received_torque: 0.0,
            produced_torque: 0.0,
        }
    }

    /// Neutral, or first gear for automatic boxes.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Self::new(config);
        if self.config.automatic {
            self.state = GearState::Forward(0);
        }
    }

    pub fn config(&self) -> &GearboxConfig { &self.config }
    pub fn state(&self) -> GearState { self.state }
    pub fn pending(&self) -> Option<GearState> { self.pending }
    pub fn is_shifting(&self) -> bool { self.pending.is_some() }
    pub fn gear_count(&self) -> usize { self.config.ratios.len() }
    pub fn received_torque(&self) -> f32 { self.received_torque }
    pub fn produced_torque(&self) -> f32 { self.produced_torque }

    /// 0-based index of the engaged ratio (reverse shares index 0).
    pub fn current_gear(&self) -> usize {
        match self.state {
            GearState::Forward(i) => i,
            GearState::Neutral | GearState::Reverse => 0,
        }
    }

    pub fn current_ratio(&self) -> f32 {
        match self.state {
            GearState::Forward(i) => self.ratio(i),
            GearState::Reverse => -self.ratio(0),
            GearState::Neutral => 0.0,
        }
    }

    pub fn direction(&self) -> f32 {
        if self.state == GearState::Reverse { -1.0 } else { 1.0 }
    }

    /// 1 when a forward gear or reverse is engaged and no shift is running.
    pub fn gear_engaged(&self) -> f32 {
        match (self.state, self.is_shifting()) {
            (GearState::Neutral, _) | (_, true) => 0.0,
            _ => 1.0,
        }
    }

    fn ratio(&self, index: usize) -> f32 {
        self.config.ratios.get(index).copied().unwrap_or(1.0)
    }

    // --------------------------------------------------
    // Shift requests (ignored while a shift is running)
    // --------------------------------------------------

    pub fn request(&mut self, target: GearState) -> bool {
        if self.is_shifting() {
            debug!(current = %self.state, requested = %target, "shift ignored, already shifting");
            return false;
        }
        let target = match target {
            GearState::Forward(i) if i >= self.gear_count() => {
                let clamped = self.gear_count() - 1;
                warn!(requested = i, clamped, "gear index out of range");
                GearState::Forward(clamped)
            }
            t => t,
        };
        if target == self.state {
            return false;
        }
        debug!(from = %self.state, to = %target, "shift started");
        self.pending = Some(target);
        self.shift_timer = self.config.shifting_time.max(0.0);
        true
    }

    pub fn shift_up(&mut self) -> bool {
        let target = match self.state {
            GearState::Reverse => GearState::Neutral,
            GearState::Neutral => GearState::Forward(0),
            GearState::Forward(i) if i + 1 < self.gear_count() => GearState::Forward(i + 1),
            GearState::Forward(_) => return false,
        };
        self.request(target)
    }

    pub fn shift_down(&mut self) -> bool {
        let target = match self.state {
            GearState::Forward(0) => GearState::Neutral,
            GearState::Forward(i) => GearState::Forward(i - 1),
            GearState::Neutral => GearState::Reverse,
            GearState::Reverse => return false,
        };
        self.request(target)
    }

    pub fn shift_to_gear(&mut self, index: usize) -> bool {
        self.request(GearState::Forward(index))
    }

    pub fn shift_reverse(&mut self) -> bool {
        self.request(GearState::Reverse)
    }

    pub fn shift_to_neutral(&mut self) -> bool {
        self.request(GearState::Neutral)
    }

    // --------------------------------------------------
    // Tick
    // --------------------------------------------------

    /// Advance shift timers and the automatic policy.
    pub fn update(&mut self, inputs: &GearboxInputs, dt: f32, events: &mut EventQueue) {
        if let Some(target) = self.pending {
            self.shift_timer -= dt;
            if self.shift_timer <= 0.0 {
                let from = self.state;
                self.state = target;
                self.pending = None;
                self.shift_timer = 0.0;
                self.cooldown = self.config.auto_shift_cooldown.max(0.0);
                debug!(%from, to = %target, "gear committed");
                events.push(VehicleEvent::GearChanged { from, to: target });
            }
        }

        if self.cooldown > 0.0 {
            self.cooldown -= dt;
        }

        if self.config.automatic && !self.is_shifting() && self.cooldown <= 0.0 {
            self.automatic_policy(inputs);
        }
    }

    /// Upper speed of gear `index`'s band (km/h).
    pub fn gear_speed_threshold(&self, index: usize) -> f32 {
        let n = self.gear_count() as f32;
        self.config.max_speed_kmh / n * (index as f32 + 1.0) * self.config.shift_threshold
    }

    /// Lowest gear whose band still contains `speed_kmh`.
    pub fn eligible_gear(&self, speed_kmh: f32) -> usize {
        let speed = speed_kmh.abs();
        (0..self.gear_count())
            .find(|&i| speed < self.gear_speed_threshold(i))
            .unwrap_or(self.gear_count() - 1)
    }

    fn automatic_policy(&mut self, inputs: &GearboxInputs) {
        let speed = inputs.vehicle_speed_kmh.abs();
        let standing = speed < AUTO_REVERSE_SPEED_KMH;

        match self.state {
            GearState::Forward(i) => {
                if self.config.auto_reverse && standing && inputs.brake >= 0.5 && inputs.throttle < 0.05 {
                    self.request(GearState::Reverse);
                    return;
                }
                let threshold = self.gear_speed_threshold(i);
                if inputs.engine_rpm >= self.config.shift_up_rpm
                    && inputs.wheel_speed_kmh.abs() >= threshold
                    && speed >= threshold
                    && i + 1 < self.gear_count()
                {
                    self.request(GearState::Forward(i + 1));
                } else if inputs.engine_rpm <= self.config.shift_down_rpm && i > 0 && self.eligible_gear(speed) < i {
                    self.request(GearState::Forward(i - 1));
                }
            }
            GearState::Reverse => {
                if self.config.auto_reverse && standing && inputs.throttle >= 0.5 && inputs.brake < 0.05 {
                    self.request(GearState::Forward(0));
                }
            }
            GearState::Neutral => {
                if inputs.throttle > 0.05 {
                    self.request(GearState::Forward(0));
                }
            }
        }
    }

    pub fn transmit(&mut self, received: f32) -> f32 {
        self.received_torque = received;
        self.produced_torque = received * self.current_ratio() * self.gear_engaged();
        self.produced_torque
    }
}
