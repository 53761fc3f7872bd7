// ==============================================================================
// engine.rs — COMBUSTION MODEL (RPM INTEGRATOR, TORQUE CURVE, TURBO, NOS)
// ==============================================================================
// Per tick (Engine::update):
//
//   1) start-up countdown → running, RPM seeded at min_rpm
//   2) idle air control    idle = clamp01(1 - rpm / (1.2 * min_rpm))
//   3) fuel                fuel = clamp01(throttle + idle), 0 when off / cut
//   4) NOS                 one-tick torque multiplier, drain + regeneration
//   5) wanted RPM          free-rev + load coupling - friction, clamp [0, max]
//                          coupling = gear_engaged * (1 - clutch)^3
//   6) RPM                 SmoothDamp(wanted, engine_inertia)
//   7) rev limiter         rpm >= 0.975 * max → fuel cut (same tick)
//   8) turbo               psi → max_psi * fuel * rpm_factor, blow-off on lift
//   9) torque              curve(rpm) * max_torque * fuel * mult * turbo
//                          * lerp(1, 0, (wheel_rpm - rpm) / (max_rpm / 2))
//
// "clutch" below is the smoothed clutch input of the previous tick
// (0 = engaged, 1 = disengaged). gear_engaged is 0 in neutral / shifting.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aven_tire::types::{inverse_lerp, lerp};
use crate::drivetrain::smoothing::{SmoothDamp, exp_approach};
use crate::events::{EventQueue, VehicleEvent};

pub const REV_LIMIT_FRACTION: f32 = 0.975;
const LOAD_COUPLING_RATE: f32 = 5.0; // 1/s

// ============================================
// Torque curve
// ============================================

/// (rpm, normalized torque) samples, sorted by rpm. Linear between samples,
/// held flat beyond both ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorqueCurve {
    points: Vec<[f32; 2]>,
}

impl TorqueCurve {
    pub fn new(mut points: Vec<[f32; 2]>) -> Self {
        points.retain(|p| p[0].is_finite() && p[1].is_finite());
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Self { points }
    }

    pub fn flat() -> Self {
        Self::new(vec![[0.0, 1.0]])
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn sample(&self, rpm: f32) -> f32 {
        let Some(first) = self.points.first() else { return 0.0 };
        if rpm <= first[0] {
            return first[1];
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if rpm <= b[0] {
                return lerp(a[1], b[1], inverse_lerp(a[0], b[0], rpm));
            }
        }
        self.points.last().map(|p| p[1]).unwrap_or(0.0)
    }
}

impl Default for TorqueCurve {
    fn default() -> Self {
        Self::new(vec![
            [0.0, 0.45],
            [1000.0, 0.6],
            [2500.0, 0.8],
            [4500.0, 0.95],
            [6400.0, 1.0],
            [7500.0, 0.8],
        ])
    }
}

// ============================================
// Config
// ============================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurboConfig {
    pub enabled: bool,
    pub max_psi: f32,
    pub spool_rate: f32,  // 1/s
    pub torque_gain: f32, // extra torque fraction at max psi
}

impl Default for TurboConfig {
    fn default() -> Self {
        Self { enabled: false, max_psi: 7.0, spool_rate: 2.5, torque_gain: 0.25 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NosConfig {
    pub enabled: bool,
    pub torque_multiplier: f32,
    pub duration: f32,    // s of continuous use from full
    pub regen_delay: f32, // s idle before regeneration starts
    pub regen_time: f32,  // s from empty to full
}

impl Default for NosConfig {
    fn default() -> Self {
        Self { enabled: false, torque_multiplier: 1.5, duration: 4.0, regen_delay: 2.0, regen_time: 10.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub min_rpm: f32,
    pub max_rpm: f32,
    pub max_torque: f32,     // Nm
    pub torque_curve: TorqueCurve,
    pub engine_inertia: f32, // s, SmoothDamp time
    pub engine_friction: f32, // fraction of max_rpm lost per second
    pub start_delay: f32,    // s
    pub auto_start: bool,
    pub turbo: TurboConfig,
    pub nos: NosConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_rpm: 800.0,
            max_rpm: 7500.0,
            max_torque: 300.0,
            torque_curve: TorqueCurve::default(),
            engine_inertia: 0.15,
            engine_friction: 0.15,
            start_delay: 0.5,
            auto_start: true,
            turbo: TurboConfig::default(),
            nos: NosConfig::default(),
        }
    }
}

// ============================================
// Engine
// ============================================

#[derive(Clone, Copy, Debug, Default)]
pub struct EngineInputs {
    pub throttle: f32,          // 0..1
    pub boost: f32,             // 0..1
    pub clutch: f32,            // 0 engaged .. 1 disengaged (smoothed)
    pub gear_engaged: f32,      // 0 or 1
    pub wheel_rpm_projected: f32, // driven wheel rpm × ratios, engine side
}

#[derive(Clone, Debug)]
pub struct Engine {
    config: EngineConfig,

    running: bool,
    start_timer: Option<f32>,

    rpm: f32,
    wanted_rpm: f32,
    rpm_filter: SmoothDamp,

    idle_input: f32,
    fuel_input: f32,
    fuel_cut: bool,
    torque_multiplier: f32,

    psi: f32,
    blow_off_armed: bool,

    nos_remaining: f32,
    nos_regen_timer: f32,
    nos_active: bool,

    produced_torque: f32,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            running: false,
            start_timer: None,
            rpm: 0.0,
            wanted_rpm: 0.0,
            rpm_filter: SmoothDamp::new(),
            idle_input: 0.0,
            fuel_input: 0.0,
            fuel_cut: false,
            torque_multiplier: 1.0,
            psi: 0.0,
            blow_off_armed: false,
            nos_remaining: 1.0,
            nos_regen_timer: 0.0,
            nos_active: false,
            produced_torque: 0.0,
        }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Neutral state. `running` seeds RPM at idle (respawn with engine on).
    pub fn reset(&mut self, running: bool) {
        *self = Self::new(self.config.clone());
        if running {
            self.running = true;
            self.rpm = self.config.min_rpm;
            self.wanted_rpm = self.config.min_rpm;
        }
    }

    // --------------------------------------------------
    // Commands
    // --------------------------------------------------

    pub fn start(&mut self) {
        if self.running || self.start_timer.is_some() {
            return;
        }
        info!(delay = self.config.start_delay, "engine starting");
        self.start_timer = Some(self.config.start_delay.max(0.0));
    }

    pub fn stop(&mut self, events: &mut EventQueue) {
        self.start_timer = None;
        if !self.running {
            return;
        }
        self.running = false;
        info!("engine stopped");
        events.push(VehicleEvent::EngineStopped);
    }

    /// One-tick external torque multiplier (reset after every update).
    pub fn set_torque_multiplier(&mut self, m: f32) {
        if m.is_finite() {
            self.torque_multiplier *= m.max(0.0);
        }
    }

    // --------------------------------------------------
    // Observables
    // --------------------------------------------------

    pub fn is_running(&self) -> bool { self.running }
    pub fn is_starting(&self) -> bool { self.start_timer.is_some() }
    pub fn rpm(&self) -> f32 { self.rpm }
    pub fn wanted_rpm(&self) -> f32 { self.wanted_rpm }
    pub fn idle_input(&self) -> f32 { self.idle_input }
    pub fn fuel_input(&self) -> f32 { self.fuel_input }
    pub fn fuel_cut(&self) -> bool { self.fuel_cut }
    pub fn turbo_psi(&self) -> f32 { self.psi }
    pub fn nos_remaining(&self) -> f32 { self.nos_remaining }
    pub fn nos_active(&self) -> bool { self.nos_active }
    pub fn produced_torque(&self) -> f32 { self.produced_torque }

    // --------------------------------------------------
    // Tick
    // --------------------------------------------------

    pub fn update(&mut self, inputs: &EngineInputs, dt: f32, events: &mut EventQueue) {
        if dt <= 0.0 {
            return;
        }
        let cfg = &self.config;
        let max_rpm = cfg.max_rpm.max(1.0);
        let throttle = inputs.throttle.clamp(0.0, 1.0);

        // 1) start-up delay
        if let Some(timer) = self.start_timer.as_mut() {
            *timer -= dt;
            if *timer <= 0.0 {
                self.start_timer = None;
                self.running = true;
                self.rpm = self.rpm.max(cfg.min_rpm);
                self.wanted_rpm = self.rpm;
                info!(rpm = self.rpm, "engine running");
                events.push(VehicleEvent::EngineStarted);
            }
        }

        // 2) idle air control
        self.idle_input = if self.running {
            (1.0 - self.rpm / (cfg.min_rpm * 1.2).max(1.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // 3) fuel
        self.fuel_input = (throttle + self.idle_input).clamp(0.0, 1.0);
        if !self.running || self.fuel_cut || self.rpm >= max_rpm {
            self.fuel_input = 0.0;
        }

        // 4) NOS
        let nos_multiplier = self.update_nos(inputs.boost, throttle, dt);
        self.torque_multiplier *= nos_multiplier;

        // 5) wanted RPM
        let clutch = inputs.clutch.clamp(0.0, 1.0);
        let gear = inputs.gear_engaged.clamp(0.0, 1.0);
        // load grows with the cube of clutch engagement
        let coupled = (1.0 - clutch).powi(3) * gear;
        let decoupled = 1.0 - coupled;

        let mut wanted = self.wanted_rpm;
        wanted += decoupled * self.fuel_input * max_rpm * dt;
        wanted += coupled * (inputs.wheel_rpm_projected.abs() - wanted) * dt * LOAD_COUPLING_RATE;
        wanted -= self.config.engine_friction * max_rpm * dt;
        self.wanted_rpm = if wanted.is_finite() { wanted.clamp(0.0, max_rpm) } else { 0.0 };

        // 6) needle lag
        let smoothed = self.rpm_filter.step(self.rpm, self.wanted_rpm, self.config.engine_inertia, dt);
        self.rpm = smoothed.clamp(0.0, max_rpm);

        // 7) rev limiter (single threshold)
        let cut = self.rpm >= REV_LIMIT_FRACTION * max_rpm;
        if cut && !self.fuel_cut {
            debug!(rpm = self.rpm, "rev limiter");
        }
        self.fuel_cut = cut;
        if self.fuel_cut {
            self.fuel_input = 0.0;
        }

        // 8) turbo
        self.update_turbo(dt, events);

        // 9) torque
        let cfg = &self.config;
        let turbo_mult = if cfg.turbo.enabled && cfg.turbo.max_psi > 0.0 {
            1.0 + cfg.turbo.torque_gain * (self.psi / cfg.turbo.max_psi)
        } else {
            1.0
        };
        let over_rev = ((inputs.wheel_rpm_projected.abs() - self.rpm) / (max_rpm * 0.5)).clamp(0.0, 1.0);
        let feedback = lerp(1.0, 0.0, over_rev);

        let torque = cfg.torque_curve.sample(self.rpm)
            * cfg.max_torque
            * self.fuel_input
            * self.torque_multiplier
            * turbo_mult
            * feedback;

        self.produced_torque = if self.running && torque.is_finite() { torque.max(0.0) } else { 0.0 };
        self.torque_multiplier = 1.0;
    }

    fn update_nos(&mut self, boost: f32, throttle: f32, dt: f32) -> f32 {
        let nos = &self.config.nos;
        if !nos.enabled {
            self.nos_active = false;
            return 1.0;
        }

        let engaged = boost >= 0.5 && throttle >= 0.5 && self.running && self.nos_remaining > 0.0;
        if engaged && !self.nos_active {
            debug!(remaining = self.nos_remaining, "nos engaged");
        }
        self.nos_active = engaged;

        if engaged {
            self.nos_remaining = (self.nos_remaining - dt / nos.duration.max(1e-3)).max(0.0);
            self.nos_regen_timer = nos.regen_delay;
            nos.torque_multiplier
        } else {
            if self.nos_regen_timer > 0.0 {
                self.nos_regen_timer -= dt;
            } else {
                self.nos_remaining = (self.nos_remaining + dt / nos.regen_time.max(1e-3)).min(1.0);
            }
            1.0
        }
    }

    fn update_turbo(&mut self, dt: f32, events: &mut EventQueue) {
        let turbo = &self.config.turbo;
        if !turbo.enabled {
            self.psi = 0.0;
            return;
        }

        let max_rpm = self.config.max_rpm.max(1.0);
        let rpm_factor = inverse_lerp(max_rpm * 0.35, max_rpm * 0.65, self.rpm);
        let target = turbo.max_psi * self.fuel_input * rpm_factor;

        let previous = self.psi;
        self.psi = exp_approach(self.psi, target, turbo.spool_rate, dt).clamp(0.0, turbo.max_psi);

        // armed once boost builds under load, fires once per lift
        if self.fuel_input > 0.0 && self.psi > turbo.max_psi * 0.15 {
            self.blow_off_armed = true;
        }
        if self.blow_off_armed && self.fuel_input <= 0.0 && self.psi < previous {
            self.blow_off_armed = false;
            debug!(psi = previous, "turbo blow-off");
            events.push(VehicleEvent::TurboBlowOff { psi: previous });
        }
    }
}
