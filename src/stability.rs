// ==============================================================================
// stability.rs — ABS / TCS / ESP + DRIVING HELPERS
// ==============================================================================
// Runs at the END of a tick on fresh wheel slip. Its wheel commands are
// consumed by the NEXT tick's torque arbitration (WheelContact::step):
//
//   ABS   braked wheel:  |fwd_slip| × brake_input >= threshold → brake cut
//   TCS   driven wheel:  fwd_slip × direction >= threshold      → motor cut
//   ESP   front |lat| >= threshold → understeer → brake front wheels ∝ rear slip
//         rear  |lat| >= threshold → oversteer  → brake rear wheels  ∝ front slip
//         (side chosen so the brake moment opposes the slide)
//
// Helpers act on the chassis directly:
//   steering helper     rotate velocity with small heading changes
//   traction helper     front sideways stiffness × (1 - k|yaw rate|) when
//                       steer and body slip angle disagree
//   angular drag helper angular damping ∝ speed
//   turn helper         yaw impulse towards the steered direction
//
// Engaged flags are rebuilt from scratch every evaluation (no latching).
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aven_tire::kinematics::{body_slip_angle, wheel_basis};
use crate::aven_tire::types::{Vec3, lerp, v_cross, v_dot, v_norm, v_reject, v_rotate, v_scale};
use crate::aven_tire::wheel::WheelContact;
use crate::drivetrain::axle::{Axle, AxlePosition};
use crate::host::ChassisBody;

const STEER_HELPER_MAX_DELTA: f32 = 10.0 * std::f32::consts::PI / 180.0; // rad
const HELPER_MIN_SPEED: f32 = 1.0; // m/s

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assist {
    Abs,
    Tcs,
    Esp,
    SteeringHelper,
    TractionHelper,
    AngularDragHelper,
    TurnHelper,
}

impl Assist {
    pub fn as_str(&self) -> &'static str {
        match self {
            Assist::Abs => "abs",
            Assist::Tcs => "tcs",
            Assist::Esp => "esp",
            Assist::SteeringHelper => "steering_helper",
            Assist::TractionHelper => "traction_helper",
            Assist::AngularDragHelper => "angular_drag_helper",
            Assist::TurnHelper => "turn_helper",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub abs: bool,
    pub abs_threshold: f32,
    pub abs_intensity: f32,

    pub tcs: bool,
    pub tcs_threshold: f32,
    pub tcs_intensity: f32,

    pub esp: bool,
    pub esp_threshold: f32,
    pub esp_intensity: f32,
    pub esp_brake_torque: f32, // Nm per wheel at full intensity and slip

    pub steering_helper: bool,
    pub steer_helper_strength: f32, // 0..1 share of the heading change

    pub traction_helper: bool,
    pub traction_helper_strength: f32,

    pub angular_drag_helper: bool,
    pub angular_drag_strength: f32,

    pub turn_helper: bool,
    pub turn_helper_strength: f32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            abs: true,
            abs_threshold: 0.35,
            abs_intensity: 1.0,
            tcs: true,
            tcs_threshold: 0.35,
            tcs_intensity: 1.0,
            esp: true,
            esp_threshold: 0.5,
            esp_intensity: 0.5,
            esp_brake_torque: 2500.0,
            steering_helper: true,
            steer_helper_strength: 0.1,
            traction_helper: true,
            traction_helper_strength: 0.1,
            angular_drag_helper: false,
            angular_drag_strength: 0.1,
            turn_helper: false,
            turn_helper_strength: 0.1,
        }
    }
}

impl StabilityConfig {
    pub fn is_enabled(&self, assist: Assist) -> bool {
        match assist {
            Assist::Abs => self.abs,
            Assist::Tcs => self.tcs,
            Assist::Esp => self.esp,
            Assist::SteeringHelper => self.steering_helper,
            Assist::TractionHelper => self.traction_helper,
            Assist::AngularDragHelper => self.angular_drag_helper,
            Assist::TurnHelper => self.turn_helper,
        }
    }

    pub fn set_enabled(&mut self, assist: Assist, enabled: bool) {
        let flag = match assist {
            Assist::Abs => &mut self.abs,
            Assist::Tcs => &mut self.tcs,
            Assist::Esp => &mut self.esp,
            Assist::SteeringHelper => &mut self.steering_helper,
            Assist::TractionHelper => &mut self.traction_helper,
            Assist::AngularDragHelper => &mut self.angular_drag_helper,
            Assist::TurnHelper => &mut self.turn_helper,
        };
        *flag = enabled;
    }
}

/// Observable output, rebuilt every evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StabilityState {
    pub abs_engaged: bool,
    pub tcs_engaged: bool,
    pub esp_engaged: bool,
    pub understeering: bool,
    pub oversteering: bool,
    pub front_slip: f32,
    pub rear_slip: f32,
    pub traction_multiplier: f32,
}

/// Corrections for one wheel, applied next tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WheelCommand {
    pub motor_cut: f32,   // 0..1
    pub brake_cut: f32,   // 0..1
    pub extra_brake: f32, // Nm, ESP
    pub traction_multiplier: f32,
}

impl WheelCommand {
    fn neutral() -> Self {
        Self { traction_multiplier: 1.0, ..Default::default() }
    }
}

// ============================================
// Pure laws
// ============================================

/// Brake torque left after an ABS cut. Never more than the input.
#[inline]
pub fn cut_brake_abs(torque: f32, intensity: f32) -> f32 {
    (torque * (1.0 - intensity.clamp(0.0, 1.0))).max(0.0)
}

/// Motor torque left after a TCS cut.
#[inline]
pub fn cut_traction_tcs(torque: f32, intensity: f32) -> f32 {
    torque * (1.0 - intensity.clamp(0.0, 1.0))
}

/// ABS cut for one wheel, `None` when not triggered.
pub fn abs_cut(forward_slip: f32, brake_input: f32, threshold: f32, intensity: f32) -> Option<f32> {
    let demand = forward_slip.abs() * brake_input.clamp(0.0, 1.0);
    (brake_input > 0.0 && demand >= threshold).then(|| intensity.clamp(0.0, 1.0))
}

/// TCS cut for one wheel. Only slip in the direction of travel counts.
pub fn tcs_cut(forward_slip: f32, direction: f32, threshold: f32, intensity: f32) -> Option<f32> {
    let dir = if direction < 0.0 { -1.0 } else { 1.0 };
    let slip = forward_slip * dir;
    (slip >= threshold).then(|| (intensity * slip).clamp(0.0, 1.0))
}

/// Front sideways stiffness multiplier from the traction helper.
pub fn traction_multiplier(slip_angle: f32, steer_angle: f32, yaw_rate: f32, strength: f32) -> f32 {
    if slip_angle * steer_angle < 0.0 {
        1.0 - (strength * yaw_rate.abs()).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Heading angle about +Y of a forward vector.
#[inline]
pub fn heading(forward: Vec3) -> f32 {
    forward[0].atan2(forward[2])
}

fn wrap_angle(a: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    let mut a = a % tau;
    if a > std::f32::consts::PI {
        a -= tau;
    } else if a < -std::f32::consts::PI {
        a += tau;
    }
    a
}

// ============================================
// StabilityControl
// ============================================

#[derive(Clone, Debug)]
pub struct StabilityControl {
    config: StabilityConfig,
    state: StabilityState,
    commands: Vec<WheelCommand>,
    previous_heading: Option<f32>,
}

impl StabilityControl {
    pub fn new(config: StabilityConfig, wheel_count: usize) -> Self {
        Self {
            config,
            state: StabilityState { traction_multiplier: 1.0, ..Default::default() },
            commands: vec![WheelCommand::neutral(); wheel_count],
            previous_heading: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone(), self.commands.len());
    }

    pub fn config(&self) -> &StabilityConfig { &self.config }
    pub fn state(&self) -> &StabilityState { &self.state }
    pub fn commands(&self) -> &[WheelCommand] { &self.commands }

    pub fn set_enabled(&mut self, assist: Assist, enabled: bool) {
        self.config.set_enabled(assist, enabled);
        debug!(system = assist.as_str(), enabled, "assist toggled");
    }

    /// Flip one system, returns the new state.
    pub fn toggle(&mut self, assist: Assist) -> bool {
        let enabled = !self.config.is_enabled(assist);
        self.set_enabled(assist, enabled);
        enabled
    }

    /// ABS / TCS / ESP from the slip produced this tick.
    pub fn evaluate(&mut self, wheels: &[WheelContact], axles: &[Axle], brake_input: f32, direction: f32) {
        let cfg = &self.config;
        self.commands.clear();
        self.commands.resize(wheels.len(), WheelCommand::neutral());
        let mut state = StabilityState { traction_multiplier: 1.0, ..Default::default() };

        for axle in axles {
            for i in axle.wheels() {
                let Some(w) = wheels.get(i).filter(|w| w.is_enabled() && w.is_grounded()) else { continue };

                if cfg.abs && axle.is_brake() {
                    if let Some(cut) = abs_cut(w.forward_slip(), brake_input, cfg.abs_threshold, cfg.abs_intensity) {
                        self.commands[i].brake_cut = cut;
                        state.abs_engaged = true;
                    }
                }
                if cfg.tcs && axle.is_power() {
                    if let Some(cut) = tcs_cut(w.forward_slip(), direction, cfg.tcs_threshold, cfg.tcs_intensity) {
                        self.commands[i].motor_cut = cut;
                        state.tcs_engaged = true;
                    }
                }
            }
        }

        state.front_slip = mean_lateral_slip(wheels, axles, AxlePosition::Front);
        state.rear_slip = mean_lateral_slip(wheels, axles, AxlePosition::Rear);

        if cfg.esp {
            state.understeering = state.front_slip.abs() >= cfg.esp_threshold;
            state.oversteering = state.rear_slip.abs() >= cfg.esp_threshold;
            let torque = cfg.esp_brake_torque * cfg.esp_intensity;

            for axle in axles {
                let (left, right) = match axle.position() {
                    // brake the inner side to pull the nose in
                    AxlePosition::Front if state.understeering => {
                        (state.rear_slip.max(0.0), (-state.rear_slip).max(0.0))
                    }
                    // brake the outer side to stop the rotation
                    AxlePosition::Rear if state.oversteering => {
                        ((-state.front_slip).max(0.0), state.front_slip.max(0.0))
                    }
                    _ => continue,
                };
                for (index, share) in [(axle.config().left_wheel, left), (axle.config().right_wheel, right)] {
                    if let Some(cmd) = index.and_then(|i| self.commands.get_mut(i)) {
                        cmd.extra_brake += torque * share;
                    }
                }
            }
            state.esp_engaged = state.understeering || state.oversteering;
        }

        self.state = state;
    }

    /// Chassis-level helpers. Also fills the traction multiplier for front wheels.
    pub fn apply_helpers<H: ChassisBody + ?Sized>(
        &mut self,
        host: &mut H,
        wheels: &[WheelContact],
        axles: &[Axle],
        dt: f32,
    ) {
        let cfg = self.config.clone();
        let up = host.up();
        let forward = host.forward();
        let velocity = host.linear_velocity();
        let speed = v_dot(velocity, velocity).sqrt();
        let yaw_rate = v_dot(host.angular_velocity(), up);
        let front_steer = axles
            .iter()
            .find(|a| a.position() == AxlePosition::Front && a.config().is_steer)
            .map(|a| a.steer_angle())
            .unwrap_or(0.0);

        let active: Vec<&WheelContact> = wheels.iter().filter(|w| w.is_enabled()).collect();
        let all_grounded = !active.is_empty() && active.iter().all(|w| w.is_grounded());
        let any_grounded = active.iter().any(|w| w.is_grounded());

        // --------------------------------------------------
        // Steering helper
        // --------------------------------------------------
        let heading_now = heading(forward);
        if cfg.steering_helper && all_grounded {
            if let Some(prev) = self.previous_heading {
                let delta = wrap_angle(heading_now - prev);
                if delta.abs() < STEER_HELPER_MAX_DELTA && delta != 0.0 {
                    let turned = v_rotate(velocity, up, delta * cfg.steer_helper_strength.clamp(0.0, 1.0));
                    host.set_linear_velocity(turned);
                }
            }
        }
        self.previous_heading = Some(heading_now);

        // --------------------------------------------------
        // Traction helper
        // --------------------------------------------------
        let mut multiplier = 1.0;
        if cfg.traction_helper && any_grounded {
            let slip_angle = body_slip_angle(velocity, forward, up);
            multiplier = traction_multiplier(slip_angle, front_steer, yaw_rate, cfg.traction_helper_strength);
        }
        self.state.traction_multiplier = multiplier;
        for axle in axles.iter().filter(|a| a.position() == AxlePosition::Front) {
            for i in axle.wheels() {
                if let Some(cmd) = self.commands.get_mut(i) {
                    cmd.traction_multiplier = multiplier;
                }
            }
        }

        // --------------------------------------------------
        // Angular drag helper
        // --------------------------------------------------
        if cfg.angular_drag_helper {
            let kmh = speed * 3.6;
            host.set_angular_damping(lerp(0.0, 10.0, (kmh * cfg.angular_drag_strength / 1000.0).clamp(0.0, 1.0)));
        }

        // --------------------------------------------------
        // Turn helper
        // --------------------------------------------------
        if cfg.turn_helper && any_grounded && speed > HELPER_MIN_SPEED && v_dot(velocity, forward) > 0.0 {
            let (steer_dir, _) = wheel_basis(forward, host.right(), up, front_steer);
            let travel = v_norm(v_reject(velocity, up));
            let angle = v_dot(v_cross(travel, steer_dir), up).clamp(-1.0, 1.0).asin();
            let impulse = cfg.turn_helper_strength * angle * host.mass() * dt;
            if impulse.is_finite() && impulse != 0.0 {
                host.apply_torque_impulse(v_scale(up, impulse));
            }
        }
    }
}

fn mean_lateral_slip(wheels: &[WheelContact], axles: &[Axle], position: AxlePosition) -> f32 {
    let (sum, n) = axles
        .iter()
        .filter(|a| a.position() == position)
        .flat_map(|a| a.wheels())
        .filter_map(|i| wheels.get(i))
        .filter(|w| w.is_enabled() && w.is_grounded())
        .fold((0.0, 0usize), |(s, n), w| (s + w.lateral_slip(), n + 1));
    if n == 0 { 0.0 } else { sum / n as f32 }
}
