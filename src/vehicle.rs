// ==============================================================================
// vehicle.rs — ONE VEHICLE: ASSEMBLY + FIXED-ORDER TICK PIPELINE
// ==============================================================================
// Vehicle::tick(host, samples, dt), strictly in this order:
//
//    1) commands, input clamping, reverse pedal swap (automatic only)
//    2) ground samples → wheels
//    3) axles: inputs + steering rack
//    4) engine    (clutch of last tick, wheel rpm projected through the ratios)
//    5) clutch    update + transmit
//    6) gearbox   update + transmit
//    7) differentials (gearbox torque shared evenly by powered axles)
//    8) axles distribute; last tick's stability commands applied to wheels
//    9) wheel contact → impulses on the host (non-finite impulses dropped)
//   10) anti-roll impulses
//   11) grounded flags
//   12) stability evaluation + chassis helpers (consumed next tick)
//   13) VehicleState snapshot
//
// The vehicle owns no rigid body. Everything physical goes through ChassisBody.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::aven_tire::ground::GroundMaterials;
use crate::aven_tire::types::{GroundSample, Vec3, WheelId, v_dot, v_is_finite};
use crate::aven_tire::wheel::{ContactFrame, WheelContact};
use crate::config::VehicleConfig;
use crate::drivetrain::axle::Axle;
use crate::drivetrain::clutch::{Clutch, ClutchInputs};
use crate::drivetrain::differential::Differential;
use crate::drivetrain::engine::{Engine, EngineInputs};
use crate::drivetrain::gearbox::{GearState, Gearbox, GearboxInputs};
use crate::error::ConfigError;
use crate::events::{EventQueue, VehicleEvent};
use crate::host::ChassisBody;
use crate::stability::{Assist, StabilityControl};

const MS_TO_KMH: f32 = 3.6;

/// Normalised driver inputs, clamped at the start of every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleInputs {
    pub throttle: f32,  // 0..1
    pub brake: f32,     // 0..1
    pub steer: f32,     // -1 (left) .. 1 (right)
    pub handbrake: f32, // 0..1
    pub clutch: f32,    // 0..1, manual clutch only
    pub boost: f32,     // 0..1, NOS
}

impl VehicleInputs {
    pub fn clamped(&self) -> Self {
        let unit = |v: f32, min: f32| if v.is_finite() { v.clamp(min, 1.0) } else { 0.0 };
        Self {
            throttle: unit(self.throttle, 0.0),
            brake: unit(self.brake, 0.0),
            steer: unit(self.steer, -1.0),
            handbrake: unit(self.handbrake, 0.0),
            clutch: unit(self.clutch, 0.0),
            boost: unit(self.boost, 0.0),
        }
    }
}

/// Discrete requests, applied at the start of the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VehicleCommand {
    StartEngine,
    StopEngine,
    ShiftUp,
    ShiftDown,
    ShiftToGear { index: usize },
    ShiftReverse,
    ShiftToNeutral,
    ToggleAssist { assist: Assist },
    SetAssist { assist: Assist, enabled: bool },
    DeflateTire { wheel: WheelId },
    InflateTire { wheel: WheelId },
    SetWheelEnabled { wheel: WheelId, enabled: bool },
}

// ============================================
// Observable snapshot
// ============================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WheelSnapshot {
    pub id: WheelId,
    pub rpm: f32,
    pub forward_slip: f32,
    pub lateral_slip: f32,
    pub total_slip: f32,
    pub skidding: bool,
    pub deflated: bool,
    pub grounded: bool,
    pub ground_index: usize,
    pub motor_torque: f32, // Nm
    pub brake_torque: f32, // Nm
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VehicleState {
    pub engine_rpm: f32,
    pub speed_kmh: f32,
    pub direction: f32,
    pub current_gear: usize,
    pub gear_ratio: f32,
    pub gear_state: String,
    pub shifting: bool,
    pub engine_running: bool,

    pub engine_torque: f32,
    pub clutch_torque: f32,
    pub gearbox_torque: f32,
    pub differential_torque: f32,
    pub wheel_torque_total: f32,

    pub turbo_psi: f32,
    pub nos_remaining: f32,

    pub abs_engaged: bool,
    pub tcs_engaged: bool,
    pub esp_engaged: bool,
    pub understeering: bool,
    pub oversteering: bool,

    pub wheels: Vec<WheelSnapshot>,
}

// ============================================
// Vehicle
// ============================================

#[derive(Clone, Debug)]
pub struct Vehicle {
    config: VehicleConfig,
    materials: GroundMaterials,

    wheels: Vec<WheelContact>,
    axles: Vec<Axle>,
    differentials: Vec<Differential>, // one per axle, used when the axle is powered
    engine: Engine,
    clutch: Clutch,
    gearbox: Gearbox,
    stability: StabilityControl,

    inputs: VehicleInputs,
    commands: Vec<VehicleCommand>,
    events: EventQueue,
    state: VehicleState,
    ticks: u64,
}

impl Vehicle {
    /// Assemble from a config. The config is sanitised first.
    pub fn new(mut config: VehicleConfig, materials: GroundMaterials) -> Result<Self, ConfigError> {
        config.sanitize()?;

        let wheels = config.wheels.iter().map(|w| WheelContact::new(w.id, w.tire.clone())).collect();
        let axles = config.axles.iter().cloned().map(Axle::new).collect();
        let differentials = config.axles.iter().map(|a| Differential::new(a.differential.clone())).collect();

        let mut vehicle = Self {
            engine: Engine::new(config.engine.clone()),
            clutch: Clutch::new(config.clutch.clone()),
            gearbox: Gearbox::new(config.gearbox.clone()),
            stability: StabilityControl::new(config.stability.clone(), config.wheels.len()),
            config,
            materials,
            wheels,
            axles,
            differentials,
            inputs: VehicleInputs::default(),
            commands: Vec::new(),
            events: EventQueue::default(),
            state: VehicleState::default(),
            ticks: 0,
        };
        vehicle.reset();
        info!(
            name = %vehicle.config.name,
            wheels = vehicle.wheels.len(),
            axles = vehicle.axles.len(),
            "vehicle assembled"
        );
        Ok(vehicle)
    }

    /// Back to spawn state. The engine comes back running when `auto_start` is set.
    pub fn reset(&mut self) {
        self.wheels.iter_mut().for_each(WheelContact::reset);
        self.axles.iter_mut().for_each(Axle::reset);
        self.differentials = self.config.axles.iter().map(|a| Differential::new(a.differential.clone())).collect();
        self.engine.reset(self.config.engine.auto_start);
        self.clutch.reset();
        self.gearbox.reset();
        self.stability.reset();
        self.inputs = VehicleInputs::default();
        self.commands.clear();
        self.state = VehicleState::default();
    }

    // --------------------------------------------------
    // Accessors
    // --------------------------------------------------

    pub fn config(&self) -> &VehicleConfig { &self.config }
    pub fn materials(&self) -> &GroundMaterials { &self.materials }
    pub fn wheels(&self) -> &[WheelContact] { &self.wheels }
    pub fn axles(&self) -> &[Axle] { &self.axles }
    pub fn differentials(&self) -> &[Differential] { &self.differentials }
    pub fn engine(&self) -> &Engine { &self.engine }
    pub fn clutch(&self) -> &Clutch { &self.clutch }
    pub fn gearbox(&self) -> &Gearbox { &self.gearbox }
    pub fn stability(&self) -> &StabilityControl { &self.stability }
    pub fn inputs(&self) -> &VehicleInputs { &self.inputs }
    pub fn state(&self) -> &VehicleState { &self.state }
    pub fn ticks(&self) -> u64 { self.ticks }

    pub fn wheel(&self, id: WheelId) -> Option<&WheelContact> {
        self.wheels.iter().find(|w| w.id() == id)
    }

    fn wheel_index(&self, id: WheelId) -> Option<usize> {
        self.wheels.iter().position(|w| w.id() == id)
    }

    // --------------------------------------------------
    // Driver interface
    // --------------------------------------------------

    pub fn set_inputs(&mut self, inputs: VehicleInputs) {
        self.inputs = inputs;
    }

    pub fn command(&mut self, command: VehicleCommand) {
        self.commands.push(command);
    }

    /// One-tick engine torque multiplier from outside (damage, scripted boosts).
    pub fn set_torque_multiplier(&mut self, m: f32) {
        self.engine.set_torque_multiplier(m);
    }

    /// Events raised since the last drain.
    pub fn drain_events(&mut self) -> Vec<VehicleEvent> {
        self.events.drain().collect()
    }

    /// Live on/off guard. Indices held by axles stay valid.
    pub fn set_wheel_enabled(&mut self, id: WheelId, enabled: bool) {
        let Some(i) = self.wheel_index(id) else {
            warn!(wheel = %id, "no such wheel");
            return;
        };
        if self.wheels[i].is_enabled() == enabled {
            return;
        }
        self.wheels[i].set_enabled(enabled);
        debug!(wheel = %id, enabled, "wheel toggled");
        self.events.push(VehicleEvent::WheelEnabled { wheel: id, enabled });
    }

    pub fn deflate(&mut self, id: WheelId) {
        if let Some(i) = self.wheel_index(id) {
            if self.wheels[i].deflate() {
                self.events.push(VehicleEvent::TireDeflated { wheel: id });
            }
        }
    }

    pub fn inflate(&mut self, id: WheelId) {
        if let Some(i) = self.wheel_index(id) {
            if self.wheels[i].inflate() {
                self.events.push(VehicleEvent::TireInflated { wheel: id });
            }
        }
    }

    fn set_assist(&mut self, assist: Assist, enabled: bool) {
        self.stability.set_enabled(assist, enabled);
        self.events.push(VehicleEvent::AssistToggled { system: assist.as_str().to_string(), enabled });
    }

    fn apply_commands(&mut self) {
        let commands = std::mem::take(&mut self.commands);
        for command in commands {
            match command {
                VehicleCommand::StartEngine => self.engine.start(),
                VehicleCommand::StopEngine => self.engine.stop(&mut self.events),
                VehicleCommand::ShiftUp => {
                    self.gearbox.shift_up();
                }
                VehicleCommand::ShiftDown => {
                    self.gearbox.shift_down();
                }
                VehicleCommand::ShiftToGear { index } => {
                    self.gearbox.shift_to_gear(index);
                }
                VehicleCommand::ShiftReverse => {
                    self.gearbox.shift_reverse();
                }
                VehicleCommand::ShiftToNeutral => {
                    self.gearbox.shift_to_neutral();
                }
                VehicleCommand::ToggleAssist { assist } => {
                    let enabled = !self.stability.config().is_enabled(assist);
                    self.set_assist(assist, enabled);
                }
                VehicleCommand::SetAssist { assist, enabled } => self.set_assist(assist, enabled),
                VehicleCommand::DeflateTire { wheel } => self.deflate(wheel),
                VehicleCommand::InflateTire { wheel } => self.inflate(wheel),
                VehicleCommand::SetWheelEnabled { wheel, enabled } => self.set_wheel_enabled(wheel, enabled),
            }
        }
    }

    // --------------------------------------------------
    // Drivetrain helpers
    // --------------------------------------------------

    /// Mean driven wheel rpm on the gearbox side of the differentials.
    fn driven_wheel_rpm(&self) -> f32 {
        let (sum, n) = self
            .axles
            .iter()
            .zip(&self.differentials)
            .filter(|(a, _)| a.is_power())
            .map(|(a, d)| {
                let (l, r) = a.wheel_rpms(&self.wheels);
                (l + r) * 0.5 * d.final_drive()
            })
            .fold((0.0, 0usize), |(s, n), rpm| (s + rpm, n + 1));
        if n == 0 { 0.0 } else { sum / n as f32 }
    }

    /// Mean surface speed of the enabled driven wheels (km/h).
    fn driven_wheel_speed_kmh(&self) -> f32 {
        let (sum, n) = self
            .axles
            .iter()
            .filter(|a| a.is_power())
            .flat_map(|a| a.wheels())
            .filter_map(|i| self.wheels.get(i))
            .filter(|w| w.is_enabled())
            .fold((0.0, 0usize), |(s, n), w| (s + w.angular_velocity() * w.radius(), n + 1));
        if n == 0 { 0.0 } else { sum / n as f32 * MS_TO_KMH }
    }

    // ============================================
    // Tick
    // ============================================

    /// Advance one fixed step. `samples[i]` is the suspension contact of wheel i;
    /// missing samples count as airborne.
    pub fn tick<H: ChassisBody + ?Sized>(&mut self, host: &mut H, samples: &[GroundSample], dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            warn!(dt, "skipping tick with invalid dt");
            return;
        }
        self.ticks += 1;

        // 1) commands + inputs
        self.apply_commands();
        let raw = self.inputs.clamped();
        let reversing = self.config.gearbox.automatic && self.gearbox.state() == GearState::Reverse;
        let (throttle, brake) = if reversing { (raw.brake, raw.throttle) } else { (raw.throttle, raw.brake) };
        let speed_kmh = host.forward_speed() * MS_TO_KMH;

        // 2) contact
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            wheel.set_ground_sample(samples.get(i).copied().unwrap_or_else(GroundSample::airborne));
        }

        // 3) steering
        for axle in &mut self.axles {
            axle.receive_inputs(throttle, brake, raw.steer, raw.handbrake);
            axle.update_steering(&mut self.wheels, dt);
        }

        // 4) engine
        let wheel_rpm_projected = self.driven_wheel_rpm() * self.gearbox.current_ratio().abs();
        self.engine.update(
            &EngineInputs {
                throttle,
                boost: raw.boost,
                clutch: self.clutch.input(),
                gear_engaged: self.gearbox.gear_engaged(),
                wheel_rpm_projected,
            },
            dt,
            &mut self.events,
        );

        // 5) clutch
        self.clutch.update(
            &ClutchInputs {
                engine_rpm: self.engine.rpm(),
                speed_kmh,
                throttle,
                handbrake: raw.handbrake,
                shifting: self.gearbox.is_shifting(),
                manual_clutch: raw.clutch,
            },
            dt,
        );
        let clutch_torque = self.clutch.transmit(self.engine.produced_torque());

        // 6) gearbox (automatic policy sees the pedals as pressed)
        let wheel_speed_kmh = self.driven_wheel_speed_kmh();
        self.gearbox.update(
            &GearboxInputs {
                engine_rpm: self.engine.rpm(),
                wheel_speed_kmh,
                vehicle_speed_kmh: speed_kmh,
                throttle: raw.throttle,
                brake: raw.brake,
            },
            dt,
            &mut self.events,
        );
        let gearbox_torque = self.gearbox.transmit(clutch_torque);
        let direction = self.gearbox.direction();

        // 7 + 8) differentials → axles → wheel accumulators
        let powered = self.axles.iter().filter(|a| a.is_power()).count();
        let share = if powered > 0 { gearbox_torque / powered as f32 } else { 0.0 };
        let mut differential_torque = 0.0;
        for (axle, diff) in self.axles.iter_mut().zip(&mut self.differentials) {
            if axle.is_power() {
                let (l_rpm, r_rpm) = axle.wheel_rpms(&self.wheels);
                let (l, r) = diff.split(share, l_rpm, r_rpm);
                differential_torque += diff.produced_torque();
                axle.receive_drive_torque(l, r);
            }
            axle.distribute(&mut self.wheels, direction);
        }

        for (wheel, cmd) in self.wheels.iter_mut().zip(self.stability.commands()) {
            wheel.set_stability_cuts(cmd.motor_cut, cmd.brake_cut);
            if cmd.extra_brake > 0.0 {
                wheel.accumulate_stability_brake_torque(cmd.extra_brake);
            }
            wheel.set_traction_multiplier(cmd.traction_multiplier);
        }

        // 9) wheel contact
        let enabled = self.wheels.iter().filter(|w| w.is_enabled()).count().max(1);
        let mass_share = host.mass() / enabled as f32;
        let (forward, right) = (host.forward(), host.right());
        let mut wheel_torque_total = 0.0;
        for wheel in &mut self.wheels {
            let frame = ContactFrame {
                point_velocity: host.point_velocity(wheel.ground_sample().point),
                chassis_forward: forward,
                chassis_right: right,
                mass_share,
            };
            let forces = wheel.step(&frame, &self.materials, dt);
            wheel_torque_total += wheel.applied_motor_torque();
            apply_impulse(host, forces.impulse, forces.at_point, wheel.id().as_str());
        }

        // 10) anti-roll
        for axle in &mut self.axles {
            if let Some(pair) = axle.anti_roll(&self.wheels, dt) {
                for arb in pair {
                    apply_impulse(host, arb.impulse, arb.at_point, "anti_roll");
                }
            }
        }

        // 11) grounded
        for axle in &mut self.axles {
            axle.update_grounded(&self.wheels);
        }

        // 12) stability, consumed next tick
        self.stability.evaluate(&self.wheels, &self.axles, brake, direction);
        self.stability.apply_helpers(host, &self.wheels, &self.axles, dt);

        // 13) snapshot
        self.state = self.snapshot(
            v_dot(host.linear_velocity(), forward) * MS_TO_KMH,
            clutch_torque,
            gearbox_torque,
            differential_torque,
            wheel_torque_total,
        );
        trace!(
            rpm = self.state.engine_rpm,
            speed = self.state.speed_kmh,
            gear = %self.state.gear_state,
            "vehicle tick"
        );
    }

    fn snapshot(
        &self,
        speed_kmh: f32,
        clutch_torque: f32,
        gearbox_torque: f32,
        differential_torque: f32,
        wheel_torque_total: f32,
    ) -> VehicleState {
        let st = self.stability.state();
        VehicleState {
            engine_rpm: self.engine.rpm(),
            speed_kmh,
            direction: self.gearbox.direction(),
            current_gear: self.gearbox.current_gear(),
            gear_ratio: self.gearbox.current_ratio(),
            gear_state: self.gearbox.state().to_string(),
            shifting: self.gearbox.is_shifting(),
            engine_running: self.engine.is_running(),
            engine_torque: self.engine.produced_torque(),
            clutch_torque,
            gearbox_torque,
            differential_torque,
            wheel_torque_total,
            turbo_psi: self.engine.turbo_psi(),
            nos_remaining: self.engine.nos_remaining(),
            abs_engaged: st.abs_engaged,
            tcs_engaged: st.tcs_engaged,
            esp_engaged: st.esp_engaged,
            understeering: st.understeering,
            oversteering: st.oversteering,
            wheels: self
                .wheels
                .iter()
                .map(|w| WheelSnapshot {
                    id: w.id(),
                    rpm: w.rpm(),
                    forward_slip: w.forward_slip(),
                    lateral_slip: w.lateral_slip(),
                    total_slip: w.total_slip(),
                    skidding: w.is_skidding(),
                    deflated: w.is_deflated(),
                    grounded: w.is_grounded(),
                    ground_index: w.ground_sample().ground_index,
                    motor_torque: w.applied_motor_torque(),
                    brake_torque: w.applied_brake_torque(),
                })
                .collect(),
        }
    }
}

/// Hand an impulse to the host unless it would poison the solver.
fn apply_impulse<H: ChassisBody + ?Sized>(host: &mut H, impulse: Vec3, point: Vec3, source: &str) {
    if !v_is_finite(impulse) || !v_is_finite(point) {
        warn!(source, ?impulse, "dropping non-finite impulse");
        return;
    }
    if impulse == [0.0; 3] {
        return;
    }
    host.apply_impulse_at_point(impulse, point);
}
