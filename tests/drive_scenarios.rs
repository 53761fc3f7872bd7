// ==============================================================================
// drive_scenarios.rs — WHOLE-VEHICLE RUNS ON THE FLAT-GROUND HOST
// ==============================================================================
// Every scenario drives Vehicle::tick against FlatGroundChassis at 50 Hz and
// checks what a driver would notice: launch, shifts, surfaces, reverse.
// ==============================================================================

use aven_drive::aven_tire::ground::GroundMaterials;
use aven_drive::aven_tire::types::{GroundSample, WheelId};
use aven_drive::drivetrain::{DifferentialType, GearState};
use aven_drive::events::VehicleEvent;
use aven_drive::vehicle::WheelSnapshot;
use aven_drive::{ChassisBody, FlatGroundChassis, Vehicle, VehicleCommand, VehicleConfig, VehicleInputs};
use rand::{Rng, SeedableRng, rngs::StdRng};

const DT: f32 = 0.02;

fn build(cfg: VehicleConfig) -> (Vehicle, FlatGroundChassis) {
    let host = FlatGroundChassis::new(cfg.mass, cfg.wheel_offsets());
    let vehicle = Vehicle::new(cfg, GroundMaterials::standard()).expect("valid config");
    (vehicle, host)
}

fn tick(v: &mut Vehicle, host: &mut FlatGroundChassis) {
    let samples = host.ground_samples();
    v.tick(host, &samples, DT);
    host.step(DT);
}

fn run(v: &mut Vehicle, host: &mut FlatGroundChassis, ticks: usize) {
    for _ in 0..ticks {
        tick(v, host);
    }
}

fn rear_slip(wheels: &[WheelSnapshot]) -> f32 {
    let rear: Vec<f32> = wheels
        .iter()
        .filter(|w| matches!(w.id, WheelId::RL | WheelId::RR))
        .map(|w| w.forward_slip)
        .collect();
    rear.iter().sum::<f32>() / rear.len().max(1) as f32
}

/// Manual box, short first gear, locked rear axle: the launch spins the rears.
fn launch_config() -> VehicleConfig {
    let mut cfg = VehicleConfig::gt86();
    cfg.gearbox.automatic = false;
    cfg.gearbox.ratios[0] = 4.35;
    cfg.axles[1].differential.kind = DifferentialType::Direct;
    cfg.stability.tcs = true;
    cfg.stability.tcs_threshold = 0.35;
    cfg
}

#[test]
fn full_throttle_launch_is_caught_by_traction_control() {
    let (mut v, mut host) = build(launch_config());
    v.command(VehicleCommand::ShiftToGear { index: 0 });
    run(&mut v, &mut host, 20);
    assert_eq!(v.gearbox().state(), GearState::Forward(0));

    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });

    let ticks = (2.0 / DT) as usize;
    let early = (1.0 / DT) as usize;
    let mut early_max_slip = 0.0f32;
    let mut tcs_seen = false;
    let mut torque_seen = false;
    for i in 0..ticks {
        tick(&mut v, &mut host);
        let st = v.state();
        torque_seen |= st.wheel_torque_total > 0.0;
        if i < early {
            early_max_slip = early_max_slip.max(rear_slip(&st.wheels));
            tcs_seen |= st.tcs_engaged;
        }
    }

    let st = v.state();
    assert!(torque_seen, "no drive torque reached the wheels");
    assert!(early_max_slip > 0.5, "early slip {early_max_slip}");
    assert!(tcs_seen, "TCS never engaged during the launch");
    let final_slip = rear_slip(&st.wheels);
    assert!(final_slip < early_max_slip, "final {final_slip} vs early {early_max_slip}");
    assert!(st.engine_rpm > 1500.0, "rpm {}", st.engine_rpm);
    assert!(host.forward_speed() > 0.0);
}

#[test]
fn launch_holds_revs_above_the_bite_point() {
    let (mut v, mut host) = build(launch_config());
    let engage_rpm = v.config().clutch.engage_rpm;
    v.command(VehicleCommand::ShiftToGear { index: 0 });
    run(&mut v, &mut host, 20);

    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    run(&mut v, &mut host, 25);
    let mut speeds = Vec::new();
    for i in 0..75 {
        tick(&mut v, &mut host);
        let rpm = v.state().engine_rpm;
        assert!(rpm > engage_rpm, "bogged to {rpm} rpm at tick {i}");
        assert!(v.state().gearbox_torque > 0.0, "clutch opened at tick {i}");
        if i % 25 == 24 {
            speeds.push(host.forward_speed());
        }
    }
    assert!(speeds.windows(2).all(|w| w[1] > w[0]), "{speeds:?}");
}

#[test]
fn launch_without_traction_control_keeps_spinning() {
    let mut cfg = launch_config();
    cfg.stability.tcs = false;
    let (mut v, mut host) = build(cfg);
    v.command(VehicleCommand::ShiftToGear { index: 0 });
    run(&mut v, &mut host, 20);

    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    let mut tcs_seen = false;
    let mut max_slip = 0.0f32;
    for _ in 0..50 {
        tick(&mut v, &mut host);
        tcs_seen |= v.state().tcs_engaged;
        max_slip = max_slip.max(rear_slip(&v.state().wheels));
    }
    assert!(!tcs_seen);
    assert!(max_slip > 0.5, "slip {max_slip}");
    assert!(v.state().wheels.iter().all(|w| w.motor_torque >= 0.0));
}

#[test]
fn double_shift_request_moves_one_gear() {
    let (mut v, mut host) = build(launch_config());
    v.command(VehicleCommand::ShiftToGear { index: 0 });
    run(&mut v, &mut host, 20);
    v.drain_events();

    let shifting_time = v.config().gearbox.shifting_time;
    v.command(VehicleCommand::ShiftUp);
    run(&mut v, &mut host, 2);
    assert!(2.0 * DT < shifting_time / 2.0);
    assert!(v.state().shifting);
    v.command(VehicleCommand::ShiftUp);
    run(&mut v, &mut host, 50);

    assert_eq!(v.gearbox().state(), GearState::Forward(1));
    let changes: Vec<_> = v
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, VehicleEvent::GearChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![VehicleEvent::GearChanged { from: GearState::Forward(0), to: GearState::Forward(1) }]
    );
}

#[test]
fn no_torque_reaches_the_wheels_mid_shift() {
    let (mut v, mut host) = build(launch_config());
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    v.command(VehicleCommand::ShiftToGear { index: 0 });
    tick(&mut v, &mut host);
    assert!(v.state().shifting);
    assert_eq!(v.state().gearbox_torque, 0.0);
    assert_eq!(v.state().wheel_torque_total, 0.0);
}

#[test]
fn rev_limiter_holds_in_neutral() {
    let (mut v, mut host) = build(launch_config());
    let max_rpm = v.config().engine.max_rpm;
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    for _ in 0..(10.0 / DT) as usize {
        tick(&mut v, &mut host);
        let rpm = v.state().engine_rpm;
        assert!(rpm.is_finite() && rpm <= max_rpm + 1e-3, "rpm {rpm}");
    }
    assert_eq!(v.gearbox().state(), GearState::Neutral);
    assert!(host.speed() < 0.1);
}

#[test]
fn ice_gives_less_acceleration_than_asphalt() {
    let speed_after = |ground: usize| {
        let (mut v, mut host) = build(VehicleConfig::gt86());
        host.set_ground_index_all(ground);
        v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
        run(&mut v, &mut host, 100);
        assert!(v.state().wheels.iter().all(|w| w.ground_index == ground));
        host.forward_speed()
    };
    let asphalt = speed_after(0);
    let ice = speed_after(3);
    assert!(asphalt > 0.0 && ice > 0.0);
    assert!(asphalt > ice * 1.5, "asphalt {asphalt} ice {ice}");
}

#[test]
fn holding_brake_at_standstill_reverses_an_automatic() {
    let (mut v, mut host) = build(VehicleConfig::gt86());
    v.set_inputs(VehicleInputs { brake: 1.0, ..Default::default() });
    run(&mut v, &mut host, (3.0 / DT) as usize);

    assert_eq!(v.gearbox().state(), GearState::Reverse);
    assert_eq!(v.state().direction, -1.0);
    assert_eq!(v.state().gear_state, "R");
    assert!(host.forward_speed() < -0.5, "speed {}", host.forward_speed());
    assert!(v.state().wheels.iter().all(|w| w.motor_torque <= 0.0));
}

#[test]
fn stopped_engine_does_not_drive() {
    let (mut v, mut host) = build(VehicleConfig::gt86());
    v.command(VehicleCommand::StopEngine);
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    run(&mut v, &mut host, 50);
    assert!(!v.state().engine_running);
    assert!(host.speed() < 0.1);

    v.command(VehicleCommand::StartEngine);
    run(&mut v, &mut host, 150);
    assert!(v.state().engine_running);
    assert!(host.forward_speed() > 1.0);
}

#[test]
fn front_drive_preset_pulls_with_the_front_axle() {
    let (mut v, mut host) = build(VehicleConfig::hatchback_fwd());
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    run(&mut v, &mut host, 100);
    let wheels = &v.state().wheels;
    assert!(wheels[0].motor_torque > 0.0 || wheels[1].motor_torque > 0.0);
    assert_eq!(wheels[2].motor_torque, 0.0);
    assert_eq!(wheels[3].motor_torque, 0.0);
    assert!(host.forward_speed() > 2.0);
}

#[test]
fn poisoned_samples_never_reach_the_host() {
    let (mut v, mut host) = build(VehicleConfig::gt86());
    v.set_inputs(VehicleInputs { throttle: 1.0, steer: 0.5, ..Default::default() });
    for i in 0..100 {
        let mut samples = host.ground_samples();
        if i % 7 == 0 {
            samples[1].load = f32::NAN;
            samples[2].point = [f32::INFINITY, 0.0, 0.0];
        }
        v.tick(&mut host, &samples, DT);
        host.step(DT);
    }
    let vel = host.linear_velocity();
    assert!(vel.iter().all(|c| c.is_finite()));
    assert!(host.yaw_rate().is_finite());
    assert!(v.state().engine_rpm.is_finite());
}

#[test]
fn missing_samples_count_as_airborne() {
    let (mut v, mut host) = build(VehicleConfig::gt86());
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    let samples: Vec<GroundSample> = host.ground_samples().into_iter().take(2).collect();
    v.tick(&mut host, &samples, DT);
    let wheels = &v.state().wheels;
    assert!(wheels[0].grounded && wheels[1].grounded);
    assert!(!wheels[2].grounded && !wheels[3].grounded);
}

#[test]
fn random_driving_stays_finite() {
    let mut rng = StdRng::seed_from_u64(7);
    let (mut v, mut host) = build(VehicleConfig::gt86());
    for i in 0..1500 {
        if i % 25 == 0 {
            v.set_inputs(VehicleInputs {
                throttle: rng.gen_range(0.0..1.0),
                brake: if rng.gen_bool(0.2) { rng.gen_range(0.0..1.0) } else { 0.0 },
                steer: rng.gen_range(-1.0..1.0),
                handbrake: if rng.gen_bool(0.1) { 1.0 } else { 0.0 },
                ..Default::default()
            });
        }
        if i % 200 == 0 {
            host.set_ground_index_all(rng.gen_range(0..4));
        }
        tick(&mut v, &mut host);

        let st = v.state();
        assert!(st.engine_rpm.is_finite() && st.engine_rpm <= v.config().engine.max_rpm + 1e-3);
        assert!(st.speed_kmh.is_finite());
        for w in &st.wheels {
            assert!(w.total_slip.is_finite());
            assert!(w.brake_torque >= 0.0);
        }
    }
}

#[test]
fn reset_restores_spawn_state_but_keeps_the_tick_count() {
    let (mut v, mut host) = build(VehicleConfig::gt86());
    v.set_inputs(VehicleInputs { throttle: 1.0, ..Default::default() });
    run(&mut v, &mut host, 30);
    assert_eq!(v.ticks(), 30);

    v.reset();
    assert_eq!(v.ticks(), 30);
    assert_eq!(*v.inputs(), VehicleInputs::default());
    assert!(v.engine().is_running());
    assert_eq!(v.gearbox().state(), GearState::Forward(0));
}
