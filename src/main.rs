use std::path::PathBuf;

use aven_drive::config::VehicleConfig;
use aven_drive::physics::PhysicsWorld;
use aven_drive::vehicle::VehicleInputs;
use clap::Parser;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{Level, error, info, trace};

/// Headless fixed-timestep driver: spawns vehicles and runs a scripted lap.
#[derive(Parser, Debug)]
#[command(name = "drive-server", version, about)]
struct Args {
    /// Built-in preset (gt86, hatchback)
    #[arg(long, default_value = "gt86")]
    preset: String,

    /// JSON vehicle config, overrides --preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 10.0)]
    seconds: f32,

    /// Physics rate
    #[arg(long, default_value_t = 60)]
    hz: u32,

    /// Vehicles to spawn side by side
    #[arg(long, default_value_t = 1)]
    vehicles: usize,

    /// Log per-event detail
    #[arg(long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Option<VehicleConfig> {
    if let Some(path) = &args.config {
        return match VehicleConfig::load(path) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                error!(%err, "could not load vehicle config");
                None
            }
        };
    }
    let preset = VehicleConfig::preset(&args.preset);
    if preset.is_none() {
        error!(preset = %args.preset, "unknown preset");
    }
    preset
}

/// Throttle on, a gentle weave after two seconds, brake for the last second.
fn scripted_inputs(t: f32, total: f32) -> VehicleInputs {
    if t > total - 1.0 {
        return VehicleInputs { brake: 1.0, ..Default::default() };
    }
    let steer = if t > 2.0 { (t * 0.8).sin() * 0.4 } else { 0.0 };
    VehicleInputs { throttle: 1.0, steer, ..Default::default() }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    info!("starting drive server");

    let Some(config) = load_config(&args) else { std::process::exit(2) };

    let mut world = PhysicsWorld::default();
    for i in 0..args.vehicles.max(1) {
        let id = format!("car-{i}");
        let x = i as f32 * 4.0;
        if let Err(err) = world.spawn_vehicle(&id, config.clone(), [x, 1.0, 0.0]) {
            error!(%err, %id, "spawn failed");
            std::process::exit(2);
        }
    }

    let hz = args.hz.max(1);
    let dt = 1.0 / hz as f32;
    let total_ticks = (args.seconds.max(0.0) * hz as f32).round() as u64;

    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for tick in 0..total_ticks {
        ticker.tick().await;

        let t = tick as f32 * dt;
        let inputs = scripted_inputs(t, args.seconds);
        for id in world.vehicle_ids() {
            world.set_inputs(&id, inputs);
        }

        world.step(dt);

        let snapshot = world.snapshot();
        for v in &snapshot.vehicles {
            for event in &v.events {
                info!(vehicle = %v.id, ?event, "event");
            }
        }
        if tick % hz as u64 == 0 {
            for v in &snapshot.vehicles {
                info!(
                    vehicle = %v.id,
                    t,
                    rpm = v.state.engine_rpm as i32,
                    kmh = v.state.speed_kmh as i32,
                    gear = %v.state.gear_state,
                    tcs = v.state.tcs_engaged,
                    abs = v.state.abs_engaged,
                    esp = v.state.esp_engaged,
                    "status"
                );
            }
        }
        match snapshot.to_json() {
            Ok(json) => trace!(%json, "snapshot"),
            Err(err) => error!(%err, "snapshot serialisation failed"),
        }
    }

    info!(ticks = total_ticks, "run complete");
}
