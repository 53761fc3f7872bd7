// ==============================================================================
// config.rs — VEHICLE PARAMETER TREE + PRESETS
// ==============================================================================
// One serde tree per vehicle, consumed once at assembly time. Every struct
// is #[serde(default)] so a JSON override only needs the fields it changes.
//
// Loading is the only fallible path. Degenerate values are repaired with a
// warning in sanitize(); a vehicle without wheels is rejected.
//
// Chassis local frame: x left, y up, z forward.
// ==============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aven_tire::steering::SteeringConfig;
use crate::aven_tire::types::{Vec3, WheelId};
use crate::aven_tire::wheel::WheelConfig;
use crate::drivetrain::axle::{AxleConfig, AxlePosition};
use crate::drivetrain::clutch::ClutchConfig;
use crate::drivetrain::differential::{DifferentialConfig, DifferentialType};
use crate::drivetrain::engine::{EngineConfig, TorqueCurve, TurboConfig};
use crate::drivetrain::gearbox::GearboxConfig;
use crate::error::ConfigError;
use crate::stability::StabilityConfig;
use crate::suspension_contact::SuspensionConfig;

const DEFAULT_RADIUS: f32 = 0.33; // m
const DEFAULT_MASS: f32 = 1350.0; // kg

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub half_extents: [f32; 3], // [hx, hy, hz] meters
    pub com_offset: [f32; 3],   // local offset from collider center
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            half_extents: [1.0, 0.35, 2.1],
            com_offset: [0.0, -0.15, 0.0],
            linear_damping: 0.05,
            angular_damping: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelSetup {
    pub id: WheelId,
    pub offset: Vec3, // chassis local mount
    #[serde(default)]
    pub tire: WheelConfig,
    #[serde(default)]
    pub suspension: SuspensionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub name: String,
    pub mass: f32, // kg
    pub chassis: ChassisConfig,
    pub wheels: Vec<WheelSetup>,
    pub axles: Vec<AxleConfig>,
    pub engine: EngineConfig,
    pub clutch: ClutchConfig,
    pub gearbox: GearboxConfig,
    pub stability: StabilityConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self::gt86()
    }
}

impl VehicleConfig {
    // ============================================
    // Presets
    // ============================================

    /// Rear-drive coupe, the reference car.
    pub fn gt86() -> Self {
        let mass = 1350.0;
        let (wheelbase, track) = (2.57, 1.52);
        let suspension = SuspensionConfig::from_sag(mass, 4, 0.05, 0.9);
        let tire = WheelConfig { radius: 0.32, inertia: 1.1, ..Default::default() };

        Self {
            name: "gt86".to_string(),
            mass,
            chassis: ChassisConfig::default(),
            wheels: four_wheels(wheelbase, track, -0.3, &tire, &suspension),
            axles: vec![
                AxleConfig {
                    position: AxlePosition::Front,
                    left_wheel: Some(0),
                    right_wheel: Some(1),
                    is_steer: true,
                    max_brake_torque: 3600.0,
                    anti_roll_force: 6000.0,
                    steering: SteeringConfig { wheelbase, track_width: track, ..Default::default() },
                    ..Default::default()
                },
                AxleConfig {
                    position: AxlePosition::Rear,
                    left_wheel: Some(2),
                    right_wheel: Some(3),
                    is_power: true,
                    is_handbrake: true,
                    max_brake_torque: 2400.0,
                    anti_roll_force: 4000.0,
                    differential: DifferentialConfig {
                        kind: DifferentialType::Limited,
                        final_drive: 4.1,
                        limited_slip_ratio: 80.0,
                    },
                    ..Default::default()
                },
            ],
            engine: EngineConfig {
                max_torque: 212.0,
                max_rpm: 7500.0,
                torque_curve: TorqueCurve::new(vec![
                    [0.0, 0.55],
                    [2000.0, 0.8],
                    [4000.0, 0.85],
                    [6400.0, 1.0],
                    [7500.0, 0.9],
                ]),
                ..Default::default()
            },
            clutch: ClutchConfig::default(),
            gearbox: GearboxConfig {
                ratios: vec![3.626, 2.188, 1.541, 1.213, 1.0, 0.767],
                ..Default::default()
            },
            stability: StabilityConfig::default(),
        }
    }

    /// Front-drive hatchback with a small turbo.
    pub fn hatchback_fwd() -> Self {
        let mass = 1150.0;
        let (wheelbase, track) = (2.45, 1.48);
        let suspension = SuspensionConfig::from_sag(mass, 4, 0.06, 0.8);
        let tire = WheelConfig { radius: 0.31, inertia: 1.0, ..Default::default() };

        Self {
            name: "hatchback".to_string(),
            mass,
            chassis: ChassisConfig {
                half_extents: [0.9, 0.4, 1.95],
                com_offset: [0.0, -0.1, 0.2],
                ..Default::default()
            },
            wheels: four_wheels(wheelbase, track, -0.3, &tire, &suspension),
            axles: vec![
                AxleConfig {
                    position: AxlePosition::Front,
                    left_wheel: Some(0),
                    right_wheel: Some(1),
                    is_steer: true,
                    is_power: true,
                    max_brake_torque: 3000.0,
                    steering: SteeringConfig { wheelbase, track_width: track, ..Default::default() },
                    differential: DifferentialConfig {
                        kind: DifferentialType::Open,
                        final_drive: 3.9,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                AxleConfig {
                    position: AxlePosition::Rear,
                    left_wheel: Some(2),
                    right_wheel: Some(3),
                    is_handbrake: true,
                    max_brake_torque: 1800.0,
                    anti_roll_force: 3000.0,
                    ..Default::default()
                },
            ],
            engine: EngineConfig {
                max_torque: 250.0,
                max_rpm: 6500.0,
                turbo: TurboConfig { enabled: true, ..Default::default() },
                ..Default::default()
            },
            clutch: ClutchConfig::default(),
            gearbox: GearboxConfig {
                ratios: vec![3.45, 1.94, 1.28, 0.97, 0.8],
                shift_up_rpm: 5800.0,
                shift_down_rpm: 2500.0,
                max_speed_kmh: 205.0,
                ..Default::default()
            },
            stability: StabilityConfig::default(),
        }
    }

    /// Preset by name ("gt86", "hatchback").
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "gt86" => Some(Self::gt86()),
            "hatchback" | "hatchback_fwd" => Some(Self::hatchback_fwd()),
            _ => None,
        }
    }

    // ============================================
    // Loading
    // ============================================

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.sanitize()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!(path = %path.display(), name = %config.name, "vehicle config loaded");
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn wheel_offsets(&self) -> Vec<Vec3> {
        self.wheels.iter().map(|w| w.offset).collect()
    }

    /// Repair degenerate values in place. Fails only when nothing can be simulated.
    pub fn sanitize(&mut self) -> Result<(), ConfigError> {
        if self.wheels.is_empty() {
            return Err(ConfigError::Invalid(format!("vehicle '{}' has no wheels", self.name)));
        }

        if !self.mass.is_finite() || self.mass <= 0.0 {
            warn!(mass = self.mass, "non-positive vehicle mass, using {DEFAULT_MASS} kg");
            self.mass = DEFAULT_MASS;
        }

        self.gearbox.ratios.retain(|r| r.is_finite() && *r > 0.0);
        if self.gearbox.ratios.is_empty() {
            warn!("empty gear ratio table, using a single 1:1 gear");
            self.gearbox.ratios = vec![1.0];
        }

        if self.engine.max_rpm <= self.engine.min_rpm {
            warn!(
                min_rpm = self.engine.min_rpm,
                max_rpm = self.engine.max_rpm,
                "max rpm below idle, widening the rev range"
            );
            self.engine.max_rpm = self.engine.min_rpm + 1000.0;
        }

        for wheel in &mut self.wheels {
            if !wheel.tire.radius.is_finite() || wheel.tire.radius <= 0.0 {
                warn!(wheel = %wheel.id, radius = wheel.tire.radius, "non-positive tire radius, using {DEFAULT_RADIUS} m");
                wheel.tire.radius = DEFAULT_RADIUS;
            }
        }

        let count = self.wheels.len();
        for axle in &mut self.axles {
            for slot in [&mut axle.left_wheel, &mut axle.right_wheel] {
                if let Some(index) = *slot {
                    if index >= count {
                        warn!(position = ?axle.position, index, count, "axle wheel index out of range, dropping it");
                        *slot = None;
                    }
                }
            }
        }

        Ok(())
    }
}

/// FL, FR, RL, RR around the origin.
fn four_wheels(wheelbase: f32, track: f32, height: f32, tire: &WheelConfig, suspension: &SuspensionConfig) -> Vec<WheelSetup> {
    let (x, z) = (track * 0.5, wheelbase * 0.5);
    [
        (WheelId::FL, [x, height, z]),
        (WheelId::FR, [-x, height, z]),
        (WheelId::RL, [x, height, -z]),
        (WheelId::RR, [-x, height, -z]),
    ]
    .into_iter()
    .map(|(id, offset)| WheelSetup { id, offset, tire: tire.clone(), suspension: suspension.clone() })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_survive_json_round_trip() {
        for preset in [VehicleConfig::gt86(), VehicleConfig::hatchback_fwd()] {
            let json = preset.to_json().expect("serialise");
            let back = VehicleConfig::from_json_str(&json).expect("parse");
            assert_eq!(back, preset);
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = VehicleConfig::from_json_str(r#"{ "name": "light", "mass": 900.0 }"#).expect("parse");
        assert_eq!(cfg.name, "light");
        assert_eq!(cfg.mass, 900.0);
        assert_eq!(cfg.wheels.len(), 4);
    }

    #[test]
    fn sanitize_repairs_degenerate_values() {
        let mut cfg = VehicleConfig::gt86();
        cfg.gearbox.ratios.clear();
        cfg.wheels[1].tire.radius = -1.0;
        cfg.axles[1].right_wheel = Some(9);
        cfg.sanitize().expect("repairable");

        assert_eq!(cfg.gearbox.ratios, vec![1.0]);
        assert_eq!(cfg.wheels[1].tire.radius, DEFAULT_RADIUS);
        assert_eq!(cfg.axles[1].right_wheel, None);
    }

    #[test]
    fn no_wheels_is_invalid() {
        let err = VehicleConfig::from_json_str(r#"{ "wheels": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = VehicleConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn preset_lookup() {
        assert_eq!(VehicleConfig::preset("gt86").map(|c| c.name), Some("gt86".to_string()));
        assert!(VehicleConfig::preset("tank").is_none());
    }

    #[test]
    fn left_wheels_sit_on_positive_x() {
        let cfg = VehicleConfig::gt86();
        assert!(cfg.wheels[0].offset[0] > 0.0 && cfg.wheels[1].offset[0] < 0.0);
        assert!(cfg.wheels[0].offset[2] > 0.0 && cfg.wheels[2].offset[2] < 0.0);
    }
}
