//! aven-drive - fixed-timestep drivetrain and tire-contact vehicle dynamics
//!
//! engine → clutch → gearbox → differential → axle → wheel contact, with
//! ABS / TCS / ESP, running against any rigid body that implements
//! [`host::ChassisBody`] (rapier3d via [`physics::PhysicsWorld`]).

pub mod aven_tire;
pub mod drivetrain;
pub mod stability;
pub mod host;
pub mod vehicle;
pub mod config;
pub mod events;
pub mod error;
pub mod physics;
pub mod suspension_contact;
pub mod state;

pub use config::VehicleConfig;
pub use error::ConfigError;
pub use host::{ChassisBody, FlatGroundChassis};
pub use vehicle::{Vehicle, VehicleCommand, VehicleInputs, VehicleState};
