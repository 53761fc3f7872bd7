//! drivetrain - engine → clutch → gearbox → differential → axle

pub mod smoothing;
pub mod engine;
pub mod clutch;
pub mod gearbox;
pub mod differential;
pub mod axle;

pub use axle::{Axle, AxleConfig, AxlePosition};
pub use clutch::{Clutch, ClutchConfig, ClutchTorquePolicy};
pub use differential::{Differential, DifferentialConfig, DifferentialType};
pub use engine::{Engine, EngineConfig, NosConfig, TorqueCurve, TurboConfig};
pub use gearbox::{GearState, Gearbox, GearboxConfig};
