//! aven_tire - engine-agnostic tire helpers (pure types + wheel contact)

pub mod types;
pub mod friction;
pub mod ground;
pub mod kinematics;
pub mod solve;
pub mod wheel;
pub mod steering;
pub mod anti_roll;

pub use types::*;
pub use friction::FrictionCurve;
pub use ground::{GroundMaterial, GroundMaterials};
pub use wheel::{ContactFrame, WheelConfig, WheelContact};
