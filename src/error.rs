// ==============================================================================
// error.rs — CONFIGURATION BOUNDARY ERRORS
// ------------------------------------------------------------------------------
// Only loading a VehicleConfig can fail. Inside the tick everything is clamped
// or defaulted and logged instead.
// ==============================================================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read vehicle config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse vehicle config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid vehicle config: {0}")]
    Invalid(String),
}
