// ==============================================================================
// events.rs — ONE-SHOT NOTIFICATIONS FOR EXTERNAL COLLABORATORS
// ------------------------------------------------------------------------------
// Audio / particles / UI subscribe by draining the queue once per tick.
// The simulation never reads its own events back.
// ==============================================================================

use serde::Serialize;

use crate::aven_tire::WheelId;
use crate::drivetrain::gearbox::GearState;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleEvent {
    EngineStarted,
    EngineStopped,
    GearChanged { from: GearState, to: GearState },
    TurboBlowOff { psi: f32 },
    TireDeflated { wheel: WheelId },
    TireInflated { wheel: WheelId },
    WheelEnabled { wheel: WheelId, enabled: bool },
    AssistToggled { system: String, enabled: bool },
}

#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: Vec<VehicleEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: VehicleEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, VehicleEvent> {
        self.events.drain(..)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
