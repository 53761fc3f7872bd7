// ==============================================================================
// state.rs — SERIALISABLE WORLD SNAPSHOT FOR COLLABORATORS
// ------------------------------------------------------------------------------
// Read-only view built after each physics step. Audio, dashboards and loggers
// consume this; nothing here feeds back into the simulation.
// ==============================================================================

use serde::Serialize;

use crate::aven_tire::types::Vec3;
use crate::events::VehicleEvent;
use crate::vehicle::VehicleState;

#[derive(Clone, Debug, Serialize)]
pub struct VehicleSnapshot {
    pub id: String,
    pub position: Vec3,
    pub rotation: [f32; 4], // quaternion i, j, k, w
    #[serde(flatten)]
    pub state: VehicleState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<VehicleEvent>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub vehicles: Vec<VehicleSnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn vehicle(&self, id: &str) -> Option<&VehicleSnapshot> {
        self.vehicles.iter().find(|v| v.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serialises_flat_vehicle_state() {
        let snap = Snapshot {
            tick: 7,
            vehicles: vec![VehicleSnapshot {
                id: "car-0".to_string(),
                position: [1.0, 0.5, 2.0],
                rotation: [0.0, 0.0, 0.0, 1.0],
                state: VehicleState { engine_rpm: 800.0, gear_state: "1".to_string(), ..Default::default() },
                events: Vec::new(),
            }],
        };
        let json: serde_json::Value = serde_json::from_str(&snap.to_json().expect("serialise")).expect("json");
        assert_eq!(json["tick"], 7);
        assert_eq!(json["vehicles"][0]["engine_rpm"], 800.0);
        assert_eq!(json["vehicles"][0]["gear_state"], "1");
        assert!(json["vehicles"][0].get("events").is_none());
        assert!(snap.vehicle("car-0").is_some());
    }
}
