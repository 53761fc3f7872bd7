// ==============================================================================
// ground.rs — GROUND MATERIAL TABLE
// ------------------------------------------------------------------------------
// Surface properties keyed by an index the host resolves from its collider
// lookup. The table is injected into each vehicle at assembly time.
//
// Lookups never fail: an unknown index resolves to entry 0, and an empty table
// resolves to a built-in asphalt entry.
// ==============================================================================

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundMaterial {
    pub name: String,
    pub forward_stiffness: f32,  // multiplier on the forward friction curve
    pub sideways_stiffness: f32, // multiplier on the sideways friction curve
    pub slip_threshold: f32,     // total slip above which the tire skids
    pub damp: f32,               // extra rolling drag (N*m per rad/s)

    // hooks for external collaborators (skid audio / particles), opaque here
    pub audio_hook: Option<String>,
    pub particle_hook: Option<String>,
}

impl GroundMaterial {
    pub fn asphalt() -> Self {
        Self {
            name: "asphalt".to_string(),
            forward_stiffness: 1.0,
            sideways_stiffness: 1.0,
            slip_threshold: 0.25,
            damp: 0.0,
            audio_hook: Some("skid_asphalt".to_string()),
            particle_hook: Some("smoke".to_string()),
        }
    }
}

impl Default for GroundMaterial {
    fn default() -> Self { Self::asphalt() }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundMaterials {
    materials: Vec<GroundMaterial>,
}

static FALLBACK: std::sync::LazyLock<GroundMaterial> =
    std::sync::LazyLock::new(GroundMaterial::asphalt);

impl GroundMaterials {
    pub fn new(materials: Vec<GroundMaterial>) -> Self {
        if materials.is_empty() {
            tracing::warn!("empty ground material table, falling back to asphalt");
        }
        Self { materials }
    }

    /// asphalt (0), grass (1), sand (2), ice (3)
    pub fn standard() -> Self {
        Self::new(vec![
            GroundMaterial::asphalt(),
            GroundMaterial {
                name: "grass".to_string(),
                forward_stiffness: 0.6,
                sideways_stiffness: 0.55,
                slip_threshold: 0.45,
                damp: 2.0,
                audio_hook: Some("skid_grass".to_string()),
                particle_hook: Some("dirt".to_string()),
            },
            GroundMaterial {
                name: "sand".to_string(),
                forward_stiffness: 0.45,
                sideways_stiffness: 0.4,
                slip_threshold: 0.5,
                damp: 6.0,
                audio_hook: Some("skid_sand".to_string()),
                particle_hook: Some("sand".to_string()),
            },
            GroundMaterial {
                name: "ice".to_string(),
                forward_stiffness: 0.15,
                sideways_stiffness: 0.12,
                slip_threshold: 0.6,
                damp: 0.0,
                audio_hook: None,
                particle_hook: None,
            },
        ])
    }

    /// Resolve an index to a material; unknown → entry 0.
    pub fn get(&self, index: usize) -> &GroundMaterial {
        self.materials
            .get(index)
            .or_else(|| self.materials.first())
            .unwrap_or(&FALLBACK)
    }

    /// Index actually used for `index` after fallback.
    pub fn resolve(&self, index: usize) -> usize {
        if index < self.materials.len() { index } else { 0 }
    }

    pub fn len(&self) -> usize { self.materials.len() }
    pub fn is_empty(&self) -> bool { self.materials.is_empty() }
}

impl Default for GroundMaterials {
    fn default() -> Self { Self::standard() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_index_falls_back_to_first() {
        let table = GroundMaterials::standard();
        assert_eq!(table.get(99).name, "asphalt");
        assert_eq!(table.resolve(99), 0);
        assert_eq!(table.get(3).name, "ice");
    }

    #[test]
    fn empty_table_still_resolves() {
        let table = GroundMaterials::new(Vec::new());
        assert_eq!(table.get(0).name, "asphalt");
        assert_eq!(table.get(5).slip_threshold, 0.25);
    }
}
