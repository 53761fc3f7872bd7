// ==============================================================================
// physics.rs — RAPIER3D WORLD HOSTING DRIVETRAIN VEHICLES
// ==============================================================================
// Per step (PhysicsWorld::step):
//
//   1) query pipeline refresh
//   2) per vehicle: suspension raycasts → GroundSamples + spring impulses
//   3) per vehicle: Vehicle::tick through RapierChassis (tire + ARB impulses,
//      helpers)
//   4) rapier pipeline step
//   5) exploding-body guard (non-finite / far away → reset above origin)
//
// Chassis frame: x left, y up, z forward. Ground material indices come from
// the collider the suspension ray hits (unknown colliders → 0).
// ==============================================================================

use std::collections::HashMap;

use rapier3d::prelude::*;
use tracing::{debug, info, warn};

use crate::aven_tire::ground::GroundMaterials;
use crate::aven_tire::types::{GroundSample, Vec3, v_cross};
use crate::config::VehicleConfig;
use crate::error::ConfigError;
use crate::host::{ChassisBody, GRAVITY};
use crate::state::{Snapshot, VehicleSnapshot};
use crate::suspension_contact::{SuspensionConfig, SuspensionQuery, cast_suspension};
use crate::vehicle::{Vehicle, VehicleCommand, VehicleInputs};

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);

const WORLD_LIMIT: f32 = 1_000.0; // m
const RESET_POSITION: [f32; 3] = [0.0, 1.0, 0.0];

#[inline] pub(crate) fn to_vec3(v: &Vector<Real>) -> Vec3 { [v.x, v.y, v.z] }
#[inline] pub(crate) fn to_vector(v: Vec3) -> Vector<Real> { vector![v[0], v[1], v[2]] }
#[inline] pub(crate) fn to_point(v: Vec3) -> Point<Real> { point![v[0], v[1], v[2]] }

// ============================================
// RapierChassis
// ============================================

/// ChassisBody over a borrowed rapier rigid body.
pub struct RapierChassis<'a> {
    body: &'a mut RigidBody,
}

impl<'a> RapierChassis<'a> {
    pub fn new(body: &'a mut RigidBody) -> Self {
        Self { body }
    }

    fn local_axis(&self, axis: Vector<Real>) -> Vec3 {
        to_vec3(&(self.body.rotation() * axis))
    }
}

impl ChassisBody for RapierChassis<'_> {
    fn mass(&self) -> f32 { self.body.mass() }
    fn position(&self) -> Vec3 { to_vec3(self.body.translation()) }
    fn center_of_mass(&self) -> Vec3 { to_vec3(&self.body.center_of_mass().coords) }

    fn forward(&self) -> Vec3 { self.local_axis(vector![0.0, 0.0, 1.0]) }
    fn right(&self) -> Vec3 { v_cross(self.forward(), self.up()) }
    fn up(&self) -> Vec3 { self.local_axis(vector![0.0, 1.0, 0.0]) }

    fn linear_velocity(&self) -> Vec3 { to_vec3(self.body.linvel()) }
    fn angular_velocity(&self) -> Vec3 { to_vec3(self.body.angvel()) }

    fn set_linear_velocity(&mut self, v: Vec3) {
        self.body.set_linvel(to_vector(v), true);
    }

    fn set_angular_velocity(&mut self, w: Vec3) {
        self.body.set_angvel(to_vector(w), true);
    }

    fn apply_impulse_at_point(&mut self, impulse: Vec3, point: Vec3) {
        self.body.apply_impulse_at_point(to_vector(impulse), to_point(point), true);
    }

    fn apply_torque_impulse(&mut self, impulse: Vec3) {
        self.body.apply_torque_impulse(to_vector(impulse), true);
    }

    fn set_angular_damping(&mut self, damping: f32) {
        self.body.set_angular_damping(damping);
    }
}

// ============================================
// World
// ============================================

struct WheelMount {
    offset: Vec3, // chassis local
    radius: f32,
    suspension: SuspensionConfig,
}

pub struct VehicleEntry {
    pub body: RigidBodyHandle,
    pub vehicle: Vehicle,
    mounts: Vec<WheelMount>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>, // gravity vector
    pub pipeline: PhysicsPipeline, // physics pipeline
    pub island_manager: IslandManager, // manages islands of bodies
    pub broad_phase: DefaultBroadPhase, // broad-phase collision detection
    pub narrow_phase: NarrowPhase, // collision detection
    pub bodies: RigidBodySet, // for rigid bodies
    pub colliders: ColliderSet, // for collision shapes
    pub joints: ImpulseJointSet, // for constraints
    pub multibody_joints: MultibodyJointSet,// for articulated bodies
    pub ccd: CCDSolver, // continuous collision detection
    pub query_pipeline: QueryPipeline, // for raycasting

    pub materials: GroundMaterials,
    ground_index: HashMap<ColliderHandle, usize>, // collider → material index
    vehicles: HashMap<String, VehicleEntry>, // vehicle id → vehicle
    tick: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(GroundMaterials::standard())
    }
}

impl PhysicsWorld {
    pub fn new(materials: GroundMaterials) -> Self {
        let mut world = Self {
            gravity: vector![0.0, -GRAVITY, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            materials,
            ground_index: HashMap::new(),
            vehicles: HashMap::new(),
            tick: 0,
        };

        // Big static slab, top surface exactly at y = 0.
        world.add_ground_patch([0.0, -1.0, 0.0], [500.0, 1.0, 500.0], 0);
        info!(bodies = world.bodies.len(), colliders = world.colliders.len(), "ground inserted");
        world
    }

    pub fn tick(&self) -> u64 { self.tick }

    /// Static box tagged with a ground material (ice patch, grass verge...).
    pub fn add_ground_patch(&mut self, center: Vec3, half_extents: Vec3, material: usize) -> ColliderHandle {
        let material = self.materials.resolve(material);
        let body = self.bodies.insert(RigidBodyBuilder::fixed().translation(to_vector(center)).build());
        let collider = ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2])
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        let handle = self.colliders.insert_with_parent(collider, body, &mut self.bodies);
        self.ground_index.insert(handle, material);
        debug!(?center, material, "ground patch added");
        handle
    }

    // --------------------------------------------------
    // Vehicles
    // --------------------------------------------------

    /// Dynamic box chassis + drivetrain. Replaces an existing vehicle with the same id.
    pub fn spawn_vehicle(
        &mut self,
        id: impl Into<String>,
        config: VehicleConfig,
        position: Vec3,
    ) -> Result<RigidBodyHandle, ConfigError> {
        let id = id.into();
        self.despawn_vehicle(&id);

        let vehicle = Vehicle::new(config, self.materials.clone())?;
        let cfg = vehicle.config();

        let [hx, hy, hz] = cfg.chassis.half_extents;
        let volume = (8.0 * hx * hy * hz).max(1e-3);
        let density = cfg.mass / volume; // ρ = m / V

        let rb = RigidBodyBuilder::dynamic()
            .translation(to_vector(position))
            .linear_damping(cfg.chassis.linear_damping)
            .angular_damping(cfg.chassis.angular_damping)
            .ccd_enabled(true)
            .build();

        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(to_vector(cfg.chassis.com_offset)) // COM offset
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .active_events(ActiveEvents::empty())
            .density(density)
            .friction(0.0) // tires carry all grip
            .restitution(0.0)
            .build();

        let mounts = cfg
            .wheels
            .iter()
            .map(|w| WheelMount { offset: w.offset, radius: w.tire.radius, suspension: w.suspension.clone() })
            .collect();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        info!(%id, name = %cfg.name, ?position, ?handle, "vehicle spawned");
        self.vehicles.insert(id, VehicleEntry { body: handle, vehicle, mounts });
        Ok(handle)
    }

    pub fn despawn_vehicle(&mut self, id: &str) -> bool {
        let Some(entry) = self.vehicles.remove(id) else { return false };
        self.bodies.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        info!(%id, "vehicle despawned");
        true
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.get(id).map(|e| &e.vehicle)
    }

    pub fn vehicle_mut(&mut self, id: &str) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(id).map(|e| &mut e.vehicle)
    }

    pub fn vehicle_body(&self, id: &str) -> Option<&RigidBody> {
        self.vehicles.get(id).and_then(|e| self.bodies.get(e.body))
    }

    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vehicles.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn set_inputs(&mut self, id: &str, inputs: VehicleInputs) -> bool {
        match self.vehicle_mut(id) {
            Some(v) => {
                v.set_inputs(inputs);
                true
            }
            None => false,
        }
    }

    pub fn command(&mut self, id: &str, command: VehicleCommand) -> bool {
        match self.vehicle_mut(id) {
            Some(v) => {
                v.command(command);
                true
            }
            None => false,
        }
    }

    // --------------------------------------------------
    // Step
    // --------------------------------------------------

    fn drive_vehicles(&mut self, dt: Real) {
        self.query_pipeline.update(&self.colliders);

        let ground_index = &self.ground_index;
        let lookup = |c: ColliderHandle| ground_index.get(&c).copied().unwrap_or(0);

        for entry in self.vehicles.values_mut() {
            // 1) suspension
            let hits: Vec<_> = {
                let world = SuspensionQuery {
                    query: &self.query_pipeline,
                    bodies: &self.bodies,
                    colliders: &self.colliders,
                };
                entry
                    .mounts
                    .iter()
                    .map(|m| cast_suspension(&world, entry.body, m.offset, m.radius, &m.suspension, lookup, dt))
                    .collect()
            };

            let Some(body) = self.bodies.get_mut(entry.body) else { continue };

            let samples: Vec<GroundSample> = hits
                .iter()
                .map(|hit| hit.map(|h| h.sample).unwrap_or_else(GroundSample::airborne))
                .collect();

            for hit in hits.iter().flatten() {
                body.apply_impulse_at_point(to_vector(hit.impulse), to_point(hit.sample.point), true);
            }

            // 2) drivetrain + tires
            let mut chassis = RapierChassis::new(body);
            entry.vehicle.tick(&mut chassis, &samples, dt);
        }
    }

    pub fn step(&mut self, dt: Real) {
        if !dt.is_finite() || dt <= 0.0 {
            warn!(dt, "skipping physics step with invalid dt");
            return;
        }
        self.tick += 1;

        self.drive_vehicles(dt);

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        self.reset_exploded_bodies();
    }

    /// Prevent bodies from exploding to insane coordinates.
    fn reset_exploded_bodies(&mut self) {
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.x.is_finite()
                || !pos.y.is_finite()
                || !pos.z.is_finite()
                || pos.x.abs() > WORLD_LIMIT
                || pos.y.abs() > WORLD_LIMIT
                || pos.z.abs() > WORLD_LIMIT;

            if bad {
                body.set_translation(to_vector(RESET_POSITION), true);
                body.set_rotation(Rotation::identity(), true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                warn!(?handle, "reset exploding body");
            }
        }
    }

    /// World view for collaborators. Drains each vehicle's pending events.
    pub fn snapshot(&mut self) -> Snapshot {
        let mut ids: Vec<&String> = self.vehicles.keys().collect();
        ids.sort();
        let ids: Vec<String> = ids.into_iter().cloned().collect();

        let mut vehicles = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entry) = self.vehicles.get_mut(&id) else { continue };
            let Some(body) = self.bodies.get(entry.body) else { continue };
            let iso = body.position();
            vehicles.push(VehicleSnapshot {
                position: to_vec3(&iso.translation.vector),
                rotation: [iso.rotation.i, iso.rotation.j, iso.rotation.k, iso.rotation.w],
                state: entry.vehicle.state().clone(),
                events: entry.vehicle.drain_events(),
                id,
            });
        }
        Snapshot { tick: self.tick, vehicles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn world_with_car() -> PhysicsWorld {
        let mut world = PhysicsWorld::default();
        world.spawn_vehicle("car", VehicleConfig::gt86(), [0.0, 1.0, 0.0]).expect("spawn");
        world
    }

    #[test]
    fn chassis_basis_matches_world_axes() {
        let mut world = world_with_car();
        let handle = world.vehicles["car"].body;
        let body = world.bodies.get_mut(handle).expect("body");
        let chassis = RapierChassis::new(body);
        assert_eq!(chassis.forward(), [0.0, 0.0, 1.0]);
        assert_eq!(chassis.up(), [0.0, 1.0, 0.0]);
        assert_eq!(chassis.right(), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn car_settles_on_its_wheels() {
        let mut world = world_with_car();
        for _ in 0..180 {
            world.step(DT);
        }
        let body = world.vehicle_body("car").expect("body");
        let y = body.translation().y;
        assert!(y.is_finite() && y > 0.1 && y < 1.5, "ride height {y}");
        let snap = world.snapshot();
        let car = snap.vehicle("car").expect("car");
        assert!(car.state.wheels.iter().any(|w| w.grounded));
    }

    #[test]
    fn throttle_drives_forward() {
        let mut world = world_with_car();
        for _ in 0..60 {
            world.step(DT);
        }
        world.set_inputs("car", VehicleInputs { throttle: 1.0, ..Default::default() });
        for _ in 0..180 {
            world.step(DT);
        }
        let z = world.vehicle_body("car").expect("body").translation().z;
        assert!(z > 1.0, "travelled {z}");
    }

    #[test]
    fn unknown_vehicle_is_reported() {
        let mut world = PhysicsWorld::default();
        assert!(!world.set_inputs("ghost", VehicleInputs::default()));
        assert!(!world.command("ghost", VehicleCommand::StartEngine));
        assert!(!world.despawn_vehicle("ghost"));
    }

    #[test]
    fn ground_patch_reports_its_material() {
        let mut world = PhysicsWorld::default();
        let ice = world.add_ground_patch([0.0, 0.05, 0.0], [5.0, 0.05, 5.0], 3);
        assert_eq!(world.ground_index.get(&ice), Some(&3));
        let unknown = world.add_ground_patch([20.0, 0.05, 0.0], [1.0, 0.05, 1.0], 99);
        assert_eq!(world.ground_index.get(&unknown), Some(&0));
    }
}
