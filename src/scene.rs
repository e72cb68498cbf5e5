//! The collision scene: owns every physics object, the dynamic AABB tree,
//! the contact pool and the optional static mesh, and advances them in
//! fixed ticks.

mod contacts;
mod raycast;
mod static_mesh;

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    collision::{bvh::AabbTree, contact::ContactPool, gjk::Simplex},
    config::{PhysicsConfig, BVH_DISPLACEMENT_MULTIPLIER, BVH_MARGIN},
    core::{
        mesh::MeshCollider,
        physics_object::{BodyKind, PhysicsObject},
    },
    dynamics::{integrator::Integrator, solver::ContactSolver},
    utils::{
        allocator::{EntityId, Handle, SlotArena},
        logging::{warn_if_tick_budget_exceeded, TraceSpan},
        profiling::{ScopedTimer, TickProfile},
    },
};

pub use contacts::NearestContact;

/// Container orchestrating broad phase, narrow phase, response and the
/// static mesh for a set of [`PhysicsObject`]s.
pub struct CollisionScene {
    config: PhysicsConfig,
    objects: SlotArena<PhysicsObject>,
    index: HashMap<EntityId, Handle>,
    tree: AabbTree<Handle>,
    contacts: ContactPool,
    static_mesh: Option<MeshCollider>,
    integrator: Integrator,
    solver: ContactSolver,

    accumulator: f32,
    tick_count: u64,
    profile: TickProfile,

    simplex: Simplex,
    pairs: Vec<(Handle, Handle)>,
}

impl Default for CollisionScene {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl CollisionScene {
    pub fn new(config: PhysicsConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!("{err}; continuing with the given values");
        }
        Self {
            config,
            objects: SlotArena::with_capacity(config.object_capacity),
            index: HashMap::with_capacity(config.object_capacity),
            tree: AabbTree::with_capacity(config.object_capacity, BVH_MARGIN, BVH_DISPLACEMENT_MULTIPLIER),
            contacts: ContactPool::with_capacity(config.contact_capacity),
            static_mesh: None,
            integrator: Integrator::from_config(&config),
            solver: ContactSolver::from_config(&config),
            accumulator: 0.0,
            tick_count: 0,
            profile: TickProfile::default(),
            simplex: Simplex::new(),
            pairs: Vec::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Registers an object. Fails (returning `None`) for the reserved
    /// [`EntityId::NONE`] or an entity that is already present.
    pub fn add(&mut self, mut object: PhysicsObject) -> Option<Handle> {
        let entity = object.entity;
        if entity.is_none() {
            warn!("refusing to add an object with the reserved entity id");
            return None;
        }
        if self.index.contains_key(&entity) {
            warn!("entity {entity:?} is already in the scene");
            return None;
        }

        object.time_step = self.config.time_step;
        let (linear, angular) = (object.velocity, object.angular_velocity);
        object.set_motion(linear, angular);
        object.contact_head = None;
        let bounds = object.world_bounds();

        let handle = self.objects.insert(object);
        let leaf = self.tree.create_node(bounds, handle);
        if let Some(stored) = self.objects.get_mut(handle) {
            stored.leaf = leaf;
        }
        self.index.insert(entity, handle);
        debug!("added entity {entity:?} ({} objects)", self.objects.len());
        Some(handle)
    }

    /// Removes an object together with its tree leaf and contacts.
    pub fn remove(&mut self, entity: EntityId) -> Option<PhysicsObject> {
        let handle = self.index.remove(&entity)?;
        let object = self.objects.remove(handle)?;
        self.tree.remove_node(object.leaf);
        self.contacts.remove_entity(entity);
        contacts::link_contact_lists(&mut self.contacts, &mut self.objects);
        debug!("removed entity {entity:?}");
        Some(object)
    }

    pub fn handle(&self, entity: EntityId) -> Option<Handle> {
        self.index.get(&entity).copied()
    }

    pub fn object(&self, entity: EntityId) -> Option<&PhysicsObject> {
        self.objects.get(self.handle(entity)?)
    }

    pub fn object_mut(&mut self, entity: EntityId) -> Option<&mut PhysicsObject> {
        let handle = self.handle(entity)?;
        self.objects.get_mut(handle)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &PhysicsObject> + '_ {
        self.objects.iter().map(|(_, object)| object)
    }

    pub fn contacts(&self) -> &ContactPool {
        &self.contacts
    }

    pub fn tree(&self) -> &AabbTree<Handle> {
        &self.tree
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_profile(&self) -> &TickProfile {
        &self.profile
    }

    /// Drops every object, contact and the static mesh.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.index.clear();
        self.tree.clear();
        self.contacts.clear();
        self.static_mesh = None;
        self.accumulator = 0.0;
    }

    /// Rebuilds the dynamic tree from scratch for better query cost.
    pub fn rebuild_broad_phase(&mut self) {
        let _span = TraceSpan::new("broad_phase::rebuild");
        self.tree.rebuild();
    }

    /// Advances by `dt` seconds of wall time, running as many fixed ticks as
    /// have accumulated. Returns the number of ticks run.
    pub fn step(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);
        let mut ticks = 0;
        while self.accumulator >= self.config.time_step {
            self.accumulator -= self.config.time_step;
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// Runs exactly one fixed tick.
    pub fn tick(&mut self) {
        let started = Instant::now();
        let dt = self.config.time_step;
        self.profile.reset();
        self.contacts.begin_tick();

        let mut elapsed = Duration::ZERO;
        {
            let _timer = ScopedTimer::new(&mut elapsed);
            self.integrate_objects(dt);
        }
        self.profile.integrate_time = elapsed;

        let mut elapsed = Duration::ZERO;
        {
            let _timer = ScopedTimer::new(&mut elapsed);
            self.find_pairs();
        }
        self.profile.broad_phase_time = elapsed;
        self.profile.candidate_pairs = self.pairs.len();

        let mut elapsed = Duration::ZERO;
        {
            let _timer = ScopedTimer::new(&mut elapsed);
            self.collide_pairs();
        }
        self.profile.narrow_phase_time = elapsed;

        let mut elapsed = Duration::ZERO;
        {
            let _timer = ScopedTimer::new(&mut elapsed);
            self.solver.prestep(&mut self.contacts, &mut self.objects, dt);
            self.solver.solve(&mut self.contacts, &mut self.objects);
        }
        self.profile.solve_time = elapsed;

        let mut elapsed = Duration::ZERO;
        {
            let _timer = ScopedTimer::new(&mut elapsed);
            self.collide_static_mesh();
        }
        self.profile.static_mesh_time = elapsed;

        self.finish_contacts();
        self.update_sleep(dt);

        for (_, object) in self.objects.iter() {
            if object.kind == BodyKind::Dynamic {
                object.push_transform();
            }
        }

        self.tick_count += 1;
        if self.config.rebuild_interval > 0 && self.tick_count % u64::from(self.config.rebuild_interval) == 0 {
            self.rebuild_broad_phase();
        }

        self.profile.object_count = self.objects.len();
        self.profile.contact_count = self.contacts.len();
        self.profile.total_time = started.elapsed();
        self.profile.report();
        warn_if_tick_budget_exceeded(self.tick_count, self.profile.total_time, dt * 1000.0);
    }

    fn integrate_objects(&mut self, dt: f32) {
        let mut active = 0;
        for (_, object) in self.objects.iter_mut() {
            object.pull_transform(dt);
            self.integrator.integrate(object, dt);
            if object.is_simulated() {
                active += 1;
            }
            let displacement = object.position - object.previous_position;
            self.tree.move_node(object.leaf, object.world_bounds(), displacement);
        }
        self.profile.active_count = active;
    }

    /// Objects that look for partners this tick.
    fn queries_pairs(object: &PhysicsObject) -> bool {
        object.is_simulated() || object.kind == BodyKind::Kinematic
    }

    fn may_collide(a: &PhysicsObject, b: &PhysicsObject) -> bool {
        if !a.layers.can_collide(&b.layers) {
            return false;
        }
        let sensing = a.is_trigger || b.is_trigger;
        (a.is_dynamic() || b.is_dynamic() || sensing) && !(a.is_sleeping() && b.is_sleeping())
    }

    fn find_pairs(&mut self) {
        use crate::config::MAX_BROADPHASE_CANDIDATES;

        self.pairs.clear();
        let mut candidates = [Handle::INVALID; MAX_BROADPHASE_CANDIDATES];

        for (handle, object) in self.objects.iter() {
            if !Self::queries_pairs(object) {
                continue;
            }
            let Some(bounds) = self.tree.fat_bounds(object.leaf) else {
                continue;
            };
            let count = self.tree.query_bounds(&bounds, &mut candidates);
            if count == candidates.len() {
                debug!("broad phase candidates for {:?} truncated at {count}", object.entity);
            }

            for &other_handle in &candidates[..count] {
                if other_handle == handle {
                    continue;
                }
                let Some(other) = self.objects.get(other_handle) else {
                    continue;
                };
                // Both sides query: keep the pair once, from the lower slot.
                if Self::queries_pairs(other) && other_handle.index() < handle.index() {
                    continue;
                }
                if !Self::may_collide(object, other) {
                    continue;
                }
                self.pairs.push((handle, other_handle));
            }
        }
    }

    fn update_sleep(&mut self, dt: f32) {
        for (_, object) in self.objects.iter_mut() {
            if self.integrator.update_sleep(object, dt) {
                debug!("entity {:?} went to sleep at tick {}", object.entity, self.tick_count);
            }
        }
    }
}
