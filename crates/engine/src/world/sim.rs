use std::collections::{BTreeMap, BTreeSet};

use crate::jobs::ActionKind;
use crate::world::{
    ActionOutcome, Body, EntityFilter, EntityKind, EntityView, FacilityKind, MoveOutcome,
    ObjectId, Position, RoomName, World,
};

const ROOM_SIZE: i32 = 50;
const CARRY_CAPACITY: u32 = 50;
const HITS_PER_PART: u32 = 100;
const HARVEST_POWER: u32 = 2;
const BUILD_POWER: u32 = 5;
const REPAIR_POWER: u32 = 100;
const DISMANTLE_POWER: u32 = 50;
const ATTACK_POWER: u32 = 30;
const HEAL_POWER: u32 = 12;
const TOWER_ENERGY_COST: u32 = 10;
const TOWER_ATTACK: u32 = 600;
const TOWER_HEAL: u32 = 400;
const TOWER_REPAIR: u32 = 800;
const SOURCE_ENERGY: u32 = 3000;
const SOURCE_REGEN_TICKS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSpec {
    pub body: Body,
    pub energy: u32,
    pub owned: bool,
}

impl UnitSpec {
    pub fn worker(work: u32, carry: u32) -> Self {
        Self {
            body: Body {
                work,
                carry,
                ..Body::default()
            },
            energy: 0,
            owned: true,
        }
    }

    pub fn hauler(carry: u32) -> Self {
        Self::worker(0, carry)
    }

    pub fn healer(heal: u32) -> Self {
        Self {
            body: Body {
                heal,
                ..Body::default()
            },
            energy: 0,
            owned: true,
        }
    }

    pub fn fighter(attack: u32) -> Self {
        Self {
            body: Body {
                attack,
                ..Body::default()
            },
            energy: 0,
            owned: true,
        }
    }

    pub fn claimer() -> Self {
        Self {
            body: Body {
                claim: 1,
                ..Body::default()
            },
            energy: 0,
            owned: true,
        }
    }

    pub fn hostile(self) -> Self {
        Self {
            owned: false,
            ..self
        }
    }

    pub fn with_energy(self, energy: u32) -> Self {
        Self { energy, ..self }
    }

    fn parts(&self) -> u32 {
        let body = self.body;
        (body.work + body.carry + body.attack + body.heal + body.claim).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacilitySpec {
    pub kind: FacilityKind,
    pub energy: u32,
    pub energy_capacity: u32,
    pub hits: u32,
    pub hits_max: u32,
    pub owned: bool,
}

impl FacilitySpec {
    pub fn new(kind: FacilityKind) -> Self {
        let (energy_capacity, hits_max) = match kind {
            FacilityKind::Spawn => (300, 5000),
            FacilityKind::Extension => (50, 1000),
            FacilityKind::Tower => (1000, 3000),
            FacilityKind::Link => (800, 1000),
            FacilityKind::Container => (2000, 5000),
            FacilityKind::Storage => (100_000, 10_000),
            FacilityKind::Controller => (0, 0),
            FacilityKind::Wall => (0, 10_000),
        };
        Self {
            kind,
            energy: 0,
            energy_capacity,
            hits: hits_max,
            hits_max,
            owned: true,
        }
    }

    pub fn with_energy(self, energy: u32) -> Self {
        Self { energy, ..self }
    }

    pub fn with_hits(self, hits: u32) -> Self {
        Self { hits, ..self }
    }

    pub fn unowned(self) -> Self {
        Self {
            owned: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub agent: ObjectId,
    pub action: ActionKind,
    pub target: ObjectId,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Default)]
struct SimRoom {
    visible: bool,
    walls: BTreeSet<Position>,
}

/// Deterministic in-memory world used by the driver and by tests.
///
/// Removals and construction completions are queued and applied by
/// [`SimWorld::advance_tick`], so objects stay resolvable for the rest of the tick in
/// which they were destroyed.
#[derive(Debug, Default)]
pub struct SimWorld {
    tick: u64,
    next_id: u64,
    rooms: BTreeMap<RoomName, SimRoom>,
    entities: Vec<EntityView>,
    pending_spawns: Vec<EntityView>,
    pending_despawns: Vec<ObjectId>,
    move_calls: u64,
    actions: Vec<ActionRecord>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, room: &RoomName) {
        self.rooms.entry(room.clone()).or_default().visible = true;
    }

    pub fn set_room_visible(&mut self, room: &RoomName, visible: bool) {
        if let Some(sim_room) = self.rooms.get_mut(room) {
            sim_room.visible = visible;
        }
    }

    pub fn add_wall(&mut self, room: &RoomName, position: Position) {
        self.rooms
            .entry(room.clone())
            .or_default()
            .walls
            .insert(position);
    }

    pub fn spawn_unit(&mut self, room: &RoomName, position: Position, spec: UnitSpec) -> ObjectId {
        let hits = spec.parts() * HITS_PER_PART;
        let id = self.allocate("u");
        self.entities.push(EntityView {
            id: id.clone(),
            room: room.clone(),
            position,
            kind: EntityKind::Unit(spec.body),
            owned: spec.owned,
            hits,
            hits_max: hits,
            energy: spec.energy.min(spec.body.carry * CARRY_CAPACITY),
            energy_capacity: spec.body.carry * CARRY_CAPACITY,
        });
        id
    }

    pub fn add_facility(
        &mut self,
        room: &RoomName,
        position: Position,
        spec: FacilitySpec,
    ) -> ObjectId {
        let id = self.allocate("f");
        self.entities.push(facility_view(id.clone(), room, position, spec));
        id
    }

    pub fn add_source(&mut self, room: &RoomName, position: Position) -> ObjectId {
        let id = self.allocate("s");
        self.entities.push(EntityView {
            id: id.clone(),
            room: room.clone(),
            position,
            kind: EntityKind::Source,
            owned: false,
            hits: 0,
            hits_max: 0,
            energy: SOURCE_ENERGY,
            energy_capacity: SOURCE_ENERGY,
        });
        id
    }

    pub fn add_construction_site(
        &mut self,
        room: &RoomName,
        position: Position,
        structure: FacilityKind,
        progress_total: u32,
    ) -> ObjectId {
        let id = self.allocate("c");
        self.entities.push(EntityView {
            id: id.clone(),
            room: room.clone(),
            position,
            kind: EntityKind::ConstructionSite {
                structure,
                progress: 0,
                progress_total,
            },
            owned: true,
            hits: 0,
            hits_max: 0,
            energy: 0,
            energy_capacity: 0,
        });
        id
    }

    /// Immediate removal, for objects that vanish outside of any action.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        let before = self.entities.len();
        self.entities.retain(|entity| &entity.id != id);
        before != self.entities.len()
    }

    pub fn entity_mut(&mut self, id: &ObjectId) -> Option<&mut EntityView> {
        self.entities.iter_mut().find(|entity| &entity.id == id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn move_calls(&self) -> u64 {
        self.move_calls
    }

    /// Actions attempted since the last [`SimWorld::advance_tick`].
    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn advance_tick(&mut self) {
        if !self.pending_despawns.is_empty() {
            let pending = std::mem::take(&mut self.pending_despawns);
            self.entities.retain(|entity| !pending.contains(&entity.id));
        }
        self.entities.append(&mut self.pending_spawns);

        self.tick = self.tick.saturating_add(1);
        if self.tick % SOURCE_REGEN_TICKS == 0 {
            for entity in &mut self.entities {
                if matches!(entity.kind, EntityKind::Source) {
                    entity.energy = entity.energy_capacity;
                }
            }
        }
        self.actions.clear();
    }

    fn allocate(&mut self, prefix: &str) -> ObjectId {
        self.next_id = self.next_id.saturating_add(1);
        ObjectId(format!("{prefix}{}", self.next_id))
    }

    fn find(&self, id: &ObjectId) -> Option<&EntityView> {
        self.entities.iter().find(|entity| &entity.id == id)
    }

    fn store(&mut self, view: EntityView) {
        if let Some(slot) = self.entity_mut(&view.id) {
            *slot = view;
        }
    }

    fn is_walkable(&self, room: &RoomName, position: Position) -> bool {
        if !(0..ROOM_SIZE).contains(&position.x) || !(0..ROOM_SIZE).contains(&position.y) {
            return false;
        }
        if self
            .rooms
            .get(room)
            .is_some_and(|sim_room| sim_room.walls.contains(&position))
        {
            return false;
        }
        !self.entities.iter().any(|entity| {
            &entity.room == room && entity.position == position && blocks_movement(entity)
        })
    }

    fn in_range(agent: &EntityView, target: &EntityView, action: ActionKind) -> bool {
        if agent.room != target.room {
            return false;
        }
        if agent.facility_kind().is_some() {
            return true;
        }
        agent
            .position
            .in_range_to(target.position, action.interaction_range())
    }

    fn resolve_action(
        &mut self,
        agent: &mut EntityView,
        target: &mut EntityView,
        action: ActionKind,
    ) -> ActionOutcome {
        if let Some(kind) = agent.facility_kind() {
            return facility_action(kind, agent, target, action, &mut self.pending_despawns);
        }
        let Some(body) = agent.body() else {
            return ActionOutcome::InvalidTarget;
        };
        if !Self::in_range(agent, target, action) {
            return ActionOutcome::NotInRange;
        }

        match action {
            ActionKind::Move => ActionOutcome::InvalidTarget,
            ActionKind::Transfer => {
                if target.energy_capacity == 0 || !target.owned {
                    return ActionOutcome::InvalidTarget;
                }
                if agent.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                let amount = agent.energy.min(target.energy_free());
                if amount == 0 {
                    return ActionOutcome::Full;
                }
                agent.energy -= amount;
                target.energy += amount;
                ActionOutcome::Ok
            }
            ActionKind::Withdraw => {
                if target.facility_kind().is_none() || target.energy_capacity == 0 {
                    return ActionOutcome::InvalidTarget;
                }
                if agent.energy_free() == 0 {
                    return ActionOutcome::Full;
                }
                if target.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                let amount = agent.energy_free().min(target.energy);
                agent.energy += amount;
                target.energy -= amount;
                ActionOutcome::Ok
            }
            ActionKind::Harvest => {
                if !matches!(target.kind, EntityKind::Source) {
                    return ActionOutcome::InvalidTarget;
                }
                if body.work == 0 {
                    return ActionOutcome::NoBodypart;
                }
                if target.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                if agent.energy_free() == 0 {
                    return ActionOutcome::Full;
                }
                let amount = (body.work * HARVEST_POWER)
                    .min(target.energy)
                    .min(agent.energy_free());
                agent.energy += amount;
                target.energy -= amount;
                ActionOutcome::Ok
            }
            ActionKind::Build => {
                let EntityKind::ConstructionSite {
                    structure,
                    progress,
                    progress_total,
                } = target.kind
                else {
                    return ActionOutcome::InvalidTarget;
                };
                if body.work == 0 {
                    return ActionOutcome::NoBodypart;
                }
                if agent.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                let amount = (body.work * BUILD_POWER)
                    .min(agent.energy)
                    .min(progress_total.saturating_sub(progress));
                agent.energy -= amount;
                let progress = progress + amount;
                target.kind = EntityKind::ConstructionSite {
                    structure,
                    progress,
                    progress_total,
                };
                if progress >= progress_total {
                    self.pending_despawns.push(target.id.clone());
                    let id = self.allocate("f");
                    self.pending_spawns.push(facility_view(
                        id,
                        &target.room,
                        target.position,
                        FacilitySpec::new(structure),
                    ));
                }
                ActionOutcome::Ok
            }
            ActionKind::Repair => {
                if !target.owned || target.facility_kind().is_none() || !target.is_damaged() {
                    return ActionOutcome::InvalidTarget;
                }
                if body.work == 0 {
                    return ActionOutcome::NoBodypart;
                }
                if agent.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                let spent = body.work.min(agent.energy);
                agent.energy -= spent;
                target.hits = (target.hits + spent * REPAIR_POWER).min(target.hits_max);
                ActionOutcome::Ok
            }
            ActionKind::Dismantle => {
                let dismantlable = target.owned
                    && target.hits_max > 0
                    && !matches!(
                        target.facility_kind(),
                        None | Some(FacilityKind::Controller)
                    );
                if !dismantlable {
                    return ActionOutcome::InvalidTarget;
                }
                if body.work == 0 {
                    return ActionOutcome::NoBodypart;
                }
                let damage = (body.work * DISMANTLE_POWER).min(target.hits);
                target.hits -= damage;
                agent.energy = (agent.energy + damage / 4).min(agent.energy_capacity);
                if target.hits == 0 {
                    self.pending_despawns.push(target.id.clone());
                }
                ActionOutcome::Ok
            }
            ActionKind::Upgrade => {
                if target.facility_kind() != Some(FacilityKind::Controller) || !target.owned {
                    return ActionOutcome::InvalidTarget;
                }
                if body.work == 0 {
                    return ActionOutcome::NoBodypart;
                }
                if agent.energy == 0 {
                    return ActionOutcome::NotEnoughResources;
                }
                let spent = body.work.min(agent.energy);
                agent.energy -= spent;
                target.energy += spent;
                ActionOutcome::Ok
            }
            ActionKind::Attack => {
                if target.owned || target.hits_max == 0 {
                    return ActionOutcome::InvalidTarget;
                }
                if body.attack == 0 {
                    return ActionOutcome::NoBodypart;
                }
                strike(target, body.attack * ATTACK_POWER, &mut self.pending_despawns);
                ActionOutcome::Ok
            }
            ActionKind::Claim => {
                if target.facility_kind() != Some(FacilityKind::Controller) || target.owned {
                    return ActionOutcome::InvalidTarget;
                }
                if body.claim == 0 {
                    return ActionOutcome::NoBodypart;
                }
                target.owned = true;
                ActionOutcome::Ok
            }
            ActionKind::Heal => {
                if !target.is_unit() || !target.owned {
                    return ActionOutcome::InvalidTarget;
                }
                if body.heal == 0 {
                    return ActionOutcome::NoBodypart;
                }
                target.hits = (target.hits + body.heal * HEAL_POWER).min(target.hits_max);
                ActionOutcome::Ok
            }
        }
    }
}

fn facility_view(
    id: ObjectId,
    room: &RoomName,
    position: Position,
    spec: FacilitySpec,
) -> EntityView {
    EntityView {
        id,
        room: room.clone(),
        position,
        kind: EntityKind::Facility(spec.kind),
        owned: spec.owned,
        hits: spec.hits.min(spec.hits_max),
        hits_max: spec.hits_max,
        energy: spec.energy,
        energy_capacity: spec.energy_capacity,
    }
}

fn blocks_movement(entity: &EntityView) -> bool {
    match entity.kind {
        EntityKind::Source => true,
        EntityKind::Facility(kind) => kind != FacilityKind::Container,
        EntityKind::Unit(_) | EntityKind::ConstructionSite { .. } => false,
    }
}

fn strike(target: &mut EntityView, damage: u32, despawns: &mut Vec<ObjectId>) {
    target.hits = target.hits.saturating_sub(damage);
    if target.hits == 0 {
        despawns.push(target.id.clone());
    }
}

/// Towers act anywhere in their room; other facilities cannot perform job actions.
fn facility_action(
    kind: FacilityKind,
    agent: &mut EntityView,
    target: &mut EntityView,
    action: ActionKind,
    despawns: &mut Vec<ObjectId>,
) -> ActionOutcome {
    if kind != FacilityKind::Tower || agent.room != target.room {
        return ActionOutcome::InvalidTarget;
    }
    let valid_target = match action {
        ActionKind::Attack => !target.owned && target.hits_max > 0,
        ActionKind::Heal => target.is_unit() && target.owned,
        ActionKind::Repair => {
            target.owned && target.facility_kind().is_some() && target.is_damaged()
        }
        _ => false,
    };
    if !valid_target {
        return ActionOutcome::InvalidTarget;
    }
    if agent.energy < TOWER_ENERGY_COST {
        return ActionOutcome::NotEnoughResources;
    }
    agent.energy -= TOWER_ENERGY_COST;
    match action {
        ActionKind::Attack => strike(target, TOWER_ATTACK, despawns),
        ActionKind::Heal => target.hits = (target.hits + TOWER_HEAL).min(target.hits_max),
        _ => target.hits = (target.hits + TOWER_REPAIR).min(target.hits_max),
    }
    ActionOutcome::Ok
}

impl World for SimWorld {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn room_names(&self) -> Vec<RoomName> {
        self.rooms.keys().cloned().collect()
    }

    fn room_visible(&self, room: &RoomName) -> bool {
        self.rooms.get(room).is_some_and(|sim_room| sim_room.visible)
    }

    fn units_in_room(&self, room: &RoomName) -> Vec<ObjectId> {
        if !self.room_visible(room) {
            return Vec::new();
        }
        self.entities
            .iter()
            .filter(|entity| &entity.room == room && entity.owned && entity.is_unit())
            .map(|entity| entity.id.clone())
            .collect()
    }

    fn facilities_in_room(&self, room: &RoomName) -> Vec<ObjectId> {
        if !self.room_visible(room) {
            return Vec::new();
        }
        self.entities
            .iter()
            .filter(|entity| {
                &entity.room == room && entity.owned && entity.facility_kind().is_some()
            })
            .map(|entity| entity.id.clone())
            .collect()
    }

    fn resolve(&self, id: &ObjectId) -> Option<EntityView> {
        let entity = self.find(id)?;
        self.room_visible(&entity.room).then(|| entity.clone())
    }

    fn query_range(
        &self,
        room: &RoomName,
        center: Position,
        radius: u32,
        filter: EntityFilter,
    ) -> Vec<EntityView> {
        if !self.room_visible(room) {
            return Vec::new();
        }
        self.entities
            .iter()
            .filter(|entity| &entity.room == room)
            .filter(|entity| entity.position.in_range_to(center, radius))
            .filter(|entity| filter.matches(entity))
            .cloned()
            .collect()
    }

    fn open_spots(&self, room: &RoomName, center: Position, radius: u32) -> usize {
        let radius = radius as i32;
        let mut count = 0;
        for y in center.y - radius..=center.y + radius {
            for x in center.x - radius..=center.x + radius {
                let position = Position::new(x, y);
                if position != center && self.is_walkable(room, position) {
                    count += 1;
                }
            }
        }
        count
    }

    fn move_toward(&mut self, agent: &ObjectId, target: Position, range: u32) -> MoveOutcome {
        self.move_calls = self.move_calls.saturating_add(1);
        let Some(view) = self.find(agent).filter(|view| view.is_unit()).cloned() else {
            return MoveOutcome::NoPath;
        };
        if view.position.in_range_to(target, range) {
            return MoveOutcome::AlreadyThere;
        }
        let step_x = (target.x - view.position.x).signum();
        let step_y = (target.y - view.position.y).signum();
        let candidates = [(step_x, step_y), (step_x, 0), (0, step_y)];
        let next = candidates
            .into_iter()
            .filter(|(dx, dy)| *dx != 0 || *dy != 0)
            .map(|(dx, dy)| Position::new(view.position.x + dx, view.position.y + dy))
            .find(|position| self.is_walkable(&view.room, *position));
        match (next, self.entity_mut(agent)) {
            (Some(position), Some(entity)) => {
                entity.position = position;
                MoveOutcome::Moved
            }
            _ => MoveOutcome::NoPath,
        }
    }

    fn act(&mut self, agent: &ObjectId, action: ActionKind, target: &ObjectId) -> ActionOutcome {
        let outcome = match (self.find(agent).cloned(), self.find(target).cloned()) {
            (Some(mut agent_view), Some(mut target_view)) => {
                let same_object = agent_view.id == target_view.id;
                let outcome = self.resolve_action(&mut agent_view, &mut target_view, action);
                if same_object {
                    target_view.energy = agent_view.energy;
                    self.store(target_view);
                } else {
                    self.store(agent_view);
                    self.store(target_view);
                }
                outcome
            }
            _ => ActionOutcome::InvalidTarget,
        };
        self.actions.push(ActionRecord {
            agent: agent.clone(),
            action,
            target: target.clone(),
            outcome,
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomName {
        RoomName::from("W1N1")
    }

    #[test]
    fn harvest_then_transfer_moves_energy() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        let source = world.add_source(&room(), Position::new(10, 10));
        let spawn = world.add_facility(
            &room(),
            Position::new(12, 10),
            FacilitySpec::new(FacilityKind::Spawn),
        );
        let unit = world.spawn_unit(&room(), Position::new(11, 10), UnitSpec::worker(2, 1));

        assert_eq!(
            world.act(&unit, ActionKind::Harvest, &source),
            ActionOutcome::Ok
        );
        assert_eq!(world.resolve(&unit).expect("unit").energy, 4);
        assert_eq!(
            world.act(&unit, ActionKind::Transfer, &spawn),
            ActionOutcome::Ok
        );
        assert_eq!(world.resolve(&spawn).expect("spawn").energy, 4);
        assert_eq!(
            world.act(&unit, ActionKind::Transfer, &spawn),
            ActionOutcome::NotEnoughResources
        );
        assert_eq!(world.actions().len(), 3);
    }

    #[test]
    fn out_of_range_action_reports_not_in_range() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        let source = world.add_source(&room(), Position::new(10, 10));
        let unit = world.spawn_unit(&room(), Position::new(20, 20), UnitSpec::worker(1, 1));
        assert_eq!(
            world.act(&unit, ActionKind::Harvest, &source),
            ActionOutcome::NotInRange
        );
    }

    #[test]
    fn completed_site_becomes_facility_after_tick() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        let site = world.add_construction_site(
            &room(),
            Position::new(5, 5),
            FacilityKind::Extension,
            10,
        );
        let unit = world.spawn_unit(
            &room(),
            Position::new(6, 6),
            UnitSpec::worker(2, 1).with_energy(50),
        );

        assert_eq!(world.act(&unit, ActionKind::Build, &site), ActionOutcome::Ok);
        assert!(world.resolve(&site).is_some());
        world.advance_tick();
        assert!(world.resolve(&site).is_none());
        let facilities = world.facilities_in_room(&room());
        assert_eq!(facilities.len(), 1);
        assert_eq!(
            world
                .resolve(&facilities[0])
                .and_then(|view| view.facility_kind()),
            Some(FacilityKind::Extension)
        );
        assert!(world.actions().is_empty());
    }

    #[test]
    fn tower_repairs_itself_and_pays_energy() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        let tower = world.add_facility(
            &room(),
            Position::new(20, 20),
            FacilitySpec::new(FacilityKind::Tower)
                .with_energy(100)
                .with_hits(1000),
        );
        assert_eq!(
            world.act(&tower, ActionKind::Repair, &tower),
            ActionOutcome::Ok
        );
        let view = world.resolve(&tower).expect("tower");
        assert_eq!(view.hits, 1800);
        assert_eq!(view.energy, 90);
    }

    #[test]
    fn movement_steps_around_walls_and_stops_in_range() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        world.add_wall(&room(), Position::new(11, 11));
        let unit = world.spawn_unit(&room(), Position::new(10, 10), UnitSpec::hauler(1));

        assert_eq!(
            world.move_toward(&unit, Position::new(15, 15), 1),
            MoveOutcome::Moved
        );
        assert_eq!(
            world.resolve(&unit).expect("unit").position,
            Position::new(11, 10)
        );
        assert_eq!(
            world.move_toward(&unit, Position::new(12, 11), 1),
            MoveOutcome::AlreadyThere
        );
        assert_eq!(world.move_calls(), 2);
    }

    #[test]
    fn open_spots_exclude_walls_sources_and_edges() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        world.add_wall(&room(), Position::new(1, 0));
        world.add_source(&room(), Position::new(1, 1));
        assert_eq!(world.open_spots(&room(), Position::new(0, 0), 1), 1);
        assert_eq!(world.open_spots(&room(), Position::new(10, 10), 1), 8);
    }

    #[test]
    fn hidden_rooms_resolve_nothing() {
        let mut world = SimWorld::new();
        world.add_room(&room());
        let source = world.add_source(&room(), Position::new(10, 10));
        world.set_room_visible(&room(), false);
        assert!(world.resolve(&source).is_none());
        assert!(!world.room_visible(&room()));
    }
}
