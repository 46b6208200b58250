//! Boundary between the dispatcher and the simulated world.
//!
//! The dispatcher never holds references into world state across ticks. It keeps
//! [`ObjectId`]s and asks the world to resolve them each time; a failed resolve means
//! the object is gone.

mod sim;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::jobs::ActionKind;

pub use sim::{ActionRecord, FacilitySpec, SimWorld, UnitSpec};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(pub String);

impl RoomName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance; diagonal steps cost one.
    pub fn range_to(self, other: Position) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    pub fn in_range_to(self, other: Position, range: u32) -> bool {
        self.range_to(other) <= range
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    Spawn,
    Extension,
    Tower,
    Link,
    Container,
    Storage,
    Controller,
    Wall,
}

impl FacilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Extension => "extension",
            Self::Tower => "tower",
            Self::Link => "link",
            Self::Container => "container",
            Self::Storage => "storage",
            Self::Controller => "controller",
            Self::Wall => "wall",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub work: u32,
    pub carry: u32,
    pub attack: u32,
    pub heal: u32,
    pub claim: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Unit(Body),
    Facility(FacilityKind),
    Source,
    ConstructionSite {
        structure: FacilityKind,
        progress: u32,
        progress_total: u32,
    },
}

/// Read-only copy of an object's state for the current tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityView {
    pub id: ObjectId,
    pub room: RoomName,
    pub position: Position,
    pub kind: EntityKind,
    pub owned: bool,
    pub hits: u32,
    pub hits_max: u32,
    pub energy: u32,
    pub energy_capacity: u32,
}

impl EntityView {
    pub fn body(&self) -> Option<Body> {
        match self.kind {
            EntityKind::Unit(body) => Some(body),
            _ => None,
        }
    }

    pub fn facility_kind(&self) -> Option<FacilityKind> {
        match self.kind {
            EntityKind::Facility(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, EntityKind::Unit(_))
    }

    pub fn is_damaged(&self) -> bool {
        self.hits < self.hits_max
    }

    pub fn energy_free(&self) -> u32 {
        self.energy_capacity.saturating_sub(self.energy)
    }

    /// Fill level in whole percent; zero-capacity objects report 0.
    pub fn energy_percent(&self) -> u32 {
        if self.energy_capacity == 0 {
            return 0;
        }
        ((u64::from(self.energy) * 100) / u64::from(self.energy_capacity)) as u32
    }

    pub fn remaining_progress(&self) -> Option<u32> {
        match self.kind {
            EntityKind::ConstructionSite {
                progress,
                progress_total,
                ..
            } => Some(progress_total.saturating_sub(progress)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Ok,
    NotInRange,
    InvalidTarget,
    NotEnoughResources,
    Full,
    Tired,
    NoBodypart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    AlreadyThere,
    NoPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFilter {
    Any,
    Sources,
    Hostiles,
    OwnedUnits,
    OwnedFacilities,
    ConstructionSites,
}

impl EntityFilter {
    pub fn matches(self, view: &EntityView) -> bool {
        match self {
            Self::Any => true,
            Self::Sources => matches!(view.kind, EntityKind::Source),
            Self::Hostiles => !view.owned && view.is_unit(),
            Self::OwnedUnits => view.owned && view.is_unit(),
            Self::OwnedFacilities => view.owned && view.facility_kind().is_some(),
            Self::ConstructionSites => {
                view.owned && matches!(view.kind, EntityKind::ConstructionSite { .. })
            }
        }
    }
}

/// What the dispatcher needs from the world each tick.
pub trait World {
    fn tick(&self) -> u64;
    fn room_names(&self) -> Vec<RoomName>;
    fn room_visible(&self, room: &RoomName) -> bool;
    fn units_in_room(&self, room: &RoomName) -> Vec<ObjectId>;
    fn facilities_in_room(&self, room: &RoomName) -> Vec<ObjectId>;
    fn resolve(&self, id: &ObjectId) -> Option<EntityView>;
    fn query_range(
        &self,
        room: &RoomName,
        center: Position,
        radius: u32,
        filter: EntityFilter,
    ) -> Vec<EntityView>;
    /// Walkable tiles around `center` within `radius`, the center excluded.
    fn open_spots(&self, room: &RoomName, center: Position, radius: u32) -> usize;
    /// One step toward `target`, stopping once within `range`.
    fn move_toward(&mut self, agent: &ObjectId, target: Position, range: u32) -> MoveOutcome;
    fn act(&mut self, agent: &ObjectId, action: ActionKind, target: &ObjectId) -> ActionOutcome;

    fn controller(&self, room: &RoomName) -> Option<EntityView> {
        self.facilities_in_room(room)
            .iter()
            .filter_map(|id| self.resolve(id))
            .find(|view| view.facility_kind() == Some(FacilityKind::Controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_chebyshev() {
        let origin = Position::new(10, 10);
        assert_eq!(origin.range_to(Position::new(13, 11)), 3);
        assert_eq!(origin.range_to(Position::new(7, 14)), 4);
        assert!(origin.in_range_to(Position::new(11, 11), 1));
    }

    #[test]
    fn energy_percent_handles_empty_capacity() {
        let view = EntityView {
            id: ObjectId::from("c1"),
            room: RoomName::from("W1N1"),
            position: Position::new(1, 1),
            kind: EntityKind::Facility(FacilityKind::Controller),
            owned: true,
            hits: 0,
            hits_max: 0,
            energy: 40,
            energy_capacity: 0,
        };
        assert_eq!(view.energy_percent(), 0);
        assert!(!view.is_damaged());

        let container = EntityView {
            energy_capacity: 200,
            kind: EntityKind::Facility(FacilityKind::Container),
            ..view
        };
        assert_eq!(container.energy_percent(), 20);
        assert_eq!(container.energy_free(), 160);
    }
}
