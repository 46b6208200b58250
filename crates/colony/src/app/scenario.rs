use hive_engine::{FacilityKind, FacilitySpec, Position, RoomName, SimWorld, UnitSpec};
use tracing::info;

pub(crate) const HOME_ROOM: &str = "W1N1";
pub(crate) const EXPANSION_ROOM: &str = "W1N2";

/// Seeds a deterministic two-room world: an established home room and a neighbour
/// whose controller is still unclaimed. The same seed always yields the same ids, so
/// persisted memory lines up with a freshly seeded world.
pub(crate) fn seed_world() -> SimWorld {
    let mut world = SimWorld::new();
    seed_home_room(&mut world, &RoomName::from(HOME_ROOM));
    seed_expansion_room(&mut world, &RoomName::from(EXPANSION_ROOM));
    info!(
        rooms = 2,
        entities = world.entity_count(),
        "scenario_seeded"
    );
    world
}

fn seed_home_room(world: &mut SimWorld, room: &RoomName) {
    world.add_room(room);
    for x in 0..10 {
        world.add_wall(room, Position::new(x, 20));
    }

    world.add_source(room, Position::new(8, 8));
    world.add_source(room, Position::new(40, 12));
    world.add_facility(
        room,
        Position::new(38, 12),
        FacilitySpec::new(FacilityKind::Container),
    );

    world.add_facility(
        room,
        Position::new(25, 25),
        FacilitySpec::new(FacilityKind::Spawn).with_energy(150),
    );
    for x in [22, 23, 27, 28] {
        world.add_facility(
            room,
            Position::new(x, 27),
            FacilitySpec::new(FacilityKind::Extension),
        );
    }
    world.add_facility(
        room,
        Position::new(30, 22),
        FacilitySpec::new(FacilityKind::Tower)
            .with_energy(400)
            .with_hits(2500),
    );
    world.add_facility(
        room,
        Position::new(15, 40),
        FacilitySpec::new(FacilityKind::Controller),
    );
    world.add_facility(
        room,
        Position::new(17, 40),
        FacilitySpec::new(FacilityKind::Container).with_energy(600),
    );
    world.add_facility(
        room,
        Position::new(26, 30),
        FacilitySpec::new(FacilityKind::Storage).with_energy(5000),
    );
    world.add_facility(
        room,
        Position::new(5, 21),
        FacilitySpec::new(FacilityKind::Wall).with_hits(4000),
    );
    world.add_construction_site(room, Position::new(24, 22), FacilityKind::Extension, 300);

    world.spawn_unit(room, Position::new(24, 24), UnitSpec::worker(2, 2));
    world.spawn_unit(room, Position::new(26, 24), UnitSpec::worker(2, 1).with_energy(50));
    world.spawn_unit(room, Position::new(10, 10), UnitSpec::worker(1, 1));
    world.spawn_unit(room, Position::new(27, 26), UnitSpec::hauler(2).with_energy(100));
    world.spawn_unit(room, Position::new(20, 25), UnitSpec::healer(1));
    world.spawn_unit(room, Position::new(45, 45), UnitSpec::fighter(2).hostile());
}

fn seed_expansion_room(world: &mut SimWorld, room: &RoomName) {
    world.add_room(room);
    world.add_source(room, Position::new(12, 30));
    world.add_facility(
        room,
        Position::new(30, 30),
        FacilitySpec::new(FacilityKind::Controller).unowned(),
    );
    world.spawn_unit(room, Position::new(5, 5), UnitSpec::claimer());
    world.spawn_unit(room, Position::new(6, 5), UnitSpec::worker(1, 1));
}

#[cfg(test)]
mod tests {
    use hive_engine::World;

    use super::*;

    #[test]
    fn seeding_is_deterministic() {
        let first = seed_world();
        let second = seed_world();
        let home = RoomName::from(HOME_ROOM);

        assert_eq!(first.entity_count(), second.entity_count());
        assert_eq!(first.units_in_room(&home), second.units_in_room(&home));
        assert_eq!(
            first.facilities_in_room(&home),
            second.facilities_in_room(&home)
        );
    }

    #[test]
    fn expansion_controller_starts_unclaimed() {
        let world = seed_world();
        let room = RoomName::from(EXPANSION_ROOM);
        assert!(world.controller(&room).is_none());
        assert_eq!(world.units_in_room(&room).len(), 2);
    }
}
