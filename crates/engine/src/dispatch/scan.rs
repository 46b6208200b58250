use std::collections::BTreeSet;

use tracing::info;

use crate::jobs::{ActionKind, Job, JobAction, JobCategory, JobId};
use crate::world::{EntityFilter, EntityKind, FacilityKind, ObjectId, Position, RoomName, World};

use super::Dispatcher;

const ROOM_CENTER: Position = Position::new(25, 25);
const ROOM_RADIUS: u32 = 50;

impl<W: World> Dispatcher<'_, W> {
    /// Derives jobs from world objects that cannot create their own: construction sites,
    /// sources, and controllers nobody owns yet. Jobs that already exist are left as is.
    pub(super) fn scan_room(&mut self, room: &RoomName) {
        let objects = self
            .world
            .query_range(room, ROOM_CENTER, ROOM_RADIUS, EntityFilter::Any);
        for object in objects {
            let job = match object.kind {
                EntityKind::ConstructionSite { .. } if object.owned => {
                    let remaining = object.remaining_progress().unwrap_or(0);
                    let spots = self
                        .world
                        .open_spots(room, object.position, ActionKind::Build.interaction_range())
                        .max(1);
                    Job::new(
                        JobId::for_site(JobCategory::Build, object.position, &object.id),
                        JobAction::Build {
                            energy_required: remaining,
                        },
                    )
                    .with_capacity(spots, 0)
                }
                EntityKind::Source => {
                    let spots = self
                        .world
                        .open_spots(room, object.position, ActionKind::Harvest.interaction_range())
                        .max(1);
                    Job::new(
                        JobId::for_target(JobCategory::Harvest, &object.id),
                        JobAction::Harvest,
                    )
                    .with_capacity(spots, 0)
                }
                EntityKind::Facility(FacilityKind::Controller) if !object.owned => Job::new(
                    JobId::for_target(JobCategory::Claim, &object.id),
                    JobAction::Claim,
                ),
                _ => continue,
            };
            self.ensure_job(room, job.targeting(object.id).at(object.position));
        }
    }

    /// Frees job slots held by agents no longer enumerated in `room`, marks their
    /// memory unseen, and forgets it once the grace period has passed.
    pub(super) fn sweep_stale_agents(
        &mut self,
        room: &RoomName,
        units: &[ObjectId],
        facilities: &[ObjectId],
        tick: u64,
    ) {
        let grace = self.config.save_unloaded_for_ticks;
        let live_units: BTreeSet<&ObjectId> = units.iter().collect();
        let live_facilities: BTreeSet<&ObjectId> = facilities.iter().collect();
        let live_agents: BTreeSet<ObjectId> = units.iter().chain(facilities).cloned().collect();
        self.memory.jobs.retain_live_agents(room, &live_agents);

        let mut expired_units = Vec::new();
        for (id, unit) in &mut self.memory.units {
            if &unit.room != room || live_units.contains(id) {
                continue;
            }
            let since = *unit.is_not_seen_since.get_or_insert(tick);
            if tick.saturating_sub(since) >= grace {
                expired_units.push(id.clone());
            }
        }
        for id in expired_units {
            self.memory.forget_unit(&id);
            info!(unit = %id, room = %room, tick, "unit_memory_removed");
        }

        let mut expired_facilities = Vec::new();
        for (id, facility) in &mut self.memory.facilities {
            if &facility.room != room || live_facilities.contains(id) {
                continue;
            }
            let since = *facility.is_not_seen_since.get_or_insert(tick);
            if tick.saturating_sub(since) >= grace {
                expired_facilities.push(id.clone());
            }
        }
        for id in expired_facilities {
            self.memory.forget_facility(&id);
            info!(facility = %id, room = %room, tick, "facility_memory_removed");
        }
    }
}
