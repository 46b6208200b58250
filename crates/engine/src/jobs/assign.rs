use crate::codes::DispatchError;
use crate::jobs::board::JobBoard;
use crate::jobs::types::{Job, JobCategory, JobId};
use crate::world::{ObjectId, Position, RoomName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRef<'a> {
    Unit(&'a ObjectId),
    Facility(&'a ObjectId),
}

impl<'a> AgentRef<'a> {
    pub fn id(&self) -> &'a ObjectId {
        match self {
            Self::Unit(id) | Self::Facility(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Assigned(JobId),
    NoContent,
}

impl Assignment {
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Assigned(id) => Some(id),
            Self::NoContent => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignmentRequest<'a> {
    pub agent: AgentRef<'a>,
    pub position: Option<Position>,
    /// Preference order; the first category with an eligible job wins.
    pub categories: &'a [JobCategory],
    pub tick: u64,
    /// Never hand back this job, typically the agent's current primary.
    pub exclude: Option<&'a JobId>,
}

/// First-fit across categories. Inside a category the pick goes to `has_priority`, then
/// to the nearest job, then to table order.
pub fn assign_new_job(
    board: &mut JobBoard,
    room: &RoomName,
    request: &AssignmentRequest<'_>,
) -> Result<Assignment, DispatchError> {
    let Some(job_id) = select_job(board, room, request) else {
        return Ok(Assignment::NoContent);
    };
    match request.agent {
        AgentRef::Unit(unit) => board.assign_unit(room, &job_id, unit)?,
        AgentRef::Facility(facility) => board.assign_facility(room, &job_id, facility)?,
    }
    Ok(Assignment::Assigned(job_id))
}

pub fn select_job(
    board: &JobBoard,
    room: &RoomName,
    request: &AssignmentRequest<'_>,
) -> Option<JobId> {
    let table = board.table(room)?;
    request.categories.iter().find_map(|category| {
        table
            .iter()
            .enumerate()
            .filter(|(_, job)| job.category() == *category)
            .filter(|(_, job)| Some(&job.id) != request.exclude)
            .filter(|(_, job)| is_eligible(job, request))
            .min_by_key(|(index, job)| {
                (
                    !job.has_priority,
                    distance(request.position, job.position),
                    *index,
                )
            })
            .map(|(_, job)| job.id.clone())
    })
}

fn is_eligible(job: &Job, request: &AssignmentRequest<'_>) -> bool {
    match request.agent {
        AgentRef::Unit(unit) => job.has_unit(unit) || job.accepts_units(request.tick),
        AgentRef::Facility(facility) => {
            job.has_facility(facility) || job.accepts_facilities(request.tick)
        }
    }
}

fn distance(from: Option<Position>, to: Option<Position>) -> u32 {
    match (from, to) {
        (Some(from), Some(to)) => from.range_to(to),
        _ => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{JobAction, WithdrawPurpose};

    fn room() -> RoomName {
        RoomName::from("W1N1")
    }

    fn harvest(source: &str, x: i32) -> Job {
        let source = ObjectId::from(source);
        Job::new(
            JobId::for_target(JobCategory::Harvest, &source),
            JobAction::Harvest,
        )
        .targeting(source)
        .at(Position::new(x, 10))
        .with_capacity(2, 0)
    }

    fn withdraw(container: &str, x: i32) -> Job {
        let container = ObjectId::from(container);
        Job::new(
            JobId::for_target(JobCategory::Withdraw, &container),
            JobAction::Withdraw {
                purpose: WithdrawPurpose::General,
            },
        )
        .targeting(container)
        .at(Position::new(x, 10))
        .with_capacity(2, 0)
    }

    fn request<'a>(
        unit: &'a ObjectId,
        categories: &'a [JobCategory],
        x: i32,
    ) -> AssignmentRequest<'a> {
        AssignmentRequest {
            agent: AgentRef::Unit(unit),
            position: Some(Position::new(x, 10)),
            categories,
            tick: 5,
            exclude: None,
        }
    }

    #[test]
    fn falls_through_categories_in_preference_order() {
        let mut board = JobBoard::default();
        board.upsert_job(&room(), harvest("src1", 10));
        let unit = ObjectId::from("u1");
        let categories = [JobCategory::Withdraw, JobCategory::Harvest];

        let assignment =
            assign_new_job(&mut board, &room(), &request(&unit, &categories, 0)).expect("assign");
        assert_eq!(
            assignment,
            Assignment::Assigned(JobId("harvest-src1".to_string()))
        );
        assert!(board
            .get_job(&room(), &JobId("harvest-src1".to_string()))
            .expect("job")
            .has_unit(&unit));
    }

    #[test]
    fn earlier_category_beats_nearer_job() {
        let mut board = JobBoard::default();
        board.upsert_job(&room(), harvest("src1", 1));
        board.upsert_job(&room(), withdraw("c1", 40));
        let unit = ObjectId::from("u1");
        let categories = [JobCategory::Withdraw, JobCategory::Harvest];

        let picked = select_job(&board, &room(), &request(&unit, &categories, 0));
        assert_eq!(picked, Some(JobId("withdraw-c1".to_string())));
    }

    #[test]
    fn priority_then_proximity_then_table_order() {
        let mut board = JobBoard::default();
        board.upsert_job(&room(), harvest("far", 40));
        board.upsert_job(&room(), harvest("near", 12));
        board.upsert_job(&room(), harvest("near_twin", 12));
        let unit = ObjectId::from("u1");
        let categories = [JobCategory::Harvest];

        assert_eq!(
            select_job(&board, &room(), &request(&unit, &categories, 10)),
            Some(JobId("harvest-near".to_string()))
        );

        board.upsert_job(&room(), harvest("far", 40).with_priority(true));
        assert_eq!(
            select_job(&board, &room(), &request(&unit, &categories, 10)),
            Some(JobId("harvest-far".to_string()))
        );
    }

    #[test]
    fn skips_full_future_and_excluded_jobs() {
        let mut board = JobBoard::default();
        board.upsert_job(&room(), harvest("src1", 10).with_capacity(0, 0));
        board.upsert_job(&room(), harvest("src2", 10).eligible_from(6));
        board.upsert_job(&room(), harvest("src3", 10));
        let unit = ObjectId::from("u1");
        let categories = [JobCategory::Harvest];
        let excluded = JobId("harvest-src3".to_string());

        let mut req = request(&unit, &categories, 10);
        req.exclude = Some(&excluded);
        let assignment = assign_new_job(&mut board, &room(), &req).expect("assign");
        assert_eq!(assignment, Assignment::NoContent);
    }

    #[test]
    fn no_jobs_in_room_yields_no_content() {
        let mut board = JobBoard::default();
        let unit = ObjectId::from("u1");
        let categories = [JobCategory::Build];
        let assignment =
            assign_new_job(&mut board, &room(), &request(&unit, &categories, 0)).expect("assign");
        assert_eq!(assignment, Assignment::NoContent);
        assert_eq!(assignment.job_id(), None);
    }
}
