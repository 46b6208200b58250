use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::world::{ObjectId, Position};

/// Closed set of primitive actions a job can ask an agent to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Transfer,
    Withdraw,
    Harvest,
    Build,
    Repair,
    Dismantle,
    Upgrade,
    Attack,
    Claim,
    Heal,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        Self::Move,
        Self::Transfer,
        Self::Withdraw,
        Self::Harvest,
        Self::Build,
        Self::Repair,
        Self::Dismantle,
        Self::Upgrade,
        Self::Attack,
        Self::Claim,
        Self::Heal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Transfer => "transfer",
            Self::Withdraw => "withdraw",
            Self::Harvest => "harvest",
            Self::Build => "build",
            Self::Repair => "repair",
            Self::Dismantle => "dismantle",
            Self::Upgrade => "upgrade",
            Self::Attack => "attack",
            Self::Claim => "claim",
            Self::Heal => "heal",
        }
    }

    /// Range at which a mobile unit can perform the action on its target.
    pub fn interaction_range(self) -> u32 {
        match self {
            Self::Move => 0,
            Self::Build | Self::Repair | Self::Upgrade => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown action kind '{value}'"))
    }
}

/// What an agent asks the assignment policy for. Withdraw and transfer jobs carry a
/// purpose so roles can request, for example, only controller-side withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobCategory {
    Move,
    Transfer,
    TransferSource,
    Withdraw,
    WithdrawController,
    Harvest,
    Build,
    Repair,
    Dismantle,
    Upgrade,
    Attack,
    Claim,
    Heal,
}

impl JobCategory {
    pub const ALL: [JobCategory; 13] = [
        Self::Move,
        Self::Transfer,
        Self::TransferSource,
        Self::Withdraw,
        Self::WithdrawController,
        Self::Harvest,
        Self::Build,
        Self::Repair,
        Self::Dismantle,
        Self::Upgrade,
        Self::Attack,
        Self::Claim,
        Self::Heal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Transfer => "transfer",
            Self::TransferSource => "transferSource",
            Self::Withdraw => "withdraw",
            Self::WithdrawController => "withdrawController",
            Self::Harvest => "harvest",
            Self::Build => "build",
            Self::Repair => "repair",
            Self::Dismantle => "dismantle",
            Self::Upgrade => "upgrade",
            Self::Attack => "attack",
            Self::Claim => "claim",
            Self::Heal => "heal",
        }
    }

    pub fn action_kind(self) -> ActionKind {
        match self {
            Self::Move => ActionKind::Move,
            Self::Transfer | Self::TransferSource => ActionKind::Transfer,
            Self::Withdraw | Self::WithdrawController => ActionKind::Withdraw,
            Self::Harvest => ActionKind::Harvest,
            Self::Build => ActionKind::Build,
            Self::Repair => ActionKind::Repair,
            Self::Dismantle => ActionKind::Dismantle,
            Self::Upgrade => ActionKind::Upgrade,
            Self::Attack => ActionKind::Attack,
            Self::Claim => ActionKind::Claim,
            Self::Heal => ActionKind::Heal,
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| format!("unknown job category '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPurpose {
    #[default]
    General,
    Source,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawPurpose {
    #[default]
    General,
    Controller,
}

/// The action a job performs, carrying only the fields that action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum JobAction {
    Move,
    Transfer {
        energy_required: u32,
        #[serde(default)]
        purpose: TransferPurpose,
    },
    Withdraw {
        #[serde(default)]
        purpose: WithdrawPurpose,
    },
    Harvest,
    Build {
        energy_required: u32,
    },
    Repair,
    Dismantle,
    Upgrade {
        energy_required: u32,
    },
    Attack,
    Claim,
    Heal {
        #[serde(default)]
        stop_at_max_hits: bool,
    },
}

impl JobAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Move => ActionKind::Move,
            Self::Transfer { .. } => ActionKind::Transfer,
            Self::Withdraw { .. } => ActionKind::Withdraw,
            Self::Harvest => ActionKind::Harvest,
            Self::Build { .. } => ActionKind::Build,
            Self::Repair => ActionKind::Repair,
            Self::Dismantle => ActionKind::Dismantle,
            Self::Upgrade { .. } => ActionKind::Upgrade,
            Self::Attack => ActionKind::Attack,
            Self::Claim => ActionKind::Claim,
            Self::Heal { .. } => ActionKind::Heal,
        }
    }

    pub fn category(&self) -> JobCategory {
        match self {
            Self::Transfer {
                purpose: TransferPurpose::Source,
                ..
            } => JobCategory::TransferSource,
            Self::Transfer { .. } => JobCategory::Transfer,
            Self::Withdraw {
                purpose: WithdrawPurpose::Controller,
            } => JobCategory::WithdrawController,
            Self::Withdraw { .. } => JobCategory::Withdraw,
            Self::Move => JobCategory::Move,
            Self::Harvest => JobCategory::Harvest,
            Self::Build { .. } => JobCategory::Build,
            Self::Repair => JobCategory::Repair,
            Self::Dismantle => JobCategory::Dismantle,
            Self::Upgrade { .. } => JobCategory::Upgrade,
            Self::Attack => JobCategory::Attack,
            Self::Claim => JobCategory::Claim,
            Self::Heal { .. } => JobCategory::Heal,
        }
    }

    pub fn energy_required(&self) -> Option<u32> {
        match self {
            Self::Transfer {
                energy_required, ..
            }
            | Self::Build { energy_required }
            | Self::Upgrade { energy_required } => Some(*energy_required),
            _ => None,
        }
    }

    fn energy_required_mut(&mut self) -> Option<&mut u32> {
        match self {
            Self::Transfer {
                energy_required, ..
            }
            | Self::Build { energy_required }
            | Self::Upgrade { energy_required } => Some(energy_required),
            _ => None,
        }
    }
}

/// Stable, human-readable job key; see `identity.rs` for derivation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(flatten)]
    pub action: JobAction,
    /// Resolved through the world every time; `None` only for position-only move jobs.
    #[serde(default)]
    pub target: Option<ObjectId>,
    #[serde(default)]
    pub position: Option<Position>,
    pub max_units: usize,
    pub max_facilities: usize,
    #[serde(default)]
    pub assigned_units: Vec<ObjectId>,
    #[serde(default)]
    pub assigned_facilities: Vec<ObjectId>,
    pub update_at_tick: u64,
    #[serde(default)]
    pub expire_at_tick: Option<u64>,
    #[serde(default)]
    pub has_priority: bool,
    #[serde(default)]
    pub linked_job: Option<JobId>,
}

impl Job {
    pub fn new(id: JobId, action: JobAction) -> Self {
        Self {
            id,
            action,
            target: None,
            position: None,
            max_units: 1,
            max_facilities: 0,
            assigned_units: Vec::new(),
            assigned_facilities: Vec::new(),
            update_at_tick: 0,
            expire_at_tick: None,
            has_priority: false,
            linked_job: None,
        }
    }

    pub fn targeting(mut self, target: ObjectId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_capacity(mut self, max_units: usize, max_facilities: usize) -> Self {
        self.max_units = max_units;
        self.max_facilities = max_facilities;
        self
    }

    pub fn with_priority(mut self, has_priority: bool) -> Self {
        self.has_priority = has_priority;
        self
    }

    pub fn eligible_from(mut self, tick: u64) -> Self {
        self.update_at_tick = tick;
        self
    }

    pub fn expires_at(mut self, tick: u64) -> Self {
        self.expire_at_tick = Some(tick);
        self
    }

    pub fn linked_to(mut self, job_id: JobId) -> Self {
        self.linked_job = Some(job_id);
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn category(&self) -> JobCategory {
        self.action.category()
    }

    pub fn energy_required(&self) -> Option<u32> {
        self.action.energy_required()
    }

    /// Changes unit capacity. Units past the new limit lose their slot, latest first.
    pub fn set_max_units(&mut self, max_units: usize) {
        self.max_units = max_units;
        self.assigned_units.truncate(max_units);
    }

    pub fn set_energy_required(&mut self, value: u32) {
        if let Some(energy_required) = self.action.energy_required_mut() {
            *energy_required = value;
        }
    }

    /// Lowers the remaining requirement and returns what is left. Jobs without a
    /// requirement report `None`.
    pub fn consume_energy(&mut self, amount: u32) -> Option<u32> {
        let energy_required = self.action.energy_required_mut()?;
        *energy_required = energy_required.saturating_sub(amount);
        Some(*energy_required)
    }

    pub fn requirement_met(&self) -> bool {
        self.energy_required() == Some(0)
    }

    pub fn is_expired(&self, tick: u64) -> bool {
        self.expire_at_tick.is_some_and(|expire| expire <= tick)
    }

    pub fn is_due(&self, tick: u64) -> bool {
        self.update_at_tick <= tick
    }

    pub fn has_unit(&self, unit: &ObjectId) -> bool {
        self.assigned_units.contains(unit)
    }

    pub fn has_facility(&self, facility: &ObjectId) -> bool {
        self.assigned_facilities.contains(facility)
    }

    pub fn accepts_units(&self, tick: u64) -> bool {
        self.is_due(tick)
            && !self.is_expired(tick)
            && !self.requirement_met()
            && self.assigned_units.len() < self.max_units
    }

    pub fn accepts_facilities(&self, tick: u64) -> bool {
        self.is_due(tick)
            && !self.is_expired(tick)
            && !self.requirement_met()
            && self.assigned_facilities.len() < self.max_facilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_job(energy_required: u32) -> Job {
        Job::new(
            JobId("build-4/4-site1".to_string()),
            JobAction::Build { energy_required },
        )
        .targeting(ObjectId::from("site1"))
        .at(Position::new(4, 4))
        .with_capacity(2, 0)
    }

    #[test]
    fn categories_keep_purpose_but_share_action_kind() {
        let controller_withdraw = JobAction::Withdraw {
            purpose: WithdrawPurpose::Controller,
        };
        assert_eq!(
            controller_withdraw.category(),
            JobCategory::WithdrawController
        );
        assert_eq!(controller_withdraw.kind(), ActionKind::Withdraw);
        assert_eq!(
            JobCategory::TransferSource.action_kind(),
            ActionKind::Transfer
        );
    }

    #[test]
    fn consume_energy_saturates_at_zero() {
        let mut job = build_job(8);
        assert_eq!(job.consume_energy(5), Some(3));
        assert_eq!(job.consume_energy(5), Some(0));
        assert!(job.requirement_met());
        assert!(!job.accepts_units(0));

        let mut attack = Job::new(JobId("attack-h1".to_string()), JobAction::Attack);
        assert_eq!(attack.consume_energy(5), None);
    }

    #[test]
    fn eligibility_respects_schedule_expiry_and_capacity() {
        let mut job = build_job(100).eligible_from(10).expires_at(20);
        assert!(!job.accepts_units(9));
        assert!(job.accepts_units(10));
        assert!(!job.accepts_units(20));

        job.assigned_units.push(ObjectId::from("u1"));
        job.assigned_units.push(ObjectId::from("u2"));
        assert!(!job.accepts_units(12));
        assert!(!job.accepts_facilities(12));
    }

    #[test]
    fn lowering_capacity_drops_latest_units() {
        let mut job = build_job(100);
        job.assigned_units.push(ObjectId::from("u1"));
        job.assigned_units.push(ObjectId::from("u2"));

        job.set_max_units(1);
        assert_eq!(job.max_units, 1);
        assert_eq!(job.assigned_units, vec![ObjectId::from("u1")]);

        job.set_max_units(2);
        assert_eq!(job.assigned_units.len(), 1);
        assert!(job.accepts_units(0));
    }

    #[test]
    fn job_json_is_flat_with_action_tag() {
        let job = build_job(500);
        let value = serde_json::to_value(&job).expect("encode");
        assert_eq!(value["action"], "build");
        assert_eq!(value["energy_required"], 500);
        assert_eq!(value["id"], "build-4/4-site1");

        let decoded: Job = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded, job);
    }

    #[test]
    fn parse_round_trips_names() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>(), Ok(kind));
        }
        assert_eq!(
            "withdrawController".parse::<JobCategory>(),
            Ok(JobCategory::WithdrawController)
        );
        assert!("teleport".parse::<ActionKind>().is_err());
    }
}
