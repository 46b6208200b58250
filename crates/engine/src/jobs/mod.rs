mod assign;
mod board;
mod identity;
mod types;

pub use assign::{assign_new_job, select_job, AgentRef, Assignment, AssignmentRequest};
pub use board::{JobBoard, RoomJobTable};
pub use types::{
    ActionKind, Job, JobAction, JobCategory, JobId, TransferPurpose, WithdrawPurpose,
};
