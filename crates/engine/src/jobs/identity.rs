use crate::jobs::types::{JobCategory, JobId};
use crate::world::{ObjectId, Position};

impl JobId {
    /// Deterministic key: `<category>[-<x>/<y>][-<target>]`.
    ///
    /// Deriving from the same inputs always yields the same id, so creating a job that
    /// already exists is detected by lookup instead of producing a duplicate. Pass a
    /// position only for targets that do not move; jobs against units key on the target
    /// alone.
    pub fn derive(
        category: JobCategory,
        position: Option<Position>,
        target: Option<&ObjectId>,
    ) -> Self {
        let mut id = category.as_str().to_string();
        if let Some(position) = position {
            id.push('-');
            id.push_str(&format!("{}/{}", position.x, position.y));
        }
        if let Some(target) = target {
            id.push('-');
            id.push_str(target.as_str());
        }
        Self(id)
    }

    pub fn for_target(category: JobCategory, target: &ObjectId) -> Self {
        Self::derive(category, None, Some(target))
    }

    pub fn for_site(category: JobCategory, position: Position, target: &ObjectId) -> Self {
        Self::derive(category, Some(position), Some(target))
    }

    pub fn for_position(category: JobCategory, position: Position) -> Self {
        Self::derive(category, Some(position), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_derive_the_same_id() {
        let site = ObjectId::from("site7");
        let first = JobId::for_site(JobCategory::Build, Position::new(12, 30), &site);
        let second = JobId::for_site(JobCategory::Build, Position::new(12, 30), &site);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "build-12/30-site7");
    }

    #[test]
    fn category_keeps_purpose_distinct() {
        let container = ObjectId::from("c1");
        assert_eq!(
            JobId::for_target(JobCategory::WithdrawController, &container).as_str(),
            "withdrawController-c1"
        );
        assert_ne!(
            JobId::for_target(JobCategory::Withdraw, &container),
            JobId::for_target(JobCategory::WithdrawController, &container)
        );
    }

    #[test]
    fn position_only_ids_have_no_target_suffix() {
        let id = JobId::for_position(JobCategory::Move, Position::new(25, 25));
        assert_eq!(id.as_str(), "move-25/25");
    }
}
