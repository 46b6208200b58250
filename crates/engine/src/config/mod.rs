mod roles;

pub use roles::{
    load_role_dir, load_role_file, parse_roles_document, RoleBook, RoleDef, RoleDefError,
    RoleDefErrorCode, SourceLocation, UnitRole,
};

use crate::jobs::ActionKind;

pub const DEFAULT_SAVE_UNLOADED_FOR_TICKS: u64 = 500;
pub const DEFAULT_AVERAGE_OVER_TICKS: u32 = 2500;

/// Energy a single WORK part is expected to move per tick for each action. Executors
/// use these to lower a job's remaining requirement after a successful action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub build: u32,
    pub repair: u32,
    pub upgrade: u32,
    pub harvest: u32,
    pub dismantle: u32,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            build: 5,
            repair: 1,
            upgrade: 2,
            harvest: 2,
            dismantle: 1,
        }
    }
}

impl Throughput {
    pub fn per_work_part(&self, action: ActionKind) -> u32 {
        match action {
            ActionKind::Build => self.build,
            ActionKind::Repair => self.repair,
            ActionKind::Upgrade => self.upgrade,
            ActionKind::Harvest => self.harvest,
            ActionKind::Dismantle => self.dismantle,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Ticks an unseen agent or room keeps its memory before cleanup.
    pub save_unloaded_for_ticks: u64,
    pub stats_enabled: bool,
    pub average_over_ticks: u32,
    pub throughput: Throughput,
    /// Energy requirement given to a freshly created upgrade job.
    pub upgrade_energy_budget: u32,
    /// Towers refill below this fill percentage.
    pub tower_refill_percent: u32,
    pub controller_energy_range: u32,
    pub source_link_range: u32,
    pub roles: RoleBook,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            save_unloaded_for_ticks: DEFAULT_SAVE_UNLOADED_FOR_TICKS,
            stats_enabled: true,
            average_over_ticks: DEFAULT_AVERAGE_OVER_TICKS,
            throughput: Throughput::default(),
            upgrade_energy_budget: 1000,
            tower_refill_percent: 100,
            controller_energy_range: 3,
            source_link_range: 2,
            roles: RoleBook::builtin(),
        }
    }
}

impl DispatchConfig {
    pub fn with_roles(mut self, roles: RoleBook) -> Self {
        self.roles = roles;
        self
    }

    pub fn without_stats(mut self) -> Self {
        self.stats_enabled = false;
        self
    }
}
