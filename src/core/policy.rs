//! Scheduling policy interface.

use std::str::FromStr;

use strum_macros::EnumString;

use crate::core::config::{parse_config_value, SchedulerConfig};
use crate::core::common::{MachineId, TaskId, Time};
use crate::core::policies::consolidating_greedy::ConsolidatingGreedy;
use crate::core::policies::energy_tiered::EnergyTiered;
use crate::core::policies::greedy::Greedy;
use crate::core::policies::static_packer::StaticPacker;
use crate::scheduler::SchedulerCore;

/// Trait for implementation of scheduling policies.
///
/// A policy reacts to the simulator-driven events it cares about and mutates
/// the shared scheduler state (fleet registry, migration tracker,
/// pending-wake map) through the passed core. Migration completion, host
/// state-change draining, SLA priority raising and shutdown are handled by
/// the scheduler itself and are identical across policies.
///
/// It is possible to implement an arbitrary policy and select it per run.
pub trait SchedulerPolicy {
    /// Called once, after the fleet registry has been populated.
    fn init(&mut self, core: &mut SchedulerCore, time: Time);

    /// Places the arriving task or records a placement failure.
    fn on_new_task(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId);

    /// Bookkeeping after a task completes; may trigger consolidation.
    fn on_task_complete(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId);

    /// Periodic tick: P-state sweep plus whatever background work the policy does.
    fn on_periodic(&mut self, core: &mut SchedulerCore, time: Time);

    /// Tries one relieving migration off the overcommitted machine, or declines.
    fn on_memory_warning(&mut self, core: &mut SchedulerCore, time: Time, machine: MachineId);

    /// Optional reaction beyond the priority raise already performed by the scheduler.
    fn on_sla_warning(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId);
}

#[derive(Debug, Clone, PartialEq, EnumString)]
pub enum PolicyKind {
    EnergyTiered,
    Greedy,
    ConsolidatingGreedy,
    StaticPacker,
}

/// Resolves the `policy` config value into a policy instance.
pub fn policy_resolver(config: &SchedulerConfig) -> Box<dyn SchedulerPolicy> {
    let (name, _options) = parse_config_value(&config.policy);
    match PolicyKind::from_str(&name) {
        Ok(PolicyKind::EnergyTiered) => Box::new(EnergyTiered::new(config)),
        Ok(PolicyKind::Greedy) => Box::new(Greedy::new()),
        Ok(PolicyKind::ConsolidatingGreedy) => Box::new(ConsolidatingGreedy::new(config)),
        Ok(PolicyKind::StaticPacker) => Box::new(StaticPacker::new()),
        Err(_) => panic!("Can't resolve: {}", config.policy),
    }
}
