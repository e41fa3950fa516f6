//! Greedy placement plus the consolidation loop: underloaded machines are
//! drained by packing migrations and idle machines are powered down to the
//! running-tier minimum. Powered-off machines are woken on demand.

use crate::core::common::{default_flavor, MachineId, SState, TaskId, Time};
use crate::core::config::SchedulerConfig;
use crate::core::migration;
use crate::core::placement;
use crate::core::policy::SchedulerPolicy;
use crate::core::power;
use crate::core::tiers::TierController;
use crate::scheduler::SchedulerCore;

pub struct ConsolidatingGreedy {
    tiers: TierController,
}

impl ConsolidatingGreedy {
    pub fn new(config: &SchedulerConfig) -> Self {
        // every machine starts in the running tier and there is no standby
        let mut tier_config = config.clone();
        tier_config.max_running = usize::MAX;
        tier_config.standby_size = 0;
        Self {
            tiers: TierController::new(&tier_config),
        }
    }

    fn try_consolidate(&mut self, core: &mut SchedulerCore, time: Time) {
        if !core.migrations.has_capacity() {
            return;
        }
        let decision = {
            let cloud = core.cloud.borrow();
            migration::find_consolidation(
                &*cloud,
                &core.fleet,
                &core.migrations,
                self.tiers.running(),
                core.config.consolidation_threshold,
                core.config.pack_ceiling,
            )
        };
        if let Some((vm, _source, dest)) = decision {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            migration::start_migration(&mut *cloud, &mut core.migrations, &mut **logger, vm, dest, time);
        }
    }
}

impl SchedulerPolicy for ConsolidatingGreedy {
    fn init(&mut self, core: &mut SchedulerCore, time: Time) {
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        self.tiers.initial_partition(&mut *cloud, &mut **logger, &core.fleet, time);

        let running = self.tiers.running().to_vec();
        for machine in running {
            let cpu = match core.fleet.host_cpu(machine) {
                Some(cpu) => cpu,
                None => continue,
            };
            let flavor = default_flavor(cpu);
            let vm = match cloud.vm_create(flavor, cpu) {
                Ok(vm) => vm,
                Err(e) => {
                    logger.log_error(time, format!("error creating vm on machine #{}: {}", machine, e));
                    continue;
                }
            };
            if let Err(e) = cloud.vm_attach(vm, machine) {
                logger.log_error(time, format!("error attaching vm #{} to machine #{}: {}", vm, machine, e));
                continue;
            }
            core.fleet.note_create(vm, flavor, cpu);
            core.fleet.note_attach(vm, machine);
        }
    }

    fn on_new_task(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId) {
        let req = match placement::task_requirements(&*core.cloud.borrow(), task) {
            Ok(req) => req,
            Err(e) => {
                core.logger
                    .borrow_mut()
                    .log_error(time, format!("error getting task requirements: {}", e));
                return;
            }
        };

        let best = placement::least_loaded_vm(&*core.cloud.borrow(), &core.fleet, &core.migrations, |info| {
            info.cpu == req.cpu && info.flavor == req.flavor
        });
        if let Some(vm) = best {
            if core.cloud.borrow_mut().vm_add_task(vm, task, req.priority).is_ok() {
                core.logger
                    .borrow_mut()
                    .log_debug(time, format!("placed task #{} on vm #{}", task, vm));
                return;
            }
        }

        let compatible =
            placement::least_loaded_vm(&*core.cloud.borrow(), &core.fleet, &core.migrations, |info| {
                info.cpu == req.cpu
            });
        if let Some(vm) = compatible {
            if core.cloud.borrow_mut().vm_add_task(vm, task, req.priority).is_ok() {
                core.logger
                    .borrow_mut()
                    .log_debug(time, format!("placed task #{} on compatible vm #{}", task, vm));
                return;
            }
        }

        // no compatible VM is live: wake a powered-down machine of the
        // required architecture and park the task until it reports S0
        {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            if let Some(machine) = self.tiers.wake_for(&mut *cloud, &mut **logger, req.cpu, time) {
                let powered_on = match cloud.machine_info(machine) {
                    Ok(info) => info.state == SState::S0,
                    Err(_) => false,
                };
                if !powered_on {
                    core.pending_wake.entry(machine).or_default().push(task);
                    logger.log_debug(time, format!("task #{} waiting for machine #{} to power on", task, machine));
                    return;
                }
                match cloud.vm_create(req.flavor, req.cpu) {
                    Ok(vm) => {
                        if cloud.vm_attach(vm, machine).is_ok() {
                            core.fleet.note_create(vm, req.flavor, req.cpu);
                            core.fleet.note_attach(vm, machine);
                            if cloud.vm_add_task(vm, task, req.priority).is_ok() {
                                logger.log_debug(
                                    time,
                                    format!("woke machine #{} for task #{} on vm #{}", machine, task, vm),
                                );
                                return;
                            }
                        }
                    }
                    Err(e) => logger.log_error(time, format!("error creating vm on machine #{}: {}", machine, e)),
                }
            }
        }

        let placed = {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            placement::emergency_place(&mut *cloud, &core.fleet, &core.migrations, &mut **logger, task, time)
        };
        if placed.is_none() {
            core.logger
                .borrow_mut()
                .log_error(time, format!("failed to place task #{}", task));
        }
    }

    fn on_task_complete(&mut self, core: &mut SchedulerCore, time: Time, _task: TaskId) {
        self.try_consolidate(core, time);
    }

    fn on_periodic(&mut self, core: &mut SchedulerCore, time: Time) {
        {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            power::apply_pstates(
                &mut *cloud,
                &mut **logger,
                self.tiers.running(),
                &core.config.pstate_cutpoints,
                time,
            );
        }
        self.try_consolidate(core, time);
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        self.tiers.demote_idle_hosts(&mut *cloud, &mut **logger, &core.migrations, time);
    }

    fn on_memory_warning(&mut self, core: &mut SchedulerCore, time: Time, machine: MachineId) {
        if !core.migrations.has_capacity() {
            return;
        }
        let decision = {
            let cloud = core.cloud.borrow();
            migration::find_relief_migration(&*cloud, &core.fleet, &core.migrations, machine, self.tiers.running())
        };
        match decision {
            Some((vm, dest)) => {
                let mut cloud = core.cloud.borrow_mut();
                let mut logger = core.logger.borrow_mut();
                migration::start_migration(&mut *cloud, &mut core.migrations, &mut **logger, vm, dest, time);
            }
            None => core
                .logger
                .borrow_mut()
                .log_error(time, format!("unable to handle memory warning on machine #{}", machine)),
        }
    }

    fn on_sla_warning(&mut self, _core: &mut SchedulerCore, _time: Time, _task: TaskId) {}
}
