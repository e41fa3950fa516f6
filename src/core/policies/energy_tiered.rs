//! Three-tier energy policy: running / standby / off host lifecycle with
//! standby promotion, load-driven P-states, consolidation and demotion.

use crate::core::cloud_api::VmInfo;
use crate::core::common::{default_flavor, MachineId, SState, TaskId, Time, VmId};
use crate::core::config::SchedulerConfig;
use crate::core::migration;
use crate::core::placement;
use crate::core::policy::SchedulerPolicy;
use crate::core::power;
use crate::core::tiers::TierController;
use crate::scheduler::SchedulerCore;

pub struct EnergyTiered {
    tiers: TierController,
}

impl EnergyTiered {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            tiers: TierController::new(config),
        }
    }

    /// One consolidation migration at most: pack a VM from an underloaded
    /// running machine onto the most-loaded compatible destination.
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
        if let Some((vm, source, dest)) = decision {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            logger.log_debug(time, format!("consolidating vm #{} away from machine #{}", vm, source));
            migration::start_migration(&mut *cloud, &mut core.migrations, &mut **logger, vm, dest, time);
        }
    }

    /// Promotion path of the placement engine: wake a standby machine of the
    /// required architecture. The task is either placed right away (if the
    /// machine is already at S0) or parked in the pending-wake map.
    fn place_via_promotion(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId) -> bool {
        let req = match placement::task_requirements(&*core.cloud.borrow(), task) {
            Ok(req) => req,
            Err(_) => return false,
        };
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        let machine = match self.tiers.promote_for(&mut *cloud, &mut **logger, req.cpu, time) {
            Some(machine) => machine,
            None => return false,
        };

        let powered_on = match cloud.machine_info(machine) {
            Ok(info) => info.state == SState::S0,
            Err(_) => false,
        };
        let mut placed = false;
        if powered_on {
            match cloud.vm_create(req.flavor, req.cpu) {
                Ok(vm) => match cloud.vm_attach(vm, machine) {
                    Ok(()) => {
                        core.fleet.note_create(vm, req.flavor, req.cpu);
                        core.fleet.note_attach(vm, machine);
                        match cloud.vm_add_task(vm, task, req.priority) {
                            Ok(()) => {
                                logger.log_debug(
                                    time,
                                    format!("activated machine #{} for task #{} on vm #{}", machine, task, vm),
                                );
                                placed = true;
                            }
                            Err(e) => logger.log_error(time, format!("error adding task to vm #{}: {}", vm, e)),
                        }
                    }
                    Err(e) => logger.log_error(time, format!("error attaching vm #{}: {}", vm, e)),
                },
                Err(e) => logger.log_error(time, format!("error creating vm on machine #{}: {}", machine, e)),
            }
        } else {
            core.pending_wake.entry(machine).or_default().push(task);
            logger.log_debug(time, format!("task #{} waiting for machine #{} to power on", task, machine));
            placed = true;
        }

        self.tiers.refill_standby(&mut *cloud, &mut **logger, time);
        placed
    }
}

impl SchedulerPolicy for EnergyTiered {
    fn init(&mut self, core: &mut SchedulerCore, time: Time) {
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        self.tiers.initial_partition(&mut *cloud, &mut **logger, &core.fleet, time);

        // one VM per running machine, flavor chosen from the architecture
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
            logger.log_debug(time, format!("created vm #{} on machine #{}", vm, machine));
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

        // best fit: the compatible VM with the fewest active tasks
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

        // relax the flavor requirement to just the architecture
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

        if self.place_via_promotion(core, time, task) {
            return;
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
            core.logger.borrow_mut().log_debug(
                time,
                format!("migration budget exhausted, not relieving machine #{}", machine),
            );
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
                logger.log_debug(time, format!("relieving machine #{} by moving vm #{}", machine, vm));
                migration::start_migration(&mut *cloud, &mut core.migrations, &mut **logger, vm, dest, time);
            }
            None => core
                .logger
                .borrow_mut()
                .log_error(time, format!("unable to handle memory warning on machine #{}", machine)),
        }
    }

    fn on_sla_warning(&mut self, core: &mut SchedulerCore, time: Time, task: TaskId) {
        if !core.migrations.has_capacity() {
            return;
        }
        let decision = {
            let cloud = core.cloud.borrow();
            let mut hosting: Option<(VmId, VmInfo)> = None;
            for vm in core.fleet.vm_ids() {
                if core.migrations.contains(vm) {
                    continue;
                }
                if let Ok(info) = cloud.vm_info(vm) {
                    if info.active_tasks.contains(&task) {
                        hosting = Some((vm, info));
                        break;
                    }
                }
            }
            hosting.and_then(|(vm, info)| {
                let source = info.machine_id?;
                let source_info = cloud.machine_info(source).ok()?;
                if source_info.num_cores == 0 {
                    return None;
                }
                let source_utilization = source_info.active_tasks as f64 / source_info.num_cores as f64;
                if source_utilization <= core.config.pack_ceiling {
                    return None;
                }
                let footprint = migration::vm_memory_footprint(&*cloud, &info);
                for &dest in self.tiers.running() {
                    if dest == source {
                        continue;
                    }
                    let dest_info = match cloud.machine_info(dest) {
                        Ok(dest_info) => dest_info,
                        Err(_) => continue,
                    };
                    if dest_info.cpu != info.cpu || dest_info.num_cores == 0 {
                        continue;
                    }
                    if !migration::fits_memory(&dest_info, footprint) {
                        continue;
                    }
                    let dest_utilization = dest_info.active_tasks as f64 / dest_info.num_cores as f64;
                    if dest_utilization <= core.config.sla_migration_slack * source_utilization {
                        return Some((vm, source, dest));
                    }
                }
                None
            })
        };
        if let Some((vm, source, dest)) = decision {
            let mut cloud = core.cloud.borrow_mut();
            let mut logger = core.logger.borrow_mut();
            logger.log_debug(
                time,
                format!("rebalancing vm #{} off loaded machine #{} for task #{}", vm, source, task),
            );
            migration::start_migration(&mut *cloud, &mut core.migrations, &mut **logger, vm, dest, time);
        }
    }
}
