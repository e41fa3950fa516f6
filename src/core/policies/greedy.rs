//! Greedy policy: every machine powered on, least-loaded compatible
//! placement, no tiers and no consolidation.

use crate::core::common::{default_flavor, MachineId, SState, TaskId, Time};
use crate::core::migration;
use crate::core::placement;
use crate::core::policy::SchedulerPolicy;
use crate::core::power;
use crate::scheduler::SchedulerCore;

#[derive(Default)]
pub struct Greedy;

impl Greedy {
    pub fn new() -> Self {
        Default::default()
    }
}

impl SchedulerPolicy for Greedy {
    fn init(&mut self, core: &mut SchedulerCore, time: Time) {
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        for machine in core.fleet.host_ids() {
            if let Err(e) = cloud.set_machine_state(machine, SState::S0) {
                logger.log_error(time, format!("error powering on machine #{}: {}", machine, e));
                continue;
            }
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
        logger.log_info(time, format!("powered on all {} machines", core.fleet.host_count()));
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

    fn on_task_complete(&mut self, _core: &mut SchedulerCore, _time: Time, _task: TaskId) {}

    fn on_periodic(&mut self, core: &mut SchedulerCore, time: Time) {
        let machines = core.fleet.host_ids();
        let mut cloud = core.cloud.borrow_mut();
        let mut logger = core.logger.borrow_mut();
        power::apply_pstates(&mut *cloud, &mut **logger, &machines, &core.config.pstate_cutpoints, time);
    }

    fn on_memory_warning(&mut self, core: &mut SchedulerCore, time: Time, machine: MachineId) {
        if !core.migrations.has_capacity() {
            core.logger.borrow_mut().log_debug(
                time,
                format!("migration budget exhausted, not relieving machine #{}", machine),
            );
            return;
        }
        let candidates = core.fleet.host_ids();
        let decision = {
            let cloud = core.cloud.borrow();
            migration::find_relief_migration(&*cloud, &core.fleet, &core.migrations, machine, &candidates)
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
