//! Static packing policy: tasks are packed onto the most-loaded compatible
//! VM with spare core capacity, so lightly used machines stay near idle and
//! their cores can be kept at low P-states. Never migrates.

use crate::core::common::{default_flavor, MachineId, SState, TaskId, Time};
use crate::core::placement;
use crate::core::policy::SchedulerPolicy;
use crate::core::power;
use crate::scheduler::SchedulerCore;

#[derive(Default)]
pub struct StaticPacker;

impl StaticPacker {
    pub fn new() -> Self {
        Default::default()
    }
}

impl SchedulerPolicy for StaticPacker {
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

        // pack onto the busiest compatible VM whose machine still has a spare core
        let packed = {
            let cloud = core.cloud.borrow();
            placement::most_loaded_vm(&*cloud, &core.fleet, &core.migrations, |info| {
                if info.cpu != req.cpu || info.flavor != req.flavor {
                    return false;
                }
                match info.machine_id {
                    Some(machine) => match cloud.machine_info(machine) {
                        Ok(host) => host.active_tasks < host.num_cores,
                        Err(_) => false,
                    },
                    None => false,
                }
            })
        };
        if let Some(vm) = packed {
            if core.cloud.borrow_mut().vm_add_task(vm, task, req.priority).is_ok() {
                core.logger
                    .borrow_mut()
                    .log_debug(time, format!("packed task #{} on vm #{}", task, vm));
                return;
            }
        }

        // no headroom anywhere: fall back to the busiest VM of the right
        // architecture, then to any VM at all
        let compatible = {
            let cloud = core.cloud.borrow();
            placement::most_loaded_vm(&*cloud, &core.fleet, &core.migrations, |info| info.cpu == req.cpu)
        };
        if let Some(vm) = compatible {
            if core.cloud.borrow_mut().vm_add_task(vm, task, req.priority).is_ok() {
                core.logger
                    .borrow_mut()
                    .log_debug(time, format!("packed task #{} on compatible vm #{}", task, vm));
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
        // placements are fixed once made; the warning will re-fire
        core.logger
            .borrow_mut()
            .log_warn(time, format!("memory warning on machine #{} declined", machine));
    }

    fn on_sla_warning(&mut self, _core: &mut SchedulerCore, _time: Time, _task: TaskId) {}
}
