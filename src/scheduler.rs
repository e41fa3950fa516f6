//! Scheduler object: shared fleet state plus dispatch to the active policy.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, Priority, SState, TaskId, Time, VmId};
use crate::core::config::SchedulerConfig;
use crate::core::fleet::FleetRegistry;
use crate::core::logger::Logger;
use crate::core::migration::MigrationTracker;
use crate::core::placement;
use crate::core::policy::SchedulerPolicy;
use crate::core::report;

/// State shared by the scheduler and the active policy: the fleet registry,
/// the set of in-flight migrations, the pending-wake map of tasks queued for
/// machines that are still powering up, and the handles to the simulator,
/// the logger and the configuration.
pub struct SchedulerCore {
    pub cloud: Rc<RefCell<dyn CloudApi>>,
    pub fleet: FleetRegistry,
    pub migrations: MigrationTracker,
    pub pending_wake: IndexMap<MachineId, Vec<TaskId>>,
    pub logger: Rc<RefCell<Box<dyn Logger>>>,
    pub config: Rc<SchedulerConfig>,
}

/// The policy engine driven by the simulator's callbacks. One instance lives
/// for the duration of a simulation run.
pub struct Scheduler {
    pub core: SchedulerCore,
    policy: Box<dyn SchedulerPolicy>,
}

impl Scheduler {
    pub fn new(
        cloud: Rc<RefCell<dyn CloudApi>>,
        policy: Box<dyn SchedulerPolicy>,
        logger: Rc<RefCell<Box<dyn Logger>>>,
        config: Rc<SchedulerConfig>,
    ) -> Self {
        let migration_cap = config.migration_cap;
        Self {
            core: SchedulerCore {
                cloud,
                fleet: FleetRegistry::new(),
                migrations: MigrationTracker::new(migration_cap),
                pending_wake: IndexMap::new(),
                logger,
                config,
            },
            policy,
        }
    }

    /// Populates the fleet registry from the simulator and hands over to the
    /// policy. A failing machine enumeration leaves the fleet empty; all
    /// later events then decline naturally.
    pub fn init(&mut self, time: Time) {
        let total = match self.core.cloud.borrow().machine_count() {
            Ok(total) => total,
            Err(e) => {
                self.core
                    .logger
                    .borrow_mut()
                    .log_error(time, format!("error getting total machines: {}", e));
                return;
            }
        };
        for machine in 0..total {
            let cpu = match self.core.cloud.borrow().machine_cpu_type(machine) {
                Ok(cpu) => cpu,
                Err(e) => {
                    self.core
                        .logger
                        .borrow_mut()
                        .log_error(time, format!("error initializing machine #{}: {}", machine, e));
                    continue;
                }
            };
            self.core.fleet.add_host(machine, cpu);
        }
        let Self { core, policy } = self;
        policy.init(core, time);
    }

    pub fn on_new_task(&mut self, time: Time, task: TaskId) {
        let Self { core, policy } = self;
        policy.on_new_task(core, time, task);
    }

    pub fn on_task_completion(&mut self, time: Time, task: TaskId) {
        if let Ok(true) = self.core.cloud.borrow().is_sla_violation(task) {
            self.core
                .logger
                .borrow_mut()
                .log_info(time, format!("task #{} violated its SLA", task));
        }
        let Self { core, policy } = self;
        policy.on_task_complete(core, time, task);
    }

    pub fn on_memory_warning(&mut self, time: Time, machine: MachineId) {
        let Self { core, policy } = self;
        policy.on_memory_warning(core, time, machine);
    }

    /// Clears the in-flight mark and reconciles the attachment mirror with
    /// the simulator. Completion of a VM that is not migrating is a no-op.
    pub fn on_migration_done(&mut self, time: Time, vm: VmId) {
        if !self.core.migrations.complete(vm) {
            self.core
                .logger
                .borrow_mut()
                .log_trace(time, format!("spurious migration completion for vm #{}", vm));
            return;
        }
        if self.core.fleet.contains_vm(vm) {
            if let Ok(info) = self.core.cloud.borrow().vm_info(vm) {
                match info.machine_id {
                    Some(machine) => self.core.fleet.note_attach(vm, machine),
                    None => self.core.fleet.note_detach(vm),
                }
            }
        }
        self.core
            .logger
            .borrow_mut()
            .log_debug(time, format!("vm #{} migration completed", vm));
    }

    pub fn on_periodic(&mut self, time: Time) {
        let Self { core, policy } = self;
        policy.on_periodic(core, time);
    }

    /// Raises the task priority, then lets the policy react further.
    pub fn on_sla_warning(&mut self, time: Time, task: TaskId) {
        let _ = self.core.cloud.borrow_mut().set_task_priority(task, Priority::High);
        let Self { core, policy } = self;
        policy.on_sla_warning(core, time, task);
    }

    /// Drains the pending-wake queue of a machine once it reports S0. Tasks
    /// queued for a machine still in transition stay queued.
    pub fn on_state_change_complete(&mut self, time: Time, machine: MachineId) {
        let state = match self.core.cloud.borrow().machine_info(machine) {
            Ok(info) => info.state,
            Err(_) => return,
        };
        if state != SState::S0 {
            return;
        }
        let tasks = match self.core.pending_wake.shift_remove(&machine) {
            Some(tasks) => tasks,
            None => return,
        };
        for task in tasks {
            self.admit_on(time, machine, task);
        }
    }

    /// Writes the final report and tears the VM fleet down.
    pub fn finalize<W: Write>(&mut self, time: Time, out: &mut W) {
        if let Err(e) = report::write_final_report(out, &*self.core.cloud.borrow(), time) {
            self.core
                .logger
                .borrow_mut()
                .log_error(time, format!("error writing final report: {}", e));
        }
        self.shutdown(time);
    }

    /// Shuts down every VM that is not currently migrating. Iterates a
    /// snapshot of the VM list, as shutdown mutates the registry.
    pub fn shutdown(&mut self, time: Time) {
        let vms = self.core.fleet.vm_ids();
        for vm in vms {
            if self.core.migrations.contains(vm) {
                continue;
            }
            match self.core.cloud.borrow_mut().vm_shutdown(vm) {
                Ok(()) => self.core.fleet.note_destroy(vm),
                Err(e) => self
                    .core
                    .logger
                    .borrow_mut()
                    .log_error(time, format!("error shutting down vm #{}: {}", vm, e)),
            }
        }
    }

    /// Places one woken task on the machine, reusing a compatible VM already
    /// attached there or creating a fresh one.
    fn admit_on(&mut self, time: Time, machine: MachineId, task: TaskId) {
        let req = match placement::task_requirements(&*self.core.cloud.borrow(), task) {
            Ok(req) => req,
            Err(e) => {
                self.core
                    .logger
                    .borrow_mut()
                    .log_error(time, format!("error getting task requirements: {}", e));
                return;
            }
        };
        for vm in self.core.fleet.vms_on(machine) {
            if self.core.migrations.contains(vm) {
                continue;
            }
            let compatible = match self.core.fleet.vm(vm) {
                Some(record) => record.flavor == req.flavor && record.cpu == req.cpu,
                None => false,
            };
            if compatible && self.core.cloud.borrow_mut().vm_add_task(vm, task, req.priority).is_ok() {
                self.core
                    .logger
                    .borrow_mut()
                    .log_debug(time, format!("placed woken task #{} on vm #{}", task, vm));
                return;
            }
        }
        let vm = {
            let mut cloud = self.core.cloud.borrow_mut();
            let vm = match cloud.vm_create(req.flavor, req.cpu) {
                Ok(vm) => vm,
                Err(e) => {
                    self.core
                        .logger
                        .borrow_mut()
                        .log_error(time, format!("error creating vm for task #{}: {}", task, e));
                    return;
                }
            };
            if let Err(e) = cloud.vm_attach(vm, machine) {
                self.core
                    .logger
                    .borrow_mut()
                    .log_error(time, format!("error attaching vm #{} to machine #{}: {}", vm, machine, e));
                return;
            }
            vm
        };
        self.core.fleet.note_create(vm, req.flavor, req.cpu);
        self.core.fleet.note_attach(vm, machine);
        match self.core.cloud.borrow_mut().vm_add_task(vm, task, req.priority) {
            Ok(()) => self
                .core
                .logger
                .borrow_mut()
                .log_debug(time, format!("placed woken task #{} on new vm #{}", task, vm)),
            Err(e) => self
                .core
                .logger
                .borrow_mut()
                .log_error(time, format!("error adding woken task #{} to vm #{}: {}", task, vm, e)),
        }
    }
}
