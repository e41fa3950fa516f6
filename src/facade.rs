//! The entry points through which the simulator kernel drives the scheduler.
//!
//! The kernel calls these free functions synchronously as events occur. The
//! scheduler instance behind them lives from `init_scheduler` until
//! `simulation_complete` and, matching the kernel's execution model, is
//! confined to the calling thread.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use sugars::{boxed, rc, refcell};

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, TaskId, Time, VmId};
use crate::core::config::SchedulerConfig;
use crate::core::logger::{Logger, StdoutLogger};
use crate::core::policy::policy_resolver;
use crate::scheduler::Scheduler;

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = RefCell::new(None);
}

fn with_scheduler<F: FnOnce(&mut Scheduler)>(f: F) {
    SCHEDULER.with(|cell| {
        if let Some(scheduler) = cell.borrow_mut().as_mut() {
            f(scheduler);
        }
    });
}

/// Builds the scheduler with the given simulator handle and configuration.
/// Called exactly once, before any task arrives.
pub fn init_scheduler(cloud: Rc<RefCell<dyn CloudApi>>, config: SchedulerConfig) {
    init_scheduler_with_logger(cloud, config, boxed!(StdoutLogger::new()));
}

/// Same as [`init_scheduler`], with a caller-supplied log sink.
pub fn init_scheduler_with_logger(
    cloud: Rc<RefCell<dyn CloudApi>>,
    config: SchedulerConfig,
    logger: Box<dyn Logger>,
) {
    let config = Rc::new(config);
    let policy = policy_resolver(&config);
    let logger = rc!(refcell!(logger));
    let mut scheduler = Scheduler::new(cloud, policy, logger, config);
    scheduler.core.logger.borrow_mut().log_trace(0, "initializing scheduler".to_string());
    scheduler.init(0);
    SCHEDULER.with(|cell| *cell.borrow_mut() = Some(scheduler));
}

pub fn handle_new_task(time: Time, task: TaskId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_trace(time, format!("new task #{}", task));
        s.on_new_task(time, task);
    });
}

pub fn handle_task_completion(time: Time, task: TaskId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_trace(time, format!("task #{} completed", task));
        s.on_task_completion(time, task);
    });
}

pub fn memory_warning(time: Time, machine: MachineId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_warn(time, format!("memory overflow on machine #{}", machine));
        s.on_memory_warning(time, machine);
    });
}

pub fn migration_done(time: Time, vm: VmId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_trace(time, format!("vm #{} migration done", vm));
        s.on_migration_done(time, vm);
    });
}

pub fn scheduler_check(time: Time) {
    with_scheduler(|s| {
        s.core.logger.borrow_mut().log_trace(time, "periodic check".to_string());
        s.on_periodic(time);
    });
}

pub fn sla_warning(time: Time, task: TaskId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_info(time, format!("SLA warning for task #{}", task));
        s.on_sla_warning(time, task);
    });
}

pub fn state_change_complete(time: Time, machine: MachineId) {
    with_scheduler(|s| {
        s.core
            .logger
            .borrow_mut()
            .log_debug(time, format!("machine #{} state change complete", machine));
        s.on_state_change_complete(time, machine);
    });
}

/// Emits the final report to stdout and tears the scheduler down.
pub fn simulation_complete(time: Time) {
    SCHEDULER.with(|cell| {
        if let Some(mut scheduler) = cell.borrow_mut().take() {
            scheduler.finalize(time, &mut io::stdout());
        }
    });
}
