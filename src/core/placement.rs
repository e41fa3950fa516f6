//! Task placement scans shared by the scheduling policies.

use crate::core::cloud_api::{CloudApi, CloudResult, VmInfo};
use crate::core::common::{sla_priority, CpuArch, Priority, SlaClass, TaskId, Time, VmFlavor, VmId};
use crate::core::fleet::FleetRegistry;
use crate::core::logger::Logger;
use crate::core::migration::MigrationTracker;

/// Requirements of an arriving task, read from the workload oracle once per
/// placement.
#[derive(Clone, Copy, Debug)]
pub struct TaskRequirements {
    pub cpu: CpuArch,
    pub flavor: VmFlavor,
    pub sla: SlaClass,
    pub priority: Priority,
}

pub fn task_requirements(cloud: &dyn CloudApi, task: TaskId) -> CloudResult<TaskRequirements> {
    let cpu = cloud.task_required_cpu(task)?;
    let flavor = cloud.task_required_flavor(task)?;
    let sla = cloud.task_required_sla(task)?;
    Ok(TaskRequirements {
        cpu,
        flavor,
        sla,
        priority: sla_priority(sla),
    })
}

/// Scans all live VMs in registry order and returns the matching one with
/// the fewest active tasks. The comparison is strict, so the first
/// least-loaded VM encountered wins. Migrating VMs are skipped.
pub fn least_loaded_vm<F>(
    cloud: &dyn CloudApi,
    fleet: &FleetRegistry,
    tracker: &MigrationTracker,
    matches: F,
) -> Option<VmId>
where
    F: Fn(&VmInfo) -> bool,
{
    let mut best_vm: Option<VmId> = None;
    let mut lowest_tasks = usize::MAX;

    for vm in fleet.vm_ids() {
        if tracker.contains(vm) {
            continue;
        }
        let info = match cloud.vm_info(vm) {
            Ok(info) => info,
            Err(_) => continue,
        };
        if matches(&info) && info.active_tasks.len() < lowest_tasks {
            lowest_tasks = info.active_tasks.len();
            best_vm = Some(vm);
        }
    }
    best_vm
}

/// Mirror image of [`least_loaded_vm`] for packing policies: the matching VM
/// with the most active tasks wins, first encountered on ties.
pub fn most_loaded_vm<F>(
    cloud: &dyn CloudApi,
    fleet: &FleetRegistry,
    tracker: &MigrationTracker,
    matches: F,
) -> Option<VmId>
where
    F: Fn(&VmInfo) -> bool,
{
    let mut best_vm: Option<VmId> = None;
    let mut highest_tasks: Option<usize> = None;

    for vm in fleet.vm_ids() {
        if tracker.contains(vm) {
            continue;
        }
        let info = match cloud.vm_info(vm) {
            Ok(info) => info,
            Err(_) => continue,
        };
        if !matches(&info) {
            continue;
        }
        if highest_tasks.map_or(true, |highest| info.active_tasks.len() > highest) {
            highest_tasks = Some(info.active_tasks.len());
            best_vm = Some(vm);
        }
    }
    best_vm
}

/// Last-ditch placement: offer the task to any non-migrating VM regardless
/// of architecture fit, at high priority. Returns the accepting VM, if any.
pub fn emergency_place(
    cloud: &mut dyn CloudApi,
    fleet: &FleetRegistry,
    tracker: &MigrationTracker,
    logger: &mut dyn Logger,
    task: TaskId,
    time: Time,
) -> Option<VmId> {
    for vm in fleet.vm_ids() {
        if tracker.contains(vm) {
            continue;
        }
        if cloud.vm_add_task(vm, task, Priority::High).is_ok() {
            logger.log_info(time, format!("emergency placement of task #{} on vm #{}", task, vm));
            return Some(vm);
        }
    }
    None
}
