//! Live migration tracking and source/destination selection.

use indexmap::IndexMap;

use crate::core::cloud_api::{CloudApi, MachineInfo, VmInfo};
use crate::core::common::{MachineId, Time, VmId};
use crate::core::fleet::FleetRegistry;
use crate::core::logger::Logger;

/// The set of VMs with an in-flight migration (mapped to their destination),
/// plus the global in-flight budget. Membership starts when the migration
/// request is issued and ends at the MigrationComplete callback.
///
/// A VM in this set must be excluded from every placement, migration and
/// shutdown decision: its attachment is indeterminate until completion.
pub struct MigrationTracker {
    in_flight: IndexMap<VmId, MachineId>,
    cap: usize,
}

impl MigrationTracker {
    pub fn new(cap: usize) -> Self {
        Self {
            in_flight: IndexMap::new(),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn contains(&self, vm: VmId) -> bool {
        self.in_flight.contains_key(&vm)
    }

    /// True when some in-flight migration targets the given machine.
    pub fn is_destination(&self, machine: MachineId) -> bool {
        self.in_flight.values().any(|dest| *dest == machine)
    }

    /// True while the global in-flight budget permits one more migration.
    pub fn has_capacity(&self) -> bool {
        self.in_flight.len() < self.cap
    }

    /// Registers an in-flight migration. Refuses when the budget is spent or
    /// the VM is already migrating (a double-migrate would be a logic bug).
    pub fn begin(&mut self, vm: VmId, dest: MachineId) -> bool {
        if !self.has_capacity() || self.in_flight.contains_key(&vm) {
            return false;
        }
        self.in_flight.insert(vm, dest);
        true
    }

    /// Clears the in-flight mark. Completion of an unknown VM is a no-op.
    pub fn complete(&mut self, vm: VmId) -> bool {
        self.in_flight.shift_remove(&vm).is_some()
    }
}

/// Memory footprint of a VM: the sum of required memory over its active
/// tasks. Tasks whose oracle lookup fails contribute nothing.
pub fn vm_memory_footprint(cloud: &dyn CloudApi, info: &VmInfo) -> u64 {
    info.active_tasks
        .iter()
        .map(|task| cloud.task_memory(*task).unwrap_or(0))
        .sum()
}

/// Whether a VM with the given memory footprint fits on the destination.
pub fn fits_memory(dest: &MachineInfo, footprint: u64) -> bool {
    footprint <= dest.memory_size.saturating_sub(dest.memory_used)
}

/// Picks a (vm, destination) pair to relieve memory pressure on `source`.
///
/// VMs on the source are considered in registry order, skipping migrating
/// ones. The destination is the first candidate machine that is not the
/// source, matches the VM architecture and has room for the VM's footprint.
pub fn find_relief_migration(
    cloud: &dyn CloudApi,
    fleet: &FleetRegistry,
    tracker: &MigrationTracker,
    source: MachineId,
    candidates: &[MachineId],
) -> Option<(VmId, MachineId)> {
    for vm in fleet.vms_on(source) {
        if tracker.contains(vm) {
            continue;
        }
        let info = match cloud.vm_info(vm) {
            Ok(info) => info,
            Err(_) => continue,
        };
        let footprint = vm_memory_footprint(cloud, &info);
        for &dest in candidates {
            if dest == source {
                continue;
            }
            let dest_info = match cloud.machine_info(dest) {
                Ok(dest_info) => dest_info,
                Err(_) => continue,
            };
            if dest_info.cpu != info.cpu {
                continue;
            }
            if !fits_memory(&dest_info, footprint) {
                continue;
            }
            return Some((vm, dest));
        }
    }
    None
}

/// Picks the packing destination for a VM: the most-loaded compatible
/// candidate with utilization in `[floor, ceiling)` and room for the VM's
/// memory footprint. The floor keeps packing from spreading load onto
/// machines emptier than the source.
pub fn find_pack_destination(
    cloud: &dyn CloudApi,
    info: &VmInfo,
    source: MachineId,
    candidates: &[MachineId],
    floor: f64,
    ceiling: f64,
) -> Option<MachineId> {
    let footprint = vm_memory_footprint(cloud, info);
    let mut result: Option<MachineId> = None;
    let mut best_utilization = -1.;

    for &dest in candidates {
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
        if !fits_memory(&dest_info, footprint) {
            continue;
        }
        let utilization = dest_info.active_tasks as f64 / dest_info.num_cores as f64;
        if utilization >= floor && utilization < ceiling && utilization > best_utilization {
            best_utilization = utilization;
            result = Some(dest);
        }
    }
    result
}

/// Picks one consolidation migration among the candidate machines: the
/// first machine with utilization strictly between zero and `threshold`
/// whose VMs can be packed elsewhere becomes the source. Returns
/// (vm, source, destination).
pub fn find_consolidation(
    cloud: &dyn CloudApi,
    fleet: &FleetRegistry,
    tracker: &MigrationTracker,
    candidates: &[MachineId],
    threshold: f64,
    ceiling: f64,
) -> Option<(VmId, MachineId, MachineId)> {
    for &source in candidates {
        let info = match cloud.machine_info(source) {
            Ok(info) => info,
            Err(_) => continue,
        };
        if info.num_cores == 0 {
            continue;
        }
        let utilization = info.active_tasks as f64 / info.num_cores as f64;
        if utilization <= 0. || utilization >= threshold {
            continue;
        }
        for vm in fleet.vms_on(source) {
            if tracker.contains(vm) {
                continue;
            }
            let vm_info = match cloud.vm_info(vm) {
                Ok(vm_info) => vm_info,
                Err(_) => continue,
            };
            if let Some(dest) = find_pack_destination(cloud, &vm_info, source, candidates, utilization, ceiling) {
                return Some((vm, source, dest));
            }
        }
    }
    None
}

/// Registers and issues a migration, rolling the in-flight mark back if the
/// simulator refuses the request.
pub fn start_migration(
    cloud: &mut dyn CloudApi,
    tracker: &mut MigrationTracker,
    logger: &mut dyn Logger,
    vm: VmId,
    dest: MachineId,
    time: Time,
) -> bool {
    if !tracker.begin(vm, dest) {
        return false;
    }
    match cloud.vm_migrate(vm, dest) {
        Ok(()) => {
            logger.log_info(time, format!("migrating vm #{} to machine #{}", vm, dest));
            true
        }
        Err(e) => {
            tracker.complete(vm);
            logger.log_error(time, format!("error migrating vm #{}: {}", vm, e));
            false
        }
    }
}
