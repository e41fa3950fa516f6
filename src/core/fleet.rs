//! Registry of physical machines and live VMs.

use indexmap::IndexMap;

use crate::core::common::{CpuArch, MachineId, VmFlavor, VmId};

/// Immutable facts about a physical machine. Everything else (power state,
/// memory usage, task counts) is queried from the simulator on demand.
#[derive(Clone)]
pub struct HostRecord {
    pub cpu: CpuArch,
}

/// Scheduler-side record of a live VM: its fixed flavor and architecture and
/// a mirror of the simulator's VM-to-machine attachment.
#[derive(Clone)]
pub struct VmRecord {
    pub flavor: VmFlavor,
    pub cpu: CpuArch,
    pub machine: Option<MachineId>,
}

/// The only mutable process-wide state of the scheduler. All scans iterate
/// in insertion order, which makes placement tie-breaking deterministic.
pub struct FleetRegistry {
    hosts: IndexMap<MachineId, HostRecord>,
    vms: IndexMap<VmId, VmRecord>,
}

impl FleetRegistry {
    /// Creates empty registry.
    pub fn new() -> Self {
        Self {
            hosts: IndexMap::new(),
            vms: IndexMap::new(),
        }
    }

    /// Adds a machine discovered at init.
    pub fn add_host(&mut self, machine: MachineId, cpu: CpuArch) {
        self.hosts.insert(machine, HostRecord { cpu });
    }

    /// Returns the number of machines.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Returns IDs of all machines in insertion order.
    pub fn host_ids(&self) -> Vec<MachineId> {
        self.hosts.keys().cloned().collect()
    }

    /// Returns the architecture of the machine, if known.
    pub fn host_cpu(&self, machine: MachineId) -> Option<CpuArch> {
        self.hosts.get(&machine).map(|h| h.cpu)
    }

    /// Returns IDs of machines with the matching architecture, in insertion order.
    pub fn hosts_by_arch(&self, cpu: CpuArch) -> Vec<MachineId> {
        self.hosts
            .iter()
            .filter(|(_, record)| record.cpu == cpu)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns IDs of all live VMs in insertion order.
    pub fn vm_ids(&self) -> Vec<VmId> {
        self.vms.keys().cloned().collect()
    }

    pub fn vm(&self, vm: VmId) -> Option<&VmRecord> {
        self.vms.get(&vm)
    }

    pub fn contains_vm(&self, vm: VmId) -> bool {
        self.vms.contains_key(&vm)
    }

    /// Returns IDs of VMs currently attached to the machine, in insertion order.
    pub fn vms_on(&self, machine: MachineId) -> Vec<VmId> {
        self.vms
            .iter()
            .filter(|(_, record)| record.machine == Some(machine))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Records a freshly created VM, not yet attached anywhere.
    pub fn note_create(&mut self, vm: VmId, flavor: VmFlavor, cpu: CpuArch) {
        self.vms.insert(
            vm,
            VmRecord {
                flavor,
                cpu,
                machine: None,
            },
        );
    }

    /// Records an attachment confirmed by the simulator.
    pub fn note_attach(&mut self, vm: VmId, machine: MachineId) {
        if let Some(record) = self.vms.get_mut(&vm) {
            record.machine = Some(machine);
        }
    }

    pub fn note_detach(&mut self, vm: VmId) {
        if let Some(record) = self.vms.get_mut(&vm) {
            record.machine = None;
        }
    }

    /// Removes the VM record. Stale handles must not survive a shutdown.
    pub fn note_destroy(&mut self, vm: VmId) {
        self.vms.shift_remove(&vm);
    }
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
