//! Interface to the machine/VM facility and the workload oracle of the simulator.

use thiserror::Error;

use crate::core::common::{CpuArch, MachineId, PState, Priority, SState, SlaClass, TaskId, VmFlavor, VmId};

/// Failure of a simulator primitive. Any request may be refused, e.g. when a
/// machine is still powering up or a VM is in the middle of a migration.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("unknown machine #{0}")]
    UnknownMachine(MachineId),
    #[error("unknown vm #{0}")]
    UnknownVm(VmId),
    #[error("unknown task #{0}")]
    UnknownTask(TaskId),
    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

/// Current state of a physical machine as reported by the simulator.
#[derive(Clone, Debug)]
pub struct MachineInfo {
    pub cpu: CpuArch,
    pub num_cores: u32,
    pub memory_size: u64,
    pub memory_used: u64,
    pub state: SState,
    pub active_tasks: u32,
}

/// Current state of a virtual machine as reported by the simulator.
#[derive(Clone, Debug)]
pub struct VmInfo {
    pub flavor: VmFlavor,
    pub cpu: CpuArch,
    pub machine_id: Option<MachineId>,
    pub active_tasks: Vec<TaskId>,
}

/// Immutable task requirements read from the workload oracle.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    pub required_cpu: CpuArch,
    pub required_flavor: VmFlavor,
    pub required_memory: u64,
    pub sla: SlaClass,
}

/// Synchronous primitives of the surrounding simulator.
///
/// The scheduler never caches the data returned by the query methods across
/// events, so every decision is made against a fresh snapshot.
pub trait CloudApi {
    fn machine_count(&self) -> CloudResult<u32>;
    fn machine_cpu_type(&self, machine: MachineId) -> CloudResult<CpuArch>;
    fn machine_info(&self, machine: MachineId) -> CloudResult<MachineInfo>;
    fn set_machine_state(&mut self, machine: MachineId, state: SState) -> CloudResult<()>;
    fn set_core_performance(&mut self, machine: MachineId, core: u32, pstate: PState) -> CloudResult<()>;
    fn cluster_energy(&self) -> CloudResult<f64>;

    fn vm_create(&mut self, flavor: VmFlavor, cpu: CpuArch) -> CloudResult<VmId>;
    fn vm_attach(&mut self, vm: VmId, machine: MachineId) -> CloudResult<()>;
    fn vm_add_task(&mut self, vm: VmId, task: TaskId, priority: Priority) -> CloudResult<()>;
    fn vm_migrate(&mut self, vm: VmId, dest: MachineId) -> CloudResult<()>;
    fn vm_shutdown(&mut self, vm: VmId) -> CloudResult<()>;
    fn vm_info(&self, vm: VmId) -> CloudResult<VmInfo>;

    fn task_required_cpu(&self, task: TaskId) -> CloudResult<CpuArch>;
    fn task_required_flavor(&self, task: TaskId) -> CloudResult<VmFlavor>;
    fn task_required_sla(&self, task: TaskId) -> CloudResult<SlaClass>;
    fn task_memory(&self, task: TaskId) -> CloudResult<u64>;
    fn task_info(&self, task: TaskId) -> CloudResult<TaskInfo>;
    fn set_task_priority(&mut self, task: TaskId, priority: Priority) -> CloudResult<()>;
    fn is_sla_violation(&self, task: TaskId) -> CloudResult<bool>;
    fn is_task_completed(&self, task: TaskId) -> CloudResult<bool>;
    fn sla_report(&self, sla: SlaClass) -> CloudResult<u32>;
}
