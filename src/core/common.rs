//! Common data structures.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Opaque handle of a physical machine.
pub type MachineId = u32;
/// Opaque handle of a virtual machine.
pub type VmId = u32;
/// Opaque handle of a task.
pub type TaskId = u32;
/// Simulated time in microseconds.
pub type Time = u64;

/// CPU instruction set architecture of a machine, VM or task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CpuArch {
    X86,
    Arm,
    Power,
    Riscv,
}

/// Virtual machine flavor. A task runs only inside a VM of its required flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum VmFlavor {
    Linux,
    LinuxRt,
    Win,
    Aix,
}

/// Service level agreement class of a task, from the tightest (SLA0) to best-effort (SLA3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SlaClass {
    Sla0,
    Sla1,
    Sla2,
    Sla3,
}

impl Display for SlaClass {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SlaClass::Sla0 => write!(f, "SLA0"),
            SlaClass::Sla1 => write!(f, "SLA1"),
            SlaClass::Sla2 => write!(f, "SLA2"),
            SlaClass::Sla3 => write!(f, "SLA3"),
        }
    }
}

/// Scheduling priority of a task inside its VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Priority {
    High,
    Mid,
    Low,
}

/// Per-core performance state, from maximum (P0) to minimum (P3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PState {
    P0,
    P1,
    P2,
    P3,
}

impl Display for PState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PState::P0 => write!(f, "P0"),
            PState::P1 => write!(f, "P1"),
            PState::P2 => write!(f, "P2"),
            PState::P3 => write!(f, "P3"),
        }
    }
}

/// Machine power state. S0 is fully on, S1 is a warm standby, S5 is off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SState {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
}

impl Display for SState {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SState::S0 => write!(f, "S0"),
            SState::S1 => write!(f, "S1"),
            SState::S2 => write!(f, "S2"),
            SState::S3 => write!(f, "S3"),
            SState::S4 => write!(f, "S4"),
            SState::S5 => write!(f, "S5"),
        }
    }
}

/// Maps the SLA class of a task to its scheduling priority.
pub fn sla_priority(sla: SlaClass) -> Priority {
    match sla {
        SlaClass::Sla0 => Priority::High,
        SlaClass::Sla1 => Priority::Mid,
        SlaClass::Sla2 | SlaClass::Sla3 => Priority::Low,
    }
}

/// Default VM flavor for a machine of the given architecture.
pub fn default_flavor(cpu: CpuArch) -> VmFlavor {
    match cpu {
        CpuArch::Power => VmFlavor::Aix,
        _ => VmFlavor::Linux,
    }
}
