//! In-memory stand-in for the simulator: machines, VMs and a task oracle,
//! with every scheduler-issued command recorded for inspection.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cloudsched::core::cloud_api::{CloudApi, CloudError, CloudResult, MachineInfo, TaskInfo, VmInfo};
use cloudsched::core::common::{CpuArch, MachineId, PState, Priority, SState, SlaClass, TaskId, VmFlavor, VmId};
use cloudsched::core::config::SchedulerConfig;
use cloudsched::core::logger::{Logger, StdoutLogger};
use cloudsched::core::policy::policy_resolver;
use cloudsched::scheduler::Scheduler;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetState(MachineId, SState),
    SetCorePerformance(MachineId, u32, PState),
    VmCreate(VmId, VmFlavor, CpuArch),
    VmAttach(VmId, MachineId),
    AddTask(VmId, TaskId, Priority),
    Migrate(VmId, MachineId),
    VmShutdown(VmId),
    SetTaskPriority(TaskId, Priority),
}

pub struct MockMachine {
    pub cpu: CpuArch,
    pub num_cores: u32,
    pub memory_size: u64,
    pub memory_used: u64,
    pub state: SState,
    pub pending_state: Option<SState>,
}

pub struct MockVm {
    pub flavor: VmFlavor,
    pub cpu: CpuArch,
    pub machine: Option<MachineId>,
    pub tasks: Vec<TaskId>,
    pub migrating_to: Option<MachineId>,
}

pub struct MockTask {
    pub cpu: CpuArch,
    pub flavor: VmFlavor,
    pub sla: SlaClass,
    pub memory: u64,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub violated: bool,
}

pub struct MockCloud {
    pub machines: Vec<MockMachine>,
    pub vms: HashMap<VmId, MockVm>,
    pub tasks: HashMap<TaskId, MockTask>,
    pub commands: Vec<Command>,
    pub sla_percent: [u32; 4],
    pub energy: f64,
    /// When set, state-change requests are parked until `finish_transition`.
    pub deferred_transitions: bool,
    /// When set, `machine_count` fails (bootstrap failure).
    pub fail_machine_count: bool,
    next_vm: VmId,
}

impl MockCloud {
    pub fn new(machines: Vec<(CpuArch, u32, u64)>) -> Self {
        Self {
            machines: machines
                .into_iter()
                .map(|(cpu, num_cores, memory_size)| MockMachine {
                    cpu,
                    num_cores,
                    memory_size,
                    memory_used: 0,
                    state: SState::S0,
                    pending_state: None,
                })
                .collect(),
            vms: HashMap::new(),
            tasks: HashMap::new(),
            commands: Vec::new(),
            sla_percent: [0; 4],
            energy: 0.,
            deferred_transitions: false,
            fail_machine_count: false,
            next_vm: 0,
        }
    }

    pub fn add_task(&mut self, task: TaskId, cpu: CpuArch, flavor: VmFlavor, sla: SlaClass, memory: u64) {
        self.tasks.insert(
            task,
            MockTask {
                cpu,
                flavor,
                sla,
                memory,
                priority: None,
                completed: false,
                violated: false,
            },
        );
    }

    /// Applies a parked state transition; the test then fires
    /// `state_change_complete` on the scheduler.
    pub fn finish_transition(&mut self, machine: MachineId) {
        if let Some(state) = self.machines[machine as usize].pending_state.take() {
            self.machines[machine as usize].state = state;
        }
    }

    /// Re-attaches a migrating VM to its destination; the test then fires
    /// `migration_done` on the scheduler.
    pub fn finish_migration(&mut self, vm: VmId) {
        if let Some(mock_vm) = self.vms.get_mut(&vm) {
            if let Some(dest) = mock_vm.migrating_to.take() {
                mock_vm.machine = Some(dest);
            }
        }
    }

    pub fn machines_in_state(&self, state: SState) -> usize {
        self.machines.iter().filter(|m| m.state == state).count()
    }

    pub fn migrate_commands(&self) -> Vec<(VmId, MachineId)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Migrate(vm, dest) => Some((*vm, *dest)),
                _ => None,
            })
            .collect()
    }

    pub fn vms_attached_to(&self, machine: MachineId) -> Vec<VmId> {
        let mut vms: Vec<VmId> = self
            .vms
            .iter()
            .filter(|(_, vm)| vm.machine == Some(machine))
            .map(|(id, _)| *id)
            .collect();
        vms.sort();
        vms
    }

    fn machine(&self, machine: MachineId) -> CloudResult<&MockMachine> {
        self.machines
            .get(machine as usize)
            .ok_or(CloudError::UnknownMachine(machine))
    }

    fn active_tasks_on(&self, machine: MachineId) -> u32 {
        self.vms
            .values()
            .filter(|vm| vm.machine == Some(machine))
            .map(|vm| vm.tasks.len() as u32)
            .sum()
    }

    fn task(&self, task: TaskId) -> CloudResult<&MockTask> {
        self.tasks.get(&task).ok_or(CloudError::UnknownTask(task))
    }
}

impl CloudApi for MockCloud {
    fn machine_count(&self) -> CloudResult<u32> {
        if self.fail_machine_count {
            return Err(CloudError::Rejected("machine enumeration unavailable".to_string()));
        }
        Ok(self.machines.len() as u32)
    }

    fn machine_cpu_type(&self, machine: MachineId) -> CloudResult<CpuArch> {
        Ok(self.machine(machine)?.cpu)
    }

    fn machine_info(&self, machine: MachineId) -> CloudResult<MachineInfo> {
        let record = self.machine(machine)?;
        Ok(MachineInfo {
            cpu: record.cpu,
            num_cores: record.num_cores,
            memory_size: record.memory_size,
            memory_used: record.memory_used,
            state: record.state,
            active_tasks: self.active_tasks_on(machine),
        })
    }

    fn set_machine_state(&mut self, machine: MachineId, state: SState) -> CloudResult<()> {
        if machine as usize >= self.machines.len() {
            return Err(CloudError::UnknownMachine(machine));
        }
        self.commands.push(Command::SetState(machine, state));
        let record = &mut self.machines[machine as usize];
        if self.deferred_transitions && record.state != state {
            record.pending_state = Some(state);
        } else {
            record.state = state;
        }
        Ok(())
    }

    fn set_core_performance(&mut self, machine: MachineId, core: u32, pstate: PState) -> CloudResult<()> {
        let record = self.machine(machine)?;
        if core >= record.num_cores {
            return Err(CloudError::Rejected(format!("machine #{} has no core {}", machine, core)));
        }
        self.commands.push(Command::SetCorePerformance(machine, core, pstate));
        Ok(())
    }

    fn cluster_energy(&self) -> CloudResult<f64> {
        Ok(self.energy)
    }

    fn vm_create(&mut self, flavor: VmFlavor, cpu: CpuArch) -> CloudResult<VmId> {
        let vm = self.next_vm;
        self.next_vm += 1;
        self.vms.insert(
            vm,
            MockVm {
                flavor,
                cpu,
                machine: None,
                tasks: Vec::new(),
                migrating_to: None,
            },
        );
        self.commands.push(Command::VmCreate(vm, flavor, cpu));
        Ok(vm)
    }

    fn vm_attach(&mut self, vm: VmId, machine: MachineId) -> CloudResult<()> {
        let state = self.machine(machine)?.state;
        if state != SState::S0 {
            return Err(CloudError::Rejected(format!("machine #{} is not running", machine)));
        }
        let arch = self.machine(machine)?.cpu;
        let record = self.vms.get_mut(&vm).ok_or(CloudError::UnknownVm(vm))?;
        if record.cpu != arch {
            return Err(CloudError::Rejected(format!("vm #{} architecture mismatch", vm)));
        }
        record.machine = Some(machine);
        self.commands.push(Command::VmAttach(vm, machine));
        Ok(())
    }

    fn vm_add_task(&mut self, vm: VmId, task: TaskId, priority: Priority) -> CloudResult<()> {
        let record = self.vms.get(&vm).ok_or(CloudError::UnknownVm(vm))?;
        if record.migrating_to.is_some() {
            return Err(CloudError::Rejected(format!("vm #{} is migrating", vm)));
        }
        let machine = record.machine.ok_or_else(|| {
            CloudError::Rejected(format!("vm #{} is not attached", vm))
        })?;
        if self.machines[machine as usize].state != SState::S0 {
            return Err(CloudError::Rejected(format!("machine #{} is not running", machine)));
        }
        self.vms.get_mut(&vm).unwrap().tasks.push(task);
        if let Some(record) = self.tasks.get_mut(&task) {
            record.priority = Some(priority);
        }
        self.commands.push(Command::AddTask(vm, task, priority));
        Ok(())
    }

    fn vm_migrate(&mut self, vm: VmId, dest: MachineId) -> CloudResult<()> {
        let dest_state = self.machine(dest)?.state;
        if dest_state != SState::S0 {
            return Err(CloudError::Rejected(format!("machine #{} is not running", dest)));
        }
        let dest_arch = self.machine(dest)?.cpu;
        let record = self.vms.get_mut(&vm).ok_or(CloudError::UnknownVm(vm))?;
        if record.migrating_to.is_some() {
            return Err(CloudError::Rejected(format!("vm #{} is already migrating", vm)));
        }
        if record.cpu != dest_arch {
            return Err(CloudError::Rejected(format!("vm #{} architecture mismatch", vm)));
        }
        record.migrating_to = Some(dest);
        self.commands.push(Command::Migrate(vm, dest));
        Ok(())
    }

    fn vm_shutdown(&mut self, vm: VmId) -> CloudResult<()> {
        let record = self.vms.get(&vm).ok_or(CloudError::UnknownVm(vm))?;
        if record.migrating_to.is_some() {
            return Err(CloudError::Rejected(format!("vm #{} is migrating", vm)));
        }
        self.vms.remove(&vm);
        self.commands.push(Command::VmShutdown(vm));
        Ok(())
    }

    fn vm_info(&self, vm: VmId) -> CloudResult<VmInfo> {
        let record = self.vms.get(&vm).ok_or(CloudError::UnknownVm(vm))?;
        Ok(VmInfo {
            flavor: record.flavor,
            cpu: record.cpu,
            machine_id: record.machine,
            active_tasks: record.tasks.clone(),
        })
    }

    fn task_required_cpu(&self, task: TaskId) -> CloudResult<CpuArch> {
        Ok(self.task(task)?.cpu)
    }

    fn task_required_flavor(&self, task: TaskId) -> CloudResult<VmFlavor> {
        Ok(self.task(task)?.flavor)
    }

    fn task_required_sla(&self, task: TaskId) -> CloudResult<SlaClass> {
        Ok(self.task(task)?.sla)
    }

    fn task_memory(&self, task: TaskId) -> CloudResult<u64> {
        Ok(self.task(task)?.memory)
    }

    fn task_info(&self, task: TaskId) -> CloudResult<TaskInfo> {
        let record = self.task(task)?;
        Ok(TaskInfo {
            required_cpu: record.cpu,
            required_flavor: record.flavor,
            required_memory: record.memory,
            sla: record.sla,
        })
    }

    fn set_task_priority(&mut self, task: TaskId, priority: Priority) -> CloudResult<()> {
        let record = self.tasks.get_mut(&task).ok_or(CloudError::UnknownTask(task))?;
        record.priority = Some(priority);
        self.commands.push(Command::SetTaskPriority(task, priority));
        Ok(())
    }

    fn is_sla_violation(&self, task: TaskId) -> CloudResult<bool> {
        Ok(self.task(task)?.violated)
    }

    fn is_task_completed(&self, task: TaskId) -> CloudResult<bool> {
        Ok(self.task(task)?.completed)
    }

    fn sla_report(&self, sla: SlaClass) -> CloudResult<u32> {
        let index = match sla {
            SlaClass::Sla0 => 0,
            SlaClass::Sla1 => 1,
            SlaClass::Sla2 => 2,
            SlaClass::Sla3 => 3,
        };
        Ok(self.sla_percent[index])
    }
}

/// Builds an initialized scheduler over the given mock fleet.
pub fn build_scheduler(cloud: MockCloud, config: SchedulerConfig) -> (Scheduler, Rc<RefCell<MockCloud>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mock = Rc::new(RefCell::new(cloud));
    let handle: Rc<RefCell<dyn CloudApi>> = mock.clone();
    let policy = policy_resolver(&config);
    let logger: Box<dyn Logger> = Box::new(StdoutLogger::new());
    let mut scheduler = Scheduler::new(handle, policy, Rc::new(RefCell::new(logger)), Rc::new(config));
    scheduler.init(0);
    (scheduler, mock)
}

/// A fleet of identical machines with the given architectures.
pub fn fleet_of(archs: &[CpuArch]) -> MockCloud {
    MockCloud::new(archs.iter().map(|arch| (*arch, 8, 4096)).collect())
}
