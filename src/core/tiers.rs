//! Three-tier host power lifecycle: running (S0), standby (S1), off (S5).

use crate::core::cloud_api::CloudApi;
use crate::core::common::{CpuArch, MachineId, SState, Time};
use crate::core::config::SchedulerConfig;
use crate::core::fleet::FleetRegistry;
use crate::core::logger::Logger;
use crate::core::migration::MigrationTracker;

/// Keeps the three disjoint host lists and moves machines between them.
///
/// Tier membership changes at the moment the state-change *request* is
/// accepted by the simulator; the later StateChangeComplete callback is
/// informational only.
pub struct TierController {
    running: Vec<MachineId>,
    standby: Vec<MachineId>,
    off: Vec<MachineId>,
    min_running: usize,
    max_running: usize,
    standby_size: usize,
}

impl TierController {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            running: Vec::new(),
            standby: Vec::new(),
            off: Vec::new(),
            min_running: config.min_running,
            max_running: config.max_running,
            standby_size: config.standby_size,
        }
    }

    pub fn running(&self) -> &[MachineId] {
        &self.running
    }

    pub fn standby(&self) -> &[MachineId] {
        &self.standby
    }

    pub fn off(&self) -> &[MachineId] {
        &self.off
    }

    pub fn is_running(&self, machine: MachineId) -> bool {
        self.running.contains(&machine)
    }

    /// Splits the fleet by index order: first `max_running` machines become
    /// running (S0), the next `standby_size` go to standby (S1), the rest are
    /// powered off (S5).
    pub fn initial_partition(
        &mut self,
        cloud: &mut dyn CloudApi,
        logger: &mut dyn Logger,
        fleet: &FleetRegistry,
        time: Time,
    ) {
        for machine in fleet.host_ids() {
            if self.running.len() < self.max_running {
                match cloud.set_machine_state(machine, SState::S0) {
                    Ok(()) => self.running.push(machine),
                    Err(e) => logger.log_error(time, format!("error initializing machine #{}: {}", machine, e)),
                }
            } else if self.standby.len() < self.standby_size {
                match cloud.set_machine_state(machine, SState::S1) {
                    Ok(()) => {
                        self.standby.push(machine);
                        logger.log_debug(time, format!("added machine #{} to standby tier", machine));
                    }
                    Err(e) => logger.log_error(time, format!("error setting machine #{} to standby: {}", machine, e)),
                }
            } else {
                match cloud.set_machine_state(machine, SState::S5) {
                    Ok(()) => {
                        self.off.push(machine);
                        logger.log_debug(time, format!("added machine #{} to off tier", machine));
                    }
                    Err(e) => logger.log_error(time, format!("error powering off machine #{}: {}", machine, e)),
                }
            }
        }
        logger.log_info(
            time,
            format!(
                "initialized with {} running, {} standby and {} off machines",
                self.running.len(),
                self.standby.len(),
                self.off.len()
            ),
        );
    }

    /// Scans the standby tier for a machine of the requested architecture and
    /// wakes it into the running tier. Returns the promoted machine, if any.
    pub fn promote_for(
        &mut self,
        cloud: &mut dyn CloudApi,
        logger: &mut dyn Logger,
        arch: CpuArch,
        time: Time,
    ) -> Option<MachineId> {
        for i in 0..self.standby.len() {
            let machine = self.standby[i];
            let cpu = match cloud.machine_cpu_type(machine) {
                Ok(cpu) => cpu,
                Err(_) => continue,
            };
            if cpu != arch {
                continue;
            }
            if let Err(e) = cloud.set_machine_state(machine, SState::S0) {
                logger.log_error(time, format!("error activating machine #{}: {}", machine, e));
                continue;
            }
            self.standby.remove(i);
            self.running.push(machine);
            logger.log_debug(time, format!("activated standby machine #{}", machine));
            return Some(machine);
        }
        None
    }

    /// Pulls one machine from the off tier into standby when the standby tier
    /// has shrunk below half its target size. At most one refill per call.
    pub fn refill_standby(&mut self, cloud: &mut dyn CloudApi, logger: &mut dyn Logger, time: Time) {
        if self.standby.len() >= self.standby_size / 2 || self.off.is_empty() {
            return;
        }
        let machine = self.off.remove(0);
        match cloud.set_machine_state(machine, SState::S1) {
            Ok(()) => {
                self.standby.push(machine);
                logger.log_debug(time, format!("moved machine #{} from off to standby", machine));
            }
            Err(e) => {
                self.off.push(machine);
                logger.log_error(time, format!("error waking machine #{}: {}", machine, e));
            }
        }
    }

    /// Powers down an idle running machine, unless that would shrink the
    /// running tier below its minimum. Returns true if the demotion happened.
    pub fn demote(&mut self, cloud: &mut dyn CloudApi, logger: &mut dyn Logger, machine: MachineId, time: Time) -> bool {
        if self.running.len() <= self.min_running {
            return false;
        }
        let pos = match self.running.iter().position(|m| *m == machine) {
            Some(pos) => pos,
            None => return false,
        };
        match cloud.set_machine_state(machine, SState::S5) {
            Ok(()) => {
                self.running.remove(pos);
                self.off.push(machine);
                logger.log_debug(time, format!("demoted idle machine #{} to off tier", machine));
                true
            }
            Err(e) => {
                logger.log_error(time, format!("error powering off machine #{}: {}", machine, e));
                false
            }
        }
    }

    /// Sweeps the running tier and powers down machines that report zero
    /// active tasks, stopping at the tier minimum. Machines that are the
    /// destination of an in-flight migration are left alone.
    pub fn demote_idle_hosts(
        &mut self,
        cloud: &mut dyn CloudApi,
        logger: &mut dyn Logger,
        tracker: &MigrationTracker,
        time: Time,
    ) {
        let running = self.running.clone();
        for machine in running {
            if self.running.len() <= self.min_running {
                return;
            }
            if tracker.is_destination(machine) {
                continue;
            }
            let info = match cloud.machine_info(machine) {
                Ok(info) => info,
                Err(_) => continue,
            };
            if info.state != SState::S0 || info.active_tasks != 0 {
                continue;
            }
            self.demote(cloud, logger, machine, time);
        }
    }

    /// Wakes an off-tier machine of the requested architecture straight into
    /// the running tier. Used by policies that keep no standby tier.
    pub fn wake_for(
        &mut self,
        cloud: &mut dyn CloudApi,
        logger: &mut dyn Logger,
        arch: CpuArch,
        time: Time,
    ) -> Option<MachineId> {
        for i in 0..self.off.len() {
            let machine = self.off[i];
            let cpu = match cloud.machine_cpu_type(machine) {
                Ok(cpu) => cpu,
                Err(_) => continue,
            };
            if cpu != arch {
                continue;
            }
            if let Err(e) = cloud.set_machine_state(machine, SState::S0) {
                logger.log_error(time, format!("error waking machine #{}: {}", machine, e));
                continue;
            }
            self.off.remove(i);
            self.running.push(machine);
            logger.log_debug(time, format!("woke machine #{} into running tier", machine));
            return Some(machine);
        }
        None
    }
}
