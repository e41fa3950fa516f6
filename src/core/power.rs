//! Load-driven per-core P-state control.

use crate::core::cloud_api::CloudApi;
use crate::core::common::{MachineId, PState, SState, Time};
use crate::core::logger::Logger;

/// Maps observed machine utilization to a P-state using the three cutpoints
/// (P3/P2, P2/P1 and P1/P0 boundaries).
pub fn pstate_for_utilization(utilization: f64, cutpoints: &[f64; 3]) -> PState {
    if utilization > cutpoints[2] {
        PState::P0
    } else if utilization > cutpoints[1] {
        PState::P1
    } else if utilization > cutpoints[0] {
        PState::P2
    } else {
        PState::P3
    }
}

/// Applies load-derived P-states to every core of the given machines.
/// Machines that are not fully on (S1/S5) are skipped. P-states are
/// write-through commands to the simulator and are never cached.
pub fn apply_pstates(
    cloud: &mut dyn CloudApi,
    logger: &mut dyn Logger,
    machines: &[MachineId],
    cutpoints: &[f64; 3],
    time: Time,
) {
    for &machine in machines {
        let info = match cloud.machine_info(machine) {
            Ok(info) => info,
            Err(_) => continue,
        };
        if info.state != SState::S0 || info.num_cores == 0 {
            continue;
        }
        let utilization = info.active_tasks as f64 / info.num_cores as f64;
        let pstate = pstate_for_utilization(utilization, cutpoints);
        for core in 0..info.num_cores {
            if cloud.set_core_performance(machine, core, pstate).is_err() {
                break;
            }
        }
        logger.log_debug(
            time,
            format!("machine #{} utilization {:.2}, cores set to {}", machine, utilization, pstate),
        );
    }
}
