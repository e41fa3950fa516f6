//! Scheduler configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Auxiliary structure to parse SchedulerConfig from file
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SchedulerConfigRaw {
    /// scheduling policy with optional arguments, e.g. EnergyTiered
    pub policy: Option<String>,
    /// maximum number of machines in the running tier
    pub max_running: Option<usize>,
    /// minimum number of machines in the running tier
    pub min_running: Option<usize>,
    /// target number of machines in the standby tier
    pub standby_size: Option<usize>,
    /// global cap on concurrently migrating VMs
    pub migration_cap: Option<usize>,
    /// hosts below this utilization are consolidation sources
    pub consolidation_threshold: Option<f64>,
    /// packing destinations must stay below this utilization
    pub pack_ceiling: Option<f64>,
    /// utilization cutpoints for P3/P2, P2/P1 and P1/P0
    pub pstate_cutpoints: Option<[f64; 3]>,
    /// SLA-driven migration requires a destination at most this fraction of the source load
    pub sla_migration_slack: Option<f64>,
}

/// Represents scheduler configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// scheduling policy with optional arguments, e.g. EnergyTiered
    pub policy: String,
    /// maximum number of machines in the running tier
    pub max_running: usize,
    /// minimum number of machines in the running tier
    pub min_running: usize,
    /// target number of machines in the standby tier
    pub standby_size: usize,
    /// global cap on concurrently migrating VMs
    pub migration_cap: usize,
    /// hosts below this utilization are consolidation sources
    pub consolidation_threshold: f64,
    /// packing destinations must stay below this utilization
    pub pack_ceiling: f64,
    /// utilization cutpoints for P3/P2, P2/P1 and P1/P0
    pub pstate_cutpoints: [f64; 3],
    /// SLA-driven migration requires a destination at most this fraction of the source load
    pub sla_migration_slack: f64,
}

impl SchedulerConfig {
    /// Creates scheduler config with default parameter values.
    pub fn new() -> Self {
        Self {
            policy: "EnergyTiered".to_string(),
            max_running: 12,
            min_running: 8,
            standby_size: 4,
            migration_cap: 2,
            consolidation_threshold: 0.3,
            pack_ceiling: 0.7,
            pstate_cutpoints: [0.2, 0.4, 0.7],
            sla_migration_slack: 0.7,
        }
    }

    /// Creates scheduler config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: SchedulerConfigRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        let default = SchedulerConfig::new();

        Self {
            policy: raw.policy.unwrap_or(default.policy),
            max_running: raw.max_running.unwrap_or(default.max_running),
            min_running: raw.min_running.unwrap_or(default.min_running),
            standby_size: raw.standby_size.unwrap_or(default.standby_size),
            migration_cap: raw.migration_cap.unwrap_or(default.migration_cap),
            consolidation_threshold: raw.consolidation_threshold.unwrap_or(default.consolidation_threshold),
            pack_ceiling: raw.pack_ceiling.unwrap_or(default.pack_ceiling),
            pstate_cutpoints: raw.pstate_cutpoints.unwrap_or(default.pstate_cutpoints),
            sla_migration_slack: raw.sla_migration_slack.unwrap_or(default.sla_migration_slack),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses config value string, which consists of two parts - name and options.
/// Example: EnergyTiered[standby_size=4] parts are name EnergyTiered and options string "standby_size=4".
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
///
/// # Examples
///
/// ```rust
/// use cloudsched::core::config::parse_options;
///
/// let options = parse_options("option1=0.8,option2=something");
/// assert_eq!(options.get("option1").unwrap(), "0.8");
/// assert_eq!(options.get("option2").unwrap(), "something");
/// assert_eq!(options.get("option3"), None);
/// ```
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.to_string(), value.to_string());
        }
    }
    options
}
