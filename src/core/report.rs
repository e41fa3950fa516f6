//! Final SLA and energy report.

use std::io;
use std::io::Write;

use crate::core::cloud_api::CloudApi;
use crate::core::common::{SlaClass, Time};

/// Writes the end-of-run report in the fixed terminal format expected by the
/// simulator harness.
pub fn write_final_report<W: Write>(out: &mut W, cloud: &dyn CloudApi, time: Time) -> io::Result<()> {
    writeln!(out, "SLA violation report")?;
    for sla in [SlaClass::Sla0, SlaClass::Sla1, SlaClass::Sla2] {
        writeln!(out, "{}: {}%", sla, cloud.sla_report(sla).unwrap_or(0))?;
    }
    writeln!(out, "Total Energy {}KW-Hour", cloud.cluster_energy().unwrap_or(0.))?;
    writeln!(out, "Simulation run finished in {} seconds", time as f64 / 1_000_000.)?;
    Ok(())
}
