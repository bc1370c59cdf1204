//! Solver diagnostics carried alongside the report tables.

use serde::{Deserialize, Serialize};

use wf_core::Real;

/// Diagnostics of one solve, keyed by its time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDiagnostics {
    pub time_s: u64,
    pub converged: bool,
    pub iterations: usize,
    pub damping_corrections: usize,
    pub residual_norm_1: Real,
    pub residual_norm_2: Real,
    pub residual_norm_inf: Real,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub convergence_order: Option<Real>,
    pub elapsed_s: Real,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub messages: Vec<String>,
}

/// Diagnostics of a whole run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// One entry per hydraulic time step, in solve order.
    pub hydraulic_steps: Vec<StepDiagnostics>,
    /// One entry per report time, copied from the covering hydraulic
    /// step with any reporting-only findings appended.
    pub report_steps: Vec<StepDiagnostics>,
    /// False if any hydraulic step failed to converge.
    pub success: bool,
    pub total_elapsed_s: Real,
}

impl RunDiagnostics {
    /// Steps that did not converge.
    pub fn degraded_steps(&self) -> impl Iterator<Item = &StepDiagnostics> {
        self.hydraulic_steps.iter().filter(|s| !s.converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(time_s: u64, converged: bool) -> StepDiagnostics {
        StepDiagnostics {
            time_s,
            converged,
            iterations: 4,
            damping_corrections: 0,
            residual_norm_1: 1e-5,
            residual_norm_2: 1e-5,
            residual_norm_inf: 1e-5,
            convergence_order: Some(2.0),
            elapsed_s: 0.001,
            messages: vec![],
        }
    }

    #[test]
    fn degraded_steps_filter() {
        let diag = RunDiagnostics {
            hydraulic_steps: vec![step(0, true), step(3600, false), step(7200, true)],
            report_steps: vec![],
            success: false,
            total_elapsed_s: 0.01,
        };
        let degraded: Vec<u64> = diag.degraded_steps().map(|s| s.time_s).collect();
        assert_eq!(degraded, vec![3600]);
    }

    #[test]
    fn optional_fields_skip_serialization() {
        let mut s = step(0, true);
        s.convergence_order = None;
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("convergence_order"));
        assert!(!json.contains("messages"));
    }
}
