//! Counters for fence phases and admission control.
//!
//! This module records through the `metrics` crate facade; embedders
//! install whatever recorder they export with. Nothing is recorded when
//! no recorder is installed.

use metrics::counter;

use crate::fence::Phase;

/// Metric names as constants for consistency.
pub mod names {
    /// Phase executions that committed.
    pub const PHASES_TOTAL: &str = "fence_phases_total";
    /// Phase executions that failed and rolled back.
    pub const FAULTS_TOTAL: &str = "fence_faults_total";
    /// Calls rejected by the admission controller.
    pub const RATE_LIMITED_TOTAL: &str = "fence_rate_limited_total";
}

/// Record a committed phase.
pub fn record_phase(phase: Phase) {
    counter!(names::PHASES_TOTAL, "phase" => phase.as_str()).increment(1);
}

/// Record a phase that failed and rolled back.
pub fn record_fault(phase: Phase) {
    counter!(names::FAULTS_TOTAL, "phase" => phase.as_str()).increment(1);
}

/// Record an admission rejection.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}
