//! PPS-disciplined device clock alignment.
//!
//! [`ClockSyncSupervisor`] keeps the device's internal clock converged to host
//! (NTP) time using the pulse-per-second edge. It is re-entered before every
//! request and is a cheap no-op (one measurement) once converged.
//!
//! The supervisor is a small state machine:
//!
//! 1. **Measuring** — compare device time against host time; done when the
//!    offset magnitude is within the policy threshold.
//! 2. **AwaitingSafeWindow** — if host time sits within the slack window of a
//!    PPS edge (either side), wait past the edge plus extra slack; writing the
//!    time registers near an edge risks racing the hardware's own latch.
//! 3. **Arming** — arm the device to latch `next_edge + period` at the moment
//!    that edge occurs. The "+period" accounts for the command needing to be
//!    resident strictly before the edge it latches on, so it targets the
//!    *following* edge.
//! 4. **Cooldown** — sleep a fixed settle interval, then re-measure.
//!
//! There is no retry bound: the loop runs until convergence or cancellation.

use crate::cancel::CancelToken;
use crate::error::DaqError;
use crate::hardware::DeviceClock;
use crate::timebase::{host_now, near_edge, next_edge};
use std::time::Duration;
use tracing::{debug, info};

/// Tuning knobs for the sync loop.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Maximum tolerated |device − host| offset, seconds.
    pub threshold: f64,
    /// Half-width of the unsafe window around a PPS edge, seconds.
    pub edge_slack: f64,
    /// Cooldown between arming and the next measurement.
    pub settle: Duration,
    /// PPS period, seconds. One second on real hardware; tests shrink it.
    pub pps_period: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            edge_slack: 0.020,
            settle: Duration::from_millis(2500),
            pps_period: 1.0,
        }
    }
}

/// What one `ensure_synced` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncReport {
    /// Offset measurements taken.
    pub measurements: u32,
    /// PPS corrections armed.
    pub arms: u32,
    /// Offset at the final measurement, seconds.
    pub final_offset: f64,
}

/// Aligns a device clock to host time; see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSyncSupervisor {
    policy: SyncPolicy,
}

impl ClockSyncSupervisor {
    /// Supervisor with the given policy.
    pub fn new(policy: SyncPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Signed device-minus-host offset, seconds.
    pub fn offset<C: DeviceClock>(device: &C) -> Result<f64, DaqError> {
        Ok(device.time_now()? - host_now())
    }

    /// Drive the device clock to within the policy threshold of host time.
    ///
    /// Loops Measuring → AwaitingSafeWindow → Arming → Cooldown until
    /// converged. Returns immediately after a single measurement when the
    /// clock is already within threshold.
    pub fn ensure_synced<C: DeviceClock>(
        &self,
        device: &mut C,
        cancel: &CancelToken,
    ) -> Result<SyncReport, DaqError> {
        let policy = &self.policy;
        let mut report = SyncReport {
            measurements: 0,
            arms: 0,
            final_offset: 0.0,
        };
        loop {
            if cancel.is_cancelled() {
                return Err(DaqError::Cancelled);
            }
            let offset = Self::offset(device)?;
            report.measurements += 1;
            report.final_offset = offset;
            if offset.abs() <= policy.threshold {
                debug!(offset, "device clock within threshold");
                return Ok(report);
            }
            info!(offset, "device clock off host time; arming PPS correction");

            // AwaitingSafeWindow: stay clear of the edge on both sides
            loop {
                let now = host_now();
                if !near_edge(now, policy.edge_slack, policy.pps_period) {
                    break;
                }
                let resume = next_edge(now, policy.pps_period) + 2.0 * policy.edge_slack;
                debug!(now, resume, "too close to PPS edge, waiting past it");
                if !cancel.sleep_for(Duration::from_secs_f64((resume - now).max(0.0))) {
                    return Err(DaqError::Cancelled);
                }
            }

            // Arming: the value latches one full period past the next edge
            let now = host_now();
            let latch_time = next_edge(now, policy.pps_period) + policy.pps_period;
            device.set_time_at_next_pps(latch_time)?;
            report.arms += 1;
            debug!(latch_time, "armed PPS time set");

            // Cooldown, then re-measure
            if !cancel.sleep_for(policy.settle) {
                return Err(DaqError::Cancelled);
            }
        }
    }
}
