//! Deadline admission check for scheduled captures.
//!
//! A request can only be honored if, at validation time, there is still room
//! for the residual clock-sync error (`clock_slack`) plus the hardware
//! configuration and stream-arming time (`setup_slack`) before the requested
//! start. The check is a pure function of `(now, slacks, start_time)` and uses
//! a strict inequality: a request whose start equals the worst-case ready time
//! is rejected, since the capture could not start on schedule even in the best
//! case.

use crate::request::CaptureRequest;

/// Validates that a scheduled start time is still reachable.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineGuard {
    /// Bound on residual host/device clock disagreement, seconds.
    pub clock_slack: f64,
    /// Bound on hardware configuration plus stream-arming time, seconds.
    pub setup_slack: f64,
}

/// Rejection detail: how far past admissibility the request was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateDeadline {
    /// Requested start time, epoch seconds.
    pub start_time: f64,
    /// Seconds by which `now + slacks` met or exceeded the start time.
    pub deficit: f64,
}

impl DeadlineGuard {
    /// Create a guard with the given slack bounds.
    pub fn new(clock_slack: f64, setup_slack: f64) -> Self {
        Self {
            clock_slack,
            setup_slack,
        }
    }

    /// Admit `request` if `now + clock_slack + setup_slack < start_time`.
    pub fn check(&self, request: &CaptureRequest, now: f64) -> Result<(), LateDeadline> {
        let ready = now + self.clock_slack + self.setup_slack;
        if ready < request.start_time {
            Ok(())
        } else {
            Err(LateDeadline {
                start_time: request.start_time,
                deficit: ready - request.start_time,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_at(start_time: f64) -> CaptureRequest {
        CaptureRequest {
            center_freq: 2.4e9,
            lo_offset: 0.0,
            sample_rate: 1e6,
            bandwidth: 2e6,
            gain: 30.0,
            start_time,
            num_samples: 1000,
            antenna: "TX/RX".to_string(),
        }
    }

    #[test]
    fn admits_start_strictly_beyond_slacks() {
        let guard = DeadlineGuard::new(0.1, 0.5);
        assert!(guard.check(&request_at(101.0), 100.0).is_ok());
    }

    #[test]
    fn rejects_at_exact_equality() {
        let guard = DeadlineGuard::new(0.1, 0.5);
        let err = guard.check(&request_at(100.6), 100.0).unwrap_err();
        assert!(err.deficit.abs() < 1e-9);
    }

    #[test]
    fn rejects_start_in_the_past() {
        let guard = DeadlineGuard::new(0.1, 0.5);
        let err = guard.check(&request_at(95.0), 100.0).unwrap_err();
        assert!(err.deficit > 5.0);
        assert_eq!(err.start_time, 95.0);
    }

    #[test]
    fn check_depends_only_on_inputs() {
        let guard = DeadlineGuard::new(0.1, 0.5);
        let req = request_at(200.0);
        assert_eq!(
            guard.check(&req, 150.0).is_ok(),
            guard.check(&req, 150.0).is_ok()
        );
        assert!(guard.check(&req, 199.5).is_err());
    }
}
