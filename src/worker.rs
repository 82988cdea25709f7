//! The acquisition control loop.
//!
//! [`AcquisitionWorker`] owns the device and bridges the two queues: it
//! repeatedly re-converges the device clock, pops one inbound command, decodes
//! and validates it, executes the capture, and pushes exactly one rendered
//! status message outbound. Malformed input is reported, never dropped.
//!
//! The loop has no terminal state by design — the worker runs for the process
//! lifetime and stops only through the cancellation token or a device error
//! that the top-level supervisor treats as fatal. Because the clock is
//! re-converged before every pop, the deadline check always runs after the
//! most recent resync, bounding the scheduling error the hardware can see.

use crate::cancel::CancelToken;
use crate::clock::ClockSyncSupervisor;
use crate::deadline::DeadlineGuard;
use crate::error::{DaqError, Result};
use crate::executor::AcquisitionExecutor;
use crate::hardware::SdrDevice;
use crate::queue::BlockingQueue;
use crate::request::{self, CaptureOutcome};
use crate::timebase::{datestamp, host_now};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long one pop attempt blocks before the cancel token is re-checked.
const POP_SLICE: Duration = Duration::from_millis(200);

/// Identity and file-naming parameters for the worker.
#[derive(Debug, Clone)]
pub struct WorkerParams {
    /// Client identity used in outbound messages.
    pub client_id: String,
    /// Prefix for capture files; may include a directory.
    pub file_prefix: String,
}

/// The data-plane control loop; see the module docs.
pub struct AcquisitionWorker<D: SdrDevice> {
    device: D,
    supervisor: ClockSyncSupervisor,
    guard: DeadlineGuard,
    executor: AcquisitionExecutor,
    params: WorkerParams,
    inbound: Arc<BlockingQueue<String>>,
    outbound: Arc<BlockingQueue<String>>,
    cancel: CancelToken,
}

impl<D: SdrDevice> AcquisitionWorker<D> {
    /// Assemble a worker around `device` and the two queues.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: D,
        supervisor: ClockSyncSupervisor,
        guard: DeadlineGuard,
        executor: AcquisitionExecutor,
        params: WorkerParams,
        inbound: Arc<BlockingQueue<String>>,
        outbound: Arc<BlockingQueue<String>>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            device,
            supervisor,
            guard,
            executor,
            params,
            inbound,
            outbound,
            cancel,
        }
    }

    /// Capture file path for a request: `{prefix}{fc MHz}M_{datestamp}.dat`.
    fn capture_path(&self, center_freq: f64, start_time: f64) -> PathBuf {
        PathBuf::from(format!(
            "{}{:.3}M_{}.dat",
            self.params.file_prefix,
            center_freq / 1e6,
            datestamp(start_time)
        ))
    }

    /// Process inbound requests until cancelled.
    ///
    /// Returns `Ok(())` on cooperative shutdown; device errors during clock
    /// sync propagate so the caller can decide whether to retry or exit.
    pub fn run(&mut self) -> Result<()> {
        info!(client_id = %self.params.client_id, "acquisition worker started");
        loop {
            if self.cancel.is_cancelled() {
                info!("acquisition worker stopping");
                return Ok(());
            }

            // every processed request is preceded by a fresh convergence check
            match self.supervisor.ensure_synced(&mut self.device, &self.cancel) {
                Ok(report) if report.arms > 0 => {
                    info!(offset = report.final_offset, arms = report.arms, "device clock resynced");
                }
                Ok(_) => {}
                Err(DaqError::Cancelled) => continue,
                Err(e) => {
                    // a dead worker must take the transport down with it,
                    // otherwise triggers keep queueing with no one answering
                    warn!(error = %e, "device failure, requesting shutdown");
                    self.cancel.cancel();
                    return Err(e);
                }
            }

            let Some(text) = self.inbound.pop_timeout(POP_SLICE) else {
                continue;
            };
            debug!(payload = %text, "request received");

            let request = match request::decode(&text) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "malformed request");
                    let outcome = CaptureOutcome::parse_error(e.to_string(), host_now());
                    self.report(&outcome);
                    continue;
                }
            };

            if let Err(late) = self.guard.check(&request, host_now()) {
                warn!(
                    start_time = late.start_time,
                    deficit = late.deficit,
                    "request cannot start on schedule"
                );
                let outcome = CaptureOutcome::late_deadline(late.start_time);
                self.report(&outcome);
                continue;
            }

            let path = self.capture_path(request.center_freq, request.start_time);
            info!(path = %path.display(), "saving to file");
            let outcome = self
                .executor
                .run(&mut self.device, &request, &path, &self.cancel);
            self.report(&outcome);
        }
    }

    /// Render and enqueue the outbound status for `outcome`.
    fn report(&self, outcome: &CaptureOutcome) {
        let message = request::encode(&self.params.client_id, outcome);
        info!(%message, "reporting outcome");
        self.outbound.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SyncPolicy;
    use crate::executor::ExecutorConfig;
    use crate::hardware::mock::MockSdr;
    use crate::hardware::{
        DeviceClock, RxFrontend, RxStream, SampleFormat, StreamError, TuneRequest, WireFormat,
    };
    use std::result::Result;

    /// Device whose time registers cannot be read.
    struct DeadClock {
        inner: MockSdr,
    }

    impl DeviceClock for DeadClock {
        fn set_clock_source(&mut self, source: &str) -> Result<(), DaqError> {
            self.inner.set_clock_source(source)
        }

        fn time_now(&self) -> Result<f64, DaqError> {
            Err(DaqError::Device("time register read failed".to_string()))
        }

        fn set_time_at_next_pps(&mut self, time: f64) -> Result<(), DaqError> {
            self.inner.set_time_at_next_pps(time)
        }
    }

    impl RxFrontend for DeadClock {
        fn set_subdev(&mut self, spec: &str) -> Result<(), DaqError> {
            self.inner.set_subdev(spec)
        }

        fn set_sample_rate(&mut self, rate: f64, channel: usize) -> Result<f64, DaqError> {
            self.inner.set_sample_rate(rate, channel)
        }

        fn tune(&mut self, request: &TuneRequest, channel: usize) -> Result<f64, DaqError> {
            self.inner.tune(request, channel)
        }

        fn set_gain(&mut self, gain: f64, channel: usize) -> Result<f64, DaqError> {
            self.inner.set_gain(gain, channel)
        }

        fn set_bandwidth(&mut self, bandwidth: f64, channel: usize) -> Result<f64, DaqError> {
            self.inner.set_bandwidth(bandwidth, channel)
        }

        fn set_antenna(&mut self, antenna: &str, channel: usize) -> Result<(), DaqError> {
            self.inner.set_antenna(antenna, channel)
        }

        fn lock_status(&mut self, sensor: &str, channel: usize) -> Result<bool, DaqError> {
            self.inner.lock_status(sensor, channel)
        }
    }

    impl RxStream for DeadClock {
        fn setup_stream(
            &mut self,
            host_format: SampleFormat,
            wire_format: WireFormat,
            channel: usize,
        ) -> Result<(), DaqError> {
            self.inner.setup_stream(host_format, wire_format, channel)
        }

        fn start_timed_stream(&mut self, start_time: f64, num_samples: u64) -> Result<(), DaqError> {
            self.inner.start_timed_stream(start_time, num_samples)
        }

        fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError> {
            self.inner.recv(buf, timeout)
        }

        fn stop_stream(&mut self) -> Result<(), DaqError> {
            self.inner.stop_stream()
        }
    }

    /// A device failure must both propagate and cancel the shared token, so
    /// the transport thread winds down instead of queueing unanswered
    /// triggers.
    #[test]
    fn device_failure_cancels_the_shared_token() {
        let cancel = CancelToken::new();
        let mut worker = AcquisitionWorker::new(
            DeadClock {
                inner: MockSdr::new(),
            },
            ClockSyncSupervisor::new(SyncPolicy::default()),
            DeadlineGuard::new(0.1, 0.5),
            AcquisitionExecutor::new(ExecutorConfig::default()),
            WorkerParams {
                client_id: "tester".to_string(),
                file_prefix: String::new(),
            },
            Arc::new(BlockingQueue::new()),
            Arc::new(BlockingQueue::new()),
            cancel.clone(),
        );
        let result = worker.run();
        assert!(matches!(result, Err(DaqError::Device(_))));
        assert!(cancel.is_cancelled());
    }
}
