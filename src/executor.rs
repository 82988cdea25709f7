//! Timed acquisition execution.
//!
//! [`AcquisitionExecutor`] turns one validated [`CaptureRequest`] into a
//! classified [`CaptureOutcome`]: it configures the front-end, waits for LO
//! lock, issues a timed count-bounded stream command, and runs the blocking
//! receive loop with a shrinking per-call timeout until the requested sample
//! count is reached or a terminal condition fires.
//!
//! The receive budget is `t0 + timeout_slack + n / sample_rate`; every receive
//! call gets whatever remains of it. Raw little-endian sample bytes are
//! appended to the output file as they arrive; on any non-success outcome a
//! partially written file is deleted before returning.
//!
//! Nothing here terminates the process: every failure is folded into the
//! outcome and the worker moves on to the next request.

use crate::cancel::CancelToken;
use crate::error::DaqError;
use crate::hardware::{RxFrontend, RxStream, SampleFormat, StreamError, TuneRequest, WireFormat};
use crate::request::{CaptureOutcome, CaptureRequest, OutcomeStatus};
use crate::timebase::host_now;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval for lock sensors.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Static configuration consumed by the executor, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Device channel index.
    pub channel: usize,
    /// Samples per receive call.
    pub samples_per_buffer: usize,
    /// Sample encoding on the device link.
    pub wire_format: WireFormat,
    /// Sample encoding in host memory and in the output file.
    pub host_format: SampleFormat,
    /// Extra receive budget beyond the nominal capture duration, seconds.
    pub timeout_slack: f64,
    /// Budget for the LO-lock poll, seconds.
    pub setup_timeout: f64,
    /// Tune with integer-N synthesis.
    pub integer_n: bool,
    /// Write captured samples to disk. When false the capture runs but the
    /// data is discarded.
    pub persist: bool,
    /// When set, overrides the antenna named in the request.
    pub antenna_override: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            samples_per_buffer: 10_000,
            wire_format: WireFormat::Sc16,
            host_format: SampleFormat::Sc16,
            timeout_slack: 0.5,
            setup_timeout: 0.5,
            integer_n: false,
            persist: true,
            antenna_override: None,
        }
    }
}

/// Poll a boolean lock sensor until it asserts or `timeout` seconds elapse.
///
/// Returns `Ok(false)` on a clean timeout; device read errors and
/// cancellation propagate as `Err`.
pub fn wait_for_lock<D: RxFrontend>(
    device: &mut D,
    sensor: &str,
    channel: usize,
    timeout: f64,
    cancel: &CancelToken,
) -> Result<bool, DaqError> {
    let deadline = Instant::now() + Duration::from_secs_f64(timeout.max(0.0));
    loop {
        if cancel.is_cancelled() {
            return Err(DaqError::Cancelled);
        }
        if device.lock_status(sensor, channel)? {
            debug!(sensor, "lock detected");
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        cancel.sleep_for(LOCK_POLL_INTERVAL);
    }
}

/// Executes one timed capture per call; see the module docs.
#[derive(Debug, Clone)]
pub struct AcquisitionExecutor {
    config: ExecutorConfig,
}

impl AcquisitionExecutor {
    /// Executor with the given static configuration.
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Apply the request's front-end settings in the canonical order:
    /// rate, frequency, gain, bandwidth, antenna.
    fn configure<D: RxFrontend>(
        &self,
        device: &mut D,
        request: &CaptureRequest,
    ) -> Result<(), DaqError> {
        let cfg = &self.config;
        if request.sample_rate <= 0.0 {
            return Err(DaqError::InvalidRequest(format!(
                "non-positive sample rate {}",
                request.sample_rate
            )));
        }
        let actual_rate = device.set_sample_rate(request.sample_rate, cfg.channel)?;
        debug!(
            requested = request.sample_rate,
            actual = actual_rate,
            "sample rate set"
        );
        let actual_freq = device.tune(
            &TuneRequest {
                target_freq: request.center_freq,
                lo_offset: request.lo_offset,
                integer_n: cfg.integer_n,
            },
            cfg.channel,
        )?;
        debug!(
            requested = request.center_freq,
            actual = actual_freq,
            lo_offset = request.lo_offset,
            "front-end tuned"
        );
        device.set_gain(request.gain, cfg.channel)?;
        device.set_bandwidth(request.bandwidth, cfg.channel)?;
        let antenna = cfg
            .antenna_override
            .as_deref()
            .unwrap_or(&request.antenna);
        device.set_antenna(antenna, cfg.channel)?;
        Ok(())
    }

    /// Run one capture. Always returns an outcome; never panics the worker.
    pub fn run<D: RxFrontend + RxStream>(
        &self,
        device: &mut D,
        request: &CaptureRequest,
        file_path: &Path,
        cancel: &CancelToken,
    ) -> CaptureOutcome {
        let cfg = &self.config;
        let t0 = request.start_time;

        if let Err(e) = self.configure(device, request) {
            warn!(error = %e, "front-end configuration failed");
            return CaptureOutcome::failed(OutcomeStatus::Other, t0, 0, e.to_string());
        }

        match wait_for_lock(device, "lo_locked", cfg.channel, cfg.setup_timeout, cancel) {
            Ok(true) => {}
            Ok(false) => {
                warn!("timed out waiting for lo_locked");
                return CaptureOutcome::failed(
                    OutcomeStatus::LockTimeout,
                    t0,
                    0,
                    "timed out waiting for lo_locked",
                );
            }
            Err(e) => {
                return CaptureOutcome::failed(OutcomeStatus::Other, t0, 0, e.to_string());
            }
        }

        if let Err(e) = device
            .setup_stream(cfg.host_format, cfg.wire_format, cfg.channel)
            .and_then(|()| device.start_timed_stream(t0, request.num_samples))
        {
            warn!(error = %e, "failed to arm stream command");
            return CaptureOutcome::failed(OutcomeStatus::Other, t0, 0, e.to_string());
        }

        let mut writer = if cfg.persist {
            match File::create(file_path) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(error = %e, path = %file_path.display(), "cannot create output file");
                    return CaptureOutcome::failed(OutcomeStatus::Other, t0, 0, e.to_string());
                }
            }
        } else {
            debug!("persistence disabled, discarding samples");
            None
        };

        let bytes_per_sample = cfg.host_format.bytes_per_sample();
        let mut buf = vec![0u8; cfg.samples_per_buffer * bytes_per_sample];
        let stop_time = t0 + cfg.timeout_slack + request.num_samples as f64 / request.sample_rate;
        info!(t0, stop_time, n = request.num_samples, "requesting capture");

        let capture_start = Instant::now();
        let mut total: u64 = 0;
        let mut status = OutcomeStatus::Success;
        let mut detail: Option<String> = None;

        while total < request.num_samples {
            if cancel.is_cancelled() {
                status = OutcomeStatus::Other;
                detail = Some("cancelled mid-capture".to_string());
                break;
            }
            let remaining = stop_time - host_now();
            if remaining <= 0.0 {
                status = OutcomeStatus::StreamTimeout;
                detail = Some("receive budget exhausted".to_string());
                break;
            }
            match device.recv(&mut buf, Duration::from_secs_f64(remaining)) {
                Ok(samples) => {
                    if let Some(w) = writer.as_mut() {
                        if let Err(e) = w.write_all(&buf[..samples * bytes_per_sample]) {
                            status = OutcomeStatus::Other;
                            detail = Some(format!("write failed: {e}"));
                            break;
                        }
                    }
                    total += samples as u64;
                }
                Err(StreamError::Timeout) => {
                    warn!(total, "timeout while streaming");
                    status = OutcomeStatus::StreamTimeout;
                    detail = Some("timeout while streaming".to_string());
                    break;
                }
                Err(StreamError::Overflow) => {
                    warn!(
                        rate_mb_s = request.sample_rate * bytes_per_sample as f64 / 1e6,
                        "could not sustain write rate"
                    );
                    status = OutcomeStatus::StreamOverflow;
                    detail = Some("overflow".to_string());
                    break;
                }
                Err(StreamError::LateCommand) => {
                    warn!("late command: scheduled start already elapsed");
                    status = OutcomeStatus::LateCommand;
                    detail = Some("late command".to_string());
                    break;
                }
                Err(StreamError::Other(message)) => {
                    warn!(message, "unclassified receiver error");
                    status = OutcomeStatus::Other;
                    detail = Some(message);
                    break;
                }
            }
        }
        let elapsed = capture_start.elapsed();

        if let Err(e) = device.stop_stream() {
            debug!(error = %e, "stop_stream failed");
        }
        if let Some(mut w) = writer.take() {
            if let Err(e) = w.flush() {
                if status == OutcomeStatus::Success {
                    status = OutcomeStatus::Other;
                    detail = Some(format!("flush failed: {e}"));
                }
            }
        }

        if status == OutcomeStatus::Success {
            info!(
                samples = total,
                elapsed_s = elapsed.as_secs_f64(),
                "capture complete"
            );
            CaptureOutcome::success(Some(file_path.to_path_buf()), total, elapsed, t0)
        } else {
            if cfg.persist {
                // partial output is useless; remove it
                if let Err(e) = std::fs::remove_file(file_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(error = %e, path = %file_path.display(), "failed to remove partial file");
                    }
                }
            }
            CaptureOutcome::failed(status, t0, total, detail.unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockSdr, StreamFault};

    fn request(n: u64) -> CaptureRequest {
        CaptureRequest {
            center_freq: 2.4e9,
            lo_offset: 0.0,
            sample_rate: 1e6,
            bandwidth: 2e6,
            gain: 30.0,
            start_time: host_now() + 0.05,
            num_samples: n,
            antenna: "TX/RX".to_string(),
        }
    }

    fn executor() -> AcquisitionExecutor {
        AcquisitionExecutor::new(ExecutorConfig {
            samples_per_buffer: 1000,
            ..ExecutorConfig::default()
        })
    }

    #[test]
    fn success_writes_exact_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new();
        let req = request(5000);
        let outcome = executor().run(&mut device, &req, &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.samples, 5000);
        assert_eq!(outcome.file.as_deref(), Some(path.as_path()));
        let bytes = std::fs::metadata(&path).unwrap().len();
        assert_eq!(bytes, 5000 * 4); // sc16 storage
    }

    #[test]
    fn front_end_settings_follow_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new();
        let req = request(100);
        executor().run(&mut device, &req, &path, &CancelToken::new());
        let applied = device.applied();
        assert_eq!(applied.sample_rate, Some(1e6));
        assert_eq!(applied.gain, Some(30.0));
        assert_eq!(applied.bandwidth, Some(2e6));
        assert_eq!(applied.antenna.as_deref(), Some("TX/RX"));
        assert_eq!(applied.tune.map(|t| t.target_freq), Some(2.4e9));
    }

    #[test]
    fn antenna_override_wins_over_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new();
        let exec = AcquisitionExecutor::new(ExecutorConfig {
            antenna_override: Some("RX2".to_string()),
            ..ExecutorConfig::default()
        });
        exec.run(&mut device, &request(10), &path, &CancelToken::new());
        assert_eq!(device.applied().antenna.as_deref(), Some("RX2"));
    }

    #[test]
    fn overflow_aborts_and_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new().with_fault(StreamFault::OverflowAfter(2000));
        let outcome = executor().run(&mut device, &request(5000), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::StreamOverflow);
        assert_eq!(outcome.samples, 2000);
        assert!(!path.exists(), "partial file was not removed");
    }

    #[test]
    fn stream_timeout_aborts_and_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new().with_fault(StreamFault::TimeoutAfter(100));
        let outcome = executor().run(&mut device, &request(5000), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::StreamTimeout);
        assert_eq!(outcome.samples, 100);
        assert!(!path.exists(), "partial file was not removed");
    }

    #[test]
    fn late_command_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new().with_fault(StreamFault::LateCommand);
        let outcome = executor().run(&mut device, &request(100), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::LateCommand);
        assert!(!path.exists());
    }

    #[test]
    fn lock_timeout_is_classified_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new().with_lock_after(u32::MAX);
        let exec = AcquisitionExecutor::new(ExecutorConfig {
            setup_timeout: 0.2,
            ..ExecutorConfig::default()
        });
        let outcome = exec.run(&mut device, &request(100), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::LockTimeout);
        assert!(!path.exists());
    }

    #[test]
    fn non_positive_rate_is_rejected_without_device_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new();
        let mut req = request(100);
        req.sample_rate = 0.0;
        let outcome = executor().run(&mut device, &req, &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::Other);
        assert_eq!(device.applied().sample_rate, None);
    }

    #[test]
    fn null_mode_discards_samples_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device = MockSdr::new();
        let exec = AcquisitionExecutor::new(ExecutorConfig {
            persist: false,
            ..ExecutorConfig::default()
        });
        let outcome = exec.run(&mut device, &request(1000), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.samples, 1000);
        // the outcome still names the capture path so the saved message keeps
        // its normal shape, but nothing was written
        assert_eq!(outcome.file.as_deref(), Some(path.as_path()));
        assert!(!path.exists());
        let message = crate::request::encode("tester", &outcome);
        assert_eq!(
            message,
            format!("<tester req saved {}>", path.display())
        );
    }

    #[test]
    fn unclassified_device_error_maps_to_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.dat");
        let mut device =
            MockSdr::new().with_fault(StreamFault::ErrorAfter(0, "bad chain".to_string()));
        let outcome = executor().run(&mut device, &request(100), &path, &CancelToken::new());
        assert_eq!(outcome.status, OutcomeStatus::Other);
        assert_eq!(outcome.detail.as_deref(), Some("bad chain"));
    }
}
