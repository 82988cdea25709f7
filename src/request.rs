//! Wire codec for capture requests and status reports.
//!
//! The inbound grammar is a fixed ordered sequence of `key=value` fields:
//!
//! ```text
//! fc=<Hz>,lo=<Hz>,sps=<Hz>,bw=<Hz>,g=<dB>,t0=<epoch s>,n=<count>,ant=<name>
//! ```
//!
//! All eight fields are mandatory and positional. Decoding is total: every
//! input either yields a fully-populated [`CaptureRequest`] or a single
//! [`DaqError::InvalidRequest`] — there is no partial-success mode. Parsing
//! uses the `prse` format-string macros, so scientific notation (`2.4e9`) is
//! accepted anywhere a float is.
//!
//! Outbound, one status message is rendered per processed request; see
//! [`encode`] for the exact shapes.

use crate::error::DaqError;
use crate::timebase::format_epoch;
use prse::try_parse;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One timed capture request, parsed from a single inbound message.
///
/// Immutable once built and consumed exactly once by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// RF center frequency in Hz.
    pub center_freq: f64,
    /// Local-oscillator offset in Hz.
    pub lo_offset: f64,
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Analog bandwidth in Hz.
    pub bandwidth: f64,
    /// Receive gain in dB.
    pub gain: f64,
    /// Absolute capture start time, fractional epoch seconds.
    pub start_time: f64,
    /// Number of samples to capture.
    pub num_samples: u64,
    /// Antenna selector, e.g. `TX/RX` or `RX2`.
    pub antenna: String,
}

/// Terminal classification of one processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Requested sample count captured and persisted.
    Success,
    /// Inbound message did not match the wire grammar.
    ParseError,
    /// Scheduled start could not be honored given clock and setup slack.
    LateDeadline,
    /// Tuning/reference subsystem never reported lock.
    LockTimeout,
    /// Device produced no more data before the receive deadline.
    StreamTimeout,
    /// Device could not sustain the configured rate.
    StreamOverflow,
    /// Device reported the scheduled start had already elapsed when armed.
    LateCommand,
    /// Unclassified device error; non-recoverable for this request only.
    Other,
}

/// Result of one processed request, rendered to exactly one outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// Terminal status.
    pub status: OutcomeStatus,
    /// Capture path, present on success. The file exists on disk only when
    /// persistence is enabled; with persistence off the path still names the
    /// capture so peers see a consistent message shape.
    pub file: Option<PathBuf>,
    /// Human-readable detail for failures.
    pub detail: Option<String>,
    /// Samples actually captured.
    pub samples: u64,
    /// Wall-clock duration of the capture phase.
    pub elapsed: Duration,
    /// Reference timestamp for rendering; the request start time when known.
    pub timestamp: f64,
}

impl CaptureOutcome {
    /// Successful capture of `samples` samples.
    pub fn success(file: Option<PathBuf>, samples: u64, elapsed: Duration, start_time: f64) -> Self {
        Self {
            status: OutcomeStatus::Success,
            file,
            detail: None,
            samples,
            elapsed,
            timestamp: start_time,
        }
    }

    /// Malformed inbound message.
    pub fn parse_error(detail: impl Into<String>, now: f64) -> Self {
        Self {
            status: OutcomeStatus::ParseError,
            file: None,
            detail: Some(detail.into()),
            samples: 0,
            elapsed: Duration::ZERO,
            timestamp: now,
        }
    }

    /// Request rejected before hardware setup because the deadline is not
    /// reachable.
    pub fn late_deadline(start_time: f64) -> Self {
        Self {
            status: OutcomeStatus::LateDeadline,
            file: None,
            detail: None,
            samples: 0,
            elapsed: Duration::ZERO,
            timestamp: start_time,
        }
    }

    /// Capture aborted with `status`, after `samples` samples were received.
    pub fn failed(
        status: OutcomeStatus,
        start_time: f64,
        samples: u64,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            file: None,
            detail: Some(detail.into()),
            samples,
            elapsed: Duration::ZERO,
            timestamp: start_time,
        }
    }
}

/// Parse one inbound message into a [`CaptureRequest`].
pub fn decode(text: &str) -> Result<CaptureRequest, DaqError> {
    let parsed: Result<(f64, f64, f64, f64, f64, f64, u64, &str), _> =
        try_parse!(text, "fc={},lo={},sps={},bw={},g={},t0={},n={},ant={}");
    let (center_freq, lo_offset, sample_rate, bandwidth, gain, start_time, num_samples, ant) =
        parsed.map_err(|e| DaqError::InvalidRequest(e.to_string()))?;
    // `ant` is terminated by the next comma or end of input; ignore trailing fields
    let antenna = match ant.find(',') {
        Some(idx) => &ant[..idx],
        None => ant,
    };
    if antenna.is_empty() {
        return Err(DaqError::InvalidRequest("empty antenna field".to_string()));
    }
    Ok(CaptureRequest {
        center_freq,
        lo_offset,
        sample_rate,
        bandwidth,
        gain,
        start_time,
        num_samples,
        antenna: antenna.to_string(),
    })
}

/// Render one outbound status message for `outcome`.
///
/// The four shapes, with `{t}` as six-fractional-digit epoch seconds:
///
/// - `<{id} req saved {path}>`
/// - `<{id} req failed @ {t}>`
/// - `<{id} host late command @ {t}>`
/// - `<{id} invalid msg>`
pub fn encode(client_id: &str, outcome: &CaptureOutcome) -> String {
    match outcome.status {
        OutcomeStatus::Success => {
            let path = outcome.file.as_deref().unwrap_or(Path::new(""));
            format!("<{client_id} req saved {}>", path.display())
        }
        OutcomeStatus::ParseError => format!("<{client_id} invalid msg>"),
        OutcomeStatus::LateDeadline => format!(
            "<{client_id} host late command @ {}>",
            format_epoch(outcome.timestamp)
        ),
        _ => format!(
            "<{client_id} req failed @ {}>",
            format_epoch(outcome.timestamp)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "fc=2400000000,lo=0,sps=1000000,bw=2000000,g=30,t0=1700000010.5,n=500000,ant=TX/RX";

    #[test]
    fn decodes_all_eight_fields() {
        let req = decode(VALID).unwrap();
        assert_eq!(req.center_freq, 2.4e9);
        assert_eq!(req.lo_offset, 0.0);
        assert_eq!(req.sample_rate, 1e6);
        assert_eq!(req.bandwidth, 2e6);
        assert_eq!(req.gain, 30.0);
        assert_eq!(req.start_time, 1700000010.5);
        assert_eq!(req.num_samples, 500000);
        assert_eq!(req.antenna, "TX/RX");
    }

    #[test]
    fn decodes_scientific_notation() {
        let req = decode("fc=2.4e9,lo=0,sps=1e6,bw=2e6,g=30,t0=888888.512,n=10000,ant=RX2").unwrap();
        assert_eq!(req.center_freq, 2.4e9);
        assert_eq!(req.start_time, 888888.512);
        assert_eq!(req.antenna, "RX2");
    }

    #[test]
    fn antenna_terminates_at_next_comma() {
        let req = decode("fc=1,lo=0,sps=1,bw=1,g=1,t0=1,n=1,ant=TX/RX,form=float").unwrap();
        assert_eq!(req.antenna, "TX/RX");
    }

    #[test]
    fn rejects_missing_antenna_field() {
        assert!(decode("fc=1,lo=0,sps=1,bw=1,g=1,t0=1,n=1").is_err());
    }

    #[test]
    fn rejects_malformed_float() {
        assert!(decode("fc=abc,lo=0,sps=1,bw=1,g=1,t0=1,n=1,ant=RX2").is_err());
    }

    #[test]
    fn rejects_misordered_fields() {
        assert!(decode("lo=0,fc=1,sps=1,bw=1,g=1,t0=1,n=1,ant=RX2").is_err());
    }

    #[test]
    fn rejects_fractional_sample_count() {
        assert!(decode("fc=1,lo=0,sps=1,bw=1,g=1,t0=1,n=10.5,ant=RX2").is_err());
    }

    #[test]
    fn decode_is_total_on_garbage() {
        for input in ["", "hello", "fc=", "fc=1,lo=,sps=1,bw=1,g=1,t0=1,n=1,ant=RX2"] {
            assert!(decode(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn renders_saved_message() {
        let outcome = CaptureOutcome::success(
            Some(PathBuf::from("cap/2400.000M_x.dat")),
            500000,
            Duration::from_millis(500),
            1700000010.5,
        );
        assert_eq!(
            encode("tester", &outcome),
            "<tester req saved cap/2400.000M_x.dat>"
        );
    }

    #[test]
    fn renders_failed_message_with_six_digit_timestamp() {
        let outcome = CaptureOutcome::failed(OutcomeStatus::StreamOverflow, 888888.512, 10, "ovf");
        assert_eq!(encode("tester", &outcome), "<tester req failed @ 888888.512000>");
    }

    #[test]
    fn renders_late_command_message() {
        let outcome = CaptureOutcome::late_deadline(888888.512);
        assert_eq!(
            encode("tester", &outcome),
            "<tester host late command @ 888888.512000>"
        );
    }

    #[test]
    fn renders_invalid_message() {
        let outcome = CaptureOutcome::parse_error("garbage", 0.0);
        assert_eq!(encode("tester", &outcome), "<tester invalid msg>");
    }
}
