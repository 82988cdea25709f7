//! Hardware capability traits and sample-format descriptors.
//!
//! The SDR device is an external collaborator; this module specifies it at the
//! boundary the coordination core actually needs. Instead of one monolithic
//! device trait, the device implements three narrow capabilities:
//!
//! - [`DeviceClock`] — read the device time and arm a PPS-latched time set;
//!   consumed by the clock-sync supervisor.
//! - [`RxFrontend`] — tuning, gain, bandwidth, antenna, and lock sensors;
//!   consumed during per-request configuration.
//! - [`RxStream`] — the timed, count-bounded streaming primitive; consumed by
//!   the capture loop.
//!
//! # Thread model
//!
//! All methods are synchronous and blocking with explicit per-call timeouts
//! where they can stall. The data plane is a dedicated OS thread, not an async
//! task; the only other suspension point in that thread is the inbound queue
//! pop.
//!
//! # Sample formats
//!
//! The sample encoding is resolved once at configuration time into a
//! [`SampleFormat`] descriptor; the receive path then moves opaque
//! little-endian bytes. There is no per-call dispatch on the sample type.

pub mod mock;

use crate::error::DaqError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sample encoding on the device transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Complex 8-bit integers.
    Sc8,
    /// Complex 16-bit integers.
    Sc16,
}

impl WireFormat {
    /// Canonical name as used by device stream arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Sc8 => "sc8",
            WireFormat::Sc16 => "sc16",
        }
    }
}

impl FromStr for WireFormat {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sc8" => Ok(WireFormat::Sc8),
            "sc16" => Ok(WireFormat::Sc16),
            other => Err(DaqError::Configuration(format!(
                "unknown wire format '{other}' (expected sc8 or sc16)"
            ))),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample encoding persisted to the output file.
///
/// Samples are interleaved complex pairs, little-endian, no header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Complex 16-bit integers, 4 bytes per sample.
    Sc16,
    /// Complex 32-bit floats, 8 bytes per sample.
    Fc32,
    /// Complex 64-bit floats, 16 bytes per sample.
    Fc64,
}

impl SampleFormat {
    /// Bytes occupied by one complex sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Sc16 => 4,
            SampleFormat::Fc32 => 8,
            SampleFormat::Fc64 => 16,
        }
    }

    /// Canonical name as used by device stream arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleFormat::Sc16 => "sc16",
            SampleFormat::Fc32 => "fc32",
            SampleFormat::Fc64 => "fc64",
        }
    }
}

impl FromStr for SampleFormat {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // accept both the stream-args names and the friendlier CLI names
        match s {
            "sc16" | "short" => Ok(SampleFormat::Sc16),
            "fc32" | "float" => Ok(SampleFormat::Fc32),
            "fc64" | "double" => Ok(SampleFormat::Fc64),
            other => Err(DaqError::Configuration(format!(
                "unknown sample format '{other}' (expected short/float/double)"
            ))),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tune operation: target frequency plus synthesis options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneRequest {
    /// RF center frequency in Hz.
    pub target_freq: f64,
    /// Local-oscillator offset in Hz.
    pub lo_offset: f64,
    /// Use integer-N synthesis (better spurs, slower switching).
    pub integer_n: bool,
}

/// Error classification for one streaming receive call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// No data arrived within the per-call timeout.
    #[error("timeout while streaming")]
    Timeout,
    /// The device dropped samples because the consumer could not keep up.
    #[error("overflow: could not sustain the configured rate")]
    Overflow,
    /// The scheduled start time had already elapsed when the device armed the
    /// stream command.
    #[error("late command: scheduled start already elapsed")]
    LateCommand,
    /// Any other device-reported receive error.
    #[error("receiver error: {0}")]
    Other(String),
}

/// Device time registers and PPS-latched time setting.
pub trait DeviceClock: Send {
    /// Select the clock and time reference source (`internal`, `external`,
    /// `mimo`). Called once at bring-up.
    fn set_clock_source(&mut self, source: &str) -> Result<(), DaqError>;

    /// Current device time in fractional epoch seconds.
    fn time_now(&self) -> Result<f64, DaqError>;

    /// Arm the device to latch `time` at the PPS edge *after* the next one.
    ///
    /// The command must be resident strictly before the edge that latches it,
    /// so the device applies the value one full period after the immediate
    /// next edge.
    fn set_time_at_next_pps(&mut self, time: f64) -> Result<(), DaqError>;
}

/// Per-channel receive front-end configuration and lock sensors.
pub trait RxFrontend: Send {
    /// Apply a subdevice specification. Must precede channel-mapped settings.
    fn set_subdev(&mut self, spec: &str) -> Result<(), DaqError>;

    /// Set the sample rate; returns the rate actually coerced by the hardware.
    fn set_sample_rate(&mut self, rate: f64, channel: usize) -> Result<f64, DaqError>;

    /// Tune the front-end; returns the actual center frequency.
    fn tune(&mut self, request: &TuneRequest, channel: usize) -> Result<f64, DaqError>;

    /// Set receive gain in dB; returns the actual gain.
    fn set_gain(&mut self, gain: f64, channel: usize) -> Result<f64, DaqError>;

    /// Set analog bandwidth in Hz; returns the actual bandwidth.
    fn set_bandwidth(&mut self, bandwidth: f64, channel: usize) -> Result<f64, DaqError>;

    /// Select the receive antenna.
    fn set_antenna(&mut self, antenna: &str, channel: usize) -> Result<(), DaqError>;

    /// Read a boolean lock sensor (`lo_locked`, `ref_locked`, `mimo_locked`).
    fn lock_status(&mut self, sensor: &str, channel: usize) -> Result<bool, DaqError>;
}

/// Timed, count-bounded sample streaming.
pub trait RxStream: Send {
    /// Resolve the stream's wire and host sample encodings. Called once per
    /// request, before the stream command is issued.
    fn setup_stream(
        &mut self,
        host_format: SampleFormat,
        wire_format: WireFormat,
        channel: usize,
    ) -> Result<(), DaqError>;

    /// Issue a stream command scheduled to begin at `start_time` (epoch
    /// seconds) and bounded to `num_samples` samples.
    fn start_timed_stream(&mut self, start_time: f64, num_samples: u64) -> Result<(), DaqError>;

    /// Blocking receive of up to `buf.len() / bytes_per_sample` samples.
    ///
    /// Returns the number of *samples* written into `buf`, or a classified
    /// [`StreamError`]. Blocks at most `timeout`.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError>;

    /// Stop any in-flight streaming. Idempotent.
    fn stop_stream(&mut self) -> Result<(), DaqError>;
}

/// Convenience bound for a full SDR device.
pub trait SdrDevice: DeviceClock + RxFrontend + RxStream {}

impl<T: DeviceClock + RxFrontend + RxStream> SdrDevice for T {}
