//! Simulated SDR device for tests and hardware-free operation.
//!
//! `MockSdr` implements all three device capability traits with a simulated
//! clock offset, scriptable lock-sensor behavior, and scriptable mid-capture
//! faults. It is used by the test suite and by the daemon when no physical
//! device is present.
//!
//! # Simulated clock
//!
//! The device clock runs at host rate plus a configurable offset. A
//! PPS-latched time set takes effect at the edge *after* the immediate next
//! one, matching real hardware: the command must be resident strictly before
//! the edge that latches it.
//!
//! # Simulated streaming
//!
//! Samples are produced immediately on `recv` (the mock does not model RF
//! front-end timing); a deterministic byte ramp fills the buffer so tests can
//! verify persisted content. Faults trigger after a configured number of
//! delivered samples.

use crate::error::DaqError;
use crate::hardware::{
    DeviceClock, RxFrontend, RxStream, SampleFormat, StreamError, TuneRequest, WireFormat,
};
use crate::timebase::{host_now, next_edge};
use std::time::Duration;

/// Scripted mid-capture failure behavior.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StreamFault {
    /// Deliver every requested sample.
    #[default]
    None,
    /// Report an overflow once the given number of samples have been delivered.
    OverflowAfter(u64),
    /// Report a receive timeout once the given number of samples have been
    /// delivered.
    TimeoutAfter(u64),
    /// Report a late stream command on the first receive call.
    LateCommand,
    /// Report an unclassified receiver error once the given number of samples
    /// have been delivered.
    ErrorAfter(u64, String),
}

#[derive(Debug, Clone, Copy)]
struct PendingPps {
    apply_at: f64,
    value: f64,
}

#[derive(Debug)]
struct ActiveStream {
    remaining: u64,
    delivered: u64,
}

/// Front-end settings last applied to the mock, for test assertions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedSettings {
    /// Last sample rate in Hz.
    pub sample_rate: Option<f64>,
    /// Last tune request.
    pub tune: Option<TuneRequest>,
    /// Last gain in dB.
    pub gain: Option<f64>,
    /// Last bandwidth in Hz.
    pub bandwidth: Option<f64>,
    /// Last antenna selector.
    pub antenna: Option<String>,
    /// Last clock reference source.
    pub clock_source: Option<String>,
    /// Last subdevice specification.
    pub subdev: Option<String>,
    /// Last resolved host sample format.
    pub host_format: Option<SampleFormat>,
    /// Last resolved wire format.
    pub wire_format: Option<WireFormat>,
}

/// Simulated SDR device.
#[derive(Debug)]
pub struct MockSdr {
    pps_period: f64,
    clock_offset: f64,
    pending_pps: Option<PendingPps>,
    lock_after_polls: u32,
    lock_polls: u32,
    fault: StreamFault,
    chunk_cap: Option<usize>,
    stream: Option<ActiveStream>,
    host_format: Option<SampleFormat>,
    settings: AppliedSettings,
    arm_count: u32,
}

impl MockSdr {
    /// Device with a converged clock and no scripted faults.
    pub fn new() -> Self {
        Self {
            pps_period: 1.0,
            clock_offset: 0.0,
            pending_pps: None,
            lock_after_polls: 0,
            lock_polls: 0,
            fault: StreamFault::None,
            chunk_cap: None,
            stream: None,
            host_format: None,
            settings: AppliedSettings::default(),
            arm_count: 0,
        }
    }

    /// Start the device clock `offset` seconds away from host time.
    pub fn with_clock_offset(mut self, offset: f64) -> Self {
        self.clock_offset = offset;
        self
    }

    /// Use a non-standard PPS period (tests shrink it for speed).
    pub fn with_pps_period(mut self, period: f64) -> Self {
        self.pps_period = period;
        self
    }

    /// Require `polls` lock-sensor reads before reporting locked. Use
    /// `u32::MAX` for a sensor that never locks.
    pub fn with_lock_after(mut self, polls: u32) -> Self {
        self.lock_after_polls = polls;
        self
    }

    /// Script a mid-capture fault.
    pub fn with_fault(mut self, fault: StreamFault) -> Self {
        self.fault = fault;
        self
    }

    /// Cap the number of samples returned per receive call.
    pub fn with_chunk_cap(mut self, samples: usize) -> Self {
        self.chunk_cap = Some(samples);
        self
    }

    /// Settings last applied through the front-end trait.
    pub fn applied(&self) -> &AppliedSettings {
        &self.settings
    }

    /// Number of PPS time-set commands armed so far.
    pub fn arm_count(&self) -> u32 {
        self.arm_count
    }

    /// Device-minus-host offset that is in force at host time `now`.
    fn effective_offset(&self, now: f64) -> f64 {
        match self.pending_pps {
            Some(p) if now >= p.apply_at => p.value - p.apply_at,
            _ => self.clock_offset,
        }
    }
}

impl Default for MockSdr {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MockSdr {
    fn set_clock_source(&mut self, source: &str) -> Result<(), DaqError> {
        self.settings.clock_source = Some(source.to_string());
        Ok(())
    }

    fn time_now(&self) -> Result<f64, DaqError> {
        let now = host_now();
        Ok(now + self.effective_offset(now))
    }

    fn set_time_at_next_pps(&mut self, time: f64) -> Result<(), DaqError> {
        let now = host_now();
        // fold any matured arming into the base offset before re-arming
        self.clock_offset = self.effective_offset(now);
        let apply_at = next_edge(now, self.pps_period) + self.pps_period;
        self.pending_pps = Some(PendingPps {
            apply_at,
            value: time,
        });
        self.arm_count += 1;
        Ok(())
    }
}

impl RxFrontend for MockSdr {
    fn set_subdev(&mut self, spec: &str) -> Result<(), DaqError> {
        self.settings.subdev = Some(spec.to_string());
        Ok(())
    }

    fn set_sample_rate(&mut self, rate: f64, _channel: usize) -> Result<f64, DaqError> {
        if rate <= 0.0 {
            return Err(DaqError::Device(format!("invalid sample rate {rate}")));
        }
        self.settings.sample_rate = Some(rate);
        Ok(rate)
    }

    fn tune(&mut self, request: &TuneRequest, _channel: usize) -> Result<f64, DaqError> {
        self.settings.tune = Some(*request);
        Ok(request.target_freq)
    }

    fn set_gain(&mut self, gain: f64, _channel: usize) -> Result<f64, DaqError> {
        self.settings.gain = Some(gain);
        Ok(gain)
    }

    fn set_bandwidth(&mut self, bandwidth: f64, _channel: usize) -> Result<f64, DaqError> {
        self.settings.bandwidth = Some(bandwidth);
        Ok(bandwidth)
    }

    fn set_antenna(&mut self, antenna: &str, _channel: usize) -> Result<(), DaqError> {
        self.settings.antenna = Some(antenna.to_string());
        Ok(())
    }

    fn lock_status(&mut self, _sensor: &str, _channel: usize) -> Result<bool, DaqError> {
        if self.lock_after_polls == u32::MAX {
            return Ok(false);
        }
        self.lock_polls = self.lock_polls.saturating_add(1);
        Ok(self.lock_polls > self.lock_after_polls)
    }
}

impl RxStream for MockSdr {
    fn setup_stream(
        &mut self,
        host_format: SampleFormat,
        wire_format: WireFormat,
        _channel: usize,
    ) -> Result<(), DaqError> {
        self.host_format = Some(host_format);
        self.settings.host_format = Some(host_format);
        self.settings.wire_format = Some(wire_format);
        Ok(())
    }

    fn start_timed_stream(&mut self, _start_time: f64, num_samples: u64) -> Result<(), DaqError> {
        self.stream = Some(ActiveStream {
            remaining: num_samples,
            delivered: 0,
        });
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, StreamError> {
        let bytes_per_sample = self
            .host_format
            .map(|f| f.bytes_per_sample())
            .ok_or_else(|| StreamError::Other("stream not configured".to_string()))?;
        let fault = self.fault.clone();
        let chunk_cap = self.chunk_cap;
        let Some(stream) = self.stream.as_mut() else {
            return Err(StreamError::Other("no stream command in flight".to_string()));
        };

        match fault {
            StreamFault::LateCommand => return Err(StreamError::LateCommand),
            StreamFault::OverflowAfter(limit) if stream.delivered >= limit => {
                return Err(StreamError::Overflow)
            }
            StreamFault::TimeoutAfter(limit) if stream.delivered >= limit => {
                std::thread::sleep(timeout.min(Duration::from_millis(20)));
                return Err(StreamError::Timeout);
            }
            StreamFault::ErrorAfter(limit, ref message) if stream.delivered >= limit => {
                return Err(StreamError::Other(message.clone()));
            }
            _ => {}
        }

        if stream.remaining == 0 {
            // everything delivered; a further call behaves like a dead air
            std::thread::sleep(timeout.min(Duration::from_millis(20)));
            return Err(StreamError::Timeout);
        }

        let mut chunk = (buf.len() / bytes_per_sample).min(stream.remaining as usize);
        if let Some(cap) = chunk_cap {
            chunk = chunk.min(cap);
        }
        // cut the chunk short of a scripted fault threshold so the fault fires
        // on the next call with an exact delivered count
        match fault {
            StreamFault::OverflowAfter(limit)
            | StreamFault::TimeoutAfter(limit)
            | StreamFault::ErrorAfter(limit, _) => {
                chunk = chunk.min((limit - stream.delivered) as usize);
            }
            _ => {}
        }
        if chunk == 0 {
            return Err(StreamError::Other("zero-length receive buffer".to_string()));
        }

        let bytes = chunk * bytes_per_sample;
        for (i, slot) in buf.iter_mut().take(bytes).enumerate() {
            *slot = (stream.delivered as usize + i) as u8;
        }
        stream.delivered += chunk as u64;
        stream.remaining -= chunk as u64;
        Ok(chunk)
    }

    fn stop_stream(&mut self) -> Result<(), DaqError> {
        self.stream = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_offset_is_visible() {
        let device = MockSdr::new().with_clock_offset(5.0);
        let offset = device.time_now().unwrap() - host_now();
        assert!((offset - 5.0).abs() < 0.05);
    }

    #[test]
    fn pps_time_set_applies_after_a_full_period() {
        let mut device = MockSdr::new()
            .with_clock_offset(3.0)
            .with_pps_period(0.05);
        let now = host_now();
        let edge = next_edge(now, 0.05);
        device.set_time_at_next_pps(edge + 0.05).unwrap();
        // before the latching edge the old offset is still in force
        let offset = device.time_now().unwrap() - host_now();
        assert!((offset - 3.0).abs() < 0.05);
        std::thread::sleep(Duration::from_millis(120));
        let offset = device.time_now().unwrap() - host_now();
        assert!(offset.abs() < 0.05, "offset after latch: {offset}");
    }

    #[test]
    fn lock_sensor_needs_configured_polls() {
        let mut device = MockSdr::new().with_lock_after(2);
        assert!(!device.lock_status("lo_locked", 0).unwrap());
        assert!(!device.lock_status("lo_locked", 0).unwrap());
        assert!(device.lock_status("lo_locked", 0).unwrap());
    }

    #[test]
    fn stream_delivers_exact_sample_count() {
        let mut device = MockSdr::new();
        device
            .setup_stream(SampleFormat::Sc16, WireFormat::Sc16, 0)
            .unwrap();
        device.start_timed_stream(host_now(), 1000).unwrap();
        let mut buf = vec![0u8; 256 * 4];
        let mut total = 0u64;
        while total < 1000 {
            total += device.recv(&mut buf, Duration::from_millis(100)).unwrap() as u64;
        }
        assert_eq!(total, 1000);
        // the stream is exhausted; a further receive times out
        assert_eq!(
            device.recv(&mut buf, Duration::from_millis(10)),
            Err(StreamError::Timeout)
        );
    }

    #[test]
    fn overflow_fires_at_exact_threshold() {
        let mut device = MockSdr::new().with_fault(StreamFault::OverflowAfter(300));
        device
            .setup_stream(SampleFormat::Sc16, WireFormat::Sc16, 0)
            .unwrap();
        device.start_timed_stream(host_now(), 1000).unwrap();
        let mut buf = vec![0u8; 256 * 4];
        let mut total = 0u64;
        loop {
            match device.recv(&mut buf, Duration::from_millis(100)) {
                Ok(n) => total += n as u64,
                Err(StreamError::Overflow) => break,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(total, 300);
    }
}
