//! # Timed RX DAQ
//!
//! Core library for a daemon that performs precisely-timed SDR captures
//! triggered over MQTT. The device's internal clock is kept converged to host
//! time with a pulse-per-second edge signal; capture requests name an absolute
//! start time, a sample count, and the front-end settings to apply.
//!
//! ## Crate structure
//!
//! - **`queue`**: `BlockingQueue<T>`, the FIFO bridging the MQTT control-plane
//!   threads and the acquisition data-plane thread.
//! - **`clock`**: the PPS clock-sync supervisor, re-entered before every
//!   request.
//! - **`request`**: wire codec for capture requests and status reports.
//! - **`deadline`**: admission check for scheduled start times.
//! - **`executor`**: hardware configuration plus the timed, count-bounded
//!   receive loop with failure classification.
//! - **`worker`**: the control loop tying the above together.
//! - **`hardware`**: device capability traits, sample-format descriptors, and
//!   a simulated device.
//! - **`transport`**: the MQTT adapter behind narrow observer traits.
//! - **`cancel`**: cooperative cancellation token observed at every
//!   suspension point.
//! - **`config`** / **`telemetry`** / **`error`** / **`timebase`**: settings,
//!   tracing setup, the central error type, and epoch-time helpers.
//!
//! ## Data flow
//!
//! ```text
//! MQTT ─> inbound queue ─> worker ─> {clock sync, decode, deadline, capture}
//!                                              │
//! MQTT <─ outbound queue <─ rendered status <──┘
//! ```

pub mod cancel;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod error;
pub mod executor;
pub mod hardware;
pub mod queue;
pub mod request;
pub mod telemetry;
pub mod timebase;
pub mod transport;
pub mod worker;
