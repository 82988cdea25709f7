//! Daemon entry point.
//!
//! Saves SDR data at a known time as provided by a trigger over MQTT. The
//! acquisition worker runs on its own thread; the MQTT event loop occupies
//! this one. The two share nothing but the pair of blocking queues and the
//! cancellation token.
//!
//! The real radio plugs in behind the `hardware` capability traits; this
//! binary wires up the simulated device so the full pipeline runs without
//! hardware attached.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use timed_rx_daq::cancel::CancelToken;
use timed_rx_daq::clock::{ClockSyncSupervisor, SyncPolicy};
use timed_rx_daq::config::Settings;
use timed_rx_daq::deadline::DeadlineGuard;
use timed_rx_daq::executor::{wait_for_lock, AcquisitionExecutor, ExecutorConfig};
use timed_rx_daq::hardware::mock::MockSdr;
use timed_rx_daq::hardware::{DeviceClock, RxFrontend, SdrDevice};
use timed_rx_daq::queue::BlockingQueue;
use timed_rx_daq::transport::{self, LogConnectionObserver, MqttParams, QueueSink};
use timed_rx_daq::worker::{AcquisitionWorker, WorkerParams};
use timed_rx_daq::{config, telemetry};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "timed_rx_daq")]
#[command(about = "Timed RX to file with MQTT trigger", long_about = None)]
struct Cli {
    /// Optional TOML settings file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device address args
    #[arg(long = "device-args")]
    device_args: Option<String>,

    /// MQTT server to connect, tcp://host:port
    #[arg(long = "mqtt-server")]
    mqtt_server: Option<String>,

    /// Own ID used on MQTT and in file names
    #[arg(long)]
    id: Option<String>,

    /// Topic to send responses/updates to
    #[arg(long = "pub-topic")]
    pub_topic: Option<String>,

    /// Topic to listen on for triggers
    #[arg(long = "sub-topic")]
    sub_topic: Option<String>,

    /// Prefix for save files, may include a directory
    #[arg(long)]
    prefix: Option<String>,

    /// Subdevice specification
    #[arg(long)]
    subdev: Option<String>,

    /// Which channel to use
    #[arg(long)]
    channel: Option<usize>,

    /// Additional slack for setup operations, seconds
    #[arg(long)]
    slack: Option<f64>,

    /// Slack allowed between NTP and PPS time, seconds
    #[arg(long = "ntp-slack")]
    ntp_slack: Option<f64>,

    /// Samples per buffer
    #[arg(long)]
    spb: Option<usize>,

    /// Wire format (sc8 or sc16)
    #[arg(long)]
    wirefmt: Option<String>,

    /// Sample type: double, float, or short
    #[arg(long)]
    datafmt: Option<String>,

    /// Tune with integer-N tuning
    #[arg(long = "int-n")]
    int_n: bool,

    /// Run captures without writing files
    #[arg(long)]
    null: bool,
}

/// Layer CLI flags over the loaded settings.
fn apply_cli(settings: &mut Settings, cli: &Cli) -> anyhow::Result<()> {
    if let Some(v) = &cli.device_args {
        settings.device.args = v.clone();
    }
    if let Some(v) = &cli.mqtt_server {
        settings.mqtt.server = v.clone();
    }
    if let Some(v) = &cli.id {
        settings.mqtt.client_id = v.clone();
    }
    if let Some(v) = &cli.pub_topic {
        settings.mqtt.publish_topic = v.clone();
    }
    if let Some(v) = &cli.sub_topic {
        settings.mqtt.subscribe_topic = v.clone();
    }
    if let Some(v) = &cli.prefix {
        settings.capture.file_prefix = v.clone();
    }
    if let Some(v) = &cli.subdev {
        settings.device.subdev = Some(v.clone());
    }
    if let Some(v) = cli.channel {
        settings.device.channel = v;
    }
    if let Some(v) = cli.slack {
        settings.capture.setup_slack = v;
    }
    if let Some(v) = cli.ntp_slack {
        settings.capture.ntp_slack = v;
    }
    if let Some(v) = cli.spb {
        settings.capture.samples_per_buffer = v;
    }
    if let Some(v) = &cli.wirefmt {
        settings.capture.wire_format = v.parse()?;
    }
    if let Some(v) = &cli.datafmt {
        settings.capture.data_format = v.parse()?;
    }
    if cli.int_n {
        settings.capture.integer_n = true;
    }
    if cli.null {
        settings.capture.null = true;
    }
    Ok(())
}

/// Bring the device up: reference selection plus the lock checks the chosen
/// reference requires.
fn open_device(settings: &config::DeviceSettings, setup_slack: f64, cancel: &CancelToken) -> anyhow::Result<MockSdr> {
    let mut device = MockSdr::new();
    info!(args = %settings.args, "creating device");
    device.set_clock_source(&settings.clock_reference)?;
    let sensor = match settings.clock_reference.as_str() {
        "external" => Some("ref_locked"),
        "mimo" => Some("mimo_locked"),
        _ => None,
    };
    if let Some(sensor) = sensor {
        if !wait_for_lock(&mut device, sensor, 0, setup_slack, cancel)? {
            bail!("timed out waiting for {sensor} at device bring-up");
        }
    }
    // subdevice selection must precede channel-mapped settings
    if let Some(spec) = &settings.subdev {
        device.set_subdev(spec)?;
    }
    Ok(device)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    apply_cli(&mut settings, &cli)?;
    settings.validate()?;
    telemetry::init(&settings.log_level)?;

    info!(server = %settings.mqtt.server, client_id = %settings.mqtt.client_id, "MQTT target");
    info!(
        publish = %settings.mqtt.publish_topic,
        subscribe = %settings.mqtt.subscribe_topic,
        "topics"
    );

    let cancel = CancelToken::new();
    let inbound: Arc<BlockingQueue<String>> = Arc::new(BlockingQueue::new());
    let outbound: Arc<BlockingQueue<String>> = Arc::new(BlockingQueue::new());

    // the device must be up before the transport starts delivering triggers
    let device = open_device(&settings.device, settings.capture.setup_slack, &cancel)?;

    let worker_handle = spawn_worker(device, &settings, &inbound, &outbound, &cancel)?;

    let params = MqttParams {
        server: settings.mqtt.server.clone(),
        client_id: settings.mqtt.client_id.clone(),
        publish_topic: settings.mqtt.publish_topic.clone(),
        subscribe_topic: settings.mqtt.subscribe_topic.clone(),
        max_retries: settings.mqtt.max_retries,
    };
    let transport_result = transport::run_pubsub(
        &params,
        Arc::new(QueueSink::new(Arc::clone(&inbound))),
        Arc::new(LogConnectionObserver),
        Arc::clone(&outbound),
        &cancel,
    );

    cancel.cancel();
    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "worker exited with error"),
        Err(_) => error!("worker thread panicked"),
    }

    transport_result.context("control channel failed")?;
    Ok(())
}

/// Start the data-plane thread.
fn spawn_worker<D: SdrDevice + 'static>(
    device: D,
    settings: &Settings,
    inbound: &Arc<BlockingQueue<String>>,
    outbound: &Arc<BlockingQueue<String>>,
    cancel: &CancelToken,
) -> anyhow::Result<std::thread::JoinHandle<timed_rx_daq::error::Result<()>>> {
    let supervisor = ClockSyncSupervisor::new(SyncPolicy {
        threshold: settings.capture.ntp_slack,
        ..SyncPolicy::default()
    });
    let guard = DeadlineGuard::new(settings.capture.ntp_slack, settings.capture.setup_slack);
    let executor = AcquisitionExecutor::new(ExecutorConfig {
        channel: settings.device.channel,
        samples_per_buffer: settings.capture.samples_per_buffer,
        wire_format: settings.capture.wire_format,
        host_format: settings.capture.data_format,
        timeout_slack: 0.5,
        setup_timeout: settings.capture.setup_slack,
        integer_n: settings.capture.integer_n,
        persist: !settings.capture.null,
        antenna_override: settings.capture.antenna_override.clone(),
    });
    let params = WorkerParams {
        client_id: settings.mqtt.client_id.clone(),
        file_prefix: settings.capture.file_prefix.clone(),
    };
    let mut worker = AcquisitionWorker::new(
        device,
        supervisor,
        guard,
        executor,
        params,
        Arc::clone(inbound),
        Arc::clone(outbound),
        cancel.clone(),
    );
    let handle = std::thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || worker.run())
        .context("failed to spawn acquisition thread")?;
    Ok(handle)
}
