//! MQTT control-channel adapter.
//!
//! The publish/subscribe transport is an external collaborator: this module
//! owns the `rumqttc` client and keeps the coordination core decoupled behind
//! two narrow observer traits. [`MessageObserver`] delivers inbound payloads
//! (the core's [`QueueSink`] pushes them onto the inbound queue);
//! [`ConnectionObserver`] sees connection lifecycle events and is purely
//! informational. One adapter composes both — the core never learns MQTT
//! exists.
//!
//! A publisher thread drains the outbound queue to the response topic. On
//! connect the adapter announces `<<<id connected>>>`, re-subscribes to the
//! command topic, and registers a last-will `<<<id disconnected>>>` so peers
//! see unclean exits. Reconnection is retried with a bounded budget; when the
//! budget is exhausted the error propagates to the caller instead of
//! terminating the process from inside the event loop.

use crate::cancel::CancelToken;
use crate::error::{DaqError, Result};
use crate::queue::BlockingQueue;
use rumqttc::{Client, Event, LastWill, MqttOptions, Packet, QoS, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quality of service for both topics.
const MQTT_QOS: QoS = QoS::AtLeastOnce;

/// Pause between reconnect attempts.
const RECONNECT_PAUSE: Duration = Duration::from_millis(1000);

/// How long one outbound pop blocks before the cancel token is re-checked.
const PUBLISH_POP_SLICE: Duration = Duration::from_millis(200);

/// Narrow capability: receives every inbound message payload.
pub trait MessageObserver: Send + Sync {
    /// Called from the transport thread for each message on the command topic.
    fn on_message(&self, payload: String);
}

/// Narrow capability: observes connection lifecycle transitions.
pub trait ConnectionObserver: Send + Sync {
    /// The broker acknowledged a (re)connection.
    fn on_connected(&self);
    /// The connection was lost; the adapter will retry on its own.
    fn on_disconnected(&self);
}

/// [`MessageObserver`] that feeds the inbound queue.
pub struct QueueSink {
    queue: Arc<BlockingQueue<String>>,
}

impl QueueSink {
    /// Sink pushing onto `queue`.
    pub fn new(queue: Arc<BlockingQueue<String>>) -> Self {
        Self { queue }
    }
}

impl MessageObserver for QueueSink {
    fn on_message(&self, payload: String) {
        self.queue.push(payload);
    }
}

/// [`ConnectionObserver`] that only logs transitions.
#[derive(Debug, Default)]
pub struct LogConnectionObserver;

impl ConnectionObserver for LogConnectionObserver {
    fn on_connected(&self) {
        info!("MQTT connection established");
    }

    fn on_disconnected(&self) {
        warn!("MQTT connection lost, reconnecting");
    }
}

/// Connection parameters for the control channel.
#[derive(Debug, Clone)]
pub struct MqttParams {
    /// Broker URL, `tcp://host:port`.
    pub server: String,
    /// Client identity; also embedded in presence messages.
    pub client_id: String,
    /// Topic for outbound status messages.
    pub publish_topic: String,
    /// Topic carrying inbound capture commands.
    pub subscribe_topic: String,
    /// Consecutive reconnect failures tolerated before giving up.
    pub max_retries: u32,
}

/// Split `tcp://host:port` into host and port.
fn parse_server(server: &str) -> Result<(String, u16)> {
    let stripped = server
        .strip_prefix("tcp://")
        .or_else(|| server.strip_prefix("mqtt://"))
        .unwrap_or(server);
    match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| {
                DaqError::Configuration(format!("invalid MQTT port in '{server}'"))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((stripped.to_string(), 1883)),
    }
}

/// Run the MQTT pub/sub loops until cancellation or reconnect exhaustion.
///
/// Blocks the calling thread with the event loop and spawns one publisher
/// thread internally. On a fatal transport condition the shared token is
/// cancelled (so the worker thread also winds down) and the error is
/// returned.
pub fn run_pubsub(
    params: &MqttParams,
    messages: Arc<dyn MessageObserver>,
    connection_observer: Arc<dyn ConnectionObserver>,
    outbound: Arc<BlockingQueue<String>>,
    cancel: &CancelToken,
) -> Result<()> {
    let (host, port) = parse_server(&params.server)?;
    info!(host, port, client_id = %params.client_id, "connecting to MQTT broker");

    let mut options = MqttOptions::new(&params.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);
    options.set_last_will(LastWill::new(
        &params.publish_topic,
        format!("<<<{} disconnected>>>", params.client_id),
        MQTT_QOS,
        false,
    ));

    let (client, mut connection) = Client::new(options, 64);

    // publisher: drain the outbound queue to the response topic
    let publisher = {
        let client = client.clone();
        let topic = params.publish_topic.clone();
        let outbound = Arc::clone(&outbound);
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            while !cancel.is_cancelled() {
                let Some(message) = outbound.pop_timeout(PUBLISH_POP_SLICE) else {
                    continue;
                };
                if let Err(e) = client.publish(&topic, MQTT_QOS, false, message) {
                    warn!(error = %e, "publish failed");
                }
            }
            debug!("publisher thread stopping");
        })
    };

    let mut retries: u32 = 0;
    let result = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }
        match connection.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                retries = 0;
                connection_observer.on_connected();
                let online = format!("<<<{} connected>>>", params.client_id);
                if let Err(e) = client.publish(&params.publish_topic, MQTT_QOS, false, online) {
                    warn!(error = %e, "presence publish failed");
                }
                info!(topic = %params.subscribe_topic, "subscribing to command topic");
                if let Err(e) = client.subscribe(&params.subscribe_topic, MQTT_QOS) {
                    warn!(error = %e, "subscribe failed");
                }
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                debug!(topic = %publish.topic, "message arrived");
                messages.on_message(payload);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                connection_observer.on_disconnected();
                retries += 1;
                if retries > params.max_retries {
                    break Err(DaqError::TransportExhausted(params.max_retries));
                }
                warn!(error = %e, attempt = retries, "MQTT connection error");
                if !cancel.sleep_for(RECONNECT_PAUSE) {
                    break Ok(());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // idle window with no events; loop to re-check cancellation
            }
            Err(RecvTimeoutError::Disconnected) => {
                break Err(DaqError::Transport(
                    "MQTT event loop terminated".to_string(),
                ));
            }
        }
    };

    // wind the publisher down whether we exit cleanly or fatally
    cancel.cancel();
    publisher.join().ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_url() {
        assert_eq!(
            parse_server("tcp://localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
    }

    #[test]
    fn parses_bare_host_with_default_port() {
        assert_eq!(
            parse_server("broker.lan").unwrap(),
            ("broker.lan".to_string(), 1883)
        );
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_server("tcp://host:abc").is_err());
    }

    #[test]
    fn queue_sink_feeds_the_queue() {
        let queue = Arc::new(BlockingQueue::new());
        let sink = QueueSink::new(Arc::clone(&queue));
        sink.on_message("fc=1,...".to_string());
        assert_eq!(queue.pop(), "fc=1,...");
    }

    /// With a zero reconnect budget and nothing listening on the port, the
    /// event loop must surface `TransportExhausted` instead of spinning.
    #[test]
    fn reconnect_exhaustion_propagates_to_the_caller() {
        let params = MqttParams {
            server: "tcp://127.0.0.1:1".to_string(),
            client_id: "tester".to_string(),
            publish_topic: "response".to_string(),
            subscribe_topic: "command".to_string(),
            max_retries: 0,
        };
        let outbound = Arc::new(BlockingQueue::new());
        let cancel = CancelToken::new();
        let result = run_pubsub(
            &params,
            Arc::new(QueueSink::new(Arc::new(BlockingQueue::new()))),
            Arc::new(LogConnectionObserver),
            outbound,
            &cancel,
        );
        assert!(matches!(result, Err(DaqError::TransportExhausted(0))));
        // the fatal exit must also wind down the shared token
        assert!(cancel.is_cancelled());
    }
}
