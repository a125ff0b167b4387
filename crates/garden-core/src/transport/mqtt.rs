//! Push transport over MQTT.
//!
//! The controller publishes JSON status frames to a status topic and listens
//! for plain command tokens on a command topic.
//!
//! # Broker URLs
//!
//! | Scheme | Transport | Default port |
//! |--------|-----------|--------------|
//! | `mqtt://` | TCP | 1883 |
//! | `mqtts://` | TLS | 8883 |
//! | `ws://` | WebSocket | 80 |
//! | `wss://` | WebSocket over TLS | 443 |
//!
//! WebSocket URLs keep their path; without one, `/mqtt` is used.
//!
//! # Reconnection
//!
//! The rumqttc event loop reconnects on its own after an error. Each error is
//! reported as [`TransportEvent::Lost`]; after every ConnAck the status topic
//! is subscribed again and [`TransportEvent::Ready`] follows the SubAck.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use garden_types::{DeviceSnapshot, OutboundCommand, decode_patch};

use super::{Transport, TransportEvent, TransportKind, UPDATE_CHANNEL_CAPACITY, UpdateStream};
use crate::config::MqttConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{ConnectError, SendError, TransportError};

/// Capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long `close` waits for the event loop to stop.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Network framing selected by the broker URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl BrokerScheme {
    fn default_port(self) -> u16 {
        match self {
            BrokerScheme::Tcp => 1883,
            BrokerScheme::Tls => 8883,
            BrokerScheme::Ws => 80,
            BrokerScheme::Wss => 443,
        }
    }

    fn is_websocket(self) -> bool {
        matches!(self, BrokerScheme::Ws | BrokerScheme::Wss)
    }
}

/// A parsed broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
    /// Request path, only used for WebSocket brokers.
    pub path: String,
}

impl BrokerAddress {
    /// Parse a broker URL.
    pub fn parse(url: &str) -> Result<Self, String> {
        let (scheme, rest) = url
            .trim()
            .split_once("://")
            .ok_or_else(|| "URL must start with mqtt://, mqtts://, ws:// or wss://".to_string())?;

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => BrokerScheme::Tcp,
            "mqtts" | "ssl" => BrokerScheme::Tls,
            "ws" => BrokerScheme::Ws,
            "wss" => BrokerScheme::Wss,
            other => return Err(format!("Invalid scheme: {}", other)),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("Invalid port: {}", port))?;
                (host, port)
            }
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        let path = if !scheme.is_websocket() {
            String::new()
        } else if path.is_empty() || path == "/" {
            "/mqtt".to_string()
        } else {
            path.to_string()
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Build client options for this broker.
    fn mqtt_options(&self, client_id: &str, config: &MqttConfig) -> MqttOptions {
        let mut options = if self.scheme.is_websocket() {
            // rumqttc takes the full URL as the host for WebSocket transports
            let url = format!(
                "{}://{}:{}{}",
                if self.scheme == BrokerScheme::Wss { "wss" } else { "ws" },
                self.host,
                self.port,
                self.path
            );
            MqttOptions::new(client_id, url, self.port)
        } else {
            MqttOptions::new(client_id, &self.host, self.port)
        };

        options.set_keep_alive(Duration::from_secs(config.keep_alive.max(5)));
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        match self.scheme {
            BrokerScheme::Tcp => {}
            BrokerScheme::Tls => {
                options.set_transport(rumqttc::Transport::tls_with_default_config());
            }
            BrokerScheme::Ws => {
                options.set_transport(rumqttc::Transport::Ws);
            }
            BrokerScheme::Wss => {
                options.set_transport(rumqttc::Transport::wss_with_default_config());
            }
        }

        options
    }
}

/// Numeric MQTT 3.1.1 connect return code.
fn return_code(code: &ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// State shared between the transport handle and its event loop.
#[derive(Debug, Default)]
struct Shared {
    ready: AtomicBool,
    last_return_code: Mutex<Option<u8>>,
}

impl Shared {
    fn set_return_code(&self, code: u8) {
        if let Ok(mut last) = self.last_return_code.lock() {
            *last = Some(code);
        }
    }
}

/// MQTT transport with a background event loop.
pub struct MqttTransport {
    client: AsyncClient,
    status_topic: String,
    command_topic: String,
    shared: Arc<Shared>,
    updates: Mutex<Option<UpdateStream>>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("status_topic", &self.status_topic)
            .field("command_topic", &self.command_topic)
            .field("ready", &self.shared.ready.load(Ordering::Relaxed))
            .finish()
    }
}

impl MqttTransport {
    /// Connect to the broker and wait for its ConnAck.
    ///
    /// The subscription is made in the background; the transport reports
    /// [`TransportEvent::Ready`] once the broker acknowledges it.
    pub async fn connect(
        config: &MqttConfig,
        connect_timeout: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self, ConnectError> {
        let broker = config.broker.as_deref().unwrap_or_default();
        let address = BrokerAddress::parse(broker).map_err(|reason| ConnectError::InvalidAddress {
            address: broker.to_string(),
            reason,
        })?;

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("garden-dashboard-{:08x}", rand::random::<u32>()));
        let options = address.mqtt_options(&client_id, config);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        info!("Connecting to MQTT broker {} as {}", broker, client_id);

        let (events_tx, updates) = UpdateStream::channel(UPDATE_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = oneshot::channel();
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_event_loop(EventLoopContext {
            eventloop,
            client: client.clone(),
            status_topic: config.status_topic.clone(),
            shared: Arc::clone(&shared),
            events: events_tx,
            connected: Some(connected_tx),
            diagnostics,
            cancel: cancel.clone(),
        }));

        let outcome = match tokio::time::timeout(connect_timeout, connected_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectError::Unreachable(
                "event loop stopped before connecting".to_string(),
            )),
            Err(_) => Err(ConnectError::Timeout(connect_timeout)),
        };

        if let Err(e) = outcome {
            cancel.cancel();
            let _ = handle.await;
            return Err(e);
        }

        Ok(Self {
            client,
            status_topic: config.status_topic.clone(),
            command_topic: config.command_topic.clone(),
            shared,
            updates: Mutex::new(Some(updates)),
            cancel,
            task: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    /// The return code of the last ConnAck or refusal, if any.
    pub fn last_return_code(&self) -> Option<u8> {
        self.shared
            .last_return_code
            .lock()
            .ok()
            .and_then(|code| *code)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    async fn fetch_latest(&self) -> Result<Option<DeviceSnapshot>, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if !self.shared.ready.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }

        // a repeated SUBSCRIBE makes the broker resend the retained status
        self.client
            .subscribe(&self.status_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        debug!("Requested redelivery of {}", self.status_topic);
        Ok(None)
    }

    fn updates(&self) -> Option<UpdateStream> {
        self.updates.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn publish(&self, command: OutboundCommand) -> Result<(), SendError> {
        if self.cancel.is_cancelled() || !self.shared.ready.load(Ordering::Acquire) {
            return Err(SendError::Disconnected);
        }

        self.client
            .publish(&self.command_topic, QoS::AtLeastOnce, false, command.as_str())
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        info!("Published {} to {}", command, self.command_topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled() && self.shared.ready.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("Error disconnecting MQTT client: {}", e);
        }
        self.cancel.cancel();
        self.shared.ready.store(false, Ordering::Release);

        if let Some(handle) = self.task.lock().await.take()
            && tokio::time::timeout(CLOSE_TIMEOUT, handle).await.is_err()
        {
            warn!("MQTT event loop did not stop within {:?}", CLOSE_TIMEOUT);
        }
        info!("MQTT transport closed");
    }
}

struct EventLoopContext {
    eventloop: EventLoop,
    client: AsyncClient,
    status_topic: String,
    shared: Arc<Shared>,
    events: mpsc::Sender<TransportEvent>,
    connected: Option<oneshot::Sender<Result<(), ConnectError>>>,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
}

/// Drive the rumqttc event loop until cancelled.
///
/// Decoded frames are forwarded in arrival order. When the session is slow
/// to drain them, this waits for room rather than dropping anything.
async fn run_event_loop(mut ctx: EventLoopContext) {
    loop {
        let polled = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            polled = ctx.eventloop.poll() => polled,
        };

        let (event, back_off) = match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                ctx.shared.set_return_code(return_code(&ack.code));
                info!("MQTT connected (session present: {})", ack.session_present);
                if let Some(tx) = ctx.connected.take() {
                    let _ = tx.send(Ok(()));
                }
                if let Err(e) = ctx.client.try_subscribe(&ctx.status_topic, QoS::AtLeastOnce) {
                    warn!("Failed to queue subscription to {}: {}", ctx.status_topic, e);
                }
                (None, false)
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    error!("Broker rejected subscription to {}", ctx.status_topic);
                    ctx.shared.ready.store(false, Ordering::Release);
                    let reason = format!("subscription to {} rejected", ctx.status_topic);
                    (Some(TransportEvent::Lost { reason }), false)
                } else {
                    debug!("Subscribed to {}", ctx.status_topic);
                    ctx.shared.ready.store(true, Ordering::Release);
                    (Some(TransportEvent::Ready), false)
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == ctx.status_topic => {
                match decode_patch(&publish.payload) {
                    Ok(patch) => (Some(TransportEvent::Update(patch)), false),
                    Err(e) => {
                        warn!(
                            "Dropping undecodable status payload ({} bytes): {}",
                            publish.payload.len(),
                            e
                        );
                        ctx.diagnostics.record_decode_failure(e.to_string());
                        (None, false)
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                ctx.shared.ready.store(false, Ordering::Release);
                let reason = "broker closed the connection".to_string();
                (Some(TransportEvent::Lost { reason }), false)
            }
            Ok(Event::Incoming(Packet::PingResp)) => {
                debug!("MQTT ping response received");
                (None, false)
            }
            Ok(_) => (None, false),
            Err(e) => {
                ctx.shared.ready.store(false, Ordering::Release);
                if let ConnectionError::ConnectionRefused(code) = &e {
                    ctx.shared.set_return_code(return_code(code));
                }

                if let Some(tx) = ctx.connected.take() {
                    let err = match e {
                        ConnectionError::ConnectionRefused(code) => ConnectError::Refused {
                            code: return_code(&code),
                        },
                        other => ConnectError::Unreachable(other.to_string()),
                    };
                    let _ = tx.send(Err(err));
                    break;
                }

                warn!("MQTT connection error: {}. Reconnecting...", e);
                let reason = e.to_string();
                (Some(TransportEvent::Lost { reason }), true)
            }
        };

        if let Some(event) = event {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                sent = ctx.events.send(event) => {
                    if sent.is_err() {
                        debug!("Update stream dropped; frames are discarded");
                    }
                }
            }
        }

        if back_off {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    ctx.shared.ready.store(false, Ordering::Release);
    debug!("MQTT event loop stopped");
}
