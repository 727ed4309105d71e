//! MQTT feed subscriber
//!
//! Owns the broker connection. The `rumqttc` event loop runs in its own tokio
//! task so keep-alive pings keep flowing while the processing loop is busy
//! with a slow message; publishes on the feed topic are forwarded over an
//! unbounded channel.
//!
//! The channel has no capacity limit. A sustained arrival rate above the
//! processing rate grows it without bound, so the backlog depth is tracked
//! and logged once it passes the configured high-water mark.

use super::InboundMessage;
use crate::config::BrokerConfig;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    SubAck, SubscribeReasonCode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the client → event loop request channel (subscribe, disconnect).
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Pause between polls after a transport error, before `rumqttc` reconnects.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Broker connection errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection to {addr} failed: {message}")]
    ConnectionFailed { addr: String, message: String },

    #[error("broker {addr} refused connection: {code}")]
    Refused { addr: String, code: String },

    #[error("timed out after {secs}s waiting for broker {addr}")]
    Timeout { addr: String, secs: u64 },

    #[error("subscribe to '{topic}' failed: {message}")]
    Subscribe { topic: String, message: String },
}

/// Live subscription to the feed topic.
pub struct MqttSubscriber {
    client: AsyncClient,
    messages: mpsc::UnboundedReceiver<InboundMessage>,
    backlog: Arc<AtomicUsize>,
    cancel: CancellationToken,
    network_task: Option<JoinHandle<()>>,
    addr: String,
}

impl MqttSubscriber {
    /// Connect, wait for the broker's CONNACK, subscribe and wait for the
    /// SUBACK, then start the network task.
    ///
    /// Any failure here is a startup error, including a subscription the
    /// broker rejects.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let addr = format!("{}:{}", config.host, config.port);
        info!(address = %addr, client_id = %config.client_id, "Connecting to MQTT broker");

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        tokio::time::timeout(connect_timeout, wait_for_connack(&mut eventloop, &addr))
            .await
            .map_err(|_| BrokerError::Timeout {
                addr: addr.clone(),
                secs: config.connect_timeout_secs,
            })??;

        info!(address = %addr, "MQTT connection established");

        client
            .subscribe(config.topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| BrokerError::Subscribe {
                topic: config.topic.clone(),
                message: e.to_string(),
            })?;
        tokio::time::timeout(
            connect_timeout,
            wait_for_suback(&mut eventloop, &addr, &config.topic),
        )
        .await
        .map_err(|_| BrokerError::Timeout {
            addr: addr.clone(),
            secs: config.connect_timeout_secs,
        })??;
        info!(topic = %config.topic, "Subscribed to feed topic");

        let (tx, messages) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let network = NetworkLoop {
            eventloop,
            client: client.clone(),
            topic: config.topic.clone(),
            tx,
            backlog: Arc::clone(&backlog),
            backlog_warning: config.backlog_warning.max(1),
            cancel: cancel.clone(),
        };
        let network_task = tokio::spawn(network.run());

        Ok(Self {
            client,
            messages,
            backlog,
            cancel,
            network_task: Some(network_task),
            addr,
        })
    }

    /// Next message from the feed, or `None` once the network task has stopped.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        let msg = self.messages.recv().await?;
        self.backlog.fetch_sub(1, Ordering::SeqCst);
        Some(msg)
    }

    /// Messages received but not yet handed to the pipeline.
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Relaxed)
    }

    pub fn broker_addr(&self) -> &str {
        &self.addr
    }

    /// Send DISCONNECT and stop the network task.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not queued");
        }
        // Give the event loop a moment to flush DISCONNECT before stopping it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.cancel.cancel();
        if let Some(task) = self.network_task.take() {
            let _ = task.await;
        }
        info!(address = %self.addr, "MQTT connection closed");
    }
}

impl Drop for MqttSubscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll until the broker acknowledges the connection.
async fn wait_for_connack(eventloop: &mut EventLoop, addr: &str) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BrokerError::Refused {
                        addr: addr.to_string(),
                        code: format!("{:?}", ack.code),
                    })
                };
            }
            Ok(_) => continue,
            Err(ConnectionError::ConnectionRefused(code)) => {
                return Err(BrokerError::Refused {
                    addr: addr.to_string(),
                    code: format!("{code:?}"),
                })
            }
            Err(e) => {
                return Err(BrokerError::ConnectionFailed {
                    addr: addr.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Poll until the broker answers the SUBSCRIBE.
async fn wait_for_suback(
    eventloop: &mut EventLoop,
    addr: &str,
    topic: &str,
) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(ack))) => return check_suback(&ack, topic),
            Ok(_) => continue,
            Err(ConnectionError::MqttState(e)) => {
                return Err(BrokerError::Subscribe {
                    topic: topic.to_string(),
                    message: e.to_string(),
                })
            }
            Err(e) => {
                return Err(BrokerError::ConnectionFailed {
                    addr: addr.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

fn check_suback(ack: &SubAck, topic: &str) -> Result<(), BrokerError> {
    if ack
        .return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        return Err(BrokerError::Subscribe {
            topic: topic.to_string(),
            message: "rejected by broker".to_string(),
        });
    }
    Ok(())
}

/// State owned by the background network task.
struct NetworkLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    tx: mpsc::UnboundedSender<InboundMessage>,
    backlog: Arc<AtomicUsize>,
    backlog_warning: usize,
    cancel: CancellationToken,
}

impl NetworkLoop {
    async fn run(mut self) {
        debug!("[MqttNetwork] Task starting");
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != self.topic {
                        debug!(topic = %publish.topic, "Ignoring publish on unexpected topic");
                        continue;
                    }
                    let msg = InboundMessage::new(publish.topic, publish.payload.to_vec());
                    // Count before sending so the receiver never decrements below zero.
                    let depth = self.backlog.fetch_add(1, Ordering::SeqCst) + 1;
                    if self.tx.send(msg).is_err() {
                        info!("[MqttNetwork] Pipeline receiver dropped, stopping");
                        break;
                    }
                    if depth % self.backlog_warning == 0 {
                        warn!(
                            backlog = depth,
                            "Inbound message backlog growing; processing is slower than arrival rate"
                        );
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Clean sessions drop subscriptions on reconnect.
                    info!("MQTT reconnected, re-subscribing to {}", self.topic);
                    if let Err(e) = self
                        .client
                        .try_subscribe(self.topic.as_str(), QoS::AtMostOnce)
                    {
                        warn!(error = %e, topic = %self.topic, "Re-subscribe failed");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if let Err(e) = check_suback(&ack, &self.topic) {
                        error!(error = %e, "Re-subscribe rejected, no feed messages will arrive");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, transport will reconnect");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }
        debug!("[MqttNetwork] Task stopped");
    }
}
