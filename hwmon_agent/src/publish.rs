//! Publishing payloads to the broker.
//!
//! `MqttPublisher` wraps a rumqttc `AsyncClient`. Its `EventLoop` is driven on
//! a spawned task of the same runtime; reconnection is rumqttc's business, the
//! task only logs and keeps polling.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::config::BrokerConfig;
use crate::error::PublishError;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 10;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Returned for an accepted publish. The id is opaque and only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: u64,
}

#[async_trait]
pub trait PublishClient: Send {
    async fn publish(&mut self, topic: &str, body: &str) -> Result<PublishReceipt, PublishError>;

    /// Release transport resources. Called once on the loop's exit path;
    /// further calls are no-ops.
    async fn shutdown(&mut self) -> Result<(), PublishError>;
}

pub struct MqttPublisher {
    client: AsyncClient,
    qos: QoS,
    event_task: Option<JoinHandle<()>>,
    sent: u64,
}

impl MqttPublisher {
    /// Build the client and start driving its event loop. Must be called from
    /// within a tokio runtime.
    pub fn connect(broker: &BrokerConfig, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let mut opts = MqttOptions::new(client_id.clone(), broker.host.clone(), broker.port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_credentials(broker.user.clone(), broker.secret.clone());

        let (client, event_loop) = AsyncClient::new(opts, REQUEST_CAPACITY);
        info!(
            host = %broker.host,
            port = broker.port,
            client_id = %client_id,
            "starting mqtt client"
        );
        let event_task = tokio::spawn(drive_event_loop(event_loop));

        Self {
            client,
            qos: broker.qos,
            event_task: Some(event_task),
            sent: 0,
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop) {
    let mut disconnecting = false;
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("connected to broker");
                } else {
                    error!(code = ?ack.code, "broker refused connection");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent");
                disconnecting = true;
            }
            Ok(event) => trace!(?event, "mqtt event"),
            Err(e) if disconnecting => {
                debug!(error = %e, "event loop closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "mqtt connection error, retrying");
                sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

#[async_trait]
impl PublishClient for MqttPublisher {
    async fn publish(&mut self, topic: &str, body: &str) -> Result<PublishReceipt, PublishError> {
        if self.event_task.is_none() {
            return Err(PublishError::Closed);
        }
        // try_publish never waits on a full request queue; a full queue is a
        // failed publish and the reading is dropped.
        self.client
            .try_publish(topic, self.qos, false, body.as_bytes().to_vec())?;
        self.sent += 1;
        Ok(PublishReceipt {
            message_id: self.sent,
        })
    }

    async fn shutdown(&mut self) -> Result<(), PublishError> {
        let Some(mut task) = self.event_task.take() else {
            return Ok(());
        };
        // The request queue stays full while the broker is unreachable, so
        // the disconnect must not wait for room in it.
        let result = self.client.try_disconnect();
        if result.is_err() {
            warn!("disconnect could not be queued, aborting mqtt event loop");
            task.abort();
        } else if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("mqtt event loop did not stop in time, aborting");
            task.abort();
        }
        info!(published = self.sent, "mqtt client stopped");
        result.map_err(PublishError::from)
    }
}
